pub mod preflight;

pub use preflight::{
    check, content_type_for, looks_like_xml, PreflightError, UploadCandidate, UploadLimits,
    ValidationKind, DEFAULT_EXTENSIONS, DEFAULT_MAX_FILE_SIZE, SNIFF_LEN,
};
