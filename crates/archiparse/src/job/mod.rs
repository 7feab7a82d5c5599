//! Job lifecycle: canonical states, legal transitions and the job record.

pub mod record;
pub mod status;
pub mod timestamp;

pub use record::{IfcVersion, Job, Metadata, ValidationError, MAX_VALIDATION_ERRORS};
pub use status::{JobStatus, TransitionError, UnknownStatus};
