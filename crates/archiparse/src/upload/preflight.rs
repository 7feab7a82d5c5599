//! Pre-flight checks run before an upload is accepted.
//!
//! The same checks run in the client before anything is sent and in the job
//! service before anything is stored. Order is extension, size, format; the
//! first failing check is reported.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default ceiling on upload size: 500 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Default accepted filename extensions.
pub const DEFAULT_EXTENSIONS: [&str; 2] = [".ifcxml", ".xml"];

/// Number of leading bytes inspected when sniffing content.
pub const SNIFF_LEN: usize = 512;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const GENERIC_CONTENT_TYPE: &str = "application/octet-stream";

/// Which pre-flight check rejected a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationKind {
    Extension,
    Size,
    Format,
}

impl fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValidationKind::Extension => "extension",
            ValidationKind::Size => "size",
            ValidationKind::Format => "format",
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct PreflightError {
    pub kind: ValidationKind,
    pub message: String,
}

impl PreflightError {
    fn new(kind: ValidationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Acceptance limits for uploads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_file_size: u64,
    /// Lower-case extensions including the leading dot.
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// What is known about a file before it is accepted.
#[derive(Debug, Clone, Copy)]
pub struct UploadCandidate<'a> {
    pub filename: &'a str,
    pub size: u64,
    pub content_type: Option<&'a str>,
    /// Leading bytes of the content; [`SNIFF_LEN`] is enough.
    pub head: &'a [u8],
}

/// Runs the extension, size and format checks in that order.
pub fn check(candidate: &UploadCandidate<'_>, limits: &UploadLimits) -> Result<(), PreflightError> {
    check_extension(candidate.filename, limits)?;
    check_size(candidate.size, limits)?;
    check_format(candidate.content_type, candidate.head, candidate.size)
}

fn check_extension(filename: &str, limits: &UploadLimits) -> Result<(), PreflightError> {
    let lower = filename.to_lowercase();
    if limits
        .allowed_extensions
        .iter()
        .any(|ext| lower.ends_with(&ext.to_lowercase()))
    {
        return Ok(());
    }
    Err(PreflightError::new(
        ValidationKind::Extension,
        format!(
            "File extension not allowed. Accepted: {}",
            limits.allowed_extensions.join(", ")
        ),
    ))
}

fn check_size(size: u64, limits: &UploadLimits) -> Result<(), PreflightError> {
    if size <= limits.max_file_size {
        return Ok(());
    }
    Err(PreflightError::new(
        ValidationKind::Size,
        format!(
            "File too large ({}). Maximum: {}",
            human_size(size),
            human_size(limits.max_file_size)
        ),
    ))
}

fn check_format(content_type: Option<&str>, head: &[u8], size: u64) -> Result<(), PreflightError> {
    let declared = content_type
        .map(|ct| ct.trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty());

    match declared.as_deref() {
        Some(ct) if ct.contains("xml") => return Ok(()),
        Some(ct) if !ct.starts_with(GENERIC_CONTENT_TYPE) => {
            return Err(PreflightError::new(
                ValidationKind::Format,
                format!("Content type '{}' is not XML", ct),
            ));
        }
        _ => {}
    }

    if size == 0 || head.is_empty() {
        return Err(PreflightError::new(ValidationKind::Format, "File is empty"));
    }
    if looks_like_xml(head) {
        Ok(())
    } else {
        Err(PreflightError::new(
            ValidationKind::Format,
            "File content is not XML",
        ))
    }
}

/// True when the first non-whitespace byte after an optional BOM is `<`.
pub fn looks_like_xml(head: &[u8]) -> bool {
    let body = head.strip_prefix(UTF8_BOM).unwrap_or(head);
    body.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'<')
}

/// Content type sent with an upload.
pub fn content_type_for(filename: &str) -> String {
    if filename.to_lowercase().ends_with(".ifcxml") {
        return "application/xml".to_string();
    }
    mime_guess::from_path(filename)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

fn human_size(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    if bytes >= MIB {
        format!("{:.0} MB", bytes as f64 / MIB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
