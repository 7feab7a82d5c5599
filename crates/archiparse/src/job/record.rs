//! Job record and its transition operations.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status::{JobStatus, TransitionError};
use super::timestamp;

/// Upper bound on validation records kept for one job.
pub const MAX_VALIDATION_ERRORS: usize = 100;

/// IFC schema version detected during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IfcVersion {
    #[serde(rename = "IFC2X3")]
    Ifc2x3,
    #[serde(rename = "IFC4")]
    Ifc4,
}

impl IfcVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            IfcVersion::Ifc2x3 => "IFC2X3",
            IfcVersion::Ifc4 => "IFC4",
        }
    }
}

impl fmt::Display for IfcVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IfcVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IFC2X3" => Ok(IfcVersion::Ifc2x3),
            "IFC4" => Ok(IfcVersion::Ifc4),
            other => Err(format!("Unknown IFC version '{}'", other)),
        }
    }
}

/// One schema-violation record produced during validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    #[serde(default)]
    pub line: Option<u64>,
    #[serde(default)]
    pub column: Option<u64>,
    pub message: String,
    #[serde(default)]
    pub element: Option<String>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            line: None,
            column: None,
            message: message.into(),
            element: None,
        }
    }

    pub fn at(mut self, line: u64, column: u64) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn element(mut self, element: impl Into<String>) -> Self {
        self.element = Some(element.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(col)) => write!(f, "{}:{}: {}", line, col, self.message)?,
            (Some(line), None) => write!(f, "{}: {}", line, self.message)?,
            _ => f.write_str(&self.message)?,
        }
        if let Some(element) = &self.element {
            write!(f, " [{}]", element)?;
        }
        Ok(())
    }
}

/// Free-form job metadata.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// One submitted file's processing lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub filename: String,
    pub file_size: u64,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub ifc_version: Option<IfcVersion>,
    pub status: JobStatus,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub validation_errors: Option<Vec<ValidationError>>,
    #[serde(default, alias = "job_metadata", deserialize_with = "null_as_empty")]
    pub metadata: Metadata,
    #[serde(with = "timestamp::required")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::optional")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::optional")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::optional")]
    pub completed_at: Option<DateTime<Utc>>,
}

fn null_as_empty<'de, D>(d: D) -> Result<Metadata, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Metadata>::deserialize(d)?.unwrap_or_default())
}

impl Job {
    /// Creates a queued job for an accepted upload.
    pub fn new(
        tenant_id: Uuid,
        filename: impl Into<String>,
        file_size: u64,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            filename: filename.into(),
            file_size,
            file_path: file_path.into(),
            ifc_version: None,
            status: JobStatus::EnAttente,
            error_message: None,
            validation_errors: None,
            metadata: Metadata::new(),
            created_at: timestamp::now(),
            updated_at: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn progress(&self) -> u8 {
        self.status.progress()
    }

    /// Moves the job one step along the success path.
    ///
    /// Entering `Validation` stamps `started_at`, entering `Termine` stamps
    /// `completed_at`. Failure goes through [`Job::fail`].
    pub fn advance(&mut self, to: JobStatus, at: DateTime<Utc>) -> Result<(), TransitionError> {
        if to == JobStatus::Echoue {
            return Err(TransitionError {
                from: self.status,
                to,
            });
        }
        self.status = self.status.transition_to(to)?;
        self.updated_at = Some(at);
        match to {
            JobStatus::Validation => self.started_at = Some(at),
            JobStatus::Termine => self.completed_at = Some(at),
            _ => {}
        }
        Ok(())
    }

    /// Moves the job to `Echoue` with a reason.
    pub fn fail(
        &mut self,
        message: impl Into<String>,
        validation_errors: Option<Vec<ValidationError>>,
        at: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.status = self.status.transition_to(JobStatus::Echoue)?;
        self.error_message = Some(message.into());
        if let Some(mut errors) = validation_errors.filter(|e| !e.is_empty()) {
            errors.truncate(MAX_VALIDATION_ERRORS);
            self.validation_errors = Some(errors);
        }
        self.updated_at = Some(at);
        self.completed_at = Some(at);
        Ok(())
    }
}
