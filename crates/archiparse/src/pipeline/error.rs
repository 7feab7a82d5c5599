use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to read '{}': {source}", crate::sanitize::redact_path(.path))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}, column {column}: {message}")]
    Syntax {
        line: u64,
        column: u64,
        message: String,
    },

    #[error("{0}")]
    Transform(String),

    #[error("Storage failed: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error(transparent)]
    Transition(#[from] crate::job::TransitionError),
}

impl PipelineError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Non-fatal findings recorded in job metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineWarning {
    NoProject,
    NoElements,
    UnresolvedReference { role: String, target: String },
}

impl std::fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineWarning::NoProject => f.write_str("Document has no IfcProject"),
            PipelineWarning::NoElements => f.write_str("Document has no building elements"),
            PipelineWarning::UnresolvedReference { role, target } => {
                write!(f, "Unresolved reference '{}' under {}", target, role)
            }
        }
    }
}
