//! Job status state machine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Processing status of a job.
///
/// The success path is `EnAttente → Validation → Valide → Parsing →
/// Transformation → Termine`. `Echoue` is reachable from every non-terminal
/// state. No state is revisited once left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    EnAttente,
    Validation,
    Valide,
    Parsing,
    Transformation,
    Termine,
    Echoue,
}

/// A transition that the state machine does not allow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Illegal job transition {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// A status string that is not a member of the enum.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown job status '{0}'")]
pub struct UnknownStatus(pub String);

impl JobStatus {
    pub const ALL: [JobStatus; 7] = [
        JobStatus::EnAttente,
        JobStatus::Validation,
        JobStatus::Valide,
        JobStatus::Parsing,
        JobStatus::Transformation,
        JobStatus::Termine,
        JobStatus::Echoue,
    ];

    /// Wire and storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::EnAttente => "EN_ATTENTE",
            JobStatus::Validation => "VALIDATION",
            JobStatus::Valide => "VALIDE",
            JobStatus::Parsing => "PARSING",
            JobStatus::Transformation => "TRANSFORMATION",
            JobStatus::Termine => "TERMINE",
            JobStatus::Echoue => "ECHOUE",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::EnAttente => "En attente",
            JobStatus::Validation => "Validation",
            JobStatus::Valide => "Validé",
            JobStatus::Parsing => "Parsing",
            JobStatus::Transformation => "Transformation",
            JobStatus::Termine => "Terminé",
            JobStatus::Echoue => "Échoué",
        }
    }

    /// Returns true for `Termine` and `Echoue`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Termine | JobStatus::Echoue)
    }

    /// Coarse phase indicator for display. Not a completion fraction.
    pub fn progress(&self) -> u8 {
        match self {
            JobStatus::EnAttente => 0,
            JobStatus::Validation => 20,
            JobStatus::Valide => 30,
            JobStatus::Parsing => 50,
            JobStatus::Transformation => 80,
            JobStatus::Termine => 100,
            JobStatus::Echoue => 0,
        }
    }

    /// Position along the forward path. Both terminal states share the last rank.
    pub fn rank(&self) -> u8 {
        match self {
            JobStatus::EnAttente => 0,
            JobStatus::Validation => 1,
            JobStatus::Valide => 2,
            JobStatus::Parsing => 3,
            JobStatus::Transformation => 4,
            JobStatus::Termine | JobStatus::Echoue => 5,
        }
    }

    /// Next state on the success path, if any.
    pub fn next(&self) -> Option<JobStatus> {
        match self {
            JobStatus::EnAttente => Some(JobStatus::Validation),
            JobStatus::Validation => Some(JobStatus::Valide),
            JobStatus::Valide => Some(JobStatus::Parsing),
            JobStatus::Parsing => Some(JobStatus::Transformation),
            JobStatus::Transformation => Some(JobStatus::Termine),
            JobStatus::Termine | JobStatus::Echoue => None,
        }
    }

    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == JobStatus::Echoue || self.next() == Some(to)
    }

    /// Validates a transition, returning the target state on success.
    pub fn transition_to(&self, to: JobStatus) -> Result<JobStatus, TransitionError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(TransitionError { from: *self, to })
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}
