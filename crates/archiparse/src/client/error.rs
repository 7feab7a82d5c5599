use thiserror::Error;

use crate::upload::PreflightError;

/// Failures surfaced by [`ApiClient`](super::ApiClient).
#[derive(Error, Debug)]
pub enum ApiError {
    /// Rejected locally before anything was sent.
    #[error(transparent)]
    Validation(#[from] PreflightError),

    #[error("Not authenticated: an access token and a tenant id are required")]
    MissingCredentials,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Unauthorized(String),

    /// 5xx, unexpected statuses and transport failures.
    #[error("{message}")]
    Server { status: Option<u16>, message: String },

    /// The identity probe rejected the current token; callers log in again.
    #[error("Identity probe rejected the current token")]
    SilentAuthProbe,

    #[error("Malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    pub(crate) fn no_response() -> Self {
        ApiError::Server {
            status: None,
            message: "No response from server".to_string(),
        }
    }

    /// Worth retrying on the next poll: transport failures, 5xx, 429 and
    /// malformed bodies. Other statuses are permanent rejections.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Server { status: None, .. } | ApiError::Decode(_) => true,
            ApiError::Server {
                status: Some(status),
                ..
            } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
