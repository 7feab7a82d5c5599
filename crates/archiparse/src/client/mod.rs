//! REST client for the job processing API.

pub mod api;
pub mod error;
pub mod session;

pub use api::{
    ApiClient, CurrentUser, TokenResponse, UploadResponse, DEFAULT_BASE_URL, TENANT_HEADER,
};
pub use error::ApiError;
pub use session::{Credentials, Session, SessionContext};
