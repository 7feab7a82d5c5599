//! Explicit authentication state shared by client calls.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use super::ApiError;

/// Token and tenant sent with every authenticated request.
#[derive(Debug)]
pub struct Session {
    pub access_token: SecretString,
    pub tenant_id: Uuid,
}

impl Clone for Session {
    fn clone(&self) -> Self {
        Self {
            access_token: copy_secret(&self.access_token),
            tenant_id: self.tenant_id,
        }
    }
}

/// Login credentials, supplied explicitly by the caller.
#[derive(Debug)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: SecretString) -> Self {
        Self {
            email: email.into(),
            password,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    access_token: Option<SecretString>,
    tenant_id: Option<Uuid>,
}

/// Holder of the current session, passed to every call.
///
/// The token and the tenant id are learned separately (login returns the
/// token, the identity probe the tenant), so each half can be present alone.
#[derive(Debug, Default)]
pub struct SessionContext {
    state: RwLock<State>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        let ctx = Self::new();
        ctx.set(session);
        ctx
    }

    /// The complete session, or `MissingCredentials` when either half is
    /// absent.
    pub fn session(&self) -> Result<Session, ApiError> {
        let state = self.read();
        match (&state.access_token, state.tenant_id) {
            (Some(token), Some(tenant_id)) => Ok(Session {
                access_token: copy_secret(token),
                tenant_id,
            }),
            _ => Err(ApiError::MissingCredentials),
        }
    }

    pub fn access_token(&self) -> Option<SecretString> {
        self.read().access_token.as_ref().map(copy_secret)
    }

    pub fn tenant_id(&self) -> Option<Uuid> {
        self.read().tenant_id
    }

    pub fn set(&self, session: Session) {
        let mut state = self.write();
        state.access_token = Some(session.access_token);
        state.tenant_id = Some(session.tenant_id);
    }

    pub fn set_token(&self, token: SecretString) {
        self.write().access_token = Some(token);
    }

    pub fn set_tenant(&self, tenant_id: Uuid) {
        self.write().tenant_id = Some(tenant_id);
    }

    pub fn clear(&self) {
        *self.write() = State::default();
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret())
}
