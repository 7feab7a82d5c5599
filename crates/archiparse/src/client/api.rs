use std::time::Duration;

use log::{debug, info, warn};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::job::{Job, JobStatus};
use crate::model::{Element, ElementDetail, Model, Page};
use crate::service::{ElementQuery, QuotaUsage};
use crate::upload::{self, UploadCandidate, UploadLimits, SNIFF_LEN};

use super::session::{Credentials, Session, SessionContext};
use super::ApiError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/v1";

/// Header carrying the tenant of every authenticated request.
pub const TENANT_HEADER: &str = "X-Tenant-ID";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Response to an accepted upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub job_id: Uuid,
    pub filename: String,
    pub file_size: u64,
    pub status: JobStatus,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct JobList {
    jobs: Vec<Job>,
    total: u64,
    page: u32,
    page_size: u32,
}

#[derive(Debug, Deserialize)]
struct ElementList {
    elements: Vec<Element>,
    total: u64,
    page: u32,
    page_size: u32,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Identity returned by `/auth/me`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CurrentUser {
    pub tenant_id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

/// Client for the job processing REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    limits: UploadLimits,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Server {
                status: None,
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            limits: UploadLimits::default(),
        })
    }

    /// Limits applied by the local pre-flight checks.
    pub fn with_limits(mut self, limits: UploadLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Uploads a file after the local pre-flight checks pass.
    ///
    /// A pre-flight failure or a missing session never reaches the server.
    pub async fn upload(
        &self,
        ctx: &SessionContext,
        filename: &str,
        content: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<UploadResponse, ApiError> {
        let candidate = UploadCandidate {
            filename,
            size: content.len() as u64,
            content_type,
            head: &content[..content.len().min(SNIFF_LEN)],
        };
        upload::check(&candidate, &self.limits)?;
        let session = ctx.session()?;

        let mime = content_type
            .filter(|t| !t.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| upload::content_type_for(filename));
        let size = content.len();
        let part = Part::bytes(content)
            .file_name(filename.to_string())
            .mime_str(&mime)
            .map_err(|e| ApiError::InvalidArgument(format!("Invalid content type: {}", e)))?;
        let form = Form::new().part("file", part);

        let request = self.client.post(self.url("upload")).multipart(form);
        let response = self.send(ctx, &session, request).await?;
        let accepted: UploadResponse = decode(response).await?;
        info!("Uploaded {} ({} bytes) as job {}", filename, size, accepted.job_id);
        Ok(accepted)
    }

    pub async fn list_jobs(
        &self,
        ctx: &SessionContext,
        page: u32,
        page_size: u32,
        status: Option<JobStatus>,
    ) -> Result<Page<Job>, ApiError> {
        let mut query = vec![
            ("page", page.to_string()),
            ("page_size", page_size.to_string()),
        ];
        if let Some(status) = status {
            query.push(("status", status.as_str().to_string()));
        }

        let list: JobList = self.get(ctx, "jobs", &query).await?;
        Ok(Page {
            items: list.jobs,
            total: list.total,
            page: list.page,
            page_size: list.page_size,
        })
    }

    pub async fn get_job(&self, ctx: &SessionContext, id: Uuid) -> Result<Job, ApiError> {
        self.get(ctx, &format!("jobs/{}", id), &[]).await
    }

    /// The tenant's storage and monthly file usage against its limits.
    pub async fn quota_usage(&self, ctx: &SessionContext) -> Result<QuotaUsage, ApiError> {
        self.get(ctx, "quota/usage", &[]).await
    }

    pub async fn list_models(
        &self,
        ctx: &SessionContext,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Model>, ApiError> {
        let query = [
            ("page", page.to_string()),
            ("page_size", page_size.to_string()),
        ];
        self.get(ctx, "models", &query).await
    }

    pub async fn get_model(&self, ctx: &SessionContext, id: Uuid) -> Result<Model, ApiError> {
        self.get(ctx, &format!("models/{}", id), &[]).await
    }

    pub async fn list_elements(
        &self,
        ctx: &SessionContext,
        query: &ElementQuery,
    ) -> Result<Page<Element>, ApiError> {
        let mut params = vec![
            ("model_id", query.model_id.to_string()),
            ("page", query.page.to_string()),
            ("page_size", query.page_size.to_string()),
        ];
        if let Some(ifc_type) = &query.ifc_type {
            params.push(("ifc_type", ifc_type.clone()));
        }
        if let Some(storey_id) = query.storey_id {
            params.push(("storey_id", storey_id.to_string()));
        }
        if let Some(space_id) = query.space_id {
            params.push(("space_id", space_id.to_string()));
        }

        let list: ElementList = self.get(ctx, "elements", &params).await?;
        Ok(Page {
            items: list.elements,
            total: list.total,
            page: list.page,
            page_size: list.page_size,
        })
    }

    pub async fn get_element(
        &self,
        ctx: &SessionContext,
        id: Uuid,
    ) -> Result<ElementDetail, ApiError> {
        self.get(ctx, &format!("elements/{}", id), &[]).await
    }

    /// Exchanges credentials for a token and stores it in `ctx`.
    pub async fn login(
        &self,
        ctx: &SessionContext,
        credentials: &Credentials,
    ) -> Result<TokenResponse, ApiError> {
        let body = LoginRequest {
            email: &credentials.email,
            password: credentials.password.expose_secret(),
        };
        let response = self
            .client
            .post(self.url("auth/login"))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let response = match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let detail = error_detail(response).await;
                return Err(ApiError::Unauthorized(
                    detail.unwrap_or_else(|| "Invalid email or password".to_string()),
                ));
            }
            _ => check_status(ctx, response).await?,
        };

        let token: TokenResponse = decode(response).await?;
        ctx.set_token(SecretString::from(token.access_token.as_str()));
        debug!("Logged in as {}", credentials.email);
        Ok(token)
    }

    /// Identity probe. A 401 or 403 is the expected answer for a stale token
    /// and maps to [`ApiError::SilentAuthProbe`].
    pub async fn current_user(&self, ctx: &SessionContext) -> Result<CurrentUser, ApiError> {
        let token = ctx.access_token().ok_or(ApiError::MissingCredentials)?;
        let response = self
            .client
            .get(self.url("auth/me"))
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ApiError::SilentAuthProbe),
            _ => decode(check_status(ctx, response).await?).await,
        }
    }

    /// Returns a usable session, logging in with `credentials` when the
    /// current token is missing or rejected.
    pub async fn ensure_authenticated(
        &self,
        ctx: &SessionContext,
        credentials: Option<&Credentials>,
    ) -> Result<Session, ApiError> {
        if ctx.access_token().is_some() {
            match self.current_user(ctx).await {
                Ok(user) => {
                    ctx.set_tenant(user.tenant_id);
                    return ctx.session();
                }
                Err(ApiError::SilentAuthProbe) => {
                    debug!("Stored token rejected, logging in again");
                    ctx.clear();
                }
                Err(e) => return Err(e),
            }
        }

        let credentials = credentials.ok_or(ApiError::MissingCredentials)?;
        self.login(ctx, credentials).await?;
        match self.current_user(ctx).await {
            Ok(user) => {
                ctx.set_tenant(user.tenant_id);
                ctx.session()
            }
            Err(ApiError::SilentAuthProbe) => {
                ctx.clear();
                Err(ApiError::Unauthorized(
                    "Login succeeded but the identity probe was rejected".to_string(),
                ))
            }
            Err(e) => Err(e),
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        ctx: &SessionContext,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let session = ctx.session()?;
        let mut request = self.client.get(self.url(path));
        if !query.is_empty() {
            request = request.query(query);
        }
        let response = self.send(ctx, &session, request).await?;
        decode(response).await
    }

    async fn send(
        &self,
        ctx: &SessionContext,
        session: &Session,
        request: RequestBuilder,
    ) -> Result<Response, ApiError> {
        let response = request
            .bearer_auth(session.access_token.expose_secret())
            .header(TENANT_HEADER, session.tenant_id.to_string())
            .send()
            .await
            .map_err(transport_error)?;
        check_status(ctx, response).await
    }
}

fn transport_error(e: reqwest::Error) -> ApiError {
    warn!("Request failed: {}", e.without_url());
    ApiError::no_response()
}

async fn check_status(ctx: &SessionContext, response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let detail = error_detail(response).await;
    Err(match status {
        StatusCode::UNAUTHORIZED => {
            ctx.clear();
            ApiError::Unauthorized(
                detail.unwrap_or_else(|| "Session expired, please log in again".to_string()),
            )
        }
        StatusCode::FORBIDDEN => {
            ApiError::Unauthorized(detail.unwrap_or_else(|| "Access denied".to_string()))
        }
        StatusCode::NOT_FOUND => {
            ApiError::NotFound(detail.unwrap_or_else(|| "Resource not found".to_string()))
        }
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ApiError::InvalidArgument(detail.unwrap_or_else(|| "Invalid request".to_string()))
        }
        _ => ApiError::Server {
            status: Some(status.as_u16()),
            message: detail.unwrap_or_else(|| format!("Server error ({})", status)),
        },
    })
}

async fn error_detail(response: Response) -> Option<String> {
    let bytes = response.bytes().await.ok()?;
    detail_from_body(&bytes)
}

fn detail_from_body(body: &[u8]) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_slice(body).ok()?;
    match parsed.detail? {
        serde_json::Value::Null => None,
        serde_json::Value::String(message) => Some(message),
        other => Some(other.to_string()),
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let bytes = response.bytes().await.map_err(transport_error)?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
}
