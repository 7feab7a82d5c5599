//! REST client behaviour against a mock server.

use mockito::Matcher;
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use archiparse::client::{ApiClient, ApiError, Credentials, Session, SessionContext};
use archiparse::job::{Job, JobStatus};
use archiparse::upload::ValidationKind;

fn session_for(tenant: Uuid) -> SessionContext {
    SessionContext::with_session(Session {
        access_token: SecretString::from("tok-123"),
        tenant_id: tenant,
    })
}

fn job_json(tenant: Uuid, status: JobStatus) -> (Job, String) {
    let mut job = Job::new(tenant, "tower.ifcxml", 2048, "");
    job.status = status;
    let body = serde_json::to_string(&job).unwrap();
    (job, body)
}

#[tokio::test]
async fn test_authenticated_call_sends_both_headers() {
    let mut server = mockito::Server::new_async().await;
    let tenant = Uuid::new_v4();
    let (job, body) = job_json(tenant, JobStatus::Parsing);

    let mock = server
        .mock("GET", format!("/jobs/{}", job.id).as_str())
        .match_header("authorization", "Bearer tok-123")
        .match_header("x-tenant-id", tenant.to_string().as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await;

    let client = ApiClient::new(server.url()).unwrap();
    let fetched = client.get_job(&session_for(tenant), job.id).await.unwrap();
    assert_eq!(fetched.id, job.id);
    assert_eq!(fetched.status, JobStatus::Parsing);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_missing_session_sends_nothing() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let client = ApiClient::new(server.url()).unwrap();
    let ctx = SessionContext::new();
    ctx.set_token(SecretString::from("tok-123"));

    let err = client.list_jobs(&ctx, 1, 20, None).await.unwrap_err();
    assert!(matches!(err, ApiError::MissingCredentials));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_unauthorized_clears_session() {
    let mut server = mockito::Server::new_async().await;
    let id = Uuid::new_v4();
    server
        .mock("GET", format!("/jobs/{}", id).as_str())
        .with_status(401)
        .with_body(r#"{"detail": "Token expired"}"#)
        .create_async()
        .await;

    let client = ApiClient::new(server.url()).unwrap();
    let ctx = session_for(Uuid::new_v4());
    let err = client.get_job(&ctx, id).await.unwrap_err();

    assert!(matches!(&err, ApiError::Unauthorized(m) if m == "Token expired"));
    assert!(!ctx.session().is_ok());
    assert!(ctx.access_token().is_none());
}

#[tokio::test]
async fn test_error_statuses() {
    let mut server = mockito::Server::new_async().await;
    let missing = Uuid::new_v4();
    let broken = Uuid::new_v4();
    let garbled = Uuid::new_v4();
    server
        .mock("GET", format!("/jobs/{}", missing).as_str())
        .with_status(404)
        .with_body(r#"{"detail": "Job not found"}"#)
        .create_async()
        .await;
    server
        .mock("GET", format!("/jobs/{}", broken).as_str())
        .with_status(503)
        .create_async()
        .await;
    server
        .mock("GET", format!("/jobs/{}", garbled).as_str())
        .with_status(200)
        .with_body("{\"id\": 12")
        .create_async()
        .await;

    let client = ApiClient::new(server.url()).unwrap();
    let ctx = session_for(Uuid::new_v4());

    let err = client.get_job(&ctx, missing).await.unwrap_err();
    assert_eq!(err.to_string(), "Job not found");

    match client.get_job(&ctx, broken).await.unwrap_err() {
        ApiError::Server { status, message } => {
            assert_eq!(status, Some(503));
            assert!(message.contains("503"));
        }
        other => panic!("unexpected {:?}", other),
    }

    assert!(matches!(
        client.get_job(&ctx, garbled).await.unwrap_err(),
        ApiError::Decode(_)
    ));
    assert!(ctx.session().is_ok());
}

#[tokio::test]
async fn test_unreachable_server() {
    let client = ApiClient::new("http://127.0.0.1:9/api/v1").unwrap();
    let err = client
        .get_job(&session_for(Uuid::new_v4()), Uuid::new_v4())
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(err.to_string(), "No response from server");
}

#[tokio::test]
async fn test_list_jobs_forwards_filter_and_pagination() {
    let mut server = mockito::Server::new_async().await;
    let tenant = Uuid::new_v4();
    let (job, _) = job_json(tenant, JobStatus::Echoue);
    let body = serde_json::json!({
        "jobs": [job],
        "total": 41,
        "page": 2,
        "page_size": 20
    });

    let mock = server
        .mock("GET", "/jobs")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("page".into(), "2".into()),
            Matcher::UrlEncoded("page_size".into(), "20".into()),
            Matcher::UrlEncoded("status".into(), "ECHOUE".into()),
        ]))
        .with_status(200)
        .with_body(body.to_string())
        .create_async()
        .await;

    let client = ApiClient::new(server.url()).unwrap();
    let page = client
        .list_jobs(&session_for(tenant), 2, 20, Some(JobStatus::Echoue))
        .await
        .unwrap();

    assert_eq!(page.total, 41);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].status, JobStatus::Echoue);
    assert!(!page.is_last());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_upload_preflight_never_reaches_server() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/upload")
        .expect(0)
        .create_async()
        .await;
    let client = ApiClient::new(server.url()).unwrap();
    let ctx = session_for(Uuid::new_v4());

    let err = client
        .upload(&ctx, "model.txt", b"<ifcXML/>".to_vec(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(ref e) if e.kind == ValidationKind::Extension));

    let err = client
        .upload(&ctx, "model.xml", b"PK\x03\x04 zipped".to_vec(), Some(""))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(ref e) if e.kind == ValidationKind::Format));

    mock.assert_async().await;
}

#[tokio::test]
async fn test_upload_sends_multipart_file() {
    let mut server = mockito::Server::new_async().await;
    let tenant = Uuid::new_v4();
    let job_id = Uuid::new_v4();
    let mock = server
        .mock("POST", "/upload")
        .match_header("x-tenant-id", tenant.to_string().as_str())
        .match_header("content-type", Matcher::Regex("^multipart/form-data".into()))
        .match_body(Matcher::Regex(
            r#"name="file"; filename="tower.ifcxml""#.into(),
        ))
        .with_status(201)
        .with_body(
            serde_json::json!({
                "job_id": job_id,
                "filename": "tower.ifcxml",
                "file_size": 9,
                "status": "EN_ATTENTE",
                "message": "File uploaded successfully"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = ApiClient::new(server.url()).unwrap();
    let accepted = client
        .upload(&session_for(tenant), "tower.ifcxml", b"<ifcXML/>".to_vec(), None)
        .await
        .unwrap();

    assert_eq!(accepted.job_id, job_id);
    assert_eq!(accepted.status, JobStatus::EnAttente);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_identity_probe_rejection_is_silent() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/auth/me")
        .with_status(403)
        .create_async()
        .await;

    let client = ApiClient::new(server.url()).unwrap();
    let ctx = SessionContext::new();
    ctx.set_token(SecretString::from("stale"));

    assert!(matches!(
        client.current_user(&ctx).await,
        Err(ApiError::SilentAuthProbe)
    ));
}

#[tokio::test]
async fn test_ensure_authenticated_logs_in_again() {
    let mut server = mockito::Server::new_async().await;
    let tenant = Uuid::new_v4();

    let stale_probe = server
        .mock("GET", "/auth/me")
        .match_header("authorization", "Bearer stale")
        .with_status(401)
        .create_async()
        .await;
    let login = server
        .mock("POST", "/auth/login")
        .match_body(Matcher::Json(serde_json::json!({
            "email": "ops@example.com",
            "password": "hunter2"
        })))
        .with_status(200)
        .with_body(r#"{"access_token": "fresh", "token_type": "bearer", "expires_in": 3600}"#)
        .create_async()
        .await;
    let fresh_probe = server
        .mock("GET", "/auth/me")
        .match_header("authorization", "Bearer fresh")
        .with_status(200)
        .with_body(
            serde_json::json!({"id": 7, "email": "ops@example.com", "tenant_id": tenant})
                .to_string(),
        )
        .create_async()
        .await;

    let client = ApiClient::new(server.url()).unwrap();
    let ctx = SessionContext::new();
    ctx.set_token(SecretString::from("stale"));
    let credentials = Credentials::new("ops@example.com", SecretString::from("hunter2"));

    let session = client
        .ensure_authenticated(&ctx, Some(&credentials))
        .await
        .unwrap();
    assert_eq!(session.tenant_id, tenant);
    assert_eq!(session.access_token.expose_secret(), "fresh");
    assert!(ctx.session().is_ok());

    stale_probe.assert_async().await;
    login.assert_async().await;
    fresh_probe.assert_async().await;
}

#[tokio::test]
async fn test_ensure_authenticated_without_credentials() {
    let server = mockito::Server::new_async().await;
    let client = ApiClient::new(server.url()).unwrap();

    let err = client
        .ensure_authenticated(&SessionContext::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::MissingCredentials));
}

#[tokio::test]
async fn test_quota_usage() {
    let mut server = mockito::Server::new_async().await;
    let tenant = Uuid::new_v4();
    let mock = server
        .mock("GET", "/quota/usage")
        .match_header("x-tenant-id", tenant.to_string().as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "storage": { "used": 2048, "max": 4096, "used_percent": 50.0 },
                "files_per_month": { "used": 3, "max": 100, "used_percent": 3.0 },
                "max_file_size": 524288000
            }"#,
        )
        .create_async()
        .await;

    let client = ApiClient::new(server.url()).unwrap();
    let usage = client.quota_usage(&session_for(tenant)).await.unwrap();
    assert_eq!(usage.storage.used, 2048);
    assert_eq!(usage.storage.used_percent, 50.0);
    assert_eq!(usage.files_per_month.max, 100);
    assert_eq!(usage.max_file_size, 524_288_000);
    mock.assert_async().await;
}
