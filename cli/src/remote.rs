//! Commands served by the REST API.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::info;
use uuid::Uuid;

use archiparse::client::{ApiClient, SessionContext};
use archiparse::config::Config;
use archiparse::job::JobStatus;
use archiparse::sanitize;
use archiparse::secrets;
use archiparse::service::ElementQuery;
use archiparse::watch::{JobWatcher, ListPoller, ListQuery, ListUpdate, RemoteJobs};

use crate::commands::RemoteCommand;
use crate::error::CliError;
use crate::output;

pub(crate) struct Remote {
    client: ApiClient,
    ctx: Arc<SessionContext>,
    config: Config,
}

impl Remote {
    /// Builds the client and establishes a session.
    pub(crate) async fn connect(config: Config, token_env: Option<&str>) -> Result<Self, CliError> {
        let client = ApiClient::with_timeout(
            &config.api.base_url,
            Duration::from_secs(config.api.timeout_secs),
        )?
        .with_limits(config.upload_limits());
        let ctx = Arc::new(SessionContext::new());

        if let Some(token) = secrets::resolve_secret_optional(None, None, token_env)? {
            ctx.set_token(token);
        }
        let credentials = secrets::api_credentials(&config.api)?;
        let session = client
            .ensure_authenticated(&ctx, credentials.as_ref())
            .await?;
        info!(
            "Connected to {} as tenant {}",
            sanitize::redact_url(client.base_url()),
            session.tenant_id
        );

        Ok(Self {
            client,
            ctx,
            config,
        })
    }

    pub(crate) async fn run(&self, command: RemoteCommand) -> Result<(), CliError> {
        match command {
            RemoteCommand::Submit { file, watch } => {
                let id = self.submit(&file).await?;
                if watch {
                    self.watch(id).await?;
                }
            }
            RemoteCommand::Jobs {
                page,
                page_size,
                status,
                follow,
            } => {
                if follow {
                    self.follow_jobs(ListQuery {
                        page,
                        page_size,
                        status,
                    })
                    .await;
                } else {
                    let jobs = self
                        .client
                        .list_jobs(&self.ctx, page, page_size, status)
                        .await?;
                    output::jobs(&jobs);
                }
            }
            RemoteCommand::Job { id } => {
                output::json(&self.client.get_job(&self.ctx, id).await?)?
            }
            RemoteCommand::Watch { id } => self.watch(id).await?,
            RemoteCommand::Models { page, page_size } => {
                output::models(&self.client.list_models(&self.ctx, page, page_size).await?)
            }
            RemoteCommand::Model { id } => {
                output::json(&self.client.get_model(&self.ctx, id).await?)?
            }
            RemoteCommand::Elements {
                model_id,
                page,
                page_size,
                ifc_type,
                storey,
                space,
            } => {
                let query = ElementQuery {
                    ifc_type,
                    storey_id: storey,
                    space_id: space,
                    ..ElementQuery::new(model_id, page, page_size)
                };
                output::elements(&self.client.list_elements(&self.ctx, &query).await?);
            }
            RemoteCommand::Element { id } => {
                output::json(&self.client.get_element(&self.ctx, id).await?)?
            }
            RemoteCommand::Quota => output::json(&self.client.quota_usage(&self.ctx).await?)?,
        }
        Ok(())
    }

    async fn submit(&self, file: &Path) -> Result<Uuid, CliError> {
        let content = std::fs::read(file).map_err(|e| CliError::ReadFile {
            path: file.to_path_buf(),
            source: e,
        })?;
        let filename = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let accepted = self
            .client
            .upload(&self.ctx, &filename, content, None)
            .await?;
        println!(
            "{}  {}  {} ({} bytes): {}",
            accepted.job_id,
            accepted.status.label(),
            accepted.filename,
            accepted.file_size,
            accepted.message
        );
        Ok(accepted.job_id)
    }

    async fn watch(&self, id: Uuid) -> Result<(), CliError> {
        let source = Arc::new(RemoteJobs::new(self.client.clone(), Arc::clone(&self.ctx)));
        let watcher = JobWatcher::new(source).with_config(self.config.polling.watch_config());
        follow_to_end(&watcher, id).await
    }

    async fn follow_jobs(&self, query: ListQuery) {
        let source = Arc::new(RemoteJobs::new(self.client.clone(), Arc::clone(&self.ctx)));
        let mut handle = ListPoller::new(source)
            .with_interval(self.config.polling.list_interval())
            .start(query);

        loop {
            tokio::select! {
                update = handle.changed() => match update {
                    Some(ListUpdate::Loaded(page)) => {
                        println!();
                        output::jobs(&page);
                    }
                    Some(ListUpdate::Failed(message)) => eprintln!("Refresh failed: {}", message),
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }
        handle.cancel();
    }
}

/// Prints every accepted state of a job until it is terminal.
pub(crate) async fn follow_to_end(watcher: &JobWatcher, id: Uuid) -> Result<(), CliError> {
    let mut handle = watcher.watch(id);
    while let Some(job) = handle.changed().await {
        output::job_line(&job);
    }
    let job = handle.finish().await?;
    if job.status == JobStatus::Echoue {
        return Err(CliError::JobFailed(job.id));
    }
    Ok(())
}
