mod commands;
mod error;
mod local;
mod output;
mod remote;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use archiparse::config::{load_config, Config};
use archiparse::logging::{self, LogFormat};

use crate::commands::Command;
use crate::error::CliError;
use crate::remote::Remote;

/// Submit IFCXML models for processing and browse the results.
#[derive(Parser)]
#[command(name = "archiparse", version, about)]
struct Cli {
    /// Configuration file (JSON); built-in defaults apply when omitted
    #[arg(long, short, global = true, env = "ARCHIPARSE_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format: text or json
    #[arg(long, global = true, default_value = "text")]
    log_format: LogFormat,

    /// API base URL, overrides api.base_url
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Login email, overrides api.email
    #[arg(long, global = true)]
    email: Option<String>,

    /// Environment variable holding the login password
    #[arg(long, global = true)]
    password_env: Option<String>,

    /// Environment variable holding an existing access token
    #[arg(long, global = true)]
    token_env: Option<String>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn load_config(&self) -> Result<Config, CliError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => Config::default(),
        };
        if let Some(url) = &self.base_url {
            config.api.base_url = url.clone();
        }
        if let Some(email) = &self.email {
            config.api.email = Some(email.clone());
        }
        if let Some(var) = &self.password_env {
            config.api.password = None;
            config.api.password_file = None;
            config.api.password_env_var = Some(var.clone());
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logging::init(cli.log_format) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = cli.load_config()?;
    match cli.command {
        Command::Local { command } => local::run(config, command).await,
        Command::Remote(command) => {
            let remote = Remote::connect(config, cli.token_env.as_deref()).await?;
            remote.run(command).await
        }
    }
}
