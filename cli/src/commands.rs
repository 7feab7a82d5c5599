use std::path::PathBuf;

use archiparse::job::{JobStatus, UnknownStatus};
use clap::Subcommand;
use uuid::Uuid;

pub(crate) fn parse_status(raw: &str) -> Result<JobStatus, UnknownStatus> {
    raw.trim().to_ascii_uppercase().replace('-', "_").parse()
}

#[derive(Subcommand)]
pub(crate) enum Command {
    #[command(flatten)]
    Remote(RemoteCommand),
    /// Process files on this machine without a server
    Local {
        #[command(subcommand)]
        command: LocalCommand,
    },
}

/// Commands served by the REST API.
#[derive(Subcommand)]
pub(crate) enum RemoteCommand {
    /// Upload an IFCXML file and print the queued job
    Submit {
        file: PathBuf,
        /// Follow the job until it finishes
        #[arg(long)]
        watch: bool,
    },
    /// List jobs, newest first
    Jobs {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        page_size: u32,
        #[arg(long, value_parser = parse_status)]
        status: Option<JobStatus>,
        /// Keep polling the list until interrupted
        #[arg(long)]
        follow: bool,
    },
    /// Show one job
    Job { id: Uuid },
    /// Follow a job until it reaches TERMINE or ECHOUE
    Watch { id: Uuid },
    /// List models
    Models {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        page_size: u32,
    },
    /// Show one model with its spatial tree
    Model { id: Uuid },
    /// List the elements of a model
    Elements {
        model_id: Uuid,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 50)]
        page_size: u32,
        #[arg(long)]
        ifc_type: Option<String>,
        #[arg(long)]
        storey: Option<Uuid>,
        #[arg(long)]
        space: Option<Uuid>,
    },
    /// Show one element with properties, quantities and relationships
    Element { id: Uuid },
    /// Show storage and monthly upload usage against the tenant's quota
    Quota,
}

#[derive(Subcommand)]
pub(crate) enum LocalCommand {
    /// Submit files to the local worker pool and wait for each
    Run {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long, default_value_t = Uuid::nil())]
        tenant: Uuid,
    },
    /// List jobs stored in the local database
    Jobs {
        #[arg(long, default_value_t = Uuid::nil())]
        tenant: Uuid,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        page_size: u32,
        #[arg(long, value_parser = parse_status)]
        status: Option<JobStatus>,
    },
    /// Show a tenant's usage against the configured quota
    Quota {
        #[arg(long, default_value_t = Uuid::nil())]
        tenant: Uuid,
    },
}
