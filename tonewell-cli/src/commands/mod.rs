//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod admin;
mod ingest;
mod job;

pub use job::JobCommands;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;

use crate::config::Config;
use ingest::OwnerArgs;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Create or update the job store schema
    Migrate,
    /// Check a score without enqueueing it
    Validate {
        /// Standard MIDI File to check
        file: PathBuf,
    },
    /// Validate a score and queue it for recording
    Enqueue {
        /// Device to record on
        device: String,

        /// Standard MIDI File to record
        file: PathBuf,

        /// Name shown to the owner (defaults to the file name)
        #[arg(long)]
        name: Option<String>,

        #[command(flatten)]
        owner: OwnerArgs,

        /// Mail the owner the outcome and the estimated wait
        #[arg(long)]
        confirm: bool,
    },
    /// Estimated minutes until a new job on a device would be done
    Estimate {
        /// Device to estimate for
        device: String,
    },
    /// Job inspection
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Mail standard input to the operator address
    Alert {
        /// Recipient
        #[arg(long, env = "ALERT_EMAIL")]
        to: String,
    },
}

/// Routes the command to the appropriate handler module
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Migrate => admin::migrate(config).await,
        Commands::Validate { file } => ingest::validate_file(&file),
        Commands::Enqueue {
            device,
            file,
            name,
            owner,
            confirm,
        } => ingest::enqueue(config, &device, &file, name, owner, confirm).await,
        Commands::Estimate { device } => admin::estimate(config, &device).await,
        Commands::Job { command } => job::handle_job_command(command, config).await,
        Commands::Alert { to } => admin::alert(&to).await,
    }
}
