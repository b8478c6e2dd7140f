//! Tonewell Worker
//!
//! Renders queued scores on one hardware device.
//!
//! Architecture:
//! - Configuration: settings from the environment (optionally a `.env` file)
//! - Services: the resumable pipeline, the recording orchestrator and the encoder
//! - Scheduler: blocking fetch loop over the device's queue partition
//! - Supervisor: readiness and watchdog pulses to the service manager
//!
//! Exactly one worker may run per device; the queue does not arbitrate.

mod config;
mod error;
mod process;
mod scheduler;
mod service;
mod supervisor;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tonewell_client::{AzureBlobUploader, BlobConfig, EmailConfig, EmailNotifier};
use tonewell_core::domain::Device;
use tonewell_queue::{JobQueue, PgJobQueue, db};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::scheduler::JobPoller;
use crate::service::{
    Destination, RecordingOrchestrator, SoxEncoder, Stages, WorkerPipeline,
};
use crate::supervisor::Supervisor;

#[derive(Parser)]
#[command(name = "tonewell-worker")]
#[command(about = "Records queued scores on a hardware device", long_about = None)]
struct Args {
    /// Device to service, e.g. sc55mk2
    device: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tonewell_worker=info,tonewell_queue=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let device = Device::from_id(&args.device)?;

    info!("Starting Tonewell Worker for {}", device);

    let config = Config::from_env()?;
    config.validate()?;
    info!(
        "Loaded configuration: media_path={}, max_retries={}",
        config.media_path.display(),
        config.max_retries
    );

    let queue = Arc::new(
        PgJobQueue::open(&config.database_url)
            .await
            .context("Failed to connect to job store")?,
    );

    let result = serve(device, &config, Arc::clone(&queue)).await;

    queue.close().await;
    if let Err(e) = &result {
        error!("Worker stopped: {:#}", e);
    }
    result
}

/// Everything between opening and closing the store
async fn serve(device: &'static Device, config: &Config, queue: Arc<PgJobQueue>) -> Result<()> {
    db::run_migrations(queue.pool())
        .await
        .context("Failed to run database migrations")?;

    let uploader = AzureBlobUploader::new(BlobConfig::from_env()?)?;
    let notifier = EmailNotifier::new(&EmailConfig::from_env()?)
        .context("Failed to set up mail transport")?;

    let queue: Arc<dyn JobQueue> = queue;
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let stages = Stages {
        queue: Arc::clone(&queue),
        recorder: Arc::new(RecordingOrchestrator::new(config.recorder.clone())),
        encoder: Arc::new(SoxEncoder::new(config.encoder.clone())),
        uploader: Arc::new(uploader),
        notifier: Arc::new(notifier),
        media_path: config.media_path.clone(),
        destination: Destination {
            account: config.blob_account.clone(),
            container: config.blob_container.clone(),
        },
    };
    let pipeline = WorkerPipeline::new(stages, config.max_retries, shutdown.clone());

    info!("Worker initialized successfully");

    let poller = JobPoller::new(
        device,
        queue,
        pipeline,
        Supervisor::from_env(),
        config.fetch_timeout,
        shutdown,
    );
    poller.run().await?;

    Ok(())
}

/// Cancels `shutdown` on SIGINT or SIGTERM
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut terminate) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                        _ = terminate.recv() => info!("Received SIGTERM"),
                    }
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Received SIGINT");
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl-C");
        }

        info!("Shutting down");
        shutdown.cancel();
    });
}
