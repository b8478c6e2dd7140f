//! Worker pipeline
//!
//! Drives one job from whatever status it was fetched at to `done`:
//!
//! | status      | stage  | effect                                 |
//! |-------------|--------|----------------------------------------|
//! | `new`       | admit  | none                                   |
//! | `recording` | record | score played and captured to `id.wav`  |
//! | `encoding`  | encode | `id.wav` encoded to `id.flac`          |
//! | `uploading` | upload | `id.flac` published                    |
//! | `notifying` | notify | owner told where the recording is      |
//!
//! The status is persisted after every stage, so a job picked up again
//! after a crash resumes at the stage that did not finish.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tonewell_client::{Notifier, Uploader};
use tonewell_core::domain::{Device, JobRecord, JobStatus};
use tonewell_queue::JobQueue;
use tracing::{debug, error, info, warn};

use crate::error::PipelineError;
use crate::service::encoder::Encoder;
use crate::service::guard::RetryGuard;
use crate::service::recorder::Recorder;

/// Unit of work bound to one persisted status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Admit,
    Record,
    Encode,
    Upload,
    Notify,
}

impl Stage {
    /// The stage a job at `status` still has to run, if any
    pub fn for_status(status: JobStatus) -> Option<Stage> {
        match status {
            JobStatus::New => Some(Stage::Admit),
            JobStatus::Recording => Some(Stage::Record),
            JobStatus::Encoding => Some(Stage::Encode),
            JobStatus::Uploading => Some(Stage::Upload),
            JobStatus::Notifying => Some(Stage::Notify),
            JobStatus::Done | JobStatus::Failed => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Admit => "admit",
            Stage::Record => "record",
            Stage::Encode => "encode",
            Stage::Upload => "upload",
            Stage::Notify => "notify",
        };
        f.write_str(name)
    }
}

/// Per-job files under the media directory
#[derive(Debug, Clone)]
pub struct WorkingFiles {
    pub score: PathBuf,
    pub raw: PathBuf,
    pub encoded: PathBuf,
    /// Object name the encoded file is published under
    pub blob_name: String,
}

impl WorkingFiles {
    pub fn new(media_path: &Path, job: &JobRecord) -> Self {
        Self {
            score: media_path.join(&job.input_ref),
            raw: media_path.join(format!("{}.wav", job.id)),
            encoded: media_path.join(format!("{}.flac", job.id)),
            blob_name: format!("{}.flac", job.id),
        }
    }

    pub fn all(&self) -> [&Path; 3] {
        [&self.score, &self.raw, &self.encoded]
    }
}

/// Text sent to the owner once the recording is published
pub fn ready_message(job: &JobRecord, device: &Device, url: &str) -> String {
    format!(
        "Your score \"{}\" was recorded on a {} and uploaded here:\r\n{}",
        job.input_name, device.name, url
    )
}

/// Where the pipeline publishes recordings
#[derive(Debug, Clone)]
pub struct Destination {
    pub account: String,
    pub container: String,
}

/// Collaborators and settings the stage bodies need
pub struct Stages {
    pub queue: Arc<dyn JobQueue>,
    pub recorder: Arc<dyn Recorder>,
    pub encoder: Arc<dyn Encoder>,
    pub uploader: Arc<dyn Uploader>,
    pub notifier: Arc<dyn Notifier>,
    pub media_path: PathBuf,
    pub destination: Destination,
}

impl Stages {
    /// Runs stages until the job is done, persisting each advance
    async fn run(&self, mut job: JobRecord) -> Result<JobStatus, PipelineError> {
        let device = Device::from_id(&job.device)?;
        let files = WorkingFiles::new(&self.media_path, &job);

        while let Some(stage) = Stage::for_status(job.status) {
            info!(job_id = %job.id, %stage, "Running stage");
            self.run_stage(stage, &job, device, &files).await?;

            let Some(next) = job.status.successor() else {
                break;
            };
            self.queue.advance_status(job.id, next).await?;
            job.status = next;
            job.retries = 0;
        }

        Ok(job.status)
    }

    async fn run_stage(
        &self,
        stage: Stage,
        job: &JobRecord,
        device: &Device,
        files: &WorkingFiles,
    ) -> Result<(), PipelineError> {
        match stage {
            Stage::Admit => {}
            Stage::Record => {
                self.recorder.record(&files.score, &files.raw, device).await?;

                let size = match tokio::fs::metadata(&files.raw).await {
                    Ok(meta) => meta.len(),
                    Err(_) => 0,
                };
                if size == 0 {
                    return Err(PipelineError::EmptyCapture(files.raw.clone()));
                }
                debug!(job_id = %job.id, "Captured {} bytes", size);
            }
            Stage::Encode => {
                self.encoder.encode(&files.raw, &files.encoded).await?;
            }
            Stage::Upload => {
                let bytes = tokio::fs::read(&files.encoded).await?;
                let url = self
                    .uploader
                    .put(
                        &self.destination.account,
                        &self.destination.container,
                        &files.blob_name,
                        bytes,
                    )
                    .await?;
                info!(job_id = %job.id, "Published at {}", url);
            }
            Stage::Notify => {
                // Not persisted; the published location is deterministic
                let url = self.uploader.locate(
                    &self.destination.account,
                    &self.destination.container,
                    &files.blob_name,
                );
                self.notifier
                    .notify(&job.owner, &ready_message(job, device, &url))
                    .await?;
                info!(job_id = %job.id, owner = %job.owner, "Owner notified");
            }
        }
        Ok(())
    }
}

/// Resumable state machine for one fetched job at a time
pub struct WorkerPipeline {
    stages: Arc<Stages>,
    max_retries: u32,
    shutdown: CancellationToken,
}

impl WorkerPipeline {
    pub fn new(stages: Stages, max_retries: u32, shutdown: CancellationToken) -> Self {
        Self {
            stages: Arc::new(stages),
            max_retries,
            shutdown,
        }
    }

    /// Takes `job` as far as it goes and returns the status it ended at
    ///
    /// A job that already used up its attempts at its current status is
    /// failed without running anything. Otherwise any error leaves the
    /// status where it was and bumps the retry counter once.
    pub async fn process(&self, job: JobRecord) -> Result<JobStatus, PipelineError> {
        if job.status.is_terminal() {
            return Err(PipelineError::TerminalStatus(job.status));
        }

        let queue = &self.stages.queue;
        if job.retries >= self.max_retries {
            warn!(
                job_id = %job.id,
                status = %job.status,
                "Retry limit of {} reached, failing job",
                self.max_retries
            );
            queue.advance_status(job.id, JobStatus::Failed).await?;
            return Ok(JobStatus::Failed);
        }

        let guard = RetryGuard::arm(Arc::clone(queue), job.id);

        // Spawned so a panicking stage is reported instead of unwinding the worker
        let stages = Arc::clone(&self.stages);
        let attempt = job.clone();
        let mut task = tokio::spawn(async move { stages.run(attempt).await });

        let outcome = tokio::select! {
            joined = &mut task => match joined {
                Ok(result) => result,
                Err(e) if e.is_panic() => Err(PipelineError::Panicked(panic_message(e.into_panic()))),
                Err(e) => Err(PipelineError::Panicked(e.to_string())),
            },
            _ = self.shutdown.cancelled() => {
                task.abort();
                // Wait for the stage to be dropped so its processes are reaped
                let _ = task.await;
                Err(PipelineError::Interrupted)
            }
        };

        match outcome {
            Ok(status) => {
                guard.disarm();
                info!(job_id = %job.id, %status, "Job finished");
                self.remove_working_files(&job).await;
                Ok(status)
            }
            Err(e) => {
                if let Err(bump) = guard.fire().await {
                    error!(job_id = %job.id, "Failed to record attempt: {}", bump);
                    if bump.is_unavailable() {
                        return Err(bump.into());
                    }
                }
                Err(e)
            }
        }
    }

    async fn remove_working_files(&self, job: &JobRecord) {
        let files = WorkingFiles::new(&self.stages.media_path, job);
        for path in files.all() {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
