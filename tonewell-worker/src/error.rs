//! Worker errors

use std::path::PathBuf;
use std::process::ExitStatus;
use tonewell_client::{NotifyError, UploadError};
use tonewell_core::domain::{JobStatus, UnknownDevice};
use tonewell_core::score::ScoreError;
use tonewell_queue::QueueError;

/// Failures producing a raw capture
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("required tool '{tool}' not found")]
    ToolMissing { tool: String },

    #[error("no sequencer port matches '{port}'")]
    PortNotFound { port: String },

    #[error("sequencer port '{port}' is ambiguous: {matches:?}")]
    AmbiguousPort { port: String, matches: Vec<String> },

    #[error("playback failed ({status})")]
    PlaybackFailed { status: ExitStatus },

    #[error("playback still running {seconds}s after it should have ended")]
    PlaybackTimedOut { seconds: u64 },

    #[error("capture failed ({status})")]
    CaptureFailed { status: ExitStatus },

    #[error(transparent)]
    Score(#[from] ScoreError),

    #[error("process I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures turning a raw capture into the published format
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("required tool '{tool}' not found")]
    ToolMissing { tool: String },

    #[error("encoder failed ({status}): {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("encoder did not finish within {seconds}s")]
    TimedOut { seconds: u64 },

    #[error("encoder I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a pass over a job stopped short of its next status
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("recording failed: {0}")]
    Record(#[from] RecordError),

    #[error("encoding failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("capture file {} is missing or empty", .0.display())]
    EmptyCapture(PathBuf),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error(transparent)]
    Device(#[from] UnknownDevice),

    #[error("working file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("job is already {0}")]
    TerminalStatus(JobStatus),

    #[error("interrupted by shutdown")]
    Interrupted,

    #[error("stage panicked: {0}")]
    Panicked(String),
}

impl PipelineError {
    /// Whether the worker cannot go on fetching jobs
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Queue(e) if e.is_unavailable())
    }
}
