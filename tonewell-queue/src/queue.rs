//! The queue contract shared by every backend

use async_trait::async_trait;
use std::time::Duration;
use tonewell_core::domain::{JobRecord, JobStatus};
use uuid::Uuid;

use crate::error::QueueError;

/// Durable, device-partitioned FIFO of recording jobs
///
/// Jobs are ordered by `created_at` within a device; nothing is promised
/// across devices. There is no locking between consumers: at most one
/// worker may service a device at a time.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Stores a fresh job and wakes any consumer blocked in [`JobQueue::next`]
    async fn enqueue(&self, job: &JobRecord) -> Result<(), QueueError>;

    /// Moves a job to `status` and resets its retry counter
    ///
    /// The transition itself is not checked; callers only ever move forward.
    async fn advance_status(&self, id: Uuid, status: JobStatus) -> Result<(), QueueError>;

    /// Records an abnormal exit at the job's current status
    async fn increment_retries(&self, id: Uuid) -> Result<(), QueueError>;

    /// Minutes until a job enqueued now on `device` would be done
    async fn estimate_wait(&self, device: &str) -> Result<u32, QueueError>;

    /// Oldest job on `device` that is neither done nor failed
    async fn peek_front(&self, device: &str) -> Result<Option<JobRecord>, QueueError>;

    /// Like [`JobQueue::peek_front`], but waits up to `timeout` for a job to appear
    async fn next(&self, device: &str, timeout: Duration)
    -> Result<Option<JobRecord>, QueueError>;

    async fn get(&self, id: Uuid) -> Result<Option<JobRecord>, QueueError>;

    /// All jobs on `device` in queue order, including finished ones
    async fn list(&self, device: &str) -> Result<Vec<JobRecord>, QueueError>;
}

/// Rejects records that did not come straight from [`JobRecord::new`]
pub(crate) fn check_fresh(job: &JobRecord) -> Result<(), QueueError> {
    if job.status != JobStatus::New {
        return Err(QueueError::InvalidRecord(format!(
            "job {} has status {}, expected new",
            job.id, job.status
        )));
    }
    if job.retries != 0 {
        return Err(QueueError::InvalidRecord(format!(
            "job {} has {} retries, expected 0",
            job.id, job.retries
        )));
    }
    Ok(())
}
