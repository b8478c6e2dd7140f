//! Queue errors

use uuid::Uuid;

/// Errors raised by a [`JobQueue`](crate::JobQueue)
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The backing store could not be reached or rejected the statement
    #[error("job store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    /// Only fresh records (status `new`, no retries) may be enqueued
    #[error("invalid job record: {0}")]
    InvalidRecord(String),

    /// A stored row could not be mapped back to a job record
    #[error("corrupt job row {id}: {reason}")]
    Corrupt { id: Uuid, reason: String },

    #[error("job {0} not found")]
    NotFound(Uuid),
}

impl QueueError {
    /// Whether the error means the store itself is unusable
    pub fn is_unavailable(&self) -> bool {
        matches!(self, QueueError::StoreUnavailable(_))
    }
}
