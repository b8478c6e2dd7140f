//! Abnormal-exit guard
//!
//! Armed before a job's stages run and disarmed once they all succeed. If
//! the pass ends any other way (error, panic, shutdown, or the guard simply
//! being dropped) the job's retry counter is bumped exactly once, so the
//! next fetch can tell a crashed attempt from a fresh one.

use std::sync::Arc;
use tonewell_queue::{JobQueue, QueueError};
use tracing::{error, warn};
use uuid::Uuid;

pub struct RetryGuard {
    queue: Arc<dyn JobQueue>,
    job_id: Uuid,
    armed: bool,
}

impl RetryGuard {
    pub fn arm(queue: Arc<dyn JobQueue>, job_id: Uuid) -> Self {
        Self {
            queue,
            job_id,
            armed: true,
        }
    }

    /// The pass succeeded; nothing to record
    pub fn disarm(mut self) {
        self.armed = false;
    }

    /// Records the failed attempt and waits for the store to confirm it
    pub async fn fire(mut self) -> Result<(), QueueError> {
        self.armed = false;
        warn!(job_id = %self.job_id, "Recording failed attempt");
        self.queue.increment_retries(self.job_id).await
    }
}

impl Drop for RetryGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;

        // Dropped without an outcome: the caller itself was torn down
        let queue = Arc::clone(&self.queue);
        let job_id = self.job_id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(job_id = %job_id, "Guard dropped while armed, recording failed attempt");
                handle.spawn(async move {
                    if let Err(e) = queue.increment_retries(job_id).await {
                        error!(job_id = %job_id, "Failed to record attempt: {}", e);
                    }
                });
            }
            Err(_) => {
                error!(job_id = %job_id, "No runtime left to record failed attempt");
            }
        }
    }
}
