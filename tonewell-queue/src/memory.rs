//! In-process queue
//!
//! Same ordering and wake-up behaviour as the Postgres queue, but nothing
//! survives the process. Used by tests and by single-process setups.

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tonewell_core::domain::{JobRecord, JobStatus, estimate_wait_minutes};
use uuid::Uuid;

use crate::error::QueueError;
use crate::queue::{JobQueue, check_fresh};

#[derive(Default)]
pub struct MemoryJobQueue {
    /// Insertion order doubles as the tie-break for equal `created_at`
    jobs: Mutex<Vec<JobRecord>>,
    wake: Notify,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `job` as is, bypassing the freshness check
    ///
    /// Lets tests start from a job that crashed mid-pipeline.
    pub fn restore(&self, job: JobRecord) {
        self.jobs().push(job);
        self.wake.notify_waiters();
    }

    fn jobs(&self) -> MutexGuard<'_, Vec<JobRecord>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, id: Uuid, f: impl FnOnce(&mut JobRecord)) -> Result<(), QueueError> {
        let mut jobs = self.jobs();
        let job = jobs
            .iter_mut()
            .find(|job| job.id == id)
            .ok_or(QueueError::NotFound(id))?;
        f(job);
        job.updated_at = chrono::Utc::now();
        Ok(())
    }

    fn front(&self, device: &str) -> Option<JobRecord> {
        self.jobs()
            .iter()
            .enumerate()
            .filter(|(_, job)| job.device == device && !job.status.is_terminal())
            .min_by_key(|(seq, job)| (job.created_at, *seq))
            .map(|(_, job)| job.clone())
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: &JobRecord) -> Result<(), QueueError> {
        check_fresh(job)?;
        self.jobs().push(job.clone());
        self.wake.notify_waiters();
        Ok(())
    }

    async fn advance_status(&self, id: Uuid, status: JobStatus) -> Result<(), QueueError> {
        self.update(id, |job| {
            job.status = status;
            job.retries = 0;
        })
    }

    async fn increment_retries(&self, id: Uuid) -> Result<(), QueueError> {
        self.update(id, |job| job.retries += 1)
    }

    async fn estimate_wait(&self, device: &str) -> Result<u32, QueueError> {
        let seconds = self
            .jobs()
            .iter()
            .filter(|job| job.device == device && job.status.is_waiting())
            .map(|job| u64::from(job.input_duration))
            .sum();
        Ok(estimate_wait_minutes(seconds))
    }

    async fn peek_front(&self, device: &str) -> Result<Option<JobRecord>, QueueError> {
        Ok(self.front(device))
    }

    async fn next(
        &self,
        device: &str,
        timeout: Duration,
    ) -> Result<Option<JobRecord>, QueueError> {
        let deadline = Instant::now() + timeout;

        loop {
            // Register interest before looking so an enqueue in between is not missed
            let notified = self.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(job) = self.front(device) {
                return Ok(Some(job));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<JobRecord>, QueueError> {
        Ok(self.jobs().iter().find(|job| job.id == id).cloned())
    }

    async fn list(&self, device: &str) -> Result<Vec<JobRecord>, QueueError> {
        let mut jobs: Vec<_> = self
            .jobs()
            .iter()
            .enumerate()
            .filter(|(_, job)| job.device == device)
            .map(|(seq, job)| (job.created_at, seq, job.clone()))
            .collect();
        jobs.sort_by_key(|(created_at, seq, _)| (*created_at, *seq));
        Ok(jobs.into_iter().map(|(_, _, job)| job).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tonewell_core::domain::{Device, Owner};

    fn job(device: &str, duration: u32) -> JobRecord {
        let device = Device::from_id(device).unwrap();
        let owner = Owner::Email {
            address: "foo@bar.com".to_string(),
        };
        JobRecord::new(device, owner, "score.mid", duration)
    }

    #[tokio::test]
    async fn test_peek_front_is_fifo_and_skips_finished() {
        let queue = MemoryJobQueue::new();
        let first = job("nullsynth", 10);
        let second = job("nullsynth", 20);
        let other = job("sc55mk2", 5);

        // Same timestamp falls back to insertion order
        let mut third = job("nullsynth", 30);
        third.created_at = second.created_at;

        queue.enqueue(&first).await.unwrap();
        queue.enqueue(&other).await.unwrap();
        queue.enqueue(&second).await.unwrap();
        queue.enqueue(&third).await.unwrap();

        assert_eq!(queue.peek_front("nullsynth").await.unwrap().unwrap().id, first.id);

        queue.advance_status(first.id, JobStatus::Done).await.unwrap();
        assert_eq!(queue.peek_front("nullsynth").await.unwrap().unwrap().id, second.id);

        queue.advance_status(second.id, JobStatus::Failed).await.unwrap();
        assert_eq!(queue.peek_front("nullsynth").await.unwrap().unwrap().id, third.id);

        queue.advance_status(third.id, JobStatus::Done).await.unwrap();
        assert!(queue.peek_front("nullsynth").await.unwrap().is_none());
        assert_eq!(queue.peek_front("sc55mk2").await.unwrap().unwrap().id, other.id);
    }

    #[tokio::test]
    async fn test_advance_resets_retries_and_increment_keeps_status() {
        let queue = MemoryJobQueue::new();
        let job = job("nullsynth", 10);
        queue.enqueue(&job).await.unwrap();

        queue.increment_retries(job.id).await.unwrap();
        queue.increment_retries(job.id).await.unwrap();
        let stored = queue.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::New);
        assert_eq!(stored.retries, 2);

        queue.advance_status(job.id, JobStatus::Recording).await.unwrap();
        let stored = queue.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Recording);
        assert_eq!(stored.retries, 0);
    }

    #[tokio::test]
    async fn test_mutating_missing_job_is_not_found() {
        let queue = MemoryJobQueue::new();
        let id = Uuid::new_v4();

        assert!(matches!(
            queue.increment_retries(id).await,
            Err(QueueError::NotFound(missing)) if missing == id
        ));
        assert!(matches!(
            queue.advance_status(id, JobStatus::Done).await,
            Err(QueueError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_enqueue_rejects_stale_records() {
        let queue = MemoryJobQueue::new();

        let mut resumed = job("nullsynth", 10);
        resumed.status = JobStatus::Encoding;
        assert!(matches!(
            queue.enqueue(&resumed).await,
            Err(QueueError::InvalidRecord(_))
        ));

        let mut retried = job("nullsynth", 10);
        retried.retries = 1;
        assert!(matches!(
            queue.enqueue(&retried).await,
            Err(QueueError::InvalidRecord(_))
        ));
    }

    #[tokio::test]
    async fn test_estimate_wait() {
        let queue = MemoryJobQueue::new();
        assert_eq!(queue.estimate_wait("nullsynth").await.unwrap(), 0);

        let job = job("nullsynth", 60);
        queue.enqueue(&job).await.unwrap();
        assert_eq!(queue.estimate_wait("nullsynth").await.unwrap(), 2);
        assert_eq!(queue.estimate_wait("sc55mk2").await.unwrap(), 0);

        // Already recorded; no longer occupies the device
        queue.advance_status(job.id, JobStatus::Encoding).await.unwrap();
        assert_eq!(queue.estimate_wait("nullsynth").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_next_times_out_on_empty_partition() {
        let queue = MemoryJobQueue::new();

        let started = std::time::Instant::now();
        let found = queue
            .next("nullsynth", Duration::from_secs(1))
            .await
            .unwrap();

        assert!(found.is_none());
        assert!(started.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test]
    async fn test_next_wakes_on_enqueue() {
        let queue = Arc::new(MemoryJobQueue::new());
        let job = job("nullsynth", 10);

        let producer = {
            let queue = Arc::clone(&queue);
            let job = job.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                queue.enqueue(&job).await.unwrap();
            })
        };

        let started = std::time::Instant::now();
        let found = queue
            .next("nullsynth", Duration::from_secs(30))
            .await
            .unwrap();
        producer.await.unwrap();

        assert_eq!(found.map(|j| j.id), Some(job.id));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_next_ignores_wake_for_other_partition() {
        let queue = Arc::new(MemoryJobQueue::new());

        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                queue.enqueue(&job("sc55mk2", 10)).await.unwrap();
            })
        };

        let found = queue
            .next("nullsynth", Duration::from_millis(500))
            .await
            .unwrap();
        producer.await.unwrap();

        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_list_includes_finished_jobs() {
        let queue = MemoryJobQueue::new();
        let first = job("nullsynth", 10);
        let second = job("nullsynth", 10);
        queue.enqueue(&first).await.unwrap();
        queue.enqueue(&second).await.unwrap();
        queue.advance_status(first.id, JobStatus::Done).await.unwrap();

        let ids: Vec<_> = queue
            .list("nullsynth")
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }
}
