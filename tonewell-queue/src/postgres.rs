//! Postgres-backed queue
//!
//! Inserts fire a trigger that notifies [`WAKE_CHANNEL`]; blocked consumers
//! hold a `LISTEN` connection and re-check their partition on every
//! notification, since a wake-up may concern another device.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tonewell_core::domain::{JobRecord, JobStatus, estimate_wait_minutes};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::{self, WAKE_CHANNEL};
use crate::error::QueueError;
use crate::queue::{JobQueue, check_fresh};
use crate::repository::job_repository;

pub struct PgJobQueue {
    pool: PgPool,
    /// Kept across calls so consecutive fetches reuse one `LISTEN` session
    listener: Mutex<Option<PgListener>>,
}

impl PgJobQueue {
    /// Connects to the store at `database_url`
    pub async fn open(database_url: &str) -> Result<Self, QueueError> {
        let pool = db::create_pool(database_url).await?;
        info!("Job store connection pool created");
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            listener: Mutex::new(None),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Releases the listener and every pooled connection
    ///
    /// Later calls fail with [`QueueError::StoreUnavailable`].
    pub async fn close(&self) {
        if let Some(mut listener) = self.listener.lock().await.take() {
            if let Err(e) = listener.unlisten_all().await {
                debug!("Failed to unlisten before close: {}", e);
            }
        }
        self.pool.close().await;
        info!("Job store closed");
    }

    async fn subscribe(&self) -> Result<PgListener, QueueError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(WAKE_CHANNEL).await?;
        debug!("Listening on channel {}", WAKE_CHANNEL);
        Ok(listener)
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, job: &JobRecord) -> Result<(), QueueError> {
        check_fresh(job)?;
        job_repository::insert(&self.pool, job).await?;

        info!(job_id = %job.id, device = %job.device, "Job enqueued");
        Ok(())
    }

    async fn advance_status(&self, id: Uuid, status: JobStatus) -> Result<(), QueueError> {
        if !job_repository::set_status(&self.pool, id, status).await? {
            return Err(QueueError::NotFound(id));
        }

        debug!(job_id = %id, %status, "Job status advanced");
        Ok(())
    }

    async fn increment_retries(&self, id: Uuid) -> Result<(), QueueError> {
        if !job_repository::increment_retries(&self.pool, id).await? {
            return Err(QueueError::NotFound(id));
        }

        debug!(job_id = %id, "Job retries incremented");
        Ok(())
    }

    async fn estimate_wait(&self, device: &str) -> Result<u32, QueueError> {
        let seconds = job_repository::waiting_seconds(&self.pool, device).await?;
        Ok(estimate_wait_minutes(seconds))
    }

    async fn peek_front(&self, device: &str) -> Result<Option<JobRecord>, QueueError> {
        job_repository::find_front(&self.pool, device).await
    }

    async fn next(
        &self,
        device: &str,
        timeout: Duration,
    ) -> Result<Option<JobRecord>, QueueError> {
        let deadline = Instant::now() + timeout;

        // Subscribing before the first look means an insert racing with it
        // still produces a notification we will see.
        let mut slot = self.listener.lock().await;
        let mut listener = match slot.take() {
            Some(listener) => listener,
            None => self.subscribe().await?,
        };

        let found = loop {
            if let Some(job) = self.peek_front(device).await? {
                break Some(job);
            }

            match tokio::time::timeout_at(deadline, listener.recv()).await {
                Ok(Ok(notification)) => {
                    debug!(
                        payload = notification.payload(),
                        "Woken by {}",
                        notification.channel()
                    );
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => break None,
            }
        };

        *slot = Some(listener);
        Ok(found)
    }

    async fn get(&self, id: Uuid) -> Result<Option<JobRecord>, QueueError> {
        job_repository::find_by_id(&self.pool, id).await
    }

    async fn list(&self, device: &str) -> Result<Vec<JobRecord>, QueueError> {
        job_repository::find_by_device(&self.pool, device).await
    }
}
