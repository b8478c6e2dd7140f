//! Job poller
//!
//! Blocks on the device's partition of the queue and hands every fetched
//! job to the pipeline, one at a time. The fetch timeout only exists to
//! bring the loop around to the supervisor regularly.
//!
//! A row at the front of the partition that cannot be decoded is moved to
//! `failed` so the jobs queued behind it still get processed.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tonewell_core::domain::{Device, JobStatus};
use tonewell_queue::{JobQueue, QueueError};
use tracing::{debug, error, info};

use crate::error::PipelineError;
use crate::service::WorkerPipeline;
use crate::supervisor::Supervisor;

/// Fetch loop for one device
pub struct JobPoller {
    device: &'static Device,
    queue: Arc<dyn JobQueue>,
    pipeline: WorkerPipeline,
    supervisor: Supervisor,
    fetch_timeout: Duration,
    shutdown: CancellationToken,
}

impl JobPoller {
    pub fn new(
        device: &'static Device,
        queue: Arc<dyn JobQueue>,
        pipeline: WorkerPipeline,
        supervisor: Supervisor,
        fetch_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            device,
            queue,
            pipeline,
            supervisor,
            fetch_timeout,
            shutdown,
        }
    }

    /// Runs until shutdown is requested or the store becomes unusable
    pub async fn run(&self) -> Result<(), PipelineError> {
        info!(
            "Servicing {} (fetch timeout: {:?})",
            self.device, self.fetch_timeout
        );
        self.supervisor.ready();

        loop {
            self.supervisor.watchdog();

            let fetched = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                fetched = self.queue.next(self.device.id, self.fetch_timeout) => fetched,
            };

            let fetched = match fetched {
                Ok(fetched) => fetched,
                Err(QueueError::Corrupt { id, reason }) => {
                    error!(job_id = %id, "Failing undecodable job: {}", reason);
                    self.queue.advance_status(id, JobStatus::Failed).await?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let Some(job) = fetched else {
                debug!("No job within {:?}", self.fetch_timeout);
                continue;
            };

            self.supervisor.watchdog();
            info!(
                job_id = %job.id,
                status = %job.status,
                retries = job.retries,
                "Processing job"
            );

            match self.pipeline.process(job.clone()).await {
                Ok(status) => info!(job_id = %job.id, %status, "Job processed"),
                Err(PipelineError::Interrupted) => {
                    info!(job_id = %job.id, "Job interrupted by shutdown");
                    break;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => error!(job_id = %job.id, status = %job.status, "Job failed: {}", e),
            }
        }

        info!("Job poller stopped");
        self.supervisor.stopping();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EncodeError, RecordError};
    use crate::service::{Destination, Encoder, Recorder, Stages};
    use async_trait::async_trait;
    use std::path::Path;
    use tempfile::TempDir;
    use tonewell_client::{NotifyError, Notifier, UploadError, Uploader};
    use std::sync::Mutex;
    use tonewell_core::domain::{JobRecord, Owner};
    use tonewell_queue::MemoryJobQueue;
    use uuid::Uuid;

    struct Copying;

    #[async_trait]
    impl Recorder for Copying {
        async fn record(&self, score: &Path, dest: &Path, _: &Device) -> Result<(), RecordError> {
            tokio::fs::copy(score, dest).await?;
            Ok(())
        }
    }

    #[async_trait]
    impl Encoder for Copying {
        async fn encode(&self, raw: &Path, dest: &Path) -> Result<(), EncodeError> {
            tokio::fs::copy(raw, dest).await?;
            Ok(())
        }
    }

    #[async_trait]
    impl Uploader for Copying {
        async fn put(
            &self,
            account: &str,
            container: &str,
            name: &str,
            _: Vec<u8>,
        ) -> Result<String, UploadError> {
            Ok(self.locate(account, container, name))
        }

        fn locate(&self, account: &str, container: &str, name: &str) -> String {
            format!("https://{}/{}/{}", account, container, name)
        }
    }

    #[async_trait]
    impl Notifier for Copying {
        async fn notify(&self, _: &Owner, _: &str) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    /// Memory queue whose front row fails to decode until it is failed
    struct UndecodableFront {
        inner: MemoryJobQueue,
        undecodable: Mutex<Option<Uuid>>,
        failed: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl JobQueue for UndecodableFront {
        async fn enqueue(&self, job: &JobRecord) -> Result<(), QueueError> {
            self.inner.enqueue(job).await
        }

        async fn advance_status(&self, id: Uuid, status: JobStatus) -> Result<(), QueueError> {
            let was_undecodable = {
                let mut undecodable = self.undecodable.lock().unwrap();
                *undecodable == Some(id) && undecodable.take().is_some()
            };
            if was_undecodable {
                assert_eq!(status, JobStatus::Failed);
                self.failed.lock().unwrap().push(id);
                return Ok(());
            }
            self.inner.advance_status(id, status).await
        }

        async fn increment_retries(&self, id: Uuid) -> Result<(), QueueError> {
            self.inner.increment_retries(id).await
        }

        async fn estimate_wait(&self, device: &str) -> Result<u32, QueueError> {
            self.inner.estimate_wait(device).await
        }

        async fn peek_front(&self, device: &str) -> Result<Option<JobRecord>, QueueError> {
            self.inner.peek_front(device).await
        }

        async fn next(
            &self,
            device: &str,
            timeout: Duration,
        ) -> Result<Option<JobRecord>, QueueError> {
            let undecodable = *self.undecodable.lock().unwrap();
            if let Some(id) = undecodable {
                return Err(QueueError::Corrupt {
                    id,
                    reason: "unsupported owner type 'pager'".to_string(),
                });
            }
            self.inner.next(device, timeout).await
        }

        async fn get(&self, id: Uuid) -> Result<Option<JobRecord>, QueueError> {
            self.inner.get(id).await
        }

        async fn list(&self, device: &str) -> Result<Vec<JobRecord>, QueueError> {
            self.inner.list(device).await
        }
    }

    fn stages(queue: Arc<dyn JobQueue>, media: &Path) -> Stages {
        Stages {
            queue,
            recorder: Arc::new(Copying),
            encoder: Arc::new(Copying),
            uploader: Arc::new(Copying),
            notifier: Arc::new(Copying),
            media_path: media.to_path_buf(),
            destination: Destination {
                account: "acct".to_string(),
                container: "recordings".to_string(),
            },
        }
    }

    fn queued_job(device: &Device, media: &Path) -> JobRecord {
        let job = JobRecord::new(
            device,
            Owner::Email {
                address: "foo@bar.com".to_string(),
            },
            "score.mid",
            1,
        );
        std::fs::write(media.join(&job.input_ref), b"MThd").unwrap();
        job
    }

    #[tokio::test]
    async fn test_undecodable_front_is_failed_and_skipped() {
        let media = TempDir::new().unwrap();
        let bad_id = Uuid::new_v4();
        let queue = Arc::new(UndecodableFront {
            inner: MemoryJobQueue::new(),
            undecodable: Mutex::new(Some(bad_id)),
            failed: Mutex::new(Vec::new()),
        });
        let shutdown = CancellationToken::new();
        let device = Device::from_id("nullsynth").unwrap();

        let job = queued_job(device, media.path());
        queue.enqueue(&job).await.unwrap();

        let poller = JobPoller::new(
            device,
            queue.clone(),
            WorkerPipeline::new(stages(queue.clone(), media.path()), 3, shutdown.clone()),
            Supervisor::disabled(),
            Duration::from_millis(200),
            shutdown.clone(),
        );
        let handle = tokio::spawn(async move { poller.run().await });

        for _ in 0..100 {
            if queue.peek_front("nullsynth").await.unwrap().is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        shutdown.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(*queue.failed.lock().unwrap(), vec![bad_id]);
        let done = queue.get(job.id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Done);
    }

    #[tokio::test]
    async fn test_poller_drains_partition_in_order_until_shutdown() {
        let media = TempDir::new().unwrap();
        let queue = Arc::new(MemoryJobQueue::new());
        let shutdown = CancellationToken::new();
        let device = Device::from_id("nullsynth").unwrap();

        let stages = Stages {
            queue: queue.clone(),
            recorder: Arc::new(Copying),
            encoder: Arc::new(Copying),
            uploader: Arc::new(Copying),
            notifier: Arc::new(Copying),
            media_path: media.path().to_path_buf(),
            destination: Destination {
                account: "acct".to_string(),
                container: "recordings".to_string(),
            },
        };
        let poller = JobPoller::new(
            device,
            queue.clone(),
            WorkerPipeline::new(stages, 3, shutdown.clone()),
            Supervisor::disabled(),
            Duration::from_millis(200),
            shutdown.clone(),
        );
        let handle = tokio::spawn(async move { poller.run().await });

        let mut jobs = Vec::new();
        for _ in 0..2 {
            let job = JobRecord::new(
                device,
                Owner::Email {
                    address: "foo@bar.com".to_string(),
                },
                "score.mid",
                1,
            );
            std::fs::write(media.path().join(&job.input_ref), b"MThd").unwrap();
            queue.enqueue(&job).await.unwrap();
            jobs.push(job);
        }

        for _ in 0..100 {
            if queue.peek_front("nullsynth").await.unwrap().is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        shutdown.cancel();
        handle.await.unwrap().unwrap();

        let listed = queue.list("nullsynth").await.unwrap();
        assert_eq!(listed.len(), 2);
        for job in listed {
            assert_eq!(job.status, JobStatus::Done);
        }
        assert_eq!(std::fs::read_dir(media.path()).unwrap().count(), 0);
    }
}
