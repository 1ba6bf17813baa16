use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::queue::{JobQueue, RetryPolicy};
use crate::models::{Job, JobKind};
use crate::store::StoreResult;

const STALE_LIMIT_REASON: &str = "attempt limit reached by a job whose worker stopped responding";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    /// Worth running again later.
    #[error("retryable: {0}")]
    Retryable(String),
    /// Running again cannot succeed.
    #[error("fatal: {0}")]
    Fatal(String),
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, kind: &JobKind) -> Result<(), JobError>;
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    pub visibility_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            visibility_timeout: Duration::from_secs(300),
            retry: RetryPolicy::default(),
        }
    }
}

/// Outcome of one claimed job, mostly useful to tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processed {
    Idle,
    Completed,
    Rescheduled,
    Failed,
}

pub struct Worker {
    queue: Arc<dyn JobQueue>,
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        handler: Arc<dyn JobHandler>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            handler,
            config,
        }
    }

    /// Claims and runs at most one job.
    pub async fn run_once(&self) -> StoreResult<Processed> {
        let now = Utc::now();
        let Some(job) = self.queue.claim(now, self.config.visibility_timeout).await? else {
            return Ok(Processed::Idle);
        };

        // A worker that died mid-job never recorded the attempt's outcome.
        if job.over_attempt_limit() {
            self.queue.fail(job.id, STALE_LIMIT_REASON).await?;
            error!(
                job_id = %job.id,
                kind = job.kind.name(),
                attempts = job.attempts,
                max_attempts = job.max_attempts,
                "Reclaimed job is over its attempt limit"
            );
            return Ok(Processed::Failed);
        }

        debug!(job_id = %job.id, kind = job.kind.name(), attempt = job.attempts, "Running job");

        match self.handler.handle(&job.kind).await {
            Ok(()) => {
                self.queue.complete(job.id).await?;
                info!(job_id = %job.id, kind = job.kind.name(), "Job completed");
                Ok(Processed::Completed)
            }
            Err(JobError::Fatal(reason)) => {
                self.queue.fail(job.id, &reason).await?;
                error!(job_id = %job.id, kind = job.kind.name(), %reason, "Job failed permanently");
                Ok(Processed::Failed)
            }
            Err(JobError::Retryable(reason)) => self.retry_or_fail(&job, &reason).await,
        }
    }

    async fn retry_or_fail(&self, job: &Job, reason: &str) -> StoreResult<Processed> {
        if job.attempts_exhausted() {
            self.queue.fail(job.id, reason).await?;
            error!(
                job_id = %job.id,
                kind = job.kind.name(),
                attempts = job.attempts,
                %reason,
                "Job exhausted its retries"
            );
            return Ok(Processed::Failed);
        }

        let delay = self.config.retry.delay_after(job.attempts);
        let run_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        self.queue.reschedule(job.id, reason, run_at).await?;
        warn!(
            job_id = %job.id,
            kind = job.kind.name(),
            attempt = job.attempts,
            retry_in_ms = delay.as_millis() as u64,
            %reason,
            "Job will be retried"
        );
        Ok(Processed::Rescheduled)
    }

    /// Polls until `shutdown` flips to `true`. A job already in hand is
    /// finished before returning.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_ms = self.config.poll_interval.as_millis() as u64,
            "Worker started"
        );

        while !*shutdown.borrow() {
            match self.run_once().await {
                Ok(Processed::Idle) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "Worker could not reach the job queue");
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }

        info!("Worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use uuid::Uuid;

    use super::*;
    use crate::models::JobStatus;
    use crate::store::InMemoryStore;

    struct Scripted {
        calls: AtomicUsize,
        outcome: fn(usize) -> Result<(), JobError>,
    }

    #[async_trait]
    impl JobHandler for Scripted {
        async fn handle(&self, _kind: &JobKind) -> Result<(), JobError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)(call)
        }
    }

    fn worker(store: Arc<InMemoryStore>, handler: Arc<Scripted>) -> Worker {
        let config = WorkerConfig {
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
            },
            ..WorkerConfig::default()
        };
        Worker::new(store, handler, config)
    }

    fn distribute() -> JobKind {
        JobKind::DistributeToUsers {
            master_notification_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn retryable_errors_are_retried_until_attempts_run_out() {
        let store = Arc::new(InMemoryStore::default());
        let handler = Arc::new(Scripted {
            calls: AtomicUsize::new(0),
            outcome: |_| Err(JobError::Retryable("push provider down".into())),
        });
        let job = store
            .enqueue(Job::new(distribute(), 3, Utc::now()))
            .await
            .unwrap();
        let worker = worker(store.clone(), handler.clone());

        assert_eq!(worker.run_once().await.unwrap(), Processed::Rescheduled);
        assert_eq!(worker.run_once().await.unwrap(), Processed::Rescheduled);
        assert_eq!(worker.run_once().await.unwrap(), Processed::Failed);
        assert_eq!(worker.run_once().await.unwrap(), Processed::Idle);

        let stored = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.attempts, 3);
        assert_eq!(stored.last_error.as_deref(), Some("push provider down"));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_fail_without_retry() {
        let store = Arc::new(InMemoryStore::default());
        let handler = Arc::new(Scripted {
            calls: AtomicUsize::new(0),
            outcome: |_| Err(JobError::Fatal("master notification missing".into())),
        });
        let job = store
            .enqueue(Job::new(distribute(), 3, Utc::now()))
            .await
            .unwrap();

        let worker = worker(store.clone(), handler.clone());
        assert_eq!(worker.run_once().await.unwrap(), Processed::Failed);

        let stored = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.attempts, 1);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_after_a_transient_failure() {
        let store = Arc::new(InMemoryStore::default());
        let handler = Arc::new(Scripted {
            calls: AtomicUsize::new(0),
            outcome: |call| {
                if call == 0 {
                    Err(JobError::Retryable("timeout".into()))
                } else {
                    Ok(())
                }
            },
        });
        let job = store
            .enqueue(Job::new(distribute(), 3, Utc::now()))
            .await
            .unwrap();

        let worker = worker(store.clone(), handler);
        assert_eq!(worker.run_once().await.unwrap(), Processed::Rescheduled);
        assert_eq!(worker.run_once().await.unwrap(), Processed::Completed);

        let stored = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn stale_reclaims_count_against_the_attempt_limit() {
        let store = Arc::new(InMemoryStore::default());
        let handler = Arc::new(Scripted {
            calls: AtomicUsize::new(0),
            outcome: |_| Ok(()),
        });
        let start = Utc::now() - chrono::Duration::minutes(1);
        let job = store
            .enqueue(Job::new(distribute(), 1, start))
            .await
            .unwrap();

        // Three workers each claimed the job and died before finishing it.
        for second in 0..3 {
            let at = start + chrono::Duration::seconds(second);
            store.claim(at, Duration::ZERO).await.unwrap().unwrap();
        }

        let worker = Worker::new(
            store.clone(),
            handler.clone(),
            WorkerConfig {
                visibility_timeout: Duration::ZERO,
                ..WorkerConfig::default()
            },
        );
        assert_eq!(worker.run_once().await.unwrap(), Processed::Failed);
        assert_eq!(worker.run_once().await.unwrap(), Processed::Idle);

        let stored = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.last_error.as_deref(), Some(STALE_LIMIT_REASON));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn run_returns_once_shutdown_is_signalled() {
        let store = Arc::new(InMemoryStore::default());
        let handler = Arc::new(Scripted {
            calls: AtomicUsize::new(0),
            outcome: |_| Ok(()),
        });
        let worker = worker(store, handler);
        let (tx, rx) = watch::channel(false);

        let running = tokio::spawn(async move { worker.run(rx).await });
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .expect("worker did not stop")
            .unwrap();
    }
}
