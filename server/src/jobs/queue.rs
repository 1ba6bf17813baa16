use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::Job;
use crate::store::StoreResult;

/// Durable, at-least-once job queue.
///
/// A claimed job stays `running` until it is completed, rescheduled or
/// failed. If its worker dies, the job becomes claimable again once its lock
/// is older than the visibility timeout, so handlers must tolerate replays.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: Job) -> StoreResult<Job>;

    async fn get_job(&self, id: Uuid) -> StoreResult<Option<Job>>;

    /// Takes the oldest due job, marks it `running` and bumps `attempts`.
    async fn claim(
        &self,
        now: DateTime<Utc>,
        visibility_timeout: Duration,
    ) -> StoreResult<Option<Job>>;

    async fn complete(&self, id: Uuid) -> StoreResult<()>;

    /// Puts a job back in the queue to run again at `run_at`.
    async fn reschedule(&self, id: Uuid, error: &str, run_at: DateTime<Utc>) -> StoreResult<()>;

    async fn fail(&self, id: Uuid, error: &str) -> StoreResult<()>;

    /// Most recently updated first.
    async fn failed_jobs(&self, limit: u64) -> StoreResult<Vec<Job>>;

    /// Re-queues a failed job with a fresh attempt budget.
    async fn requeue(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<Job>;
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next run, after `attempt` runs have failed:
    /// `base * 2^(attempt - 1)`, capped at `max_delay`.
    pub fn delay_after(&self, attempt: i32) -> Duration {
        let exponent = attempt.saturating_sub(1).clamp(0, 20) as u32;
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map(|delay| delay.min(self.max_delay))
            .unwrap_or(self.max_delay)
    }
}
