use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Every kind of background work the worker knows how to run, with its
/// payload. Serialized as `{"type": "distribute-to-users", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum JobKind {
    /// Expand a broadcast into one record per active user.
    #[serde(rename_all = "camelCase")]
    DistributeToUsers { master_notification_id: Uuid },
    /// Push every still-pending record of a broadcast.
    #[serde(rename_all = "camelCase")]
    DeliverBroadcast { master_notification_id: Uuid },
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::DistributeToUsers { .. } => "distribute-to-users",
            JobKind::DeliverBroadcast { .. } => "deliver-broadcast",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub run_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(kind: JobKind, max_attempts: i32, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            status: JobStatus::Queued,
            attempts: 0,
            max_attempts,
            last_error: None,
            run_at: now,
            locked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// True once a claim has pushed attempts past the cap, which only happens
    /// when a stale running job is reclaimed.
    pub fn over_attempt_limit(&self) -> bool {
        self.attempts > self.max_attempts
    }
}
