use axum::extract::{Path, Query, State};
use axum::response::Response;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::state::AppState;
use crate::utils::response::success;
use crate::utils::{AppError, AppResult};

const DEFAULT_FAILED_LIMIT: u64 = 50;
const MAX_FAILED_LIMIT: u64 = 500;

#[derive(Debug, Deserialize)]
pub struct FailedJobsQuery {
    pub limit: Option<u64>,
}

pub async fn failed_jobs(
    State(state): State<AppState>,
    Query(query): Query<FailedJobsQuery>,
) -> AppResult<Response> {
    let limit = query.limit.unwrap_or(DEFAULT_FAILED_LIMIT);
    if limit == 0 || limit > MAX_FAILED_LIMIT {
        return Err(AppError::ValidationError(format!(
            "limit must be between 1 and {}",
            MAX_FAILED_LIMIT
        )));
    }

    let jobs = state.jobs.failed_jobs(limit).await?;
    Ok(success(jobs, "Failed jobs fetched"))
}

pub async fn retry_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> AppResult<Response> {
    let job = state.jobs.requeue(job_id, Utc::now()).await?;
    tracing::info!(job_id = %job.id, kind = job.kind.name(), "Failed job requeued");
    Ok(success(job, "Job requeued"))
}
