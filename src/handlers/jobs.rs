// src/handlers/jobs.rs
//! Job status endpoints

use axum::{
    extract::{Extension, Path, Query},
    response::Json,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ApiError;
use crate::jobs::{AttemptRecord, Job, JobId, JobStatus};
use crate::types::{Capability, GenerationResult, PriorityMode};
use crate::AppState;

const DEFAULT_LIST_LIMIT: usize = 20;
const MAX_LIST_LIMIT: usize = 100;

#[derive(Debug, Serialize)]
pub struct JobView {
    pub job_id: JobId,
    pub capability: Capability,
    pub status: JobStatus,
    pub priority_mode: PriorityMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GenerationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: Vec<AttemptRecord>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id,
            capability: job.capability,
            status: job.status,
            priority_mode: job.priority_mode,
            provider: job.provider,
            result: job.result,
            error: job.error,
            attempts: job.attempts,
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub limit: Option<usize>,
}

/// GET /api/jobs/:job_id
pub async fn get_job(
    Path(job_id): Path<JobId>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<JobView>, ApiError> {
    match state.job_store.get(&job_id).await? {
        Some(job) => Ok(Json(job.into())),
        None => Err(ApiError::NotFound(format!("Job not found: {}", job_id))),
    }
}

/// GET /api/jobs?limit=N - newest first
pub async fn list_jobs(
    Query(query): Query<ListJobsQuery>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<JobView>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let jobs = state.job_store.list_recent(limit).await?;
    Ok(Json(jobs.into_iter().map(JobView::from).collect()))
}

pub fn job_routes() -> Router {
    Router::new()
        .route("/api/jobs", get(list_jobs))
        .route("/api/jobs/:job_id", get(get_job))
}
