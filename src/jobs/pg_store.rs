// src/jobs/pg_store.rs
//! Postgres-backed job store. Mutations lock the row, apply the same `Job` state machine
//! as the in-memory store, then write the row back inside one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

use super::{AttemptRecord, Job, JobId, JobStatus, JobStore, JobStoreError};
use crate::types::{Capability, GenerationParams, GenerationResult, PriorityMode};

const SELECT_COLUMNS: &str = "id, capability, prompt, parameters, priority_mode, status, provider, \
     attempts, result, error, created_at, started_at, completed_at";

#[derive(Debug, FromRow)]
struct JobRow {
    id: String,
    capability: String,
    prompt: String,
    parameters: Json<GenerationParams>,
    priority_mode: String,
    status: String,
    provider: Option<String>,
    attempts: Json<Vec<AttemptRecord>>,
    result: Option<Json<GenerationResult>>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for Job {
    type Error = JobStoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let capability = Capability::parse(&row.capability).ok_or_else(|| {
            JobStoreError::Database(format!("unknown capability '{}' for job {}", row.capability, row.id))
        })?;
        let status = JobStatus::parse(&row.status).ok_or_else(|| {
            JobStoreError::Database(format!("unknown status '{}' for job {}", row.status, row.id))
        })?;
        let priority_mode = match row.priority_mode.as_str() {
            "speed-first" => PriorityMode::SpeedFirst,
            _ => PriorityMode::QualityFirst,
        };

        Ok(Job {
            id: row.id,
            capability,
            prompt: row.prompt,
            parameters: row.parameters.0,
            priority_mode,
            status,
            provider: row.provider,
            attempts: row.attempts.0,
            result: row.result.map(|json| json.0),
            error: row.error,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn update<F>(&self, job_id: &str, apply: F) -> Result<(), JobStoreError>
    where
        F: FnOnce(&mut Job) -> Result<(), JobStoreError> + Send,
    {
        let mut tx = self.pool.begin().await?;

        let row: Option<JobRow> = sqlx::query_as(&format!(
            "SELECT {} FROM generation_jobs WHERE id = $1 FOR UPDATE",
            SELECT_COLUMNS
        ))
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await?;

        let mut job = Job::try_from(row.ok_or_else(|| JobStoreError::NotFound(job_id.to_string()))?)?;
        apply(&mut job)?;

        sqlx::query(
            r#"
            UPDATE generation_jobs
            SET status = $2, provider = $3, attempts = $4, result = $5, error = $6,
                started_at = $7, completed_at = $8
            WHERE id = $1
            "#,
        )
        .bind(&job.id)
        .bind(job.status.as_str())
        .bind(&job.provider)
        .bind(Json(&job.attempts))
        .bind(job.result.as_ref().map(Json))
        .bind(&job.error)
        .bind(job.started_at)
        .bind(job.completed_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::debug!(job_id = %job_id, status = %job.status, "📊 Job row updated");
        Ok(())
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, job: Job) -> Result<JobId, JobStoreError> {
        sqlx::query(
            r#"
            INSERT INTO generation_jobs (
                id, capability, prompt, parameters, priority_mode, status,
                provider, attempts, result, error, created_at, started_at, completed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(&job.id)
        .bind(job.capability.as_str())
        .bind(&job.prompt)
        .bind(Json(&job.parameters))
        .bind(job.priority_mode.as_str())
        .bind(job.status.as_str())
        .bind(&job.provider)
        .bind(Json(&job.attempts))
        .bind(job.result.as_ref().map(Json))
        .bind(&job.error)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await?;

        tracing::info!(job_id = %job.id, capability = %job.capability, "🎬 Created job");
        Ok(job.id)
    }

    async fn get(&self, job_id: &str) -> Result<Option<Job>, JobStoreError> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "SELECT {} FROM generation_jobs WHERE id = $1",
            SELECT_COLUMNS
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn mark_processing(&self, job_id: &str) -> Result<(), JobStoreError> {
        self.update(job_id, |job| job.mark_processing()).await
    }

    async fn record_attempt(&self, job_id: &str, attempt: AttemptRecord) -> Result<(), JobStoreError> {
        self.update(job_id, move |job| job.record_attempt(attempt)).await
    }

    async fn complete(&self, job_id: &str, provider: &str, result: GenerationResult) -> Result<(), JobStoreError> {
        self.update(job_id, move |job| job.complete(provider, result)).await
    }

    async fn fail(&self, job_id: &str, error: &str) -> Result<(), JobStoreError> {
        self.update(job_id, |job| job.fail(error)).await
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {} FROM generation_jobs ORDER BY created_at DESC LIMIT $1",
            SELECT_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }
}
