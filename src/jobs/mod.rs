// src/jobs/mod.rs
//! Job records for generation requests.
//! A job moves pending → processing → succeeded|failed, never backwards, and is frozen once terminal.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::types::{Capability, GenerationParams, GenerationRequest, GenerationResult, PriorityMode};

pub mod generation_job;
pub mod pg_store;

pub use generation_job::spawn_generation_job;
pub use pg_store::PgJobStore;

/// Unique identifier for a generation job
pub type JobId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "succeeded" => Some(JobStatus::Succeeded),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    /// The only legal moves. processing → processing is allowed so a retried
    /// `mark_processing` is a no-op instead of an error.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Succeeded)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed,
    TimedOut,
}

/// One adapter attempt in the job's append-only log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub provider: String,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

impl AttemptRecord {
    pub fn succeeded(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            outcome: AttemptOutcome::Succeeded,
            error: None,
            at: Utc::now(),
        }
    }

    pub fn failed(provider: &str, error: impl Into<String>, timed_out: bool) -> Self {
        Self {
            provider: provider.to_string(),
            outcome: if timed_out {
                AttemptOutcome::TimedOut
            } else {
                AttemptOutcome::Failed
            },
            error: Some(error.into()),
            at: Utc::now(),
        }
    }
}

#[derive(Error, Debug)]
pub enum JobStoreError {
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("job {job_id} cannot {action} while {status}")]
    InvalidTransition {
        job_id: JobId,
        status: JobStatus,
        action: &'static str,
    },
    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for JobStoreError {
    fn from(err: sqlx::Error) -> Self {
        JobStoreError::Database(err.to_string())
    }
}

/// Durable record of one generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub capability: Capability,
    pub prompt: String,
    pub parameters: GenerationParams,
    pub priority_mode: PriorityMode,
    pub status: JobStatus,
    pub provider: Option<String>,
    pub attempts: Vec<AttemptRecord>,
    pub result: Option<GenerationResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(request: &GenerationRequest, priority_mode: PriorityMode) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            capability: request.capability,
            prompt: request.prompt.clone(),
            parameters: request.parameters.clone(),
            priority_mode,
            status: JobStatus::Pending,
            provider: None,
            attempts: Vec::new(),
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn request(&self) -> GenerationRequest {
        GenerationRequest {
            capability: self.capability,
            prompt: self.prompt.clone(),
            parameters: self.parameters.clone(),
        }
    }

    fn transition(&mut self, next: JobStatus, action: &'static str) -> Result<(), JobStoreError> {
        if !self.status.can_transition_to(next) {
            return Err(JobStoreError::InvalidTransition {
                job_id: self.id.clone(),
                status: self.status,
                action,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn mark_processing(&mut self) -> Result<(), JobStoreError> {
        self.transition(JobStatus::Processing, "start processing")?;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn record_attempt(&mut self, attempt: AttemptRecord) -> Result<(), JobStoreError> {
        if self.status != JobStatus::Processing {
            return Err(JobStoreError::InvalidTransition {
                job_id: self.id.clone(),
                status: self.status,
                action: "record an attempt",
            });
        }
        self.attempts.push(attempt);
        Ok(())
    }

    pub fn complete(&mut self, provider: &str, result: GenerationResult) -> Result<(), JobStoreError> {
        self.transition(JobStatus::Succeeded, "complete")?;
        self.provider = Some(provider.to_string());
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), JobStoreError> {
        self.transition(JobStatus::Failed, "fail")?;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}

/// Persistence boundary for jobs. Both stores apply mutations through the `Job` methods
/// above so the status machine is enforced in one place.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: Job) -> Result<JobId, JobStoreError>;

    async fn get(&self, job_id: &str) -> Result<Option<Job>, JobStoreError>;

    async fn mark_processing(&self, job_id: &str) -> Result<(), JobStoreError>;

    async fn record_attempt(&self, job_id: &str, attempt: AttemptRecord) -> Result<(), JobStoreError>;

    async fn complete(&self, job_id: &str, provider: &str, result: GenerationResult) -> Result<(), JobStoreError>;

    async fn fail(&self, job_id: &str, error: &str) -> Result<(), JobStoreError>;

    /// Newest first
    async fn list_recent(&self, limit: usize) -> Result<Vec<Job>, JobStoreError>;
}

/// Process-local store, used when no database is configured and in tests
#[derive(Clone, Default)]
pub struct InMemoryJobStore {
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update<F>(&self, job_id: &str, apply: F) -> Result<(), JobStoreError>
    where
        F: FnOnce(&mut Job) -> Result<(), JobStoreError> + Send,
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| JobStoreError::NotFound(job_id.to_string()))?;
        apply(job)
    }

    /// Drop terminal jobs that finished before `max_age` ago
    pub async fn cleanup_finished(&self, max_age: chrono::Duration) -> usize {
        let mut jobs = self.jobs.write().await;
        let cutoff = Utc::now() - max_age;

        let to_remove: Vec<JobId> = jobs
            .iter()
            .filter(|(_, job)| matches!(job.completed_at, Some(completed_at) if completed_at < cutoff))
            .map(|(id, _)| id.clone())
            .collect();

        for job_id in &to_remove {
            jobs.remove(job_id);
            tracing::debug!("🗑️ Cleaned up finished job: {}", job_id);
        }
        to_remove.len()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: Job) -> Result<JobId, JobStoreError> {
        let job_id = job.id.clone();
        self.jobs.write().await.insert(job_id.clone(), job);
        tracing::info!(job_id = %job_id, "🎬 Created job");
        Ok(job_id)
    }

    async fn get(&self, job_id: &str) -> Result<Option<Job>, JobStoreError> {
        Ok(self.jobs.read().await.get(job_id).cloned())
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
        let jobs = self.jobs.read().await;
        let mut recent: Vec<Job> = jobs.values().cloned().collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(limit);
        Ok(recent)
    }
}
