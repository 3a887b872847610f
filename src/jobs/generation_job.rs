// src/jobs/generation_job.rs
//! Background execution of a generation job. The HTTP handler returns as soon as the job
//! row exists; the orchestrator runs on its own tokio task.

use std::sync::Arc;

use tokio::task::JoinHandle;

use super::{JobId, JobStore};
use crate::orchestrator::FallbackOrchestrator;
use crate::types::{GenerationRequest, PriorityMode};

pub fn spawn_generation_job(
    orchestrator: Arc<FallbackOrchestrator>,
    store: Arc<dyn JobStore>,
    job_id: JobId,
    request: GenerationRequest,
    mode: PriorityMode,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let started = std::time::Instant::now();
        tracing::info!(job_id = %job_id, capability = %request.capability, "🎬 Starting generation job");

        match orchestrator.run(&job_id, &request, mode, store.as_ref()).await {
            Ok(outcome) => {
                tracing::info!(
                    job_id = %job_id,
                    provider = %outcome.provider,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "✅ Generation job completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    job_id = %job_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "❌ Generation job failed: {}",
                    e
                );
            }
        }
    })
}
