// src/handlers/generation.rs
//! POST /api/generate - validate, create the job row, run the fallback chain in the background

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::jobs::{spawn_generation_job, Job};
use crate::types::{Capability, GenerationParams, GenerationRequest, PriorityMode};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub capability: Capability,
    pub prompt: String,
    #[serde(default)]
    pub parameters: GenerationParams,
    /// Falls back to `parameters.priority`, then quality-first
    #[serde(default)]
    pub priority_mode: Option<PriorityMode>,
}

pub async fn generate(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload?;
    let mode = body
        .priority_mode
        .or(body.parameters.priority)
        .unwrap_or_default();
    let request = GenerationRequest::new(body.capability, body.prompt).with_parameters(body.parameters);
    request.validate()?;

    let estimated_time = request.estimated_time_secs();
    let job_id = state.job_store.create(Job::new(&request, mode)).await?;

    spawn_generation_job(
        state.orchestrator.clone(),
        state.job_store.clone(),
        job_id.clone(),
        request,
        mode,
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "job_id": job_id,
            "status": "pending",
            "estimated_time": estimated_time,
        })),
    ))
}

pub fn generation_routes() -> Router {
    Router::new().route("/api/generate", post(generate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{app, json_request, send, state};

    #[tokio::test]
    async fn test_submission_returns_pending_job() {
        let state = state();
        let (status, body) = send(
            app(state.clone()),
            json_request(
                "POST",
                "/api/generate",
                json!({
                    "capability": "audio",
                    "prompt": "rain on a tin roof",
                    "parameters": { "duration": 20, "priority": "speed" }
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "pending");
        assert_eq!(body["estimated_time"], 10);

        let job_id = body["job_id"].as_str().unwrap();
        let job = state.job_store.get(job_id).await.unwrap().unwrap();
        assert_eq!(job.capability, Capability::Audio);
        assert_eq!(job.priority_mode, PriorityMode::SpeedFirst);
    }

    #[tokio::test]
    async fn test_empty_prompt_is_rejected_before_job_creation() {
        let state = state();
        let (status, body) = send(
            app(state.clone()),
            json_request("POST", "/api/generate", json!({ "capability": "video", "prompt": "" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "prompt is required");
        assert!(state.job_store.list_recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_uses_error_shape() {
        let state = state();
        let (status, body) = send(
            app(state.clone()),
            json_request("POST", "/api/generate", json!({ "capability": "hologram", "prompt": "x" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("capability"));
        assert!(state.job_store.list_recent(10).await.unwrap().is_empty());
    }
}
