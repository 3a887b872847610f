// lib.rs - Asset orchestration service: provider fallback chains, job tracking, tool dispatch
use std::sync::Arc;

use axum::{Extension, Router};
use tower_http::cors::CorsLayer;

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod middleware;
pub mod orchestrator;
pub mod providers;
pub mod tools;
pub mod types;
pub mod webhook;

pub use error::{ApiError, GenerationError, ProviderError, ValidationError};
pub use jobs::{Job, JobStatus, JobStore};
pub use orchestrator::FallbackOrchestrator;
pub use providers::{ProviderAdapter, ProviderRegistry};
pub use tools::{ToolDispatcher, ToolResult};
pub use types::{Capability, GenerationRequest, GenerationResult, PriorityMode};

// Shared state handed to every handler through `Extension<Arc<AppState>>`
pub struct AppState {
    pub orchestrator: Arc<FallbackOrchestrator>,
    pub job_store: Arc<dyn JobStore>,
    /// "postgres" or "in-memory", reported by /api/status
    pub storage_backend: &'static str,
    pub tools: Arc<ToolDispatcher>,
    pub code_changes: Arc<webhook::CodeChangeLog>,
    pub webhook_secret: Option<String>,
}

/// Full HTTP surface with request logging and CORS
pub fn build_router(state: Arc<AppState>) -> Router {
    handlers::api_routes()
        .layer(axum::middleware::from_fn(middleware::logging::request_logging_middleware))
        .layer(CorsLayer::permissive())
        .layer(Extension(state))
}
