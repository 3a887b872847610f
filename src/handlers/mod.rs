// src/handlers/mod.rs
use axum::Router;

pub mod generation;
pub mod jobs;
pub mod status;
pub mod tools;
pub mod webhooks;

/// Every API route. Handlers read `Extension<Arc<AppState>>`, layered on by the caller.
pub fn api_routes() -> Router {
    Router::new()
        .merge(generation::generation_routes())
        .merge(jobs::job_routes())
        .merge(tools::tool_routes())
        .merge(webhooks::webhook_routes())
        .merge(status::status_routes())
}
