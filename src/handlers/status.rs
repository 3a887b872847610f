// src/handlers/status.rs
use std::sync::Arc;

use axum::{extract::Extension, response::Json, routing::get, Router};
use serde_json::{json, Map, Value};

use crate::types::Capability;
use crate::AppState;

// API Status endpoint
pub async fn api_status(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let registry = state.orchestrator.registry();

    let mut providers = Map::new();
    for capability in Capability::ALL {
        let live: Vec<String> = registry
            .available(capability)
            .into_iter()
            .filter(|name| !state.orchestrator.is_disabled(capability, name))
            .collect();
        providers.insert(capability.to_string(), json!(live));
    }

    let tools: Vec<String> = state.tools.list().into_iter().map(|t| t.name).collect();

    Json(json!({
        "status": "operational",
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "job_store": state.storage_backend,
            "github_webhook": if state.webhook_secret.is_some() { "configured" } else { "not_configured" },
        },
        "providers": providers,
        "tools": tools,
    }))
}

pub fn status_routes() -> Router {
    Router::new().route("/api/status", get(api_status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{app, get, send, state};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_status_lists_every_capability() {
        let (status, body) = send(app(state()), get("/api/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "operational");
        assert_eq!(body["services"]["job_store"], "in-memory");
        assert_eq!(body["services"]["github_webhook"], "configured");
        for capability in ["video", "image", "audio"] {
            assert_eq!(body["providers"][capability], json!([]));
        }
    }
}
