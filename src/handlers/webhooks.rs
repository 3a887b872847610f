// src/handlers/webhooks.rs
//! GitHub webhook receiver. The signature is checked against the raw body before any parsing.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Query},
    http::HeaderMap,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::webhook::{verify_signature, CodeChange, PushEvent, EVENT_HEADER, SIGNATURE_HEADER};
use crate::AppState;

/// POST /api/webhooks/github
pub async fn github_webhook(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let verified = state
        .webhook_secret
        .as_deref()
        .map(|secret| verify_signature(secret, &body, signature))
        .unwrap_or(false);

    if !verified {
        tracing::warn!("🚫 Rejected webhook with invalid signature");
        return Err(ApiError::Unauthorized("Invalid signature".to_string()));
    }

    let event_type = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if event_type != "push" {
        tracing::debug!(event = %event_type, "Ignoring webhook event");
        return Ok(Json(json!({
            "success": true,
            "message": "Event type not supported",
        })));
    }

    let event: PushEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid push payload: {}", e)))?;

    if !event.is_tracked_branch() {
        return Ok(Json(json!({
            "success": true,
            "message": "Not main branch, skipping",
        })));
    }

    let processed = state.code_changes.record_push(&event).await;
    tracing::info!(branch = %event.branch(), commits = processed, "🔔 Push webhook processed");

    Ok(Json(json!({
        "success": true,
        "processed": processed,
        "message": format!("Processed {} commits", processed),
    })))
}

#[derive(Debug, Deserialize)]
pub struct ChangesQuery {
    pub limit: Option<usize>,
}

/// GET /api/webhooks/github/changes - newest first
pub async fn recent_changes(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<ChangesQuery>,
) -> Json<Vec<CodeChange>> {
    let limit = query.limit.unwrap_or(50).min(500);
    Json(state.code_changes.recent(limit).await)
}

pub fn webhook_routes() -> Router {
    Router::new()
        .route("/api/webhooks/github", post(github_webhook))
        .route("/api/webhooks/github/changes", get(recent_changes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{app, get as get_request, send, state, WEBHOOK_SECRET};
    use crate::webhook::sign;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    fn push_body(branch: &str) -> String {
        json!({
            "ref": format!("refs/heads/{}", branch),
            "repository": { "full_name": "acme/site" },
            "commits": [
                { "id": "a1", "message": "first", "author": { "name": "Ada" }, "modified": ["README.md"] },
                { "id": "b2", "message": "second", "author": { "name": "Ada" }, "added": ["src/x.rs"] }
            ]
        })
        .to_string()
    }

    fn webhook_request(event: &str, body: &str, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/webhooks/github")
            .header("content-type", "application/json")
            .header(EVENT_HEADER, event);
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_bad_signature_is_401_and_logs_nothing() {
        let state = state();
        let body = push_body("main");
        let forged = sign("not-the-secret", body.as_bytes()).unwrap();

        let (status, response) = send(app(state.clone()), webhook_request("push", &body, Some(forged))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(response["error"], "Invalid signature");

        let (status, _) = send(app(state.clone()), webhook_request("push", &body, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(state.code_changes.len().await, 0);
    }

    #[tokio::test]
    async fn test_signed_push_to_main_records_commits() {
        let state = state();
        let body = push_body("main");
        let signature = sign(WEBHOOK_SECRET, body.as_bytes()).unwrap();

        let (status, response) = send(app(state.clone()), webhook_request("push", &body, Some(signature))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["processed"], 2);
        assert_eq!(response["message"], "Processed 2 commits");

        let (_, changes) = send(app(state), get_request("/api/webhooks/github/changes")).await;
        assert_eq!(changes[0]["commit_sha"], "b2");
        assert_eq!(changes[1]["commit_sha"], "a1");
    }

    #[tokio::test]
    async fn test_other_branches_and_events_are_skipped() {
        let state = state();

        let body = push_body("develop");
        let signature = sign(WEBHOOK_SECRET, body.as_bytes()).unwrap();
        let (status, response) = send(app(state.clone()), webhook_request("push", &body, Some(signature))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["message"], "Not main branch, skipping");

        let body = r#"{"zen":"Keep it logically awesome."}"#;
        let signature = sign(WEBHOOK_SECRET, body.as_bytes()).unwrap();
        let (status, response) = send(app(state.clone()), webhook_request("ping", body, Some(signature))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["message"], "Event type not supported");

        assert_eq!(state.code_changes.len().await, 0);
    }

    #[tokio::test]
    async fn test_malformed_push_is_400() {
        let body = "{not json";
        let signature = sign(WEBHOOK_SECRET, body.as_bytes()).unwrap();
        let (status, _) = send(app(state()), webhook_request("push", body, Some(signature))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
