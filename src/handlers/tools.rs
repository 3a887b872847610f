// src/handlers/tools.rs
//! Tool invocation endpoint. Tool failures are reported in the body, not the status code.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension},
    response::Json,
    routing::{get, post},
    Router,
};

use crate::error::ApiError;
use crate::tools::{ToolInfo, ToolInvocation, ToolResult};
use crate::AppState;

/// POST /api/tools/invoke. Only an unparseable body is an HTTP error.
pub async fn invoke_tool(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<ToolInvocation>, JsonRejection>,
) -> Result<Json<ToolResult>, ApiError> {
    let Json(invocation) = payload?;
    Ok(Json(state.tools.invoke(&invocation).await))
}

/// GET /api/tools
pub async fn list_tools(Extension(state): Extension<Arc<AppState>>) -> Json<Vec<ToolInfo>> {
    Json(state.tools.list())
}

pub fn tool_routes() -> Router {
    Router::new()
        .route("/api/tools", get(list_tools))
        .route("/api/tools/invoke", post(invoke_tool))
}
