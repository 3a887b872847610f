// src/tools/mod.rs
//! Tool dispatch: maps an AI-issued tool name to one side-effecting handler.
//! `dispatch` always answers with a `ToolResult`; handler errors never escape it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::AppConfig;

pub mod filesystem;
pub mod github;
pub mod shell;

/// Flat argument bag as sent by the caller
pub type ToolArgs = Map<String, Value>;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("unknown tool")]
    UnknownTool(String),
    #[error("{0} is not configured")]
    NotConfigured(String),
    #[error("Remote error: {0}")]
    Remote(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Command timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("Failed to launch command: {0}")]
    Launch(String),
    #[error("Command exited with code {exit_code}\nstdout: {stdout}\nstderr: {stderr}")]
    NonZeroExit {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    #[error("Path escapes the allowed root: {0}")]
    PathEscapesRoot(String),
}

/// Normalized outcome of one tool call. Exactly one of `data` / `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolInvocation {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: ToolArgs,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

/// Registry entry description, for introspection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub required: Vec<String>,
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Arguments that must be present as strings
    fn required_args(&self) -> &'static [&'static str];

    fn validate(&self, args: &ToolArgs) -> Result<(), ToolError> {
        for key in self.required_args() {
            require_str(args, key)?;
        }
        Ok(())
    }

    async fn execute(&self, args: &ToolArgs) -> Result<Value, ToolError>;
}

/// A required string argument. Missing, null and non-string values are all rejected.
pub fn require_str<'a>(args: &'a ToolArgs, key: &str) -> Result<&'a str, ToolError> {
    match args.get(key) {
        Some(Value::String(value)) => Ok(value.as_str()),
        Some(Value::Null) | None => Err(ToolError::Validation(format!(
            "missing required argument '{}'",
            key
        ))),
        Some(_) => Err(ToolError::Validation(format!("argument '{}' must be a string", key))),
    }
}

pub fn optional_str<'a>(args: &'a ToolArgs, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str()).filter(|v| !v.is_empty())
}

#[derive(Default)]
pub struct ToolDispatcher {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        let name = handler.name().to_string();
        if self.handlers.insert(name.clone(), handler).is_some() {
            tracing::warn!(tool = %name, "Tool registered twice, keeping the latest handler");
        }
    }

    /// The production tool set
    pub fn with_defaults(client: reqwest::Client, config: &AppConfig) -> Self {
        let mut dispatcher = Self::new();

        let github = github::GitHubClient::from_config(client, &config.github).map(Arc::new);
        if github.is_none() {
            tracing::warn!("GitHub tools registered without credentials (GITHUB_TOKEN, GITHUB_REPO_OWNER, GITHUB_REPO_NAME)");
        }
        dispatcher.register(Arc::new(github::ReadFileTool::new(github.clone())));
        dispatcher.register(Arc::new(github::WriteFileTool::new(github.clone())));
        dispatcher.register(Arc::new(github::ListFilesTool::new(github)));

        dispatcher.register(Arc::new(shell::BashExecuteTool::new(
            config.sandbox_workdir.clone(),
            config.sandbox_timeout,
        )));

        let root = filesystem::SandboxRoot::new(config.filesystem_root.clone());
        dispatcher.register(Arc::new(filesystem::FileReadTool::new(root.clone())));
        dispatcher.register(Arc::new(filesystem::FileWriteTool::new(root.clone())));
        dispatcher.register(Arc::new(filesystem::FileListTool::new(root)));

        tracing::info!("🔧 Registered {} tools", dispatcher.handlers.len());
        dispatcher
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Sorted by name
    pub fn list(&self) -> Vec<ToolInfo> {
        let mut tools: Vec<ToolInfo> = self
            .handlers
            .values()
            .map(|h| ToolInfo {
                name: h.name().to_string(),
                description: h.description().to_string(),
                required: h.required_args().iter().map(|r| r.to_string()).collect(),
            })
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub async fn dispatch(&self, tool_name: &str, args: &ToolArgs) -> ToolResult {
        match self.try_dispatch(tool_name, args).await {
            Ok(data) => {
                tracing::info!(tool = %tool_name, "🔧 Tool succeeded");
                ToolResult::ok(data)
            }
            Err(e) => {
                tracing::warn!(tool = %tool_name, "🔧 Tool failed: {}", e);
                ToolResult::err(e.to_string())
            }
        }
    }

    pub async fn invoke(&self, invocation: &ToolInvocation) -> ToolResult {
        let correlation_id = invocation.correlation_id.as_deref().unwrap_or("-");
        tracing::debug!(tool = %invocation.tool_name, correlation_id = %correlation_id, "Dispatching tool call");
        self.dispatch(&invocation.tool_name, &invocation.arguments).await
    }

    async fn try_dispatch(&self, tool_name: &str, args: &ToolArgs) -> Result<Value, ToolError> {
        let handler = self
            .handlers
            .get(tool_name)
            .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;
        handler.validate(args)?;
        handler.execute(args).await
    }
}
