// GitHub contents API client + repository tools
// Reads decode base64 content; writes encode it and pass the blob sha for updates.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{optional_str, require_str, ToolArgs, ToolError, ToolHandler};
use crate::config::GitHubConfig;

#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    token: String,
    owner: String,
    repo: String,
    base_url: String,
    retry_window: Duration,
}

// ============================================================================
// API REQUEST/RESPONSE STRUCTURES
// ============================================================================

/// One item from GET /repos/{owner}/{repo}/contents/{path}
#[derive(Debug, Deserialize)]
pub struct ContentItem {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub size: u64,
    pub sha: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
}

#[derive(Debug, Serialize)]
struct PutContentsRequest<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    content: Option<ShaRef>,
    commit: ShaRef,
}

#[derive(Debug, Deserialize)]
struct ShaRef {
    sha: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileContent {
    pub path: String,
    pub content: String,
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteOutcome {
    pub path: String,
    pub sha: Option<String>,
    pub commit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub size: u64,
}

// ============================================================================
// CLIENT
// ============================================================================

impl GitHubClient {
    pub fn new(client: Client, token: String, owner: String, repo: String) -> Self {
        Self {
            client,
            token,
            owner,
            repo,
            base_url: "https://api.github.com".to_string(),
            retry_window: Duration::from_secs(30),
        }
    }

    /// Needs token, owner and repo; any missing piece disables the GitHub tools
    pub fn from_config(client: Client, config: &GitHubConfig) -> Option<Self> {
        match (&config.token, &config.owner, &config.repo) {
            (Some(token), Some(owner), Some(repo)) => {
                Some(Self::new(client, token.clone(), owner.clone(), repo.clone()))
            }
            _ => None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Total time spent retrying 5xx / 429 / connection failures
    pub fn with_retry_window(mut self, retry_window: Duration) -> Self {
        self.retry_window = retry_window;
        self
    }

    fn contents_url(&self, path: &str) -> String {
        let encoded: Vec<String> = path
            .trim_matches('/')
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.base_url,
            self.owner,
            self.repo,
            encoded.join("/")
        )
    }

    /// Send with retry on transient failures, returning the parsed JSON body
    async fn send(&self, method: Method, url: &str, body: Option<Value>) -> Result<Value, ToolError> {
        let backoff_config = ExponentialBackoff {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(5),
            multiplier: 2.0,
            max_elapsed_time: Some(self.retry_window),
            ..Default::default()
        };

        let operation = || async {
            let mut request = self
                .client
                .request(method.clone(), url)
                .bearer_auth(&self.token)
                .header("Accept", "application/vnd.github+json")
                .header("User-Agent", "asset-orchestrator")
                .header("X-GitHub-Api-Version", "2022-11-28");
            if let Some(body) = &body {
                request = request.json(body);
            }

            let response = request.send().await.map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    tracing::warn!("GitHub connection error (retrying): {}", e);
                    backoff::Error::transient(ToolError::Remote(format!("Connection error: {}", e)))
                } else {
                    backoff::Error::permanent(ToolError::Remote(format!("Request error: {}", e)))
                }
            })?;

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| backoff::Error::permanent(ToolError::Remote(format!("Failed to read response: {}", e))))?;

            if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                tracing::warn!("GitHub API returned {} (retrying)", status);
                return Err(backoff::Error::transient(ToolError::Remote(format!(
                    "GitHub API error ({}): {}",
                    status, text
                ))));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(ToolError::Remote(format!(
                    "GitHub API error ({}): {}",
                    status,
                    github_message(&text)
                ))));
            }

            serde_json::from_str(&text)
                .map_err(|e| backoff::Error::permanent(ToolError::Remote(format!("Failed to parse response: {}", e))))
        };

        retry(backoff_config, operation).await
    }

    pub async fn read_file(&self, path: &str) -> Result<FileContent, ToolError> {
        let body = self.send(Method::GET, &self.contents_url(path), None).await?;
        if body.is_array() {
            return Err(ToolError::Remote(format!("{} is a directory", path)));
        }
        let item: ContentItem = serde_json::from_value(body)
            .map_err(|e| ToolError::Remote(format!("Unexpected contents response: {}", e)))?;

        let raw = item
            .content
            .ok_or_else(|| ToolError::Remote(format!("{} has no inline content", path)))?;
        if let Some(encoding) = item.encoding.as_deref() {
            if encoding != "base64" {
                return Err(ToolError::Remote(format!("Unsupported content encoding: {}", encoding)));
            }
        }
        // GitHub wraps base64 at 60 columns
        let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = BASE64_STANDARD
            .decode(compact)
            .map_err(|e| ToolError::Remote(format!("Invalid base64 content: {}", e)))?;
        let content = String::from_utf8(bytes)
            .map_err(|_| ToolError::Remote(format!("{} is not valid UTF-8 text", path)))?;

        Ok(FileContent {
            path: path.to_string(),
            content,
            sha: item.sha,
        })
    }

    /// Create or update a file. `sha` is required by GitHub when the file already exists.
    pub async fn write_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
        sha: Option<&str>,
    ) -> Result<WriteOutcome, ToolError> {
        let request = PutContentsRequest {
            message,
            content: BASE64_STANDARD.encode(content.as_bytes()),
            sha,
        };
        let body = serde_json::to_value(&request)
            .map_err(|e| ToolError::Remote(format!("Failed to encode request: {}", e)))?;

        let response = self.send(Method::PUT, &self.contents_url(path), Some(body)).await?;
        let response: PutContentsResponse = serde_json::from_value(response)
            .map_err(|e| ToolError::Remote(format!("Unexpected write response: {}", e)))?;

        tracing::info!(path = %path, commit = %response.commit.sha, "📝 Committed file to GitHub");
        Ok(WriteOutcome {
            path: path.to_string(),
            sha: response.content.map(|c| c.sha),
            commit: response.commit.sha,
        })
    }

    pub async fn list_files(&self, path: &str) -> Result<Vec<DirEntry>, ToolError> {
        let body = self.send(Method::GET, &self.contents_url(path), None).await?;
        if !body.is_array() {
            return Err(ToolError::Remote(format!("{} is not a directory", display_path(path))));
        }
        let items: Vec<ContentItem> = serde_json::from_value(body)
            .map_err(|e| ToolError::Remote(format!("Unexpected contents response: {}", e)))?;

        Ok(items
            .into_iter()
            .map(|item| DirEntry {
                name: item.name,
                path: item.path,
                kind: item.kind,
                size: item.size,
            })
            .collect())
    }
}

/// GitHub error bodies carry a `message` field; fall back to the raw text
fn github_message(text: &str) -> String {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| text.to_string())
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "/"
    } else {
        path
    }
}

fn client(github: &Option<Arc<GitHubClient>>) -> Result<&GitHubClient, ToolError> {
    github
        .as_deref()
        .ok_or_else(|| ToolError::NotConfigured("GitHub".to_string()))
}

// ============================================================================
// TOOLS
// ============================================================================

pub struct ReadFileTool {
    github: Option<Arc<GitHubClient>>,
}

impl ReadFileTool {
    pub fn new(github: Option<Arc<GitHubClient>>) -> Self {
        Self { github }
    }
}

#[async_trait]
impl ToolHandler for ReadFileTool {
    fn name(&self) -> &'static str {
        "github_read_file"
    }

    fn description(&self) -> &'static str {
        "Read a file from the configured GitHub repository"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["path"]
    }

    async fn execute(&self, args: &ToolArgs) -> Result<Value, ToolError> {
        let file = client(&self.github)?.read_file(require_str(args, "path")?).await?;
        Ok(json!(file))
    }
}

pub struct WriteFileTool {
    github: Option<Arc<GitHubClient>>,
}

impl WriteFileTool {
    pub fn new(github: Option<Arc<GitHubClient>>) -> Self {
        Self { github }
    }
}

#[async_trait]
impl ToolHandler for WriteFileTool {
    fn name(&self) -> &'static str {
        "github_write_file"
    }

    fn description(&self) -> &'static str {
        "Create or update a file in the configured GitHub repository (sha required for updates)"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["path", "content", "message"]
    }

    async fn execute(&self, args: &ToolArgs) -> Result<Value, ToolError> {
        let outcome = client(&self.github)?
            .write_file(
                require_str(args, "path")?,
                require_str(args, "content")?,
                require_str(args, "message")?,
                optional_str(args, "sha"),
            )
            .await?;
        Ok(json!(outcome))
    }
}

pub struct ListFilesTool {
    github: Option<Arc<GitHubClient>>,
}

impl ListFilesTool {
    pub fn new(github: Option<Arc<GitHubClient>>) -> Self {
        Self { github }
    }
}

#[async_trait]
impl ToolHandler for ListFilesTool {
    fn name(&self) -> &'static str {
        "github_list_files"
    }

    fn description(&self) -> &'static str {
        "List the immediate children of a directory in the configured GitHub repository"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &[]
    }

    async fn execute(&self, args: &ToolArgs) -> Result<Value, ToolError> {
        let path = optional_str(args, "path").unwrap_or("");
        let entries = client(&self.github)?.list_files(path).await?;
        Ok(json!(entries))
    }
}
