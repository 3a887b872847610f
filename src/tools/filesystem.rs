// src/tools/filesystem.rs
//! Local file tools scoped to a root directory. Relative paths resolve against the root;
//! absolute paths are accepted only when they land inside it. Symlinks are followed before
//! the containment check.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use super::{require_str, ToolArgs, ToolError, ToolHandler};

#[derive(Debug, Clone)]
pub struct SandboxRoot {
    root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FsEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub path: String,
}

impl SandboxRoot {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Map a caller path to a real path under the root
    pub async fn resolve(&self, requested: &str) -> Result<PathBuf, ToolError> {
        let root = tokio::fs::canonicalize(&self.root).await?;

        let candidate = if Path::new(requested).is_absolute() {
            PathBuf::from(requested)
        } else {
            root.join(requested)
        };
        let normalized = normalize(&candidate);

        // Canonicalize the deepest existing ancestor, then re-append the missing tail.
        // `symlink_metadata` does not follow links, so a dangling link is found here
        // instead of being treated as a missing name.
        let mut existing = normalized.clone();
        let mut tail: Vec<std::ffi::OsString> = Vec::new();
        loop {
            match tokio::fs::symlink_metadata(&existing).await {
                Ok(meta) => {
                    if meta.file_type().is_symlink() && !tokio::fs::try_exists(&existing).await.unwrap_or(false) {
                        tracing::warn!(path = %requested, link = %existing.display(), "🚫 Dangling symlink rejected");
                        return Err(ToolError::PathEscapesRoot(requested.to_string()));
                    }
                    break;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    match (existing.file_name(), existing.parent()) {
                        (Some(name), Some(parent)) => {
                            tail.push(name.to_os_string());
                            existing = parent.to_path_buf();
                        }
                        _ => break,
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        let mut resolved = tokio::fs::canonicalize(&existing).await?;
        for part in tail.into_iter().rev() {
            resolved.push(part);
        }

        if !resolved.starts_with(&root) {
            tracing::warn!(path = %requested, root = %root.display(), "🚫 Path outside filesystem root rejected");
            return Err(ToolError::PathEscapesRoot(requested.to_string()));
        }
        Ok(resolved)
    }
}

/// Lexically remove `.` and `..` components
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

pub struct FileReadTool {
    root: SandboxRoot,
}

impl FileReadTool {
    pub fn new(root: SandboxRoot) -> Self {
        Self { root }
    }
}

#[async_trait]
impl ToolHandler for FileReadTool {
    fn name(&self) -> &'static str {
        "file_read"
    }

    fn description(&self) -> &'static str {
        "Read a UTF-8 text file under the filesystem root"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["path"]
    }

    async fn execute(&self, args: &ToolArgs) -> Result<Value, ToolError> {
        let path = require_str(args, "path")?;
        let resolved = self.root.resolve(path).await?;
        let content = tokio::fs::read_to_string(&resolved).await?;
        Ok(json!({ "path": path, "content": content }))
    }
}

pub struct FileWriteTool {
    root: SandboxRoot,
}

impl FileWriteTool {
    pub fn new(root: SandboxRoot) -> Self {
        Self { root }
    }
}

#[async_trait]
impl ToolHandler for FileWriteTool {
    fn name(&self) -> &'static str {
        "file_write"
    }

    fn description(&self) -> &'static str {
        "Write a text file under the filesystem root, creating parent directories"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["path", "content"]
    }

    async fn execute(&self, args: &ToolArgs) -> Result<Value, ToolError> {
        let path = require_str(args, "path")?;
        let content = require_str(args, "content")?;
        let resolved = self.root.resolve(path).await?;

        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&resolved, content).await?;
        tracing::info!(path = %path, bytes = content.len(), "📝 File written");

        Ok(json!({ "path": path, "bytes_written": content.len() }))
    }
}

pub struct FileListTool {
    root: SandboxRoot,
}

impl FileListTool {
    pub fn new(root: SandboxRoot) -> Self {
        Self { root }
    }
}

#[async_trait]
impl ToolHandler for FileListTool {
    fn name(&self) -> &'static str {
        "file_list"
    }

    fn description(&self) -> &'static str {
        "List the entries of a directory under the filesystem root"
    }

    fn required_args(&self) -> &'static [&'static str] {
        &["path"]
    }

    async fn execute(&self, args: &ToolArgs) -> Result<Value, ToolError> {
        let path = require_str(args, "path")?;
        let resolved = self.root.resolve(path).await?;

        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&resolved).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let kind = if entry.file_type().await?.is_dir() {
                "directory"
            } else {
                "file"
            };
            entries.push(FsEntry {
                path: Path::new(path).join(&name).to_string_lossy().into_owned(),
                name,
                kind,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(json!(entries))
    }
}
