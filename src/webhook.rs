// src/webhook.rs
//! GitHub push webhooks: signature check, payload model and the in-memory code-change log.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::sync::RwLock;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const EVENT_HEADER: &str = "x-github-event";
const SIGNATURE_PREFIX: &str = "sha256=";

/// Oldest entries are dropped beyond this
const MAX_LOGGED_CHANGES: usize = 1_000;

/// `sha256=` + hex(HMAC-SHA256(secret, body)), as GitHub sends it
pub fn sign(secret: &str, body: &[u8]) -> Result<String, hmac::digest::InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(body);
    Ok(format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes())))
}

/// Constant-time check of the `X-Hub-Signature-256` header against the raw body
pub fn verify_signature(secret: &str, body: &[u8], header: Option<&str>) -> bool {
    let Some(provided) = header.and_then(|h| h.strip_prefix(SIGNATURE_PREFIX)) else {
        return false;
    };
    // Exactly the lowercase hex GitHub emits
    if provided.len() != 64 || !provided.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return false;
    }
    let Ok(provided) = hex::decode(provided) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&provided).is_ok()
}

// ============================================================================
// PUSH PAYLOAD
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub commits: Vec<PushCommit>,
    #[serde(default)]
    pub repository: Option<Repository>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub full_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushCommit {
    pub id: String,
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub author: CommitAuthor,
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommitAuthor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl PushEvent {
    /// Branch name from `refs/heads/<branch>`
    pub fn branch(&self) -> &str {
        self.git_ref
            .strip_prefix("refs/heads/")
            .unwrap_or(&self.git_ref)
    }

    pub fn is_tracked_branch(&self) -> bool {
        matches!(self.branch(), "main" | "master")
    }
}

// ============================================================================
// CODE CHANGE LOG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeChange {
    pub commit_sha: String,
    pub commit_message: String,
    pub author_name: String,
    pub author_email: String,
    pub committed_at: Option<DateTime<Utc>>,
    pub repository: Option<String>,
    pub branch: String,
    pub changed_files: Vec<String>,
    pub additions: usize,
    pub deletions: usize,
    pub received_at: DateTime<Utc>,
}

impl CodeChange {
    fn from_commit(commit: &PushCommit, branch: &str, repository: Option<&str>) -> Self {
        let changed_files: Vec<String> = commit
            .added
            .iter()
            .chain(&commit.modified)
            .chain(&commit.removed)
            .cloned()
            .collect();

        Self {
            commit_sha: commit.id.clone(),
            commit_message: commit.message.clone(),
            author_name: commit
                .author
                .username
                .clone()
                .or_else(|| commit.author.name.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            author_email: commit
                .author
                .email
                .clone()
                .unwrap_or_else(|| "unknown@github.com".to_string()),
            committed_at: commit.timestamp,
            repository: repository.map(str::to_string),
            branch: branch.to_string(),
            changed_files,
            additions: commit.added.len(),
            deletions: commit.removed.len(),
            received_at: Utc::now(),
        }
    }
}

#[derive(Default)]
pub struct CodeChangeLog {
    changes: RwLock<VecDeque<CodeChange>>,
}

impl CodeChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every commit of a push; returns how many were recorded
    pub async fn record_push(&self, event: &PushEvent) -> usize {
        let repository = event.repository.as_ref().map(|r| r.full_name.as_str());
        let mut changes = self.changes.write().await;

        for commit in &event.commits {
            let change = CodeChange::from_commit(commit, event.branch(), repository);
            tracing::info!(
                commit = %change.commit_sha,
                branch = %change.branch,
                files = change.changed_files.len(),
                "📥 Recorded code change"
            );
            changes.push_back(change);
            if changes.len() > MAX_LOGGED_CHANGES {
                changes.pop_front();
            }
        }
        event.commits.len()
    }

    /// Newest first
    pub async fn recent(&self, limit: usize) -> Vec<CodeChange> {
        self.changes.read().await.iter().rev().take(limit).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.changes.read().await.len()
    }
}
