// src/config.rs
//! Process configuration read from the environment (after `.env` is loaded by `dotenvy`).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_url: Option<String>,
    pub replicate_api_key: Option<String>,
    pub runway_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub elevenlabs_api_key: Option<String>,
    pub github: GitHubConfig,
    pub webhook_secret: Option<String>,
    pub sandbox_workdir: PathBuf,
    pub sandbox_timeout: Duration,
    pub filesystem_root: PathBuf,
    pub provider_max_concurrency: usize,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct GitHubConfig {
    pub token: Option<String>,
    pub owner: Option<String>,
    pub repo: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            database_url: non_empty("DATABASE_URL"),
            replicate_api_key: non_empty("REPLICATE_API_KEY"),
            runway_api_key: non_empty("RUNWAY_API_KEY"),
            openai_api_key: non_empty("OPENAI_API_KEY"),
            elevenlabs_api_key: non_empty("ELEVEN_LABS_API_KEY"),
            github: GitHubConfig {
                token: non_empty("GITHUB_TOKEN"),
                owner: non_empty("GITHUB_REPO_OWNER"),
                repo: non_empty("GITHUB_REPO_NAME"),
            },
            webhook_secret: non_empty("GITHUB_WEBHOOK_SECRET"),
            sandbox_workdir: non_empty("SANDBOX_WORKDIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| cwd.clone()),
            sandbox_timeout: Duration::from_secs(parse_or("SANDBOX_TIMEOUT_SECS", 30)),
            filesystem_root: non_empty("FILESYSTEM_ROOT")
                .map(PathBuf::from)
                .unwrap_or(cwd),
            provider_max_concurrency: parse_or("PROVIDER_MAX_CONCURRENCY", 4).max(1) as usize,
            output_dir: non_empty("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("outputs")),
        }
    }

    /// Log which integrations are enabled, without leaking secrets
    pub fn log_summary(&self) {
        let flag = |configured: bool| if configured { "✅" } else { "❌" };
        tracing::info!(
            "Configuration - Database: {}, Replicate: {}, Runway: {}, OpenAI: {}, ElevenLabs: {}, GitHub: {}, Webhook secret: {}",
            flag(self.database_url.is_some()),
            flag(self.replicate_api_key.is_some()),
            flag(self.runway_api_key.is_some()),
            flag(self.openai_api_key.is_some()),
            flag(self.elevenlabs_api_key.is_some()),
            flag(self.github.token.is_some()),
            flag(self.webhook_secret.is_some()),
        );
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or(key: &str, default: u64) -> u64 {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid value for {}: {:?}, using {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
