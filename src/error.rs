// error.rs - Error taxonomy for generation requests, provider calls and the HTTP layer
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

use crate::jobs::JobStoreError;
use crate::types::Capability;

/// Malformed or incomplete caller input. Never retried.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Validation error: {message}")]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors raised by a single provider adapter call
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Missing credential or configuration. The adapter is unusable for the process lifetime.
    #[error("{provider} is not configured: {reason}")]
    Configuration { provider: String, reason: String },
    #[error("Request error: {0}")]
    Request(String),
    #[error("API error ({status}): {body}")]
    Http { status: u16, body: String },
    /// The external job reached a terminal failure state
    #[error("Generation failed: {0}")]
    Failed(String),
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl ProviderError {
    pub fn not_configured(provider: &str, reason: impl Into<String>) -> Self {
        ProviderError::Configuration {
            provider: provider.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, ProviderError::Configuration { .. })
    }

    /// Turn a non-success response into an `Http` error, keeping the body for the attempt log
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        ProviderError::Http { status, body }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Request(err.to_string())
        }
    }
}

/// Outcome of the async completion poller when it does not succeed
#[derive(Error, Debug, Clone)]
pub enum PollError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("timed out after {attempts} polls")]
    Timeout { attempts: u32 },
}

/// One failed adapter attempt, in the order it was tried
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptFailure {
    pub provider: String,
    pub reason: String,
    pub timed_out: bool,
}

/// Terminal outcome of a fallback chain that did not produce a result
#[derive(Error, Debug, Clone)]
pub enum GenerationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Every adapter in the chain is disabled by configuration; nothing was attempted
    #[error("no {capability} provider is available")]
    NoProviderAvailable { capability: Capability },
    #[error("all {capability} providers failed: {}", summarize(.failures))]
    Exhausted {
        capability: Capability,
        failures: Vec<AttemptFailure>,
    },
    /// The job record could not be read or moved; no further adapters are tried
    #[error("job store error: {0}")]
    Store(String),
}

impl GenerationError {
    /// True when the chain ended because the last adapter's poller ran out of attempts
    pub fn is_timeout(&self) -> bool {
        match self {
            GenerationError::Exhausted { failures, .. } => {
                failures.last().map(|f| f.timed_out).unwrap_or(false)
            }
            _ => false,
        }
    }
}

/// HTTP-facing error. Renders as `{"success": false, "error": "..."}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("API error: {}", self);
        }
        (
            status,
            Json(json!({
                "success": false,
                "error": self.to_string(),
            })),
        )
            .into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.message)
    }
}

/// Malformed JSON bodies get the same `{success:false, error}` shape as every other failure
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<JobStoreError> for ApiError {
    fn from(err: JobStoreError) -> Self {
        match err {
            JobStoreError::NotFound(_) => ApiError::NotFound(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

fn summarize(failures: &[AttemptFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.provider, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_lists_failures_in_attempt_order() {
        let err = GenerationError::Exhausted {
            capability: Capability::Video,
            failures: vec![
                AttemptFailure {
                    provider: "runway".into(),
                    reason: "Request error: network".into(),
                    timed_out: false,
                },
                AttemptFailure {
                    provider: "replicate-video".into(),
                    reason: "Generation failed: nsfw".into(),
                    timed_out: false,
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "all video providers failed: runway: Request error: network; replicate-video: Generation failed: nsfw"
        );
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(ApiError::from(ValidationError::new("prompt is required")).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(JobStoreError::NotFound("j1".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(JobStoreError::Database("down".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_configuration_errors_are_distinguishable() {
        let err = ProviderError::not_configured("runway", "RUNWAY_API_KEY not set");
        assert!(err.is_configuration());
        assert!(!ProviderError::Failed("x".into()).is_configuration());
    }
}
