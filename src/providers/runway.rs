// Runway Gen-3 text-to-video adapter (asynchronous, task based)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use super::{PollOutcome, PollPolicy, ProviderAdapter, Submission, SubmissionHandle};
use crate::error::ProviderError;
use crate::types::{Capability, CostClass, GenerationRequest, GenerationResult};

const NAME: &str = "runway";

#[derive(Serialize, Debug)]
pub struct TextToVideoRequest {
    pub text_prompt: String,
    pub duration: f64,
    pub aspect_ratio: String,
    pub style: String,
}

#[derive(Deserialize, Debug)]
pub struct TaskCreated {
    pub id: String,
}

#[derive(Deserialize, Debug)]
pub struct TaskStatus {
    pub status: String, // "PENDING", "RUNNING", "COMPLETED", "FAILED"
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub failure: Option<String>,
    #[serde(default)]
    pub credits_remaining: Option<i64>,
}

pub struct RunwayAdapter {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl RunwayAdapter {
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: "https://api.runwayml.com/v1".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::not_configured(NAME, "RUNWAY_API_KEY not set"))
    }
}

#[async_trait]
impl ProviderAdapter for RunwayAdapter {
    fn name(&self) -> &str {
        NAME
    }

    fn capability(&self) -> Capability {
        Capability::Video
    }

    fn cost_class(&self) -> CostClass {
        CostClass::Free
    }

    fn check_configured(&self) -> Result<(), ProviderError> {
        self.api_key().map(|_| ())
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<Submission, ProviderError> {
        let api_key = self.api_key()?;
        let p = &request.parameters;

        let body = TextToVideoRequest {
            text_prompt: request.prompt.clone(),
            duration: p.duration.unwrap_or(5.0),
            aspect_ratio: p.aspect_ratio.clone().unwrap_or_else(|| "16:9".to_string()),
            style: p.style.clone().unwrap_or_else(|| "realistic".to_string()),
        };

        let response = self
            .client
            .post(format!("{}/gen3/text_to_video", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::from_response(response).await);
        }

        let task: TaskCreated = response.json().await?;
        tracing::info!(provider = NAME, task_id = %task.id, "Runway task created");

        Ok(Submission::Pending(
            SubmissionHandle::new(NAME, task.id).with_context(json!({ "duration": body.duration })),
        ))
    }

    async fn poll_status(&self, handle: &SubmissionHandle) -> Result<PollOutcome, ProviderError> {
        let response = self
            .client
            .get(format!("{}/tasks/{}", self.base_url, handle.external_id))
            .bearer_auth(self.api_key()?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::from_response(response).await);
        }

        let task: TaskStatus = response.json().await?;
        Ok(match task.status.as_str() {
            "COMPLETED" => match task.video_url {
                Some(url) => {
                    if let Some(credits) = task.credits_remaining {
                        tracing::debug!(provider = NAME, credits_remaining = credits, "Runway credits");
                    }
                    PollOutcome::Succeeded(
                        GenerationResult::new(url)
                            .with_duration(handle.context["duration"].as_f64().unwrap_or(5.0))
                            .with_resolution(1280, 768)
                            .with_format("mp4"),
                    )
                }
                None => PollOutcome::Failed("task completed without a video_url".to_string()),
            },
            "FAILED" => PollOutcome::Failed(
                task.failure
                    .unwrap_or_else(|| "Video generation failed".to_string()),
            ),
            _ => PollOutcome::Running,
        })
    }

    fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(Duration::from_secs(3), 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_defaults_are_applied_and_completion_is_mapped() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/gen3/text_to_video"))
            .and(header("Authorization", "Bearer rw_test"))
            .and(body_partial_json(json!({
                "duration": 5.0,
                "aspect_ratio": "16:9",
                "style": "realistic"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "task-9" })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/tasks/task-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "COMPLETED",
                "video_url": "https://runway/out.mp4",
                "credits_remaining": 120
            })))
            .mount(&server)
            .await;

        let adapter = RunwayAdapter::new(Client::new(), Some("rw_test".into())).with_base_url(server.uri());
        let handle = match adapter
            .submit(&GenerationRequest::new(Capability::Video, "city at night"))
            .await
            .unwrap()
        {
            Submission::Pending(handle) => handle,
            other => panic!("expected pending submission, got {:?}", other),
        };

        match adapter.poll_status(&handle).await.unwrap() {
            PollOutcome::Succeeded(result) => {
                assert_eq!(result.url, "https://runway/out.mp4");
                assert_eq!(result.duration, Some(5.0));
                assert_eq!(result.resolution.as_deref(), Some("1280x768"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_running_task_keeps_polling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tasks/task-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "RUNNING" })))
            .mount(&server)
            .await;

        let adapter = RunwayAdapter::new(Client::new(), Some("rw_test".into())).with_base_url(server.uri());
        let outcome = adapter
            .poll_status(&SubmissionHandle::new(NAME, "task-1"))
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Running);
    }
}
