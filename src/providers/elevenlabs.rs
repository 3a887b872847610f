// Eleven Labs API Client + audio adapters
// Music generation is task based (submit, then poll); sound effects return audio bytes directly.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

use super::{PollOutcome, PollPolicy, ProviderAdapter, Submission, SubmissionHandle};
use crate::error::ProviderError;
use crate::types::{Capability, CostClass, GenerationRequest, GenerationResult};

const MUSIC_MIN_MS: u32 = 10_000;
const MUSIC_MAX_MS: u32 = 300_000;

#[derive(Clone)]
pub struct ElevenLabsClient {
    api_key: String,
    client: Client,
    base_url: String,
}

// ============================================================================
// API REQUEST/RESPONSE STRUCTURES
// ============================================================================

#[derive(Serialize, Debug)]
pub struct SoundEffectsRequest {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_influence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct MusicGenerationRequest {
    pub prompt: String,
    pub duration: u32, // milliseconds (10000-300000)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct MusicGenerationResponse {
    pub generation_id: String,
}

#[derive(Deserialize, Debug)]
pub struct MusicStatusResponse {
    pub status: String, // "pending", "completed", "failed"
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

// ============================================================================
// CLIENT
// ============================================================================

impl ElevenLabsClient {
    pub fn with_client(client: Client, api_key: String) -> Self {
        Self {
            api_key,
            client,
            base_url: "https://api.elevenlabs.io/v1".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Generate sound effects from text description
    pub async fn generate_sound_effect(
        &self,
        description: &str,
        duration_seconds: Option<f64>,
        prompt_influence: Option<f64>,
    ) -> Result<Vec<u8>, ProviderError> {
        let url = format!("{}/sound-generation", self.base_url);

        let request_body = SoundEffectsRequest {
            text: description.to_string(),
            duration_seconds,
            prompt_influence,
            model_id: Some("eleven_text_to_sound_v2".to_string()),
        };

        let response = self.client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::from_response(response).await);
        }

        let audio_bytes = response.bytes().await?;
        Ok(audio_bytes.to_vec())
    }

    /// Generate music from text prompt (Step 1: Create task)
    pub async fn generate_music_task(
        &self,
        prompt: &str,
        duration_ms: u32,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/music-generation", self.base_url);

        let request_body = MusicGenerationRequest {
            prompt: prompt.to_string(),
            duration: duration_ms,
            model_id: Some("eleven_music_v1".to_string()),
        };

        let response = self.client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::from_response(response).await);
        }

        let response_data: MusicGenerationResponse = response.json().await?;
        Ok(response_data.generation_id)
    }

    /// Check music generation status (Step 2: Poll for result)
    pub async fn get_music_status(
        &self,
        generation_id: &str,
    ) -> Result<MusicStatusResponse, ProviderError> {
        let url = format!("{}/music-generation/{}", self.base_url, generation_id);

        let response = self.client
            .get(&url)
            .header("xi-api-key", &self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::from_response(response).await);
        }

        Ok(response.json().await?)
    }
}

// ============================================================================
// ADAPTERS
// ============================================================================

pub struct ElevenLabsMusicAdapter {
    client: Option<ElevenLabsClient>,
}

impl ElevenLabsMusicAdapter {
    pub fn new(client: Option<ElevenLabsClient>) -> Self {
        Self { client }
    }

    fn client(&self) -> Result<&ElevenLabsClient, ProviderError> {
        self.client
            .as_ref()
            .ok_or_else(|| ProviderError::not_configured("elevenlabs-music", "ELEVEN_LABS_API_KEY not set"))
    }
}

/// Seconds from the request, converted to the milliseconds the music endpoint accepts
fn music_duration_ms(request: &GenerationRequest) -> u32 {
    let seconds = request.parameters.duration.unwrap_or(30.0);
    ((seconds * 1000.0).round() as u32).clamp(MUSIC_MIN_MS, MUSIC_MAX_MS)
}

#[async_trait]
impl ProviderAdapter for ElevenLabsMusicAdapter {
    fn name(&self) -> &str {
        "elevenlabs-music"
    }

    fn capability(&self) -> Capability {
        Capability::Audio
    }

    fn cost_class(&self) -> CostClass {
        CostClass::Paid
    }

    fn check_configured(&self) -> Result<(), ProviderError> {
        self.client().map(|_| ())
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<Submission, ProviderError> {
        let duration_ms = music_duration_ms(request);
        let generation_id = self.client()?.generate_music_task(&request.prompt, duration_ms).await?;
        tracing::info!(provider = %self.name(), generation_id = %generation_id, duration_ms, "Music task created");

        Ok(Submission::Pending(
            SubmissionHandle::new(self.name(), generation_id)
                .with_context(json!({ "duration": duration_ms as f64 / 1000.0 })),
        ))
    }

    async fn poll_status(&self, handle: &SubmissionHandle) -> Result<PollOutcome, ProviderError> {
        let status = self.client()?.get_music_status(&handle.external_id).await?;

        Ok(match status.status.as_str() {
            "completed" => match status.audio_url {
                Some(url) => {
                    let mut result = GenerationResult::new(url).with_format("mp3");
                    if let Some(duration) = handle.context["duration"].as_f64() {
                        result = result.with_duration(duration);
                    }
                    PollOutcome::Succeeded(result)
                }
                None => PollOutcome::Failed("music completed without audio_url".to_string()),
            },
            "failed" => PollOutcome::Failed(
                status.error.unwrap_or_else(|| "Music generation failed".to_string()),
            ),
            _ => PollOutcome::Running,
        })
    }

    fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(Duration::from_secs(2), 60)
    }
}

/// Sound effects come back as bytes, so the adapter stores them and returns the file path as the url
pub struct ElevenLabsSfxAdapter {
    client: Option<ElevenLabsClient>,
    output_dir: PathBuf,
}

impl ElevenLabsSfxAdapter {
    pub fn new(client: Option<ElevenLabsClient>, output_dir: PathBuf) -> Self {
        Self { client, output_dir }
    }
}

#[async_trait]
impl ProviderAdapter for ElevenLabsSfxAdapter {
    fn name(&self) -> &str {
        "elevenlabs-sfx"
    }

    fn capability(&self) -> Capability {
        Capability::Audio
    }

    fn cost_class(&self) -> CostClass {
        CostClass::Paid
    }

    fn check_configured(&self) -> Result<(), ProviderError> {
        match self.client {
            Some(_) => Ok(()),
            None => Err(ProviderError::not_configured(self.name(), "ELEVEN_LABS_API_KEY not set")),
        }
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<Submission, ProviderError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| ProviderError::not_configured(self.name(), "ELEVEN_LABS_API_KEY not set"))?;

        // 0.5-30 seconds
        let duration = request.parameters.duration.map(|d| d.clamp(0.5, 30.0));
        let prompt_influence = request
            .parameters
            .extra
            .get("prompt_influence")
            .and_then(|v| v.as_f64());

        let audio = client
            .generate_sound_effect(&request.prompt, duration, prompt_influence)
            .await?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| ProviderError::Failed(format!("Failed to create output directory: {}", e)))?;
        let output_path = self
            .output_dir
            .join(format!("sfx_{}.mp3", uuid::Uuid::new_v4()));
        tokio::fs::write(&output_path, &audio)
            .await
            .map_err(|e| ProviderError::Failed(format!("Failed to save sound effect: {}", e)))?;

        tracing::info!(provider = %self.name(), path = %output_path.display(), bytes = audio.len(), "Sound effect saved");

        let mut result = GenerationResult::new(output_path.to_string_lossy()).with_format("mp3");
        if let Some(duration) = duration {
            result = result.with_duration(duration);
        }
        Ok(Submission::Completed(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GenerationParams;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_music_duration_is_clamped() {
        let mut request = GenerationRequest::new(Capability::Audio, "jazz");
        request.parameters = GenerationParams {
            duration: Some(2.0),
            ..Default::default()
        };
        assert_eq!(music_duration_ms(&request), MUSIC_MIN_MS);
        request.parameters.duration = Some(900.0);
        assert_eq!(music_duration_ms(&request), MUSIC_MAX_MS);
        request.parameters.duration = None;
        assert_eq!(music_duration_ms(&request), 30_000);
    }

    #[tokio::test]
    async fn test_music_task_is_polled_to_completion() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/music-generation"))
            .and(header("xi-api-key", "el_test"))
            .and(body_partial_json(json!({ "duration": 30000 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "generation_id": "gen-1" })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/music-generation/gen-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "completed",
                "audio_url": "https://el/music.mp3"
            })))
            .mount(&server)
            .await;

        let client = ElevenLabsClient::with_client(Client::new(), "el_test".into()).with_base_url(server.uri());
        let adapter = ElevenLabsMusicAdapter::new(Some(client));

        let handle = match adapter
            .submit(&GenerationRequest::new(Capability::Audio, "calm piano"))
            .await
            .unwrap()
        {
            Submission::Pending(handle) => handle,
            other => panic!("expected pending submission, got {:?}", other),
        };

        match adapter.poll_status(&handle).await.unwrap() {
            PollOutcome::Succeeded(result) => {
                assert_eq!(result.url, "https://el/music.mp3");
                assert_eq!(result.duration, Some(30.0));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sound_effect_bytes_are_written_to_output_dir() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sound-generation"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xFB, 0x90]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = ElevenLabsClient::with_client(Client::new(), "el_test".into()).with_base_url(server.uri());
        let adapter = ElevenLabsSfxAdapter::new(Some(client), dir.path().to_path_buf());

        match adapter
            .submit(&GenerationRequest::new(Capability::Audio, "door creak"))
            .await
            .unwrap()
        {
            Submission::Completed(result) => {
                let saved = std::fs::read(&result.url).unwrap();
                assert_eq!(saved, vec![0xFF, 0xFB, 0x90]);
            }
            other => panic!("expected completed submission, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_key_disables_both_adapters() {
        assert!(ElevenLabsMusicAdapter::new(None).check_configured().is_err());
        assert!(ElevenLabsSfxAdapter::new(None, PathBuf::from("outputs"))
            .check_configured()
            .unwrap_err()
            .is_configuration());
    }
}
