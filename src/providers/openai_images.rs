// OpenAI image generation (DALL-E 3). Synchronous: the response already carries the URL.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ProviderAdapter, Submission};
use crate::error::ProviderError;
use crate::types::{Capability, CostClass, GenerationRequest, GenerationResult};

const NAME: &str = "dalle3";
const COST_PER_IMAGE: f64 = 0.04;

#[derive(Serialize, Debug)]
pub struct ImageGenerationRequest {
    pub model: String,
    pub prompt: String,
    pub n: u32,
    pub size: String,
    pub quality: String,
}

#[derive(Deserialize, Debug)]
pub struct ImageGenerationResponse {
    pub data: Vec<GeneratedImage>,
}

#[derive(Deserialize, Debug)]
pub struct GeneratedImage {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub revised_prompt: Option<String>,
}

pub struct DalleAdapter {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl DalleAdapter {
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ProviderAdapter for DalleAdapter {
    fn name(&self) -> &str {
        NAME
    }

    fn capability(&self) -> Capability {
        Capability::Image
    }

    fn cost_class(&self) -> CostClass {
        CostClass::Paid
    }

    fn check_configured(&self) -> Result<(), ProviderError> {
        match self.api_key {
            Some(_) => Ok(()),
            None => Err(ProviderError::not_configured(NAME, "OPENAI_API_KEY not set")),
        }
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<Submission, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::not_configured(NAME, "OPENAI_API_KEY not set"))?;

        let body = ImageGenerationRequest {
            model: "dall-e-3".to_string(),
            prompt: request.prompt.clone(),
            n: 1,
            size: "1024x1024".to_string(),
            quality: "hd".to_string(),
        };

        let response = self
            .client
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::from_response(response).await);
        }

        let data: ImageGenerationResponse = response.json().await?;
        let image = data
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Decode("no image in response".to_string()))?;
        if let Some(revised) = &image.revised_prompt {
            tracing::debug!(provider = NAME, "Prompt revised by provider: {}", revised);
        }
        let url = image
            .url
            .ok_or_else(|| ProviderError::Decode("image has no url".to_string()))?;

        Ok(Submission::Completed(
            GenerationResult::new(url)
                .with_resolution(1024, 1024)
                .with_format("png")
                .with_cost(COST_PER_IMAGE),
        ))
    }
}
