// src/providers/mod.rs
//! Provider adapters: translators between capability-neutral requests/results and one
//! external generation service each. Adapters never retry; the orchestrator owns fallback.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::types::{Capability, CostClass, GenerationRequest, GenerationResult, PriorityMode};

pub mod elevenlabs;
pub mod openai_images;
pub mod poller;
pub mod replicate;
pub mod runway;

pub use poller::PollPolicy;

/// Opaque token for an in-flight external job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionHandle {
    pub provider: String,
    pub external_id: String,
    /// Request-derived values the adapter needs to build the final result (duration, size...)
    #[serde(default)]
    pub context: serde_json::Value,
}

impl SubmissionHandle {
    pub fn new(provider: &str, external_id: impl Into<String>) -> Self {
        Self {
            provider: provider.to_string(),
            external_id: external_id.into(),
            context: serde_json::Value::Null,
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}

/// What `submit` produced: a finished result (synchronous provider) or a handle to poll
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Completed(GenerationResult),
    Pending(SubmissionHandle),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Running,
    Succeeded(GenerationResult),
    /// Terminal failure reported by the provider, with its detail
    Failed(String),
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Unique per capability
    fn name(&self) -> &str;

    fn capability(&self) -> Capability;

    fn cost_class(&self) -> CostClass;

    /// `Err(ProviderError::Configuration)` when a credential is missing
    fn check_configured(&self) -> Result<(), ProviderError>;

    async fn submit(&self, request: &GenerationRequest) -> Result<Submission, ProviderError>;

    /// Only asynchronous providers override this
    async fn poll_status(&self, handle: &SubmissionHandle) -> Result<PollOutcome, ProviderError> {
        Err(ProviderError::Failed(format!(
            "{} is synchronous and cannot poll {}",
            self.name(),
            handle.external_id
        )))
    }

    fn poll_policy(&self) -> PollPolicy {
        PollPolicy::default()
    }
}

/// All adapters known to the process plus the fixed chain per (capability, priority mode)
#[derive(Default)]
pub struct ProviderRegistry {
    adapters: HashMap<(Capability, String), Arc<dyn ProviderAdapter>>,
    chains: HashMap<(Capability, PriorityMode), Vec<String>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        let key = (adapter.capability(), adapter.name().to_string());
        if let Err(e) = adapter.check_configured() {
            tracing::warn!(
                provider = %adapter.name(),
                capability = %adapter.capability(),
                "Provider disabled: {}",
                e
            );
        } else {
            tracing::info!(
                provider = %adapter.name(),
                capability = %adapter.capability(),
                "Provider registered"
            );
        }
        self.adapters.insert(key, adapter);
    }

    pub fn set_chain(&mut self, capability: Capability, mode: PriorityMode, names: &[&str]) {
        self.chains
            .insert((capability, mode), names.iter().map(|n| n.to_string()).collect());
    }

    /// Adapters in priority order. Names in the chain without a registered adapter are skipped.
    pub fn chain(&self, capability: Capability, mode: PriorityMode) -> Vec<Arc<dyn ProviderAdapter>> {
        self.chains
            .get(&(capability, mode))
            .map(|names| {
                names
                    .iter()
                    .filter_map(|name| self.adapters.get(&(capability, name.clone())).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get(&self, capability: Capability, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&(capability, name.to_string())).cloned()
    }

    /// Names of adapters for `capability` that are configured, sorted
    pub fn available(&self, capability: Capability) -> Vec<String> {
        let mut names: Vec<String> = self
            .adapters
            .iter()
            .filter(|((cap, _), adapter)| *cap == capability && adapter.check_configured().is_ok())
            .map(|((_, name), _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// The production adapter set and chains
    pub fn with_defaults(
        client: reqwest::Client,
        config: &crate::config::AppConfig,
    ) -> Self {
        use elevenlabs::{ElevenLabsClient, ElevenLabsMusicAdapter, ElevenLabsSfxAdapter};
        use openai_images::DalleAdapter;
        use replicate::{ReplicateAdapter, ReplicateModel};
        use runway::RunwayAdapter;

        let mut registry = Self::new();
        let replicate_key = config.replicate_api_key.clone();

        registry.register(Arc::new(RunwayAdapter::new(client.clone(), config.runway_api_key.clone())));
        for model in [
            ReplicateModel::VideoDiffusion,
            ReplicateModel::FluxSchnell,
            ReplicateModel::Sdxl,
            ReplicateModel::Playground,
            ReplicateModel::MusicGen,
        ] {
            registry.register(Arc::new(ReplicateAdapter::new(client.clone(), replicate_key.clone(), model)));
        }
        registry.register(Arc::new(DalleAdapter::new(client.clone(), config.openai_api_key.clone())));

        let elevenlabs = config
            .elevenlabs_api_key
            .clone()
            .map(|key| ElevenLabsClient::with_client(client.clone(), key));
        registry.register(Arc::new(ElevenLabsMusicAdapter::new(elevenlabs.clone())));
        registry.register(Arc::new(ElevenLabsSfxAdapter::new(
            elevenlabs,
            config.output_dir.clone(),
        )));

        registry.set_chain(Capability::Video, PriorityMode::QualityFirst, &["runway", "replicate-video"]);
        registry.set_chain(Capability::Video, PriorityMode::SpeedFirst, &["replicate-video", "runway"]);
        registry.set_chain(
            Capability::Image,
            PriorityMode::QualityFirst,
            &["flux", "sdxl", "playground", "dalle3"],
        );
        registry.set_chain(
            Capability::Image,
            PriorityMode::SpeedFirst,
            &["flux", "dalle3", "sdxl", "playground"],
        );
        registry.set_chain(
            Capability::Audio,
            PriorityMode::QualityFirst,
            &["elevenlabs-music", "musicgen", "elevenlabs-sfx"],
        );
        registry.set_chain(
            Capability::Audio,
            PriorityMode::SpeedFirst,
            &["elevenlabs-sfx", "musicgen", "elevenlabs-music"],
        );

        registry
    }
}
