// types.rs - Capability-neutral request/result structures shared by adapters, orchestrator and jobs
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

/// Category of generation work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Image,
    Audio,
    Video,
}

impl Capability {
    pub const ALL: [Capability; 3] = [Capability::Image, Capability::Audio, Capability::Video];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Image => "image",
            Capability::Audio => "audio",
            Capability::Video => "video",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "image" => Some(Capability::Image),
            "audio" => Some(Capability::Audio),
            "video" => Some(Capability::Video),
            _ => None,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which fixed adapter ordering to use for a capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PriorityMode {
    #[default]
    #[serde(alias = "quality")]
    QualityFirst,
    #[serde(alias = "speed")]
    SpeedFirst,
}

impl PriorityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityMode::QualityFirst => "quality-first",
            PriorityMode::SpeedFirst => "speed-first",
        }
    }
}

/// Rough pricing bucket for an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostClass {
    /// Free tier or monthly credits
    Free,
    Paid,
}

/// Open parameter bag. Well-known keys are typed, anything else is kept in `extra`
/// so adapters for newer services can still read it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_image: Option<String>,
    /// Priority hint ("quality" | "speed"), used when the caller gives no explicit mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<PriorityMode>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A declarative generation request. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub capability: Capability,
    pub prompt: String,
    #[serde(default)]
    pub parameters: GenerationParams,
}

impl GenerationRequest {
    pub fn new(capability: Capability, prompt: impl Into<String>) -> Self {
        Self {
            capability,
            prompt: prompt.into(),
            parameters: GenerationParams::default(),
        }
    }

    pub fn with_parameters(mut self, parameters: GenerationParams) -> Self {
        self.parameters = parameters;
        self
    }

    /// Pure input validation, run before a job is created
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.prompt.trim().is_empty() {
            return Err(ValidationError::new("prompt is required"));
        }
        if let Some(duration) = self.parameters.duration {
            if !duration.is_finite() || duration <= 0.0 {
                return Err(ValidationError::new("duration must be a positive number"));
            }
        }
        if matches!(self.parameters.width, Some(0)) || matches!(self.parameters.height, Some(0)) {
            return Err(ValidationError::new("dimensions must be non-zero"));
        }
        Ok(())
    }

    /// Seconds a caller should wait before the first status query
    pub fn estimated_time_secs(&self) -> u64 {
        match self.capability {
            Capability::Video => 60,
            Capability::Image => 15,
            Capability::Audio => {
                let duration = self.parameters.duration.unwrap_or(30.0);
                (duration / 2.0).ceil() as u64
            }
        }
    }
}

/// Provider-agnostic generation output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default)]
    pub cost: f64,
}

impl GenerationResult {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            duration: None,
            resolution: None,
            format: None,
            cost: 0.0,
        }
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = Some(format!("{}x{}", width, height));
        self
    }

    pub fn with_format(mut self, format: &str) -> Self {
        self.format = Some(format.to_string());
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }
}
