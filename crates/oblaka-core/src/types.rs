//! Wire-level request and response types shared by the dispatcher and the gateway

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Incoming chat request.
///
/// `model` stays a raw string so that an unknown provider id is reported by
/// the dispatcher as an unsupported provider instead of a body decoding error.
/// `max_tokens` and `temperature` are wider than what a provider accepts so
/// that oversized values reach the normalizer and get clamped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub max_tokens: Option<i64>,
    #[serde(default)]
    pub temperature: Option<f64>,
}

fn default_model() -> String {
    ProviderKind::Gemini.id().to_string()
}

/// Normalized reply returned for every successful chat request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub model_used: String,
    pub tokens_used: Option<u32>,
}

/// The two upstream providers, in listing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::OpenAi, ProviderKind::Gemini];

    /// Identifier used on the wire (`model` field of a chat request)
    pub fn id(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }

    /// Largest `max_tokens` value forwarded to this provider
    pub fn max_tokens_ceiling(&self) -> u32 {
        match self {
            Self::OpenAi => 4000,
            Self::Gemini => 8000,
        }
    }

    pub fn parse(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.id() == id)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi => write!(f, "OpenAI"),
            Self::Gemini => write!(f, "Gemini"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub openai_available: bool,
    pub gemini_available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    pub models: Vec<ModelInfo>,
}

/// Configuration presence flags for operational diagnosis. Never carries secrets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugInfo {
    pub openai_key_set: bool,
    pub openai_key2_set: bool,
    pub gemini_key_set: bool,
    pub gemini_key2_set: bool,
    pub openai_client_initialized: bool,
    pub gemini_initialized: bool,
    pub gemini_model: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceBanner {
    pub message: String,
    pub version: String,
    pub description: String,
    pub status: String,
}
