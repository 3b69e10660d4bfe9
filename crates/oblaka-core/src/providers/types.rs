//! Provider-agnostic types for the two upstream LLM services

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::header::HeaderValue;

use crate::error::ChatResult;
use crate::normalize::GenerationParams;

/// An API key for one provider.
///
/// Credentials are immutable and handed to each call explicitly, so a
/// failover on one request never changes which key another request uses.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Validate a raw key. Blank keys and keys that cannot be sent as an
    /// HTTP header value are rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        let key = raw.trim();
        if key.is_empty() {
            return Err(anyhow!("API key is empty"));
        }
        HeaderValue::from_str(key).map_err(|_| anyhow!("API key contains invalid characters"))?;
        Ok(Self(key.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential({})", mask_secret(&self.0))
    }
}

/// Mask a secret for Debug output and logs: first 3 and last 4 chars of
/// keys longer than 7 chars, otherwise `***`.
pub fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

/// Raw result of one upstream call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: Option<String>,
    pub tokens_used: Option<u32>,
}

/// A single upstream HTTP API. Implementations perform exactly one call per
/// `complete` and never retry.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Human-readable provider name (e.g. "openai", "google")
    fn provider_name(&self) -> &str;

    /// Model identifier sent upstream
    fn model(&self) -> &str;

    async fn complete(
        &self,
        credential: &Credential,
        message: &str,
        params: GenerationParams,
    ) -> Result<Completion>;
}

/// Which credential an attempt used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Primary,
    Backup,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Backup => write!(f, "backup"),
        }
    }
}

/// Normalized output of an adapter
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub model_used: String,
    pub tokens_used: Option<u32>,
}

/// Translates a normalized request into one provider's call shape and
/// classifies its failures.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Display name reported as `model_used` (without the backup suffix)
    fn model_label(&self) -> String;

    async fn generate(&self, message: &str, params: GenerationParams) -> ChatResult<Generation>;
}

/// Label a result produced by the backup credential
pub fn backup_label(label: &str) -> String {
    format!("{} (backup)", label)
}
