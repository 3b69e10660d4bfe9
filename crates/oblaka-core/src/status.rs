//! Health, model listing and diagnostics derived from the startup pool state

use chrono::{DateTime, Utc};

use crate::pool::ClientPool;
use crate::providers::{google, openai};
use crate::types::{DebugInfo, HealthStatus, ModelInfo, ProviderKind, ServiceBanner};

pub const SERVICE_NAME: &str = "Oblaka AI";
pub const SERVICE_DESCRIPTION: &str = "AI service backed by OpenAI and Gemini";

/// Snapshot of provider availability taken once at startup; nothing here
/// re-probes a provider.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    openai_model: String,
    gemini_model: String,
    openai_available: bool,
    gemini_available: bool,
    openai_key_set: bool,
    openai_key2_set: bool,
    gemini_key_set: bool,
    gemini_key2_set: bool,
    started_at: DateTime<Utc>,
}

impl StatusReporter {
    pub fn from_pool(pool: &ClientPool) -> Self {
        let openai = pool.slot(ProviderKind::OpenAi);
        let gemini = pool.slot(ProviderKind::Gemini);

        Self {
            openai_model: openai.backend().model().to_string(),
            gemini_model: gemini.backend().model().to_string(),
            openai_available: openai.credentials().is_available(),
            gemini_available: gemini.credentials().is_available(),
            openai_key_set: openai.credentials().primary_configured(),
            openai_key2_set: openai.credentials().backup_configured(),
            gemini_key_set: gemini.credentials().primary_configured(),
            gemini_key2_set: gemini.credentials().backup_configured(),
            started_at: Utc::now(),
        }
    }

    pub fn banner(&self) -> ServiceBanner {
        ServiceBanner {
            message: format!("Welcome to {}!", SERVICE_NAME),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: SERVICE_DESCRIPTION.to_string(),
            status: "running".to_string(),
        }
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "ok".to_string(),
            openai_available: self.openai_available,
            gemini_available: self.gemini_available,
        }
    }

    /// Usable providers only, OpenAI first
    pub fn list_models(&self) -> Vec<ModelInfo> {
        let mut models = Vec::new();
        if self.openai_available {
            models.push(ModelInfo {
                id: ProviderKind::OpenAi.id().to_string(),
                name: openai::display_name(&self.openai_model),
                description: "Powerful language model from OpenAI".to_string(),
                available: true,
            });
        }
        if self.gemini_available {
            models.push(ModelInfo {
                id: ProviderKind::Gemini.id().to_string(),
                name: google::display_name(&self.gemini_model),
                description: "Modern model from Google".to_string(),
                available: true,
            });
        }
        models
    }

    pub fn debug_info(&self) -> DebugInfo {
        DebugInfo {
            openai_key_set: self.openai_key_set,
            openai_key2_set: self.openai_key2_set,
            gemini_key_set: self.gemini_key_set,
            gemini_key2_set: self.gemini_key2_set,
            openai_client_initialized: self.openai_available,
            gemini_initialized: self.gemini_available,
            gemini_model: self.gemini_model.clone(),
            started_at: self.started_at,
        }
    }
}
