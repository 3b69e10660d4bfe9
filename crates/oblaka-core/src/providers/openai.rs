//! OpenAI chat completions provider (Provider A)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ChatError, ChatResult};
use crate::normalize::GenerationParams;
use crate::pool::{ProviderCredentials, ProviderKeys};
use crate::types::ProviderKind;

use super::failover::{Accepted, generate_with_backup};
use super::types::{Completion, CompletionBackend, Credential, Generation, ProviderAdapter};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_SYSTEM_PROMPT: &str = "Ты полезный AI-ассистент. Отвечай на русском языке.";

/// Startup settings for the OpenAI provider
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub keys: ProviderKeys,
    pub base_url: String,
    pub model: String,
    pub system_prompt: String,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            keys: ProviderKeys::default(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// Display name for an OpenAI model id
pub fn display_name(model: &str) -> String {
    match model {
        "gpt-3.5-turbo" => "OpenAI GPT-3.5".to_string(),
        other => format!("OpenAI {}", other),
    }
}

/// HTTP client for `/v1/chat/completions`
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    model: String,
    system_prompt: String,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiClient {
    pub fn new(settings: &OpenAiSettings, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            system_prompt: settings.system_prompt.clone(),
        })
    }

    fn to_openai_messages(&self, message: &str) -> Vec<OpenAiMessage> {
        vec![
            OpenAiMessage {
                role: "system".to_string(),
                content: self.system_prompt.clone(),
            },
            OpenAiMessage {
                role: "user".to_string(),
                content: message.to_string(),
            },
        ]
    }

    fn from_openai_response(resp: OpenAiApiResponse) -> Result<Completion> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("OpenAI response had no choices"))?;

        Ok(Completion {
            text: choice.message.content,
            tokens_used: resp.usage.map(|u| u.total_tokens),
        })
    }
}

#[async_trait]
impl CompletionBackend for OpenAiClient {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        credential: &Credential,
        message: &str,
        params: GenerationParams,
    ) -> Result<Completion> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = OpenAiRequest {
            model: &self.model,
            messages: self.to_openai_messages(message),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(credential.expose())
            .json(&body)
            .send()
            .await
            .context("Failed to send request to OpenAI API")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "OpenAI API request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let api_response: OpenAiApiResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI API response")?;

        debug!(
            "OpenAI response: choices={}, finish_reason={:?}",
            api_response.choices.len(),
            api_response.choices.first().and_then(|c| c.finish_reason.as_deref())
        );

        Self::from_openai_response(api_response)
    }
}

/// Provider A adapter: fixed system instruction, primary/backup failover,
/// token usage passed through when the API reports it.
pub struct OpenAiAdapter {
    backend: Arc<dyn CompletionBackend>,
    credentials: ProviderCredentials,
}

impl OpenAiAdapter {
    pub fn new(backend: Arc<dyn CompletionBackend>, credentials: ProviderCredentials) -> Self {
        Self {
            backend,
            credentials,
        }
    }
}

fn accept_completion(completion: Completion) -> ChatResult<Accepted> {
    match completion.text {
        Some(text) => Ok((text, completion.tokens_used)),
        None => Err(ChatError::EmptyResponse(ProviderKind::OpenAi)),
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn model_label(&self) -> String {
        display_name(self.backend.model())
    }

    async fn generate(&self, message: &str, params: GenerationParams) -> ChatResult<Generation> {
        generate_with_backup(
            ProviderKind::OpenAi,
            self.backend.as_ref(),
            &self.credentials,
            &self.model_label(),
            message,
            params,
            accept_completion,
        )
        .await
    }
}

// ── OpenAI wire types ──

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiApiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiUsage {
    total_tokens: u32,
}
