//! Google Gemini provider (Provider B)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ChatError, ChatResult};
use crate::normalize::GenerationParams;
use crate::pool::{ProviderCredentials, ProviderKeys};
use crate::types::ProviderKind;

use super::failover::{Accepted, generate_with_backup};
use super::types::{Completion, CompletionBackend, Credential, Generation, ProviderAdapter};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash-latest";

/// Startup settings for the Gemini provider
#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub keys: ProviderKeys,
    pub base_url: String,
    pub model: String,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            keys: ProviderKeys::default(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
        }
    }
}

pub fn display_name(model: &str) -> String {
    format!("Google {}", model)
}

/// HTTP client for `models/{model}:generateContent`
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiClient {
    pub fn new(settings: &GeminiSettings, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
        })
    }

    fn build_request(message: &str, params: GenerationParams) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart {
                    text: Some(message.to_string()),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                max_output_tokens: params.max_tokens,
                temperature: params.temperature,
            },
        }
    }

    /// Concatenate the text parts of the first candidate. A reply without
    /// candidates (e.g. a blocked prompt) yields no text.
    fn from_gemini_response(resp: GeminiApiResponse) -> Completion {
        let text = resp
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<String>()
            });

        Completion {
            text,
            tokens_used: None,
        }
    }
}

#[async_trait]
impl CompletionBackend for GeminiClient {
    fn provider_name(&self) -> &str {
        "google"
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
        // Key travels in a header so it never ends up in URLs or error messages
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = Self::build_request(message, params);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", credential.expose())
            .json(&body)
            .send()
            .await
            .context("Failed to send request to Gemini API")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "Gemini API request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let api_response: GeminiApiResponse = response
            .json()
            .await
            .context("Failed to parse Gemini API response")?;

        debug!(
            "Gemini response: candidates={}",
            api_response.candidates.len()
        );

        Ok(Self::from_gemini_response(api_response))
    }
}

/// Provider B adapter.
///
/// Per request: `Idle → PrimaryAttempt → {Success | BackupAttempt → {Success | Failed}}`.
/// An empty reply is a failure just like a transport error. Token usage is
/// never reported.
pub struct GeminiAdapter {
    backend: Arc<dyn CompletionBackend>,
    credentials: ProviderCredentials,
}

impl GeminiAdapter {
    pub fn new(backend: Arc<dyn CompletionBackend>, credentials: ProviderCredentials) -> Self {
        Self {
            backend,
            credentials,
        }
    }
}

fn accept_completion(completion: Completion) -> ChatResult<Accepted> {
    match completion.text {
        Some(text) if !text.trim().is_empty() => Ok((text, None)),
        _ => {
            warn!("Gemini returned an empty response");
            Err(ChatError::EmptyResponse(ProviderKind::Gemini))
        }
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn model_label(&self) -> String {
        display_name(self.backend.model())
    }

    async fn generate(&self, message: &str, params: GenerationParams) -> ChatResult<Generation> {
        generate_with_backup(
            ProviderKind::Gemini,
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

// ── Gemini wire types ──

#[derive(Debug, Clone, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
struct GeminiGenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiApiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::{MockBackend, Reply, credentials};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn params() -> GenerationParams {
        GenerationParams {
            max_tokens: 1000,
            temperature: 0.5,
        }
    }

    fn client_for(server: &MockServer) -> GeminiClient {
        let settings = GeminiSettings {
            base_url: server.uri(),
            ..GeminiSettings::default()
        };
        GeminiClient::new(&settings, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_build_request_shape() {
        let req = GeminiClient::build_request("hello", params());
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 1000);
        assert_eq!(json["generationConfig"]["temperature"], 0.5);
    }

    #[test]
    fn test_response_without_candidates_has_no_text() {
        let resp: GeminiApiResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        let completion = GeminiClient::from_gemini_response(resp);
        assert_eq!(completion.text, None);
    }

    #[test]
    fn test_response_joins_text_parts() {
        let resp: GeminiApiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hel"},{"text":"lo"}]},"finishReason":"STOP"}],
                "usageMetadata":{"totalTokenCount":9}}"#,
        )
        .unwrap();
        let completion = GeminiClient::from_gemini_response(resp);
        assert_eq!(completion.text.as_deref(), Some("Hello"));
        assert_eq!(completion.tokens_used, None);
    }

    #[tokio::test]
    async fn test_complete_sends_key_in_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-1.5-flash-latest:generateContent"))
            .and(header("x-goog-api-key", "AIza-test"))
            .and(body_partial_json(serde_json::json!({
                "generationConfig": {"maxOutputTokens": 1000}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": "Hi there"}]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let credential = Credential::parse("AIza-test").unwrap();
        let completion = client.complete(&credential, "hello", params()).await.unwrap();
        assert_eq!(completion.text.as_deref(), Some("Hi there"));
    }

    #[tokio::test]
    async fn test_complete_reports_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("API key not valid"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let credential = Credential::parse("AIza-bad-key").unwrap();
        let err = client.complete(&credential, "x", params()).await.unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains("403"));
        assert!(!msg.contains("AIza-bad-key"));
    }

    #[tokio::test]
    async fn test_adapter_primary_success() {
        let backend = Arc::new(
            MockBackend::new()
                .with_model("gemini-1.5-flash-latest")
                .reply("primary", Reply::text("answer", Some(40))),
        );
        let adapter = GeminiAdapter::new(backend.clone(), credentials(Some("primary"), None, true));

        let generation = adapter.generate("hello", params()).await.unwrap();
        assert_eq!(generation.text, "answer");
        assert_eq!(generation.model_used, "Google gemini-1.5-flash-latest");
        assert_eq!(generation.tokens_used, None);
    }

    #[tokio::test]
    async fn test_adapter_empty_reply_triggers_exactly_one_backup() {
        let backend = Arc::new(
            MockBackend::new()
                .with_model("gemini-pro")
                .reply("primary", Reply::empty())
                .reply("backup", Reply::empty()),
        );
        let adapter = GeminiAdapter::new(
            backend.clone(),
            credentials(Some("primary"), Some("backup"), true),
        );

        let err = adapter.generate("hello", params()).await.unwrap_err();
        assert!(matches!(
            err,
            ChatError::ProviderUnavailable {
                provider: ProviderKind::Gemini,
                ..
            }
        ));
        assert_eq!(backend.calls(), vec!["primary", "backup"]);
    }

    #[tokio::test]
    async fn test_adapter_backup_success_is_labelled() {
        let backend = Arc::new(
            MockBackend::new()
                .with_model("gemini-pro")
                .reply("primary", Reply::empty())
                .reply("backup", Reply::text("from backup", None)),
        );
        let adapter = GeminiAdapter::new(
            backend.clone(),
            credentials(Some("primary"), Some("backup"), true),
        );

        let generation = adapter.generate("hello", params()).await.unwrap();
        assert_eq!(generation.model_used, "Google gemini-pro (backup)");
    }

    #[tokio::test]
    async fn test_adapter_probe_failure_means_unavailable() {
        let backend = Arc::new(MockBackend::new().reply("primary", Reply::text("x", None)));
        let adapter = GeminiAdapter::new(
            backend.clone(),
            credentials(Some("primary"), Some("backup"), false),
        );

        assert!(adapter.generate("hello", params()).await.is_err());
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_backup_state_is_per_request() {
        let backend = Arc::new(
            MockBackend::new()
                .reply("primary", Reply::fail("quota"))
                .reply("backup", Reply::text("ok", None)),
        );
        let adapter = GeminiAdapter::new(
            backend.clone(),
            credentials(Some("primary"), Some("backup"), true),
        );

        adapter.generate("one", params()).await.unwrap();
        adapter.generate("two", params()).await.unwrap();
        assert_eq!(
            backend.calls(),
            vec!["primary", "backup", "primary", "backup"]
        );
    }
}
