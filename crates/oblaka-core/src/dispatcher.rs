//! Chat dispatcher: picks the adapter for the requested provider and runs it

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{ChatError, ChatResult};
use crate::normalize::normalize;
use crate::pool::ClientPool;
use crate::providers::{GeminiAdapter, OpenAiAdapter, ProviderAdapter};
use crate::types::{ChatRequest, ChatResponse, ProviderKind};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Routes chat requests to a provider adapter.
///
/// Failover only ever happens between the two credentials of the selected
/// provider; a failing provider is never swapped for the other one.
#[derive(Clone)]
pub struct Dispatcher {
    openai: Arc<dyn ProviderAdapter>,
    gemini: Arc<dyn ProviderAdapter>,
    request_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        openai: Arc<dyn ProviderAdapter>,
        gemini: Arc<dyn ProviderAdapter>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            openai,
            gemini,
            request_timeout,
        }
    }

    pub fn from_pool(pool: &ClientPool, request_timeout: Duration) -> Self {
        let openai = pool.slot(ProviderKind::OpenAi);
        let gemini = pool.slot(ProviderKind::Gemini);
        Self::new(
            Arc::new(OpenAiAdapter::new(
                openai.backend().clone(),
                openai.credentials().clone(),
            )),
            Arc::new(GeminiAdapter::new(
                gemini.backend().clone(),
                gemini.credentials().clone(),
            )),
            request_timeout,
        )
    }

    fn adapter(&self, kind: ProviderKind) -> &Arc<dyn ProviderAdapter> {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Gemini => &self.gemini,
        }
    }

    /// Handle one chat request.
    ///
    /// The adapter runs on its own task under `request_timeout`; a timeout is
    /// reported as the provider being unavailable and a panic as an internal
    /// error.
    pub async fn chat(&self, request: &ChatRequest) -> ChatResult<ChatResponse> {
        let request_id = Uuid::new_v4();

        let Some(kind) = ProviderKind::parse(&request.model) else {
            warn!(%request_id, model = %request.model, "Unsupported model requested");
            return Err(ChatError::UnsupportedProvider(request.model.clone()));
        };

        info!(
            %request_id,
            provider = kind.id(),
            message_length = request.message.chars().count(),
            "Chat request received"
        );

        if request.message.trim().is_empty() {
            warn!(%request_id, "Rejected chat request with empty message");
            return Err(ChatError::InvalidRequest("message must not be empty".to_string()));
        }

        let params = normalize(request.max_tokens, request.temperature, kind.max_tokens_ceiling());
        let adapter = self.adapter(kind).clone();
        let message = request.message.clone();

        let handle = tokio::spawn(async move { adapter.generate(&message, params).await });
        let abort = handle.abort_handle();

        let outcome = match tokio::time::timeout(self.request_timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(ChatError::Internal(join_err.to_string())),
            Err(_) => {
                abort.abort();
                Err(ChatError::unavailable(
                    kind,
                    format!("request timed out after {}s", self.request_timeout.as_secs()),
                ))
            }
        };

        match outcome {
            Ok(generation) => {
                info!(
                    %request_id,
                    provider = kind.id(),
                    model_used = %generation.model_used,
                    tokens_used = ?generation.tokens_used,
                    "Chat request completed"
                );
                Ok(ChatResponse {
                    response: generation.text,
                    model_used: generation.model_used,
                    tokens_used: generation.tokens_used,
                })
            }
            Err(ChatError::EmptyResponse(provider)) => {
                error!(%request_id, provider = kind.id(), "Chat request failed: empty response");
                Err(ChatError::unavailable(
                    provider,
                    ChatError::EmptyResponse(provider).to_string(),
                ))
            }
            Err(e) => {
                error!(%request_id, provider = kind.id(), "Chat request failed: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ProviderKeys;
    use crate::providers::Completion;
    use crate::providers::testing::{MockBackend, Reply, credentials};

    fn dispatcher(openai: Arc<MockBackend>, gemini: Arc<MockBackend>) -> Dispatcher {
        Dispatcher::new(
            Arc::new(OpenAiAdapter::new(
                openai,
                credentials(Some("oa-1"), Some("oa-2"), true),
            )),
            Arc::new(GeminiAdapter::new(
                gemini,
                credentials(Some("g-1"), None, true),
            )),
            Duration::from_secs(5),
        )
    }

    fn request(message: &str, model: &str) -> ChatRequest {
        ChatRequest {
            message: message.to_string(),
            model: model.to_string(),
            max_tokens: None,
            temperature: None,
        }
    }

    #[tokio::test]
    async fn test_unsupported_model_invokes_nothing() {
        let openai = Arc::new(MockBackend::new());
        let gemini = Arc::new(MockBackend::new());
        let d = dispatcher(openai.clone(), gemini.clone());

        let err = d.chat(&request("hello", "claude")).await.unwrap_err();
        assert!(matches!(err, ChatError::UnsupportedProvider(ref m) if m == "claude"));
        assert!(openai.calls().is_empty());
        assert!(gemini.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let gemini = Arc::new(MockBackend::new());
        let d = dispatcher(Arc::new(MockBackend::new()), gemini.clone());

        let err = d.chat(&request("   ", "gemini")).await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidRequest(_)));
        assert!(gemini.calls().is_empty());
    }

    #[tokio::test]
    async fn test_gemini_success_has_null_tokens() {
        let gemini = Arc::new(
            MockBackend::new()
                .with_model("gemini-1.5-flash-latest")
                .reply("g-1", Reply::text("Привет", Some(99))),
        );
        let d = dispatcher(Arc::new(MockBackend::new()), gemini);

        let resp = d.chat(&request("hello", "gemini")).await.unwrap();
        assert_eq!(resp.response, "Привет");
        assert!(resp.model_used.contains("gemini-1.5-flash-latest"));
        assert_eq!(resp.tokens_used, None);
    }

    #[tokio::test]
    async fn test_openai_backup_suffix() {
        let openai = Arc::new(
            MockBackend::new()
                .with_model("gpt-3.5-turbo")
                .reply("oa-1", Reply::fail("connection reset"))
                .reply("oa-2", Reply::text("ok", Some(30))),
        );
        let d = dispatcher(openai, Arc::new(MockBackend::new()));

        let resp = d.chat(&request("hello", "openai")).await.unwrap();
        assert!(resp.model_used.ends_with("(backup)"));
        assert_eq!(resp.tokens_used, Some(30));
    }

    #[tokio::test]
    async fn test_params_normalized_with_provider_ceiling() {
        let openai = Arc::new(MockBackend::new().reply("oa-1", Reply::text("ok", None)));
        let gemini = Arc::new(MockBackend::new().reply("g-1", Reply::text("ok", None)));
        let d = dispatcher(openai.clone(), gemini.clone());

        let mut req = request("hello", "openai");
        req.max_tokens = Some(999_999);
        req.temperature = Some(5.0);
        d.chat(&req).await.unwrap();
        let p = openai.last_params().unwrap();
        assert_eq!(p.max_tokens, 4000);
        assert_eq!(p.temperature, 2.0);

        req.model = "gemini".to_string();
        d.chat(&req).await.unwrap();
        assert_eq!(gemini.last_params().unwrap().max_tokens, 8000);
    }

    #[tokio::test]
    async fn test_no_cross_provider_fallback() {
        let openai = Arc::new(MockBackend::new().reply("oa-1", Reply::text("ok", None)));
        let gemini = Arc::new(MockBackend::new().reply("g-1", Reply::fail("down")));
        let d = dispatcher(openai.clone(), gemini);

        let err = d.chat(&request("hello", "gemini")).await.unwrap_err();
        assert!(matches!(
            err,
            ChatError::ProviderUnavailable {
                provider: ProviderKind::Gemini,
                ..
            }
        ));
        assert!(openai.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_provider_is_unavailable_without_calls() {
        let openai = Arc::new(MockBackend::new());
        let pool = ClientPool::build(
            openai.clone(),
            &ProviderKeys::default(),
            Arc::new(MockBackend::new()),
            &ProviderKeys::default(),
            Duration::from_millis(100),
        )
        .await;
        let d = Dispatcher::from_pool(&pool, Duration::from_secs(5));

        let err = d.chat(&request("hello", "openai")).await.unwrap_err();
        assert!(err.to_string().contains("unavailable"));
        assert!(openai.calls().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_reports_unavailable() {
        let gemini = Arc::new(MockBackend::new().reply(
            "g-1",
            Reply::Delay(Duration::from_secs(10), Completion::default()),
        ));
        let d = Dispatcher::new(
            Arc::new(OpenAiAdapter::new(
                Arc::new(MockBackend::new()),
                credentials(None, None, false),
            )),
            Arc::new(GeminiAdapter::new(gemini, credentials(Some("g-1"), None, true))),
            Duration::from_millis(50),
        );

        let err = d.chat(&request("hello", "gemini")).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_adapter_panic_is_internal_error() {
        let gemini = Arc::new(MockBackend::new().reply("g-1", Reply::Panic));
        let d = dispatcher(Arc::new(MockBackend::new()), gemini);

        let err = d.chat(&request("hello", "gemini")).await.unwrap_err();
        assert!(matches!(err, ChatError::Internal(_)));
    }

    #[tokio::test]
    async fn test_repeated_requests_keep_schema() {
        let gemini = Arc::new(MockBackend::new().reply("g-1", Reply::text("same", None)));
        let d = dispatcher(Arc::new(MockBackend::new()), gemini);

        for _ in 0..3 {
            let resp = d.chat(&request("hello", "gemini")).await.unwrap();
            let json = serde_json::to_value(&resp).unwrap();
            let obj = json.as_object().unwrap();
            assert_eq!(obj.len(), 3);
            assert!(obj["response"].is_string());
            assert!(obj["model_used"].is_string());
            assert!(obj["tokens_used"].is_null());
        }
    }
}
