//! Primary → backup credential failover within a single provider

use tracing::{debug, error, info, warn};

use crate::error::{ChatError, ChatResult};
use crate::normalize::GenerationParams;
use crate::pool::ProviderCredentials;
use crate::types::ProviderKind;

use super::types::{Completion, CompletionBackend, Credential, Generation, Stage, backup_label};

/// Accepted text and token count extracted from a raw completion
pub(crate) type Accepted = (String, Option<u32>);

/// Run one request against `backend`, first with the primary credential and,
/// if that fails and a backup credential exists, exactly once more with the
/// backup credential.
///
/// `accept` turns a raw completion into usable output or a failure (e.g. an
/// empty reply). The returned error always carries the primary failure's
/// detail; backup failures are only logged.
pub(crate) async fn generate_with_backup<F>(
    kind: ProviderKind,
    backend: &dyn CompletionBackend,
    credentials: &ProviderCredentials,
    label: &str,
    message: &str,
    params: GenerationParams,
    accept: F,
) -> ChatResult<Generation>
where
    F: Fn(Completion) -> ChatResult<Accepted>,
{
    let primary = match credentials.primary() {
        Some(c) if credentials.is_available() => c,
        _ => {
            warn!(provider = %kind, "Provider unavailable, no usable primary credential");
            return Err(ChatError::unavailable(kind, "no usable credential configured"));
        }
    };

    let primary_err = match attempt(kind, Stage::Primary, backend, primary, message, params, &accept).await {
        Ok((text, tokens_used)) => {
            info!(provider = %kind, "Received response from {}", kind);
            return Ok(Generation {
                text,
                model_used: label.to_string(),
                tokens_used,
            });
        }
        Err(e) => e,
    };

    if let Some(backup) = credentials.backup() {
        info!(provider = %kind, "Retrying with backup credential");
        if let Ok((text, tokens_used)) =
            attempt(kind, Stage::Backup, backend, backup, message, params, &accept).await
        {
            info!(provider = %kind, "Received response from {} backup", kind);
            return Ok(Generation {
                text,
                model_used: backup_label(label),
                tokens_used,
            });
        }
    }

    Err(ChatError::unavailable(kind, failure_detail(primary_err)))
}

async fn attempt<F>(
    kind: ProviderKind,
    stage: Stage,
    backend: &dyn CompletionBackend,
    credential: &Credential,
    message: &str,
    params: GenerationParams,
    accept: &F,
) -> ChatResult<Accepted>
where
    F: Fn(Completion) -> ChatResult<Accepted>,
{
    debug!(
        provider = %kind,
        stage = %stage,
        model = backend.model(),
        max_tokens = params.max_tokens,
        temperature = params.temperature,
        "Sending request to {}",
        backend.provider_name()
    );

    let outcome = match backend.complete(credential, message, params).await {
        Ok(completion) => accept(completion),
        Err(e) => Err(ChatError::unavailable(kind, format!("{:#}", e))),
    };

    if let Err(ref e) = outcome {
        error!(provider = %kind, stage = %stage, "{} API call failed: {}", kind, e);
    }
    outcome
}

fn failure_detail(err: ChatError) -> String {
    match err {
        ChatError::ProviderUnavailable { detail, .. } => detail,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::{MockBackend, Reply, credentials};

    fn params() -> GenerationParams {
        GenerationParams {
            max_tokens: 100,
            temperature: 0.5,
        }
    }

    fn accept_text(c: Completion) -> ChatResult<Accepted> {
        match c.text {
            Some(t) if !t.is_empty() => Ok((t, c.tokens_used)),
            _ => Err(ChatError::EmptyResponse(ProviderKind::Gemini)),
        }
    }

    #[tokio::test]
    async fn test_primary_success_skips_backup() {
        let backend = MockBackend::new()
            .reply("primary", Reply::text("hi", Some(7)))
            .reply("backup", Reply::text("unused", None));
        let creds = credentials(Some("primary"), Some("backup"), true);

        let generation = generate_with_backup(
            ProviderKind::OpenAi, &backend, &creds, "Label", "msg", params(), accept_text,
        )
        .await
        .unwrap();

        assert_eq!(generation.text, "hi");
        assert_eq!(generation.model_used, "Label");
        assert_eq!(generation.tokens_used, Some(7));
        assert_eq!(backend.calls(), vec!["primary"]);
    }

    #[tokio::test]
    async fn test_backup_used_after_primary_failure() {
        let backend = MockBackend::new()
            .reply("primary", Reply::fail("status 429: quota exceeded"))
            .reply("backup", Reply::text("from backup", None));
        let creds = credentials(Some("primary"), Some("backup"), true);

        let generation = generate_with_backup(
            ProviderKind::OpenAi, &backend, &creds, "Label", "msg", params(), accept_text,
        )
        .await
        .unwrap();

        assert_eq!(generation.text, "from backup");
        assert_eq!(generation.model_used, "Label (backup)");
        assert_eq!(backend.calls(), vec!["primary", "backup"]);
    }

    #[tokio::test]
    async fn test_both_fail_reports_primary_error() {
        let backend = MockBackend::new()
            .reply("primary", Reply::fail("primary exploded"))
            .reply("backup", Reply::fail("backup exploded"));
        let creds = credentials(Some("primary"), Some("backup"), true);

        let err = generate_with_backup(
            ProviderKind::Gemini, &backend, &creds, "Label", "msg", params(), accept_text,
        )
        .await
        .unwrap_err();

        match err {
            ChatError::ProviderUnavailable { provider, detail } => {
                assert_eq!(provider, ProviderKind::Gemini);
                assert!(detail.contains("primary exploded"));
                assert!(!detail.contains("backup exploded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(backend.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_no_backup_fails_after_one_call() {
        let backend = MockBackend::new().reply("primary", Reply::fail("down"));
        let creds = credentials(Some("primary"), None, true);

        let result = generate_with_backup(
            ProviderKind::OpenAi, &backend, &creds, "Label", "msg", params(), accept_text,
        )
        .await;

        assert!(matches!(result, Err(ChatError::ProviderUnavailable { .. })));
        assert_eq!(backend.calls(), vec!["primary"]);
    }

    #[tokio::test]
    async fn test_unavailable_provider_makes_no_calls() {
        let backend = MockBackend::new().reply("backup", Reply::text("x", None));
        let creds = credentials(None, Some("backup"), false);

        let result = generate_with_backup(
            ProviderKind::OpenAi, &backend, &creds, "Label", "msg", params(), accept_text,
        )
        .await;

        assert!(matches!(result, Err(ChatError::ProviderUnavailable { .. })));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_reply_counts_as_failure() {
        let backend = MockBackend::new()
            .reply("primary", Reply::empty())
            .reply("backup", Reply::empty());
        let creds = credentials(Some("primary"), Some("backup"), true);

        let err = generate_with_backup(
            ProviderKind::Gemini, &backend, &creds, "Label", "msg", params(), accept_text,
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("empty response"));
        assert_eq!(backend.calls(), vec!["primary", "backup"]);
    }
}
