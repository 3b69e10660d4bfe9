//! Failure taxonomy surfaced by the dispatcher

use thiserror::Error;

use crate::types::ProviderKind;

pub type ChatResult<T> = std::result::Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    /// The caller asked for a provider id we do not serve
    #[error("Unsupported model: {0}")]
    UnsupportedProvider(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No usable credential, or every credential path failed
    #[error("{provider} API unavailable: {detail}")]
    ProviderUnavailable {
        provider: ProviderKind,
        detail: String,
    },

    #[error("{0} returned an empty response")]
    EmptyResponse(ProviderKind),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChatError {
    pub fn unavailable(provider: ProviderKind, detail: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            provider,
            detail: detail.into(),
        }
    }

    /// Whether the failure was caused by the caller rather than a provider
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::UnsupportedProvider(_) | Self::InvalidRequest(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_message_names_provider() {
        let err = ChatError::unavailable(ProviderKind::OpenAi, "no credentials configured");
        assert_eq!(
            err.to_string(),
            "OpenAI API unavailable: no credentials configured"
        );
    }

    #[test]
    fn test_client_error_classification() {
        assert!(ChatError::UnsupportedProvider("x".into()).is_client_error());
        assert!(ChatError::InvalidRequest("empty".into()).is_client_error());
        assert!(!ChatError::EmptyResponse(ProviderKind::Gemini).is_client_error());
        assert!(!ChatError::Internal("boom".into()).is_client_error());
    }
}
