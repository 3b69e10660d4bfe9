//! Upstream LLM providers
//!
//! Each provider has an HTTP client implementing [`CompletionBackend`] and an
//! adapter implementing [`ProviderAdapter`]. Adapters share the
//! primary/backup credential failover in [`failover`].

pub mod failover;
pub mod google;
pub mod openai;
pub mod types;

pub use google::{GeminiAdapter, GeminiClient, GeminiSettings};
pub use openai::{OpenAiAdapter, OpenAiClient, OpenAiSettings};
pub use types::{
    Completion, CompletionBackend, Credential, Generation, ProviderAdapter, Stage, mask_secret,
};
