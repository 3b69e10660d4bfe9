//! oblaka-core - provider dispatch for the Oblaka gateway
//!
//! This crate provides:
//! - A client pool holding primary/backup credentials for OpenAI and Gemini
//! - Provider adapters with single-step primary → backup failover
//! - Parameter normalization against per-provider limits
//! - A dispatcher that turns a chat request into a normalized response
//! - A status reporter for health, model listing and diagnostics

pub mod dispatcher;
pub mod error;
pub mod normalize;
pub mod pool;
pub mod providers;
pub mod status;
pub mod types;

// Re-export main types for convenience
pub use dispatcher::{DEFAULT_REQUEST_TIMEOUT, Dispatcher};
pub use error::{ChatError, ChatResult};
pub use normalize::{GenerationParams, normalize};
pub use pool::{ClientPool, PoolConfig, ProviderKeys};
pub use providers::{GeminiSettings, OpenAiSettings};
pub use status::StatusReporter;
pub use types::{
    ChatRequest, ChatResponse, DebugInfo, HealthStatus, ModelInfo, ModelList, ProviderKind,
    ServiceBanner,
};
