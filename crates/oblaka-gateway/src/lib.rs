//! oblaka-gateway: HTTP surface for the Oblaka dispatcher
//!
//! Exposes the chat, health, model listing and diagnostics endpoints over
//! JSON, with permissive CORS for browser clients.

pub mod auth;
pub mod error;
pub mod server;

pub use error::ApiError;
pub use server::{GatewayServer, GatewayState};
