//! Gateway HTTP server: Axum-based JSON API

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use oblaka_core::{ChatRequest, ChatResponse, Dispatcher, ModelList, StatusReporter};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth;
use crate::error::ApiError;

/// Shared state for all requests
#[derive(Clone)]
pub struct GatewayState {
    pub dispatcher: Arc<Dispatcher>,
    pub status: Arc<StatusReporter>,
    /// Bearer token guarding `/debug`; empty disables the check
    pub debug_token: String,
}

/// The gateway server
pub struct GatewayServer {
    state: GatewayState,
    bind: SocketAddr,
}

impl GatewayServer {
    pub fn new(bind: SocketAddr, state: GatewayState) -> Self {
        Self { state, bind }
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Serve until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.bind).await?;
        info!("Gateway listening on {}", self.bind);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;

        info!("Gateway stopped");
        Ok(())
    }
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/chat", post(chat_handler))
        .route("/models", get(models_handler))
        .route("/debug", get(debug_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── HTTP Handlers ──

async fn root_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(state.status.banner())
}

async fn health_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    let health = state.status.health();
    info!(
        "Health check: OpenAI={}, Gemini={}",
        health.openai_available, health.gemini_available
    );
    Json(health)
}

async fn chat_handler(
    State(state): State<GatewayState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = body?;
    let response = state.dispatcher.chat(&request).await?;
    Ok(Json(response))
}

async fn models_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    let models = state.status.list_models();
    info!("Returning {} available models", models.len());
    Json(ModelList { models })
}

async fn debug_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if !auth::check_auth(&state.debug_token, &headers) {
        warn!("Rejected unauthorized /debug request");
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, "Unauthorized"));
    }
    Ok(Json(state.status.debug_info()))
}
