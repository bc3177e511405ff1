//! HTTP gateway for relaybot.
//!
//! Exposes a liveness page, a JSON health check and the endpoint the
//! Discord relay posts `MESSAGE_CREATE` events to.
//!
//! Built on Axum.

use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use relaybot_channels::DiscordChannel;
use relaybot_core::error::ChannelError;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Header carrying the relay's HMAC signature.
pub const SIGNATURE_HEADER: &str = "X-Relay-Signature";

/// Relayed events are small JSON documents.
const MAX_BODY_BYTES: usize = 256 * 1024;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub model: String,
    /// Inbound Discord adapter; `None` when Discord is not configured
    pub discord: Option<Arc<DiscordChannel>>,
    pub start_time: DateTime<Utc>,
}

impl GatewayState {
    pub fn new(model: impl Into<String>, discord: Option<Arc<DiscordChannel>>) -> Self {
        Self {
            model: model.into(),
            discord,
            start_time: Utc::now(),
        }
    }
}

type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/discord/events", post(discord_event_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the gateway on `addr` until `shutdown` fires.
pub async fn serve(
    addr: &str,
    state: SharedState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Gateway listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

// --- Handlers ---

async fn root_handler() -> &'static str {
    "relaybot is running!"
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    model: String,
    discord: bool,
    uptime_secs: i64,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        model: state.model.clone(),
        discord: state.discord.is_some(),
        uptime_secs: (Utc::now() - state.start_time).num_seconds(),
    })
}

async fn discord_event_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(discord) = state.discord.as_ref() else {
        return StatusCode::NOT_FOUND;
    };

    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    match discord.inject_event(&body, signature).await {
        Ok(()) => {
            debug!(bytes = body.len(), "Relayed Discord event accepted");
            StatusCode::ACCEPTED
        }
        Err(ChannelError::InvalidSignature) => StatusCode::UNAUTHORIZED,
        Err(ChannelError::InvalidPayload(reason)) => {
            warn!(reason = %reason, "Relayed Discord event rejected");
            StatusCode::BAD_REQUEST
        }
        Err(e) => {
            warn!(error = %e, "Relayed Discord event could not be queued");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
