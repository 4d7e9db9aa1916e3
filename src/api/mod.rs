//! HTTP and websocket server.
//!
//! Provides endpoints for:
//! - Meeting lifecycle and participant lookups
//! - Audio upload into the transcription queue
//! - The signaling websocket (`/ws`)

pub mod auth;
pub mod error;
pub mod routes;

use anyhow::{Context, Result};
use axum::{extract::State, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::IdentityVerifier;
use crate::config::{ServerConfig, UploadConfig};
use crate::meeting::MeetingService;
use crate::signaling::{ws_handler, SignalingRelay};
use crate::transcription::TranscriptionQueue;

/// Shared handles for every route.
#[derive(Clone)]
pub struct ApiState {
    pub meetings: MeetingService,
    pub relay: Arc<SignalingRelay>,
    pub queue: TranscriptionQueue,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub uploads: Arc<UploadConfig>,
}

/// Assemble the full application router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health))
        .with_state(state.clone())
        .merge(routes::meetings::router(state.clone()))
        .merge(routes::participants::router(state.clone()))
        .merge(routes::transcribe::router(state.clone()))
        .merge(
            Router::new()
                .route("/ws", get(ws_handler))
                .with_state(state.relay),
        )
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

pub struct ApiServer {
    bind: String,
    port: u16,
    state: ApiState,
}

impl ApiServer {
    pub fn new(state: ApiState, config: &ServerConfig) -> Self {
        Self {
            bind: config.bind.clone(),
            port: config.port,
            state,
        }
    }

    pub async fn start(self) -> Result<()> {
        let addr = format!("{}:{}", self.bind, self.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        info!("API server listening on http://{}", addr);
        info!("Endpoints:");
        info!("  GET  /health                        - Liveness and load");
        info!("  POST /api/meetings                  - Create meeting");
        info!("  GET  /api/meetings/:id              - Get meeting (id or room code)");
        info!("  POST /api/meetings/:id/end          - End meeting (host only)");
        info!("  GET  /api/meetings/:id/transcripts  - Meeting transcripts");
        info!("  GET  /api/meetings/host/:host_id    - Meetings hosted by caller");
        info!("  GET  /api/meetings/upcoming         - Caller's upcoming meetings");
        info!("  GET  /api/participants/:meeting_id  - Participant records");
        info!("  POST /api/participants/leave        - Leave a meeting");
        info!("  POST /api/transcribe/upload         - Queue audio for transcription");
        info!("  GET  /api/transcribe/status         - Transcription queue status");
        info!("  GET  /ws                            - Signaling websocket");

        axum::serve(listener, router(self.state)).await?;

        Ok(())
    }
}

async fn service_info() -> Json<Value> {
    Json(json!({
        "service": "huddle",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn health(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "connections": state.relay.connection_count().await,
        "queueLength": state.queue.len(),
    }))
}
