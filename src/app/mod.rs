use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::api::{ApiServer, ApiState};
use crate::auth::{IdentityVerifier, JwtVerifier};
use crate::config::Config;
use crate::db::SessionStore;
use crate::meeting::MeetingService;
use crate::signaling::{RoomBroadcaster, SignalingRelay};
use crate::transcription::{self, TranscriptionQueue, TranscriptionWorker};

pub async fn run_service(config: Config) -> Result<()> {
    info!("Starting huddle service");

    let db_path = config.database.resolved_path()?;
    let store = SessionStore::open(&db_path)?;
    info!("Session store at {:?}", db_path);

    if config.auth.jwt_secret == "change-me" {
        warn!("Using the default JWT secret; set auth.jwt_secret or HUDDLE_JWT_SECRET");
    }
    let verifier: Arc<dyn IdentityVerifier> = Arc::new(JwtVerifier::new(&config.auth.jwt_secret));

    let relay = Arc::new(SignalingRelay::new(store.clone(), verifier.clone()));

    let provider = transcription::build_provider(&config.transcription)?;
    let broadcaster: Arc<dyn RoomBroadcaster> = relay.clone();
    let worker = TranscriptionWorker::new(
        provider,
        store.clone(),
        broadcaster,
        transcription::retry_policy(&config.transcription),
    );
    let (queue, worker_handle) = TranscriptionQueue::start(worker);

    let state = ApiState {
        meetings: MeetingService::new(store),
        relay,
        queue,
        verifier,
        uploads: Arc::new(config.uploads.clone()),
    };

    info!("huddle is ready!");

    tokio::select! {
        result = ApiServer::new(state, &config.server).start() => {
            if let Err(e) = &result {
                error!("API server failed: {}", e);
            }
            result
        }
        _ = worker_handle => {
            error!("Transcription worker exited unexpectedly");
            Ok(())
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    }
}
