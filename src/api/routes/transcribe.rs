//! Audio upload for transcription.
//!
//! Uploads are validated, written to the temp directory and queued; the
//! response only acknowledges acceptance. Results arrive over the room's
//! realtime connection as `transcript-update`.

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::api::auth::AuthUser;
use crate::api::error::{ApiError, ApiResult};
use crate::api::ApiState;
use crate::error::CoordinatorError;
use crate::transcription::{QueueSnapshot, TranscriptionJob};

// Headroom for multipart framing and the text fields around the audio part.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn router(state: ApiState) -> Router {
    let body_limit = state.uploads.max_bytes + MULTIPART_OVERHEAD;
    Router::new()
        .route("/api/transcribe/upload", post(upload_audio))
        .route("/api/transcribe/status", get(queue_status))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

struct UploadedAudio {
    file_name: String,
    bytes: axum::body::Bytes,
}

/// POST /api/transcribe/upload
///
/// Multipart fields: `audio` (file), `meetingId`, optional `isFinal`.
async fn upload_audio(
    State(state): State<ApiState>,
    AuthUser(user_id): AuthUser,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let mut audio: Option<UploadedAudio> = None;
    let mut meeting_key: Option<String> = None;
    let mut is_final = false;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "audio" => {
                // Drop parameters such as `;codecs=opus`.
                let mime = field
                    .content_type()
                    .and_then(|m| m.split(';').next())
                    .unwrap_or_default()
                    .trim()
                    .to_ascii_lowercase();
                if !state.uploads.accepts(&mime) {
                    return Err(ApiError::unsupported_media_type(format!(
                        "Unsupported audio type '{}'",
                        mime
                    )));
                }
                let file_name = field.file_name().unwrap_or("audio").to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                if bytes.len() > state.uploads.max_bytes {
                    return Err(ApiError::payload_too_large(format!(
                        "Audio exceeds {} bytes",
                        state.uploads.max_bytes
                    )));
                }
                audio = Some(UploadedAudio { file_name, bytes });
            }
            "meetingId" => {
                let value = field.text().await.map_err(multipart_error)?;
                meeting_key = Some(value.trim().to_string()).filter(|v| !v.is_empty());
            }
            "isFinal" => {
                let value = field.text().await.map_err(multipart_error)?;
                is_final = parse_flag(&value);
            }
            other => debug!("Ignoring upload field {}", other),
        }
    }

    let audio = audio.ok_or_else(|| ApiError::bad_request("No audio file uploaded"))?;
    let meeting_key = meeting_key.ok_or_else(|| ApiError::bad_request("meetingId is required"))?;
    let meeting = state.meetings.resolve(&meeting_key).await?;

    let dir = state.uploads.resolved_temp_dir()?;
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(CoordinatorError::from)?;
    let path = dir.join(temp_file_name(&audio.file_name)?);
    tokio::fs::write(&path, &audio.bytes)
        .await
        .map_err(CoordinatorError::from)?;

    info!(
        "Accepted {} bytes of audio for meeting {} (final: {})",
        audio.bytes.len(),
        meeting.id,
        is_final
    );

    let queue_length = state.queue.enqueue(TranscriptionJob {
        audio_path: path,
        meeting_id: meeting.id,
        user_id,
        is_final,
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "success": true,
            "message": "Audio queued for transcription",
            "queueLength": queue_length,
        })),
    ))
}

/// GET /api/transcribe/status - Queue depth and job counters.
async fn queue_status(State(state): State<ApiState>) -> Json<QueueSnapshot> {
    Json(state.queue.stats())
}

fn multipart_error(err: MultipartError) -> ApiError {
    ApiError::new(err.status(), err.body_text())
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

fn sanitize_file_name(name: &str) -> anyhow::Result<String> {
    let whitespace = Regex::new(r"\s+")?;
    let unsafe_chars = Regex::new(r"[^A-Za-z0-9_.\-]")?;

    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let spaced = whitespace.replace_all(base, "_");
    let cleaned = unsafe_chars.replace_all(&spaced, "");
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        Ok("audio".to_string())
    } else {
        Ok(cleaned.to_string())
    }
}

fn temp_file_name(original: &str) -> anyhow::Result<String> {
    Ok(format!(
        "transcribe_{}_{}_{}",
        Utc::now().timestamp_millis(),
        &uuid::Uuid::new_v4().simple().to_string()[..8],
        sanitize_file_name(original)?
    ))
}
