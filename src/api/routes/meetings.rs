//! Meeting lifecycle endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};

use crate::api::auth::AuthUser;
use crate::api::error::{ApiError, ApiResult};
use crate::api::ApiState;
use crate::db::{Meeting, Transcript};
use crate::meeting::CreateMeeting;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/meetings", post(create_meeting))
        .route("/api/meetings/upcoming", get(list_upcoming))
        .route("/api/meetings/host/:host_id", get(list_host_meetings))
        .route("/api/meetings/:id", get(get_meeting))
        .route("/api/meetings/:id/end", post(end_meeting))
        .route("/api/meetings/:id/transcripts", get(list_transcripts))
        .with_state(state)
}

/// POST /api/meetings - Create a meeting hosted by the caller.
async fn create_meeting(
    State(state): State<ApiState>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<CreateMeeting>,
) -> ApiResult<(StatusCode, Json<Meeting>)> {
    let meeting = state.meetings.create_meeting(&user_id, request).await?;
    Ok((StatusCode::CREATED, Json(meeting)))
}

/// GET /api/meetings/:id - Look up by id or room code.
async fn get_meeting(
    State(state): State<ApiState>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Meeting>> {
    Ok(Json(state.meetings.resolve(&id).await?))
}

async fn end_meeting(
    State(state): State<ApiState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Meeting>> {
    Ok(Json(state.meetings.end_meeting(&id, &user_id).await?))
}

/// GET /api/meetings/host/:host_id - The caller's own meetings, newest first.
async fn list_host_meetings(
    State(state): State<ApiState>,
    AuthUser(user_id): AuthUser,
    Path(host_id): Path<String>,
) -> ApiResult<Json<Vec<Meeting>>> {
    if host_id != user_id {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "Cannot list another host's meetings",
        ));
    }
    Ok(Json(state.meetings.list_for_host(&host_id).await?))
}

/// GET /api/meetings/upcoming - The caller's meetings that have not started, soonest first.
async fn list_upcoming(
    State(state): State<ApiState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Json<Vec<Meeting>>> {
    Ok(Json(state.meetings.upcoming(&user_id).await?))
}

async fn list_transcripts(
    State(state): State<ApiState>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Transcript>>> {
    Ok(Json(state.meetings.transcripts(&id).await?))
}
