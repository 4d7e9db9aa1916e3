//! Participant endpoints.

use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;

use crate::api::auth::AuthUser;
use crate::api::error::ApiResult;
use crate::api::ApiState;
use crate::db::Participant;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRequest {
    pub meeting_id: String,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/participants/leave", post(leave_meeting))
        .route("/api/participants/:meeting_id", get(list_participants))
        .with_state(state)
}

async fn list_participants(
    State(state): State<ApiState>,
    _user: AuthUser,
    Path(meeting_id): Path<String>,
) -> ApiResult<Json<Vec<Participant>>> {
    Ok(Json(state.meetings.participants(&meeting_id).await?))
}

/// POST /api/participants/leave - Mark the caller as gone from a meeting.
async fn leave_meeting(
    State(state): State<ApiState>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<LeaveRequest>,
) -> ApiResult<Json<Participant>> {
    Ok(Json(
        state.meetings.leave(&request.meeting_id, &user_id).await?,
    ))
}
