//! Meeting lifecycle: creation, lookup, ending and participant bookkeeping
//! outside the realtime connection.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use tracing::info;

use crate::db::schemas::now_timestamp;
use crate::db::{Meeting, NewMeeting, Participant, Recurrence, SessionStore, Transcript};
use crate::error::{CoordinatorError, CoordinatorResult};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMeeting {
    pub title: Option<String>,
    #[serde(default)]
    pub is_scheduled: bool,
    pub schedule_at: Option<String>,
    pub recurrence: Option<Recurrence>,
}

#[derive(Clone)]
pub struct MeetingService {
    store: SessionStore,
}

impl MeetingService {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    pub async fn create_meeting(
        &self,
        host_id: &str,
        request: CreateMeeting,
    ) -> CoordinatorResult<Meeting> {
        // Stored as UTC millis so schedule times compare lexically.
        let schedule_at = request
            .schedule_at
            .as_deref()
            .map(|at| {
                DateTime::parse_from_rfc3339(at)
                    .map(|t| t.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Millis, true))
                    .map_err(|_| {
                        CoordinatorError::bad_request(format!("Invalid scheduleAt '{}'", at))
                    })
            })
            .transpose()?;
        if request.is_scheduled && schedule_at.is_none() {
            return Err(CoordinatorError::bad_request(
                "scheduleAt is required for scheduled meetings",
            ));
        }

        let title = request
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let meeting = self
            .store
            .create_meeting(NewMeeting {
                title,
                host_id: host_id.to_string(),
                is_live: !request.is_scheduled,
                schedule_at,
                recurrence: request.recurrence,
            })
            .await?
            .ok_or_else(|| CoordinatorError::conflict("Could not allocate a unique room code"))?;

        info!(
            "Meeting {} created by {} (room {}, live: {})",
            meeting.id, host_id, meeting.room_code, meeting.is_live
        );
        Ok(meeting)
    }

    /// Look a meeting up by canonical id, then by room code.
    pub async fn resolve(&self, id_or_code: &str) -> CoordinatorResult<Meeting> {
        self.store
            .resolve_meeting(id_or_code)
            .await?
            .ok_or_else(|| CoordinatorError::not_found("Meeting not found"))
    }

    pub async fn end_meeting(&self, id_or_code: &str, requester: &str) -> CoordinatorResult<Meeting> {
        let meeting = self.resolve(id_or_code).await?;
        if meeting.host_id != requester {
            return Err(CoordinatorError::forbidden("Only the host can end the meeting"));
        }

        self.store.set_meeting_live(&meeting.id, false).await?;
        info!("Meeting {} ended by host", meeting.id);
        self.resolve(&meeting.id).await
    }

    pub async fn list_for_host(&self, host_id: &str) -> CoordinatorResult<Vec<Meeting>> {
        Ok(self.store.meetings_for_host(host_id).await?)
    }

    /// Meetings `user_id` hosts or has joined that have not started yet.
    pub async fn upcoming(&self, user_id: &str) -> CoordinatorResult<Vec<Meeting>> {
        Ok(self.store.upcoming_meetings(user_id, &now_timestamp()).await?)
    }

    pub async fn participants(&self, id_or_code: &str) -> CoordinatorResult<Vec<Participant>> {
        let meeting = self.resolve(id_or_code).await?;
        Ok(self.store.participants(&meeting.id).await?)
    }

    /// Mark `user_id` as gone from the meeting regardless of which socket it used.
    pub async fn leave(&self, id_or_code: &str, user_id: &str) -> CoordinatorResult<Participant> {
        let meeting = self.resolve(id_or_code).await?;
        if self.store.mark_left_by_user(&meeting.id, user_id).await? == 0 {
            return Err(CoordinatorError::not_found("Participant not found"));
        }
        self.store
            .participant(&meeting.id, user_id)
            .await?
            .ok_or_else(|| CoordinatorError::not_found("Participant not found"))
    }

    pub async fn transcripts(&self, id_or_code: &str) -> CoordinatorResult<Vec<Transcript>> {
        let meeting = self.resolve(id_or_code).await?;
        Ok(self.store.transcripts(&meeting.id).await?)
    }
}
