use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// RFC 3339 UTC timestamp with millisecond precision; sorts lexically.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recurrence {
    pub rrule: String,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meeting {
    pub id: String,
    pub title: Option<String>,
    pub host_id: String,
    pub room_code: String,
    pub is_live: bool,
    pub is_locked: bool,
    pub schedule_at: String,
    pub recurrence: Option<Recurrence>,
    pub participants_id: Vec<String>,
    pub created_at: String,
}

/// Input for a new meeting record. `room_code` is allocated by the store.
#[derive(Debug, Clone, Default)]
pub struct NewMeeting {
    pub title: Option<String>,
    pub host_id: String,
    pub is_live: bool,
    pub schedule_at: Option<String>,
    pub recurrence: Option<Recurrence>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Host,
    Participant,
}

impl ParticipantRole {
    pub fn parse(s: &str) -> Result<ParticipantRole> {
        match s {
            "host" => Ok(ParticipantRole::Host),
            "participant" => Ok(ParticipantRole::Participant),
            _ => anyhow::bail!("Invalid participant role: {}", s),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantRole::Host => "host",
            ParticipantRole::Participant => "participant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: i64,
    pub meeting_id: String,
    pub user_id: String,
    pub joined_at: String,
    pub left_at: Option<String>,
    pub is_muted: bool,
    pub is_video_on: bool,
    pub role: ParticipantRole,
    pub socket_id: Option<String>,
}

impl Participant {
    pub fn is_active(&self) -> bool {
        self.left_at.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub id: String,
    pub meeting_id: String,
    pub created_by: Option<String>,
    pub full_text: String,
    pub segments: Vec<Segment>,
    pub is_final: bool,
    pub meta: Value,
    pub created_at: String,
    pub updated_at: String,
}

/// One provider result to merge into the meeting's open transcript.
#[derive(Debug, Clone)]
pub struct TranscriptAppend {
    pub meeting_id: String,
    pub created_by: Option<String>,
    pub text: String,
    pub segments: Vec<Segment>,
    pub is_final: bool,
    pub provider_response: Value,
}
