//! Wire format of the realtime connection.
//!
//! Every frame is a JSON object tagged by `type`. Negotiation payloads
//! (`sdp`, `candidate`) and chat bodies are opaque JSON and forwarded as-is.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::Segment;

pub type ConnectionId = String;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    JoinRoom { meeting_id: String },
    Offer { target: ConnectionId, sdp: Value },
    Answer { target: ConnectionId, sdp: Value },
    IceCandidate { target: ConnectionId, candidate: Value },
    #[serde(rename_all = "camelCase")]
    MuteUser {
        meeting_id: String,
        target: ConnectionId,
    },
    #[serde(rename_all = "camelCase")]
    RemoveUser {
        meeting_id: String,
        target: ConnectionId,
    },
    #[serde(rename_all = "camelCase")]
    LockRoom { meeting_id: String, lock: bool },
    #[serde(rename_all = "camelCase")]
    SendGroupMessage { meeting_id: String, message: Value },
    #[serde(rename_all = "camelCase")]
    LeaveRoom {
        #[serde(default)]
        meeting_id: Option<String>,
    },
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join-room",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice-candidate",
            Self::MuteUser { .. } => "mute-user",
            Self::RemoveUser { .. } => "remove-user",
            Self::LockRoom { .. } => "lock-room",
            Self::SendGroupMessage { .. } => "send-group-message",
            Self::LeaveRoom { .. } => "leave-room",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// First frame after authentication; tells the client its own connection id.
    #[serde(rename_all = "camelCase")]
    Connected {
        connection_id: ConnectionId,
        user_id: String,
    },
    AllUsers { users: Vec<ConnectionId> },
    #[serde(rename_all = "camelCase")]
    UserJoined {
        connection_id: ConnectionId,
        user_id: String,
    },
    Offer { sdp: Value, caller: ConnectionId },
    Answer { sdp: Value, responder: ConnectionId },
    IceCandidate { candidate: Value, from: ConnectionId },
    ForceMute,
    RemovedFromMeeting,
    #[serde(rename_all = "camelCase")]
    UserRemoved { connection_id: ConnectionId },
    RoomLocked { locked: bool },
    ReceiveGroupMessage { message: Value },
    #[serde(rename_all = "camelCase")]
    UserLeft {
        connection_id: ConnectionId,
        user_id: String,
    },
    #[serde(rename_all = "camelCase")]
    TranscriptUpdate {
        transcript_id: String,
        meeting_id: String,
        text: String,
        full_text: String,
        segments: Vec<Segment>,
        is_final: bool,
    },
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
