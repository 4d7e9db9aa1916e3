//! End-to-end relay behavior through the public library API: joins,
//! teardown, host-only actions and transcript fan-out.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use huddle::auth::{IdentityVerifier, JwtVerifier, UserId};
use huddle::db::{Meeting, NewMeeting, ParticipantRole, SessionStore};
use huddle::signaling::{ClientMessage, Outbox, RoomBroadcaster, ServerMessage, SignalingRelay};
use huddle::transcription::{
    ProviderError, ProviderTranscript, RetryPolicy, TranscriptionJob, TranscriptionProvider,
    TranscriptionQueue, TranscriptionWorker,
};
use huddle::CoordinatorError;

const SECRET: &str = "integration-secret";

struct Harness {
    store: SessionStore,
    relay: Arc<SignalingRelay>,
    jwt: Arc<JwtVerifier>,
    meeting: Meeting,
}

struct Client {
    id: String,
    outbox: Outbox,
}

impl Client {
    fn drain(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.outbox.try_recv() {
            messages.push(message);
        }
        messages
    }

    fn count(&mut self, pred: impl Fn(&ServerMessage) -> bool) -> usize {
        self.drain().iter().filter(|m| pred(m)).count()
    }
}

impl Harness {
    async fn new() -> Self {
        let store = SessionStore::in_memory().unwrap();
        let jwt = Arc::new(JwtVerifier::new(SECRET));
        let verifier: Arc<dyn IdentityVerifier> = jwt.clone();
        let relay = Arc::new(SignalingRelay::new(store.clone(), verifier));
        let meeting = store
            .create_meeting(NewMeeting {
                title: Some("Standup".to_string()),
                host_id: "host".to_string(),
                is_live: true,
                ..Default::default()
            })
            .await
            .unwrap()
            .unwrap();
        Self {
            store,
            relay,
            jwt,
            meeting,
        }
    }

    /// Authenticate with a real token, then open a connection.
    async fn connect(&self, user: &str) -> Client {
        let token = self.jwt.issue(user, Duration::from_secs(600)).unwrap();
        let user_id: UserId = self.relay.authenticate(Some(&token)).unwrap();
        let (id, outbox) = self.relay.connect(&user_id).await;
        let mut client = Client { id, outbox };
        client.drain();
        client
    }

    async fn join(&self, user: &str) -> Client {
        let mut client = self.connect(user).await;
        self.relay
            .join_room(&client.id, &self.meeting.id)
            .await
            .unwrap();
        client.drain();
        client
    }

    async fn meeting(&self) -> Meeting {
        self.store
            .find_meeting(&self.meeting.id)
            .await
            .unwrap()
            .unwrap()
    }
}

fn is_user_left(m: &ServerMessage) -> bool {
    matches!(m, ServerMessage::UserLeft { .. })
}

#[tokio::test]
async fn test_bad_token_rejected() {
    let h = Harness::new().await;
    let forged = JwtVerifier::new("other-secret")
        .issue("host", Duration::from_secs(600))
        .unwrap();

    assert!(matches!(
        h.relay.authenticate(Some(&forged)),
        Err(CoordinatorError::Unauthorized(_))
    ));
    assert!(matches!(
        h.relay.authenticate(None),
        Err(CoordinatorError::Unauthorized(_))
    ));
    assert_eq!(h.relay.connection_count().await, 0);
}

#[tokio::test]
async fn test_standup_join_flow() {
    let h = Harness::new().await;
    assert_eq!(h.meeting.room_code.len(), 6);

    let mut host = h.connect("host").await;
    let mut guest = h.connect("u2").await;

    let present = h.relay.join_room(&host.id, &h.meeting.room_code).await.unwrap();
    assert!(present.is_empty());
    let present = h.relay.join_room(&guest.id, &h.meeting.id).await.unwrap();
    assert_eq!(present, vec![host.id.clone()]);

    assert_eq!(
        guest.drain(),
        vec![ServerMessage::AllUsers {
            users: vec![host.id.clone()]
        }]
    );
    assert!(host.drain().contains(&ServerMessage::UserJoined {
        connection_id: guest.id.clone(),
        user_id: "u2".to_string()
    }));

    let meeting = h.meeting().await;
    assert!(meeting.participants_id.contains(&"u2".to_string()));

    let host_row = h.store.participant(&meeting.id, "host").await.unwrap().unwrap();
    assert_eq!(host_row.role, ParticipantRole::Host);
    assert_eq!(host_row.socket_id.as_deref(), Some(host.id.as_str()));
}

#[tokio::test]
async fn test_unknown_meeting_creates_nothing() {
    let h = Harness::new().await;
    let mut client = h.connect("u2").await;

    h.relay
        .handle(
            &client.id,
            ClientMessage::JoinRoom {
                meeting_id: "no-such-room".to_string(),
            },
        )
        .await;

    assert_eq!(
        client.drain(),
        vec![ServerMessage::error("Meeting not found")]
    );
    assert!(h.relay.presence().meeting_of(&client.id).await.is_none());
    let rows = h.store.participants(&h.meeting.id).await.unwrap();
    assert!(rows.iter().all(|p| p.user_id != "u2"));
}

#[tokio::test]
async fn test_double_join_keeps_one_row() {
    let h = Harness::new().await;
    let first = h.join("u2").await;
    let second = h.join("u2").await;

    let rows: Vec<_> = h
        .store
        .participants(&h.meeting.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|p| p.user_id == "u2")
        .collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].socket_id.as_deref(), Some(second.id.as_str()));

    // The stale connection's teardown must not clobber the live binding.
    h.relay.disconnect(&first.id).await;
    let row = h.store.participant(&h.meeting.id, "u2").await.unwrap().unwrap();
    assert!(row.is_active());
    assert_eq!(row.socket_id.as_deref(), Some(second.id.as_str()));
}

#[tokio::test]
async fn test_leave_then_disconnect_emits_one_user_left() {
    let h = Harness::new().await;
    let mut host = h.join("host").await;
    let guest = h.join("u2").await;
    host.drain();

    h.relay
        .handle(&guest.id, ClientMessage::LeaveRoom { meeting_id: None })
        .await;
    h.relay.disconnect(&guest.id).await;
    h.relay.disconnect(&guest.id).await;

    assert_eq!(host.count(is_user_left), 1);

    let row = h.store.participant(&h.meeting.id, "u2").await.unwrap().unwrap();
    assert!(row.left_at.is_some());
    assert!(row.socket_id.is_none());

    // A closed connection cannot come back.
    assert!(h.relay.join_room(&guest.id, &h.meeting.id).await.is_err());
}

#[tokio::test]
async fn test_relay_forwards_with_sender_id() {
    let h = Harness::new().await;
    let caller = h.join("host").await;
    let mut callee = h.join("u2").await;

    h.relay
        .handle(
            &caller.id,
            ClientMessage::Offer {
                target: callee.id.clone(),
                sdp: json!({"type": "offer", "sdp": "v=0"}),
            },
        )
        .await;
    h.relay
        .handle(
            &caller.id,
            ClientMessage::IceCandidate {
                target: callee.id.clone(),
                candidate: json!({"candidate": "a=1"}),
            },
        )
        .await;

    assert_eq!(
        callee.drain(),
        vec![
            ServerMessage::Offer {
                sdp: json!({"type": "offer", "sdp": "v=0"}),
                caller: caller.id.clone()
            },
            ServerMessage::IceCandidate {
                candidate: json!({"candidate": "a=1"}),
                from: caller.id.clone()
            }
        ]
    );
}

#[tokio::test]
async fn test_group_chat_skips_sender() {
    let h = Harness::new().await;
    let mut a = h.join("host").await;
    let mut b = h.join("u2").await;
    let mut c = h.join("u3").await;
    a.drain();
    b.drain();

    h.relay
        .handle(
            &a.id,
            ClientMessage::SendGroupMessage {
                meeting_id: h.meeting.room_code.clone(),
                message: json!({"text": "hello"}),
            },
        )
        .await;

    let expected = ServerMessage::ReceiveGroupMessage {
        message: json!({"text": "hello"}),
    };
    assert!(a.drain().is_empty());
    assert_eq!(b.drain(), vec![expected.clone()]);
    assert_eq!(c.drain(), vec![expected]);
}

#[tokio::test]
async fn test_non_host_actions_are_forbidden_without_effect() {
    let h = Harness::new().await;
    let mut host = h.join("host").await;
    let mut guest = h.join("u2").await;
    let mut other = h.join("u3").await;
    host.drain();
    guest.drain();

    let actions = [
        ClientMessage::MuteUser {
            meeting_id: h.meeting.id.clone(),
            target: other.id.clone(),
        },
        ClientMessage::RemoveUser {
            meeting_id: h.meeting.id.clone(),
            target: other.id.clone(),
        },
        ClientMessage::LockRoom {
            meeting_id: h.meeting.id.clone(),
            lock: true,
        },
    ];

    for action in actions {
        h.relay.handle(&guest.id, action).await;

        assert!(matches!(
            guest.drain().as_slice(),
            [ServerMessage::Error { .. }]
        ));
        assert!(host.drain().is_empty());
        assert!(other.drain().is_empty());
    }

    assert!(!h.meeting().await.is_locked);
    let row = h.store.participant(&h.meeting.id, "u3").await.unwrap().unwrap();
    assert!(!row.is_muted);
    assert!(row.is_active());
    assert!(h.relay.presence().is_member(&h.meeting.id, &other.id).await);
}

#[tokio::test]
async fn test_host_mute_and_remove() {
    let h = Harness::new().await;
    let mut host = h.join("host").await;
    let mut guest = h.join("u2").await;
    let mut other = h.join("u3").await;
    host.drain();
    guest.drain();

    h.relay
        .handle(
            &host.id,
            ClientMessage::MuteUser {
                meeting_id: h.meeting.id.clone(),
                target: guest.id.clone(),
            },
        )
        .await;
    assert_eq!(guest.drain(), vec![ServerMessage::ForceMute]);
    assert!(h
        .store
        .participant(&h.meeting.id, "u2")
        .await
        .unwrap()
        .unwrap()
        .is_muted);

    h.relay
        .handle(
            &host.id,
            ClientMessage::RemoveUser {
                meeting_id: h.meeting.id.clone(),
                target: guest.id.clone(),
            },
        )
        .await;

    assert_eq!(guest.drain(), vec![ServerMessage::RemovedFromMeeting]);
    let removed = ServerMessage::UserRemoved {
        connection_id: guest.id.clone(),
    };
    assert_eq!(other.drain(), vec![removed]);
    assert!(host.drain().is_empty());
    assert!(!h.relay.presence().is_member(&h.meeting.id, &guest.id).await);

    // The evicted client's own disconnect does not announce a second departure.
    h.relay.disconnect(&guest.id).await;
    assert_eq!(other.count(is_user_left), 0);
}

#[tokio::test]
async fn test_host_action_on_foreign_target_is_noop() {
    let h = Harness::new().await;
    let mut host = h.join("host").await;
    let mut outsider = h.connect("u9").await;

    h.relay
        .handle(
            &host.id,
            ClientMessage::MuteUser {
                meeting_id: h.meeting.id.clone(),
                target: outsider.id.clone(),
            },
        )
        .await;

    assert!(host.drain().is_empty());
    assert!(outsider.drain().is_empty());
}

#[tokio::test]
async fn test_locked_room_admits_only_host() {
    let h = Harness::new().await;
    let mut host = h.join("host").await;
    let mut guest = h.join("u2").await;
    host.drain();

    h.relay
        .handle(
            &host.id,
            ClientMessage::LockRoom {
                meeting_id: h.meeting.id.clone(),
                lock: true,
            },
        )
        .await;
    assert_eq!(host.drain(), vec![ServerMessage::RoomLocked { locked: true }]);
    assert_eq!(guest.drain(), vec![ServerMessage::RoomLocked { locked: true }]);
    assert!(h.meeting().await.is_locked);

    let late = h.connect("u3").await;
    assert!(matches!(
        h.relay.join_room(&late.id, &h.meeting.id).await,
        Err(CoordinatorError::Forbidden(_))
    ));
    assert!(h.store.participant(&h.meeting.id, "u3").await.unwrap().is_none());

    let second_host_tab = h.connect("host").await;
    assert!(h
        .relay
        .join_room(&second_host_tab.id, &h.meeting.id)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_rejoin_other_room_leaves_first() {
    let h = Harness::new().await;
    let other_meeting = h
        .store
        .create_meeting(NewMeeting {
            host_id: "someone".to_string(),
            is_live: true,
            ..Default::default()
        })
        .await
        .unwrap()
        .unwrap();

    let mut host = h.join("host").await;
    let guest = h.join("u2").await;
    host.drain();

    h.relay
        .join_room(&guest.id, &other_meeting.id)
        .await
        .unwrap();

    assert_eq!(host.count(is_user_left), 1);
    assert_eq!(
        h.relay.presence().meeting_of(&guest.id).await.as_deref(),
        Some(other_meeting.id.as_str())
    );
}

struct EchoProvider;

#[async_trait]
impl TranscriptionProvider for EchoProvider {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn transcribe(
        &self,
        audio: &[u8],
        _file_name: &str,
    ) -> Result<ProviderTranscript, ProviderError> {
        let text = String::from_utf8_lossy(audio).to_string();
        Ok(ProviderTranscript {
            text,
            ..Default::default()
        })
    }
}

#[tokio::test]
async fn test_transcript_update_reaches_room() {
    let h = Harness::new().await;
    let mut host = h.join("host").await;
    let mut guest = h.join("u2").await;
    let mut outsider = h.connect("u9").await;
    host.drain();

    let broadcaster: Arc<dyn RoomBroadcaster> = h.relay.clone();
    let (queue, _worker) = TranscriptionQueue::start(TranscriptionWorker::new(
        Arc::new(EchoProvider),
        h.store.clone(),
        broadcaster,
        RetryPolicy::default(),
    ));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("transcribe_1_chunk.webm");
    std::fs::write(&path, "good morning").unwrap();
    queue
        .enqueue(TranscriptionJob {
            audio_path: path.clone(),
            meeting_id: h.meeting.id.clone(),
            user_id: "host".to_string(),
            is_final: true,
        })
        .unwrap();

    let update = tokio::time::timeout(Duration::from_secs(10), guest.outbox.recv())
        .await
        .unwrap()
        .unwrap();
    match update {
        ServerMessage::TranscriptUpdate {
            meeting_id,
            full_text,
            is_final,
            ..
        } => {
            assert_eq!(meeting_id, h.meeting.id);
            assert_eq!(full_text, "good morning");
            assert!(is_final);
        }
        other => panic!("unexpected message {:?}", other),
    }
    assert!(matches!(
        host.drain().as_slice(),
        [ServerMessage::TranscriptUpdate { .. }]
    ));
    assert!(outsider.drain().is_empty());

    // The worker releases the audio right after broadcasting.
    for _ in 0..200 {
        if !path.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!path.exists());
}
