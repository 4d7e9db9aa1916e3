//! Signaling relay: room membership, negotiation forwarding and host actions.
//!
//! Each live connection owns an unbounded outbox drained by its socket
//! writer. Room fan-out walks the presence registry and pushes into those
//! outboxes, so per-connection ordering follows emission order.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::guard::HostGuard;
use super::messages::{ClientMessage, ConnectionId, ServerMessage};
use super::presence::{Binding, PresenceRegistry};
use crate::auth::{IdentityVerifier, UserId};
use crate::db::{Meeting, ParticipantRole, SessionStore};
use crate::error::{CoordinatorError, CoordinatorResult};

pub type Outbox = mpsc::UnboundedReceiver<ServerMessage>;

/// Room-scoped push used by components outside the relay.
#[async_trait]
pub trait RoomBroadcaster: Send + Sync {
    /// Deliver `message` to every connection bound to `meeting_id`.
    /// Returns the number of connections it was queued for.
    async fn broadcast_to_room(&self, meeting_id: &str, message: ServerMessage) -> usize;
}

pub struct SignalingRelay {
    store: SessionStore,
    verifier: Arc<dyn IdentityVerifier>,
    guard: HostGuard,
    presence: PresenceRegistry,
    outboxes: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<ServerMessage>>>,
}

impl SignalingRelay {
    pub fn new(store: SessionStore, verifier: Arc<dyn IdentityVerifier>) -> Self {
        Self {
            guard: HostGuard::new(store.clone()),
            store,
            verifier,
            presence: PresenceRegistry::new(),
            outboxes: RwLock::new(HashMap::new()),
        }
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    /// Resolve the connection's identity. Runs before any connection state exists.
    pub fn authenticate(&self, token: Option<&str>) -> CoordinatorResult<UserId> {
        match token {
            Some(token) => self.verifier.verify(token),
            None => Err(CoordinatorError::unauthorized("No token provided")),
        }
    }

    /// Register an authenticated connection and hand back its outbox.
    pub async fn connect(&self, user_id: &str) -> (ConnectionId, Outbox) {
        let connection_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();

        self.outboxes
            .write()
            .await
            .insert(connection_id.clone(), tx);
        self.presence.register(&connection_id, user_id).await;

        info!("Connection {} opened for user {}", connection_id, user_id);
        self.send_to(
            &connection_id,
            ServerMessage::Connected {
                connection_id: connection_id.clone(),
                user_id: user_id.to_string(),
            },
        )
        .await;

        (connection_id, rx)
    }

    /// Dispatch one inbound message. Failures are reported to the sender as
    /// an `error` frame and never affect other connections.
    pub async fn handle(&self, connection_id: &str, message: ClientMessage) {
        let kind = message.kind();
        debug!("{} from {}", kind, connection_id);

        let result = match message {
            ClientMessage::JoinRoom { meeting_id } => {
                self.join_room(connection_id, &meeting_id).await.map(|_| ())
            }
            ClientMessage::Offer { target, sdp } => {
                self.forward(
                    &target,
                    ServerMessage::Offer {
                        sdp,
                        caller: connection_id.to_string(),
                    },
                )
                .await;
                Ok(())
            }
            ClientMessage::Answer { target, sdp } => {
                self.forward(
                    &target,
                    ServerMessage::Answer {
                        sdp,
                        responder: connection_id.to_string(),
                    },
                )
                .await;
                Ok(())
            }
            ClientMessage::IceCandidate { target, candidate } => {
                self.forward(
                    &target,
                    ServerMessage::IceCandidate {
                        candidate,
                        from: connection_id.to_string(),
                    },
                )
                .await;
                Ok(())
            }
            ClientMessage::MuteUser { meeting_id, target } => {
                self.mute_user(connection_id, &meeting_id, &target).await
            }
            ClientMessage::RemoveUser { meeting_id, target } => {
                self.remove_user(connection_id, &meeting_id, &target).await
            }
            ClientMessage::LockRoom { meeting_id, lock } => {
                self.lock_room(connection_id, &meeting_id, lock).await
            }
            ClientMessage::SendGroupMessage {
                meeting_id,
                message,
            } => self.send_group_message(connection_id, &meeting_id, message).await,
            ClientMessage::LeaveRoom { .. } => {
                self.leave_room(connection_id).await;
                Ok(())
            }
        };

        if let Err(err) = result {
            debug!("{} from {} rejected: {}", kind, connection_id, err);
            self.send_to(connection_id, ServerMessage::error(client_message(&err)))
                .await;
        }
    }

    /// Bind the connection to a meeting (by id or room code) and return the
    /// connection ids that were already in the room.
    pub async fn join_room(
        &self,
        connection_id: &str,
        meeting_key: &str,
    ) -> CoordinatorResult<Vec<ConnectionId>> {
        let user_id = self.registered_user(connection_id).await?;
        let meeting = self
            .store
            .resolve_meeting(meeting_key)
            .await?
            .ok_or_else(|| CoordinatorError::not_found("Meeting not found"))?;

        let is_host = meeting.host_id == user_id;
        if meeting.is_locked && !is_host {
            return Err(CoordinatorError::forbidden("Meeting is locked"));
        }

        let already_bound = match self.presence.binding_of(connection_id).await {
            Some(current) if current.meeting_id == meeting.id => true,
            Some(_) => {
                self.leave_room(connection_id).await;
                false
            }
            None => false,
        };

        let role = if is_host {
            ParticipantRole::Host
        } else {
            ParticipantRole::Participant
        };
        self.store
            .record_join(&meeting.id, &user_id, connection_id, role)
            .await?;

        let Some(others) = self
            .presence
            .bind(connection_id, &meeting.id, &meeting.room_code)
            .await
        else {
            // Closed while the join was being recorded.
            self.store
                .mark_left_by_socket(&meeting.id, connection_id)
                .await?;
            return Err(CoordinatorError::not_found("Connection closed"));
        };

        info!(
            "User {} joined meeting {} on {} ({} already present)",
            user_id,
            meeting.id,
            connection_id,
            others.len()
        );

        self.send_to(
            connection_id,
            ServerMessage::AllUsers {
                users: others.clone(),
            },
        )
        .await;

        if !already_bound {
            let joined = ServerMessage::UserJoined {
                connection_id: connection_id.to_string(),
                user_id,
            };
            let outboxes = self.outboxes.read().await;
            for other in &others {
                if let Some(tx) = outboxes.get(other) {
                    let _ = tx.send(joined.clone());
                }
            }
        }

        Ok(others)
    }

    /// Leave the bound room, if any. Safe to call repeatedly.
    pub async fn leave_room(&self, connection_id: &str) -> bool {
        match self.presence.release(connection_id).await {
            Some(binding) => {
                self.teardown(binding).await;
                true
            }
            None => false,
        }
    }

    /// Final teardown for a closed connection. Emits at most one `user-left`
    /// even when the client already left explicitly.
    pub async fn disconnect(&self, connection_id: &str) {
        let binding = self.presence.close(connection_id).await;
        self.outboxes.write().await.remove(connection_id);

        if let Some(binding) = binding {
            self.teardown(binding).await;
        }
        info!("Connection {} closed", connection_id);
    }

    async fn teardown(&self, binding: Binding) {
        if let Err(e) = self
            .store
            .mark_left_by_socket(&binding.meeting_id, &binding.connection_id)
            .await
        {
            warn!(
                "Failed to record leave for {} in meeting {}: {}",
                binding.connection_id, binding.meeting_id, e
            );
        }

        self.broadcast(
            &binding.meeting_id,
            ServerMessage::UserLeft {
                connection_id: binding.connection_id.clone(),
                user_id: binding.user_id.clone(),
            },
            Some(&binding.connection_id),
        )
        .await;

        debug!(
            "User {} left meeting {} from {}",
            binding.user_id, binding.meeting_id, binding.connection_id
        );
    }

    async fn forward(&self, target: &str, message: ServerMessage) {
        if !self.send_to(target, message).await {
            debug!("Dropping message for unknown connection {}", target);
        }
    }

    async fn send_group_message(
        &self,
        connection_id: &str,
        meeting_key: &str,
        message: Value,
    ) -> CoordinatorResult<()> {
        let binding = self
            .presence
            .binding_of(connection_id)
            .await
            .filter(|b| b.matches(meeting_key))
            .ok_or_else(|| CoordinatorError::forbidden("Not a member of this meeting"))?;

        self.broadcast(
            &binding.meeting_id,
            ServerMessage::ReceiveGroupMessage { message },
            Some(connection_id),
        )
        .await;
        Ok(())
    }

    // Host actions

    async fn authorize_host(
        &self,
        connection_id: &str,
        meeting_key: &str,
    ) -> CoordinatorResult<Meeting> {
        let user_id = self.registered_user(connection_id).await?;
        self.guard
            .authorize(&user_id, meeting_key)
            .await
            .ok_or_else(|| CoordinatorError::forbidden("Only the host can do that"))
    }

    /// True when `target` is currently bound to `meeting_id`. Host actions
    /// aimed at connections outside the meeting are ignored.
    async fn target_in_meeting(&self, meeting_id: &str, target: &str) -> bool {
        let present = self.presence.is_member(meeting_id, target).await;
        if !present {
            debug!(
                "Ignoring host action on {} (not in meeting {})",
                target, meeting_id
            );
        }
        present
    }

    pub async fn mute_user(
        &self,
        connection_id: &str,
        meeting_key: &str,
        target: &str,
    ) -> CoordinatorResult<()> {
        let meeting = self.authorize_host(connection_id, meeting_key).await?;
        if !self.target_in_meeting(&meeting.id, target).await {
            return Ok(());
        }

        self.store
            .set_muted_by_socket(&meeting.id, target, true)
            .await?;
        self.send_to(target, ServerMessage::ForceMute).await;
        info!("Muted {} in meeting {}", target, meeting.id);
        Ok(())
    }

    /// Evict `target` from the room. Its binding is released here, so a
    /// later disconnect of the removed client emits no `user-left`.
    pub async fn remove_user(
        &self,
        connection_id: &str,
        meeting_key: &str,
        target: &str,
    ) -> CoordinatorResult<()> {
        let meeting = self.authorize_host(connection_id, meeting_key).await?;
        if !self.target_in_meeting(&meeting.id, target).await {
            return Ok(());
        }

        if self.presence.release(target).await.is_none() {
            return Ok(());
        }
        self.store.mark_left_by_socket(&meeting.id, target).await?;

        self.send_to(target, ServerMessage::RemovedFromMeeting).await;
        self.broadcast(
            &meeting.id,
            ServerMessage::UserRemoved {
                connection_id: target.to_string(),
            },
            Some(connection_id),
        )
        .await;
        info!("Removed {} from meeting {}", target, meeting.id);
        Ok(())
    }

    pub async fn lock_room(
        &self,
        connection_id: &str,
        meeting_key: &str,
        lock: bool,
    ) -> CoordinatorResult<()> {
        let meeting = self.authorize_host(connection_id, meeting_key).await?;

        self.store.set_meeting_locked(&meeting.id, lock).await?;
        self.broadcast(&meeting.id, ServerMessage::RoomLocked { locked: lock }, None)
            .await;
        info!(
            "Meeting {} {}",
            meeting.id,
            if lock { "locked" } else { "unlocked" }
        );
        Ok(())
    }

    // Delivery

    pub async fn send_to(&self, connection_id: &str, message: ServerMessage) -> bool {
        self.outboxes
            .read()
            .await
            .get(connection_id)
            .is_some_and(|tx| tx.send(message).is_ok())
    }

    /// Fan out to the room, skipping `except`. Returns the delivery count.
    pub async fn broadcast(
        &self,
        meeting_id: &str,
        message: ServerMessage,
        except: Option<&str>,
    ) -> usize {
        let members = self.presence.members(meeting_id).await;
        let outboxes = self.outboxes.read().await;

        members
            .iter()
            .filter(|c| Some(c.as_str()) != except)
            .filter_map(|c| outboxes.get(c))
            .filter(|tx| tx.send(message.clone()).is_ok())
            .count()
    }

    pub async fn connection_count(&self) -> usize {
        self.outboxes.read().await.len()
    }

    async fn registered_user(&self, connection_id: &str) -> CoordinatorResult<UserId> {
        self.presence
            .user_of(connection_id)
            .await
            .ok_or_else(|| CoordinatorError::unauthorized("Connection is not registered"))
    }
}

#[async_trait]
impl RoomBroadcaster for SignalingRelay {
    async fn broadcast_to_room(&self, meeting_id: &str, message: ServerMessage) -> usize {
        self.broadcast(meeting_id, message, None).await
    }
}

/// Message shown to the client. Internal failures are not echoed verbatim.
fn client_message(err: &CoordinatorError) -> String {
    match err {
        CoordinatorError::Storage(_) | CoordinatorError::Resource(_) => {
            "Internal server error".to_string()
        }
        other => other.to_string(),
    }
}
