//! In-memory map of live connections and the rooms they are bound to.
//!
//! The registry is the single source of truth for "who is in which room
//! right now". Durable participant rows live in the session store; this only
//! tracks sockets.

use std::collections::HashMap;
use tokio::sync::RwLock;

use super::messages::ConnectionId;

/// A connection's room membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub connection_id: ConnectionId,
    pub user_id: String,
    pub meeting_id: String,
    pub room_code: String,
}

impl Binding {
    /// True when `key` names this binding's meeting by id or room code.
    pub fn matches(&self, key: &str) -> bool {
        self.meeting_id == key || self.room_code == key
    }
}

#[derive(Debug)]
struct ConnectionEntry {
    user_id: String,
    room: Option<(String, String)>,
}

#[derive(Debug, Default)]
struct PresenceState {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    // Members per meeting id, in join order.
    rooms: HashMap<String, Vec<ConnectionId>>,
}

impl PresenceState {
    fn unlink(&mut self, connection_id: &str, meeting_id: &str) {
        if let Some(members) = self.rooms.get_mut(meeting_id) {
            members.retain(|c| c != connection_id);
            if members.is_empty() {
                self.rooms.remove(meeting_id);
            }
        }
    }

    fn take_binding(&mut self, connection_id: &str) -> Option<Binding> {
        let entry = self.connections.get_mut(connection_id)?;
        let (meeting_id, room_code) = entry.room.take()?;
        let user_id = entry.user_id.clone();
        self.unlink(connection_id, &meeting_id);
        Some(Binding {
            connection_id: connection_id.to_string(),
            user_id,
            meeting_id,
            room_code,
        })
    }
}

#[derive(Debug, Default)]
pub struct PresenceRegistry {
    state: RwLock<PresenceState>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an authenticated connection with no room yet.
    pub async fn register(&self, connection_id: &str, user_id: &str) {
        self.state.write().await.connections.insert(
            connection_id.to_string(),
            ConnectionEntry {
                user_id: user_id.to_string(),
                room: None,
            },
        );
    }

    pub async fn user_of(&self, connection_id: &str) -> Option<String> {
        self.state
            .read()
            .await
            .connections
            .get(connection_id)
            .map(|e| e.user_id.clone())
    }

    pub async fn binding_of(&self, connection_id: &str) -> Option<Binding> {
        let state = self.state.read().await;
        let entry = state.connections.get(connection_id)?;
        let (meeting_id, room_code) = entry.room.clone()?;
        Some(Binding {
            connection_id: connection_id.to_string(),
            user_id: entry.user_id.clone(),
            meeting_id,
            room_code,
        })
    }

    pub async fn meeting_of(&self, connection_id: &str) -> Option<String> {
        self.binding_of(connection_id).await.map(|b| b.meeting_id)
    }

    /// Bind a connection to a room and return the members that were already
    /// there. `None` when the connection is unknown (never registered or
    /// already closed); a closed connection can never be rebound.
    ///
    /// Any previous binding must be released first.
    pub async fn bind(
        &self,
        connection_id: &str,
        meeting_id: &str,
        room_code: &str,
    ) -> Option<Vec<ConnectionId>> {
        let mut state = self.state.write().await;
        let entry = state.connections.get_mut(connection_id)?;
        let previous = entry
            .room
            .replace((meeting_id.to_string(), room_code.to_string()));
        if let Some((old_meeting, _)) = previous {
            state.unlink(connection_id, &old_meeting);
        }

        let members = state.rooms.entry(meeting_id.to_string()).or_default();
        let others: Vec<ConnectionId> = members
            .iter()
            .filter(|c| c.as_str() != connection_id)
            .cloned()
            .collect();
        if !members.iter().any(|c| c == connection_id) {
            members.push(connection_id.to_string());
        }
        Some(others)
    }

    /// Take the connection's binding. Returns it at most once per bind, so
    /// the caller that receives `Some` owns the teardown.
    pub async fn release(&self, connection_id: &str) -> Option<Binding> {
        self.state.write().await.take_binding(connection_id)
    }

    /// Forget the connection entirely, returning a binding still held.
    pub async fn close(&self, connection_id: &str) -> Option<Binding> {
        let mut state = self.state.write().await;
        let binding = state.take_binding(connection_id);
        state.connections.remove(connection_id);
        binding
    }

    pub async fn members(&self, meeting_id: &str) -> Vec<ConnectionId> {
        self.state
            .read()
            .await
            .rooms
            .get(meeting_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn is_member(&self, meeting_id: &str, connection_id: &str) -> bool {
        self.state
            .read()
            .await
            .rooms
            .get(meeting_id)
            .is_some_and(|m| m.iter().any(|c| c == connection_id))
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }
}
