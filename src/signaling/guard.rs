//! Authorization for host-only room actions.

use tracing::{debug, warn};

use crate::db::{Meeting, SessionStore};

#[derive(Clone)]
pub struct HostGuard {
    store: SessionStore,
}

impl HostGuard {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    /// The meeting named by `meeting_key` (id or room code) when `user_id` is
    /// its host. Unknown meetings and storage failures deny.
    pub async fn authorize(&self, user_id: &str, meeting_key: &str) -> Option<Meeting> {
        match self.store.resolve_meeting(meeting_key).await {
            Ok(Some(meeting)) if meeting.host_id == user_id => Some(meeting),
            Ok(Some(_)) => {
                debug!("User {} is not host of meeting {}", user_id, meeting_key);
                None
            }
            Ok(None) => {
                debug!("Host check for unknown meeting {}", meeting_key);
                None
            }
            Err(e) => {
                warn!("Host check for meeting {} failed: {}", meeting_key, e);
                None
            }
        }
    }

    pub async fn check_host(&self, user_id: &str, meeting_key: &str) -> bool {
        self.authorize(user_id, meeting_key).await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewMeeting;

    #[tokio::test]
    async fn test_only_host_passes() {
        let store = SessionStore::in_memory().unwrap();
        let meeting = store
            .create_meeting(NewMeeting {
                host_id: "u1".to_string(),
                is_live: true,
                ..Default::default()
            })
            .await
            .unwrap()
            .unwrap();
        let guard = HostGuard::new(store);

        assert!(guard.check_host("u1", &meeting.id).await);
        assert!(guard.check_host("u1", &meeting.room_code).await);
        assert!(!guard.check_host("u2", &meeting.id).await);
        assert!(!guard.check_host("u1", "missing").await);
    }
}
