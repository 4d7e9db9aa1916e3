//! Session Store: durable meetings, participants and transcripts.
//!
//! Repositories are plain rusqlite functions over a `&Connection`.
//! [`SessionStore`] owns the single connection and runs every call on the
//! blocking pool, so async callers never hold the database on a runtime thread.

pub mod init;
pub mod meetings;
pub mod participants;
pub mod schemas;
pub mod transcripts;

use anyhow::{anyhow, Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub use init::{migrate, open_db};
pub use meetings::MeetingRepository;
pub use participants::ParticipantRepository;
pub use schemas::{
    Meeting, NewMeeting, Participant, ParticipantRole, Recurrence, Segment, Transcript,
    TranscriptAppend,
};
pub use transcripts::TranscriptRepository;

#[derive(Clone)]
pub struct SessionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SessionStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_connection(open_db(path)?))
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        migrate(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `f` against the connection on the blocking pool. Each call holds the
    /// connection lock for its whole duration, which makes multi-statement
    /// closures atomic with respect to other store calls.
    pub async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| anyhow!("Database lock poisoned"))?;
            f(&mut guard)
        })
        .await
        .context("Database task failed")?
    }

    // Meetings

    /// Create a meeting plus its host participant row. `None` when no unique
    /// room code could be allocated.
    pub async fn create_meeting(&self, meeting: NewMeeting) -> Result<Option<Meeting>> {
        self.call(move |conn| {
            let tx = conn.transaction().context("Failed to begin transaction")?;
            let Some(created) = MeetingRepository::insert(&tx, &meeting)? else {
                return Ok(None);
            };
            ParticipantRepository::insert_host(&tx, &created.id, &created.host_id)?;
            tx.commit().context("Failed to commit meeting creation")?;
            Ok(Some(created))
        })
        .await
    }

    pub async fn find_meeting(&self, id: &str) -> Result<Option<Meeting>> {
        let id = id.to_string();
        self.call(move |conn| MeetingRepository::get(conn, &id)).await
    }

    pub async fn find_meeting_by_room_code(&self, room_code: &str) -> Result<Option<Meeting>> {
        let room_code = room_code.to_string();
        self.call(move |conn| MeetingRepository::find_by_room_code(conn, &room_code))
            .await
    }

    /// Canonical id or room code.
    pub async fn resolve_meeting(&self, id_or_code: &str) -> Result<Option<Meeting>> {
        let key = id_or_code.to_string();
        self.call(move |conn| MeetingRepository::resolve(conn, &key)).await
    }

    pub async fn meetings_for_host(&self, host_id: &str) -> Result<Vec<Meeting>> {
        let host_id = host_id.to_string();
        self.call(move |conn| MeetingRepository::list_by_host(conn, &host_id))
            .await
    }

    /// Meetings the user belongs to scheduled at or after `now`.
    pub async fn upcoming_meetings(&self, user_id: &str, now: &str) -> Result<Vec<Meeting>> {
        let (user_id, now) = (user_id.to_string(), now.to_string());
        self.call(move |conn| MeetingRepository::list_upcoming(conn, &user_id, &now))
            .await
    }

    pub async fn set_meeting_live(&self, id: &str, is_live: bool) -> Result<bool> {
        let id = id.to_string();
        self.call(move |conn| MeetingRepository::set_live(conn, &id, is_live))
            .await
    }

    pub async fn set_meeting_locked(&self, id: &str, is_locked: bool) -> Result<bool> {
        let id = id.to_string();
        self.call(move |conn| MeetingRepository::set_locked(conn, &id, is_locked))
            .await
    }

    // Participants

    /// Join bookkeeping: add the user to the meeting's member set and upsert
    /// its participant row bound to `socket_id`.
    pub async fn record_join(
        &self,
        meeting_id: &str,
        user_id: &str,
        socket_id: &str,
        role: ParticipantRole,
    ) -> Result<Participant> {
        let (meeting_id, user_id, socket_id) = (
            meeting_id.to_string(),
            user_id.to_string(),
            socket_id.to_string(),
        );
        self.call(move |conn| {
            let tx = conn.transaction().context("Failed to begin transaction")?;
            MeetingRepository::add_member(&tx, &meeting_id, &user_id)?;
            let participant =
                ParticipantRepository::upsert_join(&tx, &meeting_id, &user_id, &socket_id, role)?;
            tx.commit().context("Failed to commit join")?;
            Ok(participant)
        })
        .await
    }

    pub async fn participants(&self, meeting_id: &str) -> Result<Vec<Participant>> {
        let meeting_id = meeting_id.to_string();
        self.call(move |conn| ParticipantRepository::list_by_meeting(conn, &meeting_id))
            .await
    }

    pub async fn participant(&self, meeting_id: &str, user_id: &str) -> Result<Option<Participant>> {
        let (meeting_id, user_id) = (meeting_id.to_string(), user_id.to_string());
        self.call(move |conn| ParticipantRepository::get(conn, &meeting_id, &user_id))
            .await
    }

    pub async fn mark_left_by_socket(&self, meeting_id: &str, socket_id: &str) -> Result<usize> {
        let (meeting_id, socket_id) = (meeting_id.to_string(), socket_id.to_string());
        self.call(move |conn| ParticipantRepository::mark_left_by_socket(conn, &meeting_id, &socket_id))
            .await
    }

    pub async fn mark_left_by_user(&self, meeting_id: &str, user_id: &str) -> Result<usize> {
        let (meeting_id, user_id) = (meeting_id.to_string(), user_id.to_string());
        self.call(move |conn| ParticipantRepository::mark_left_by_user(conn, &meeting_id, &user_id))
            .await
    }

    pub async fn set_muted_by_socket(
        &self,
        meeting_id: &str,
        socket_id: &str,
        is_muted: bool,
    ) -> Result<usize> {
        let (meeting_id, socket_id) = (meeting_id.to_string(), socket_id.to_string());
        self.call(move |conn| {
            ParticipantRepository::set_muted_by_socket(conn, &meeting_id, &socket_id, is_muted)
        })
        .await
    }

    // Transcripts

    pub async fn append_transcript(&self, append: TranscriptAppend) -> Result<Transcript> {
        self.call(move |conn| TranscriptRepository::append(conn, &append))
            .await
    }

    pub async fn transcripts(&self, meeting_id: &str) -> Result<Vec<Transcript>> {
        let meeting_id = meeting_id.to_string();
        self.call(move |conn| TranscriptRepository::list_by_meeting(conn, &meeting_id))
            .await
    }

    pub async fn open_transcript(&self, meeting_id: &str) -> Result<Option<Transcript>> {
        let meeting_id = meeting_id.to_string();
        self.call(move |conn| TranscriptRepository::find_latest_open(conn, &meeting_id))
            .await
    }
}
