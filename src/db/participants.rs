//! Participant record persistence.
//!
//! One row per (meeting, user). Joining again rewrites the same row.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::schemas::{now_timestamp, Participant, ParticipantRole};

const PARTICIPANT_COLUMNS: &str =
    "id, meeting_id, user_id, joined_at, left_at, is_muted, is_video_on, role, socket_id";

fn map_participant(row: &Row<'_>) -> rusqlite::Result<Participant> {
    let role: String = row.get(7)?;
    Ok(Participant {
        id: row.get(0)?,
        meeting_id: row.get(1)?,
        user_id: row.get(2)?,
        joined_at: row.get(3)?,
        left_at: row.get(4)?,
        is_muted: row.get(5)?,
        is_video_on: row.get(6)?,
        role: ParticipantRole::parse(&role).map_err(|_| rusqlite::Error::InvalidQuery)?,
        socket_id: row.get(8)?,
    })
}

/// Repository for participant records.
pub struct ParticipantRepository;

impl ParticipantRepository {
    /// Create the host's row when a meeting is created. Not bound to a socket yet.
    pub fn insert_host(conn: &Connection, meeting_id: &str, user_id: &str) -> Result<Participant> {
        conn.execute(
            "INSERT INTO participants (meeting_id, user_id, joined_at, role) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(meeting_id, user_id) DO UPDATE SET role = excluded.role",
            params![
                meeting_id,
                user_id,
                now_timestamp(),
                ParticipantRole::Host.as_str()
            ],
        )
        .context("Failed to insert host participant")?;

        Self::get(conn, meeting_id, user_id)?.context("Host participant missing after insert")
    }

    /// Atomic find-or-create-then-update for a join: stamps `joined_at`,
    /// clears `left_at` and binds `socket_id`, replacing any previous binding.
    /// The role is only set when the row is created.
    pub fn upsert_join(
        conn: &Connection,
        meeting_id: &str,
        user_id: &str,
        socket_id: &str,
        role: ParticipantRole,
    ) -> Result<Participant> {
        conn.execute(
            "INSERT INTO participants (meeting_id, user_id, joined_at, left_at, role, socket_id) \
             VALUES (?1, ?2, ?3, NULL, ?4, ?5) \
             ON CONFLICT(meeting_id, user_id) DO UPDATE SET \
                joined_at = excluded.joined_at, left_at = NULL, socket_id = excluded.socket_id",
            params![meeting_id, user_id, now_timestamp(), role.as_str(), socket_id],
        )
        .context("Failed to upsert participant")?;

        Self::get(conn, meeting_id, user_id)?.context("Participant missing after upsert")
    }

    pub fn get(conn: &Connection, meeting_id: &str, user_id: &str) -> Result<Option<Participant>> {
        conn.query_row(
            &format!(
                "SELECT {} FROM participants WHERE meeting_id = ?1 AND user_id = ?2",
                PARTICIPANT_COLUMNS
            ),
            params![meeting_id, user_id],
            map_participant,
        )
        .optional()
        .context("Failed to query participant")
    }

    /// All participant rows of a meeting, in join order.
    pub fn list_by_meeting(conn: &Connection, meeting_id: &str) -> Result<Vec<Participant>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM participants WHERE meeting_id = ?1 ORDER BY id",
                PARTICIPANT_COLUMNS
            ))
            .context("Failed to prepare participants query")?;

        let participants = stmt
            .query_map(params![meeting_id], map_participant)
            .context("Failed to query participants")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to map participants")?;

        Ok(participants)
    }

    /// Leave/disconnect teardown for the row currently bound to `socket_id`.
    /// A stale socket (row already rebound by a newer connection) matches nothing.
    pub fn mark_left_by_socket(conn: &Connection, meeting_id: &str, socket_id: &str) -> Result<usize> {
        conn.execute(
            "UPDATE participants SET left_at = ?1, socket_id = NULL \
             WHERE meeting_id = ?2 AND socket_id = ?3",
            params![now_timestamp(), meeting_id, socket_id],
        )
        .context("Failed to mark participant left")
    }

    pub fn mark_left_by_user(conn: &Connection, meeting_id: &str, user_id: &str) -> Result<usize> {
        conn.execute(
            "UPDATE participants SET left_at = ?1, socket_id = NULL \
             WHERE meeting_id = ?2 AND user_id = ?3",
            params![now_timestamp(), meeting_id, user_id],
        )
        .context("Failed to mark participant left")
    }

    pub fn set_muted_by_socket(
        conn: &Connection,
        meeting_id: &str,
        socket_id: &str,
        is_muted: bool,
    ) -> Result<usize> {
        conn.execute(
            "UPDATE participants SET is_muted = ?1 WHERE meeting_id = ?2 AND socket_id = ?3",
            params![is_muted, meeting_id, socket_id],
        )
        .context("Failed to update participant mute state")
    }
}
