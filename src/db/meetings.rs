//! Meeting record persistence.
//!
//! Raw SQL with rusqlite, no ORM. `participants_id` lives in the
//! `meeting_members` table and is loaded alongside each meeting.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::schemas::{now_timestamp, Meeting, NewMeeting, Recurrence};

pub const ROOM_CODE_LEN: usize = 6;
const ROOM_CODE_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ROOM_CODE_ATTEMPTS: usize = 16;

const MEETING_COLUMNS: &str = "id, title, host_id, room_code, is_live, is_locked, schedule_at, \
                               recurrence_rule, recurrence_end, created_at";

/// Short lowercase alphanumeric alias. Uniqueness is checked at insert time.
pub fn generate_room_code() -> String {
    let mut n = uuid::Uuid::new_v4().as_u128();
    let base = ROOM_CODE_ALPHABET.len() as u128;
    let mut code = String::with_capacity(ROOM_CODE_LEN);
    for _ in 0..ROOM_CODE_LEN {
        code.push(ROOM_CODE_ALPHABET[(n % base) as usize] as char);
        n /= base;
    }
    code
}

fn map_meeting(row: &Row<'_>) -> rusqlite::Result<Meeting> {
    let recurrence_rule: Option<String> = row.get(7)?;
    let recurrence_end: Option<String> = row.get(8)?;

    Ok(Meeting {
        id: row.get(0)?,
        title: row.get(1)?,
        host_id: row.get(2)?,
        room_code: row.get(3)?,
        is_live: row.get(4)?,
        is_locked: row.get(5)?,
        schedule_at: row.get(6)?,
        recurrence: recurrence_rule.map(|rrule| Recurrence {
            rrule,
            end_date: recurrence_end,
        }),
        participants_id: Vec::new(),
        created_at: row.get(9)?,
    })
}

/// Repository for meeting records.
pub struct MeetingRepository;

impl MeetingRepository {
    /// Insert a meeting with a freshly allocated room code and add the host
    /// to its member set. Returns `None` if no free room code was found.
    pub fn insert(conn: &Connection, meeting: &NewMeeting) -> Result<Option<Meeting>> {
        let Some(room_code) = Self::allocate_room_code(conn)? else {
            return Ok(None);
        };

        let id = uuid::Uuid::new_v4().to_string();
        let now = now_timestamp();
        let schedule_at = meeting.schedule_at.clone().unwrap_or_else(|| now.clone());
        let (rrule, recurrence_end) = match &meeting.recurrence {
            Some(r) => (Some(r.rrule.as_str()), r.end_date.as_deref()),
            None => (None, None),
        };

        conn.execute(
            "INSERT INTO meetings (id, title, host_id, room_code, is_live, is_locked, schedule_at, \
             recurrence_rule, recurrence_end, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8, ?9)",
            params![
                id,
                meeting.title,
                meeting.host_id,
                room_code,
                meeting.is_live,
                schedule_at,
                rrule,
                recurrence_end,
                now,
            ],
        )
        .context("Failed to insert meeting")?;

        Self::add_member(conn, &id, &meeting.host_id)?;

        Self::get(conn, &id)
    }

    fn allocate_room_code(conn: &Connection) -> Result<Option<String>> {
        for _ in 0..ROOM_CODE_ATTEMPTS {
            let code = generate_room_code();
            if !Self::room_code_exists(conn, &code)? {
                return Ok(Some(code));
            }
        }
        Ok(None)
    }

    pub fn room_code_exists(conn: &Connection, room_code: &str) -> Result<bool> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM meetings WHERE room_code = ?1",
                params![room_code],
                |row| row.get(0),
            )
            .context("Failed to check room code")?;
        Ok(count > 0)
    }

    /// Get a meeting by canonical ID.
    pub fn get(conn: &Connection, id: &str) -> Result<Option<Meeting>> {
        let meeting = conn
            .query_row(
                &format!("SELECT {} FROM meetings WHERE id = ?1", MEETING_COLUMNS),
                params![id],
                map_meeting,
            )
            .optional()
            .context("Failed to query meeting")?;

        meeting.map(|m| Self::with_members(conn, m)).transpose()
    }

    /// Get a meeting by its room code alias.
    pub fn find_by_room_code(conn: &Connection, room_code: &str) -> Result<Option<Meeting>> {
        let meeting = conn
            .query_row(
                &format!("SELECT {} FROM meetings WHERE room_code = ?1", MEETING_COLUMNS),
                params![room_code],
                map_meeting,
            )
            .optional()
            .context("Failed to query meeting by room code")?;

        meeting.map(|m| Self::with_members(conn, m)).transpose()
    }

    /// Canonical id first, then room code.
    pub fn resolve(conn: &Connection, id_or_code: &str) -> Result<Option<Meeting>> {
        match Self::get(conn, id_or_code)? {
            Some(meeting) => Ok(Some(meeting)),
            None => Self::find_by_room_code(conn, id_or_code),
        }
    }

    /// List a host's meetings, newest first.
    pub fn list_by_host(conn: &Connection, host_id: &str) -> Result<Vec<Meeting>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM meetings WHERE host_id = ?1 ORDER BY created_at DESC, rowid DESC",
                MEETING_COLUMNS
            ))
            .context("Failed to prepare meetings list query")?;

        let rows = stmt
            .query_map(params![host_id], map_meeting)
            .context("Failed to list meetings")?;

        let mut meetings = Vec::new();
        for row in rows {
            meetings.push(Self::with_members(conn, row?)?);
        }

        Ok(meetings)
    }

    /// Meetings `user_id` belongs to that start at or after `now`, soonest first.
    pub fn list_upcoming(conn: &Connection, user_id: &str, now: &str) -> Result<Vec<Meeting>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM meetings \
                 WHERE schedule_at >= ?2 \
                   AND id IN (SELECT meeting_id FROM meeting_members WHERE user_id = ?1) \
                 ORDER BY schedule_at ASC, rowid ASC",
                MEETING_COLUMNS
            ))
            .context("Failed to prepare upcoming meetings query")?;

        let rows = stmt
            .query_map(params![user_id, now], map_meeting)
            .context("Failed to list upcoming meetings")?;

        let mut meetings = Vec::new();
        for row in rows {
            meetings.push(Self::with_members(conn, row?)?);
        }

        Ok(meetings)
    }

    pub fn set_live(conn: &Connection, id: &str, is_live: bool) -> Result<bool> {
        let updated = conn
            .execute(
                "UPDATE meetings SET is_live = ?1 WHERE id = ?2",
                params![is_live, id],
            )
            .context("Failed to update meeting live state")?;
        Ok(updated > 0)
    }

    pub fn set_locked(conn: &Connection, id: &str, is_locked: bool) -> Result<bool> {
        let updated = conn
            .execute(
                "UPDATE meetings SET is_locked = ?1 WHERE id = ?2",
                params![is_locked, id],
            )
            .context("Failed to update meeting lock state")?;
        Ok(updated > 0)
    }

    /// Set-add into `participants_id`; a no-op when already present.
    pub fn add_member(conn: &Connection, id: &str, user_id: &str) -> Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO meeting_members (meeting_id, user_id, added_at) VALUES (?1, ?2, ?3)",
            params![id, user_id, now_timestamp()],
        )
        .context("Failed to add meeting member")?;
        Ok(())
    }

    fn with_members(conn: &Connection, mut meeting: Meeting) -> Result<Meeting> {
        let mut stmt = conn
            .prepare("SELECT user_id FROM meeting_members WHERE meeting_id = ?1 ORDER BY added_at, user_id")
            .context("Failed to prepare members query")?;

        meeting.participants_id = stmt
            .query_map(params![meeting.id], |row| row.get(0))
            .context("Failed to query meeting members")?
            .collect::<std::result::Result<Vec<String>, _>>()
            .context("Failed to map meeting members")?;

        Ok(meeting)
    }
}
