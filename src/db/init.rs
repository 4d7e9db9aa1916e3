use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

pub fn open_db(db_path: &Path) -> Result<Connection> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let conn = Connection::open(db_path).context("Failed to open database connection")?;

    migrate(&conn)?;

    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .context("Failed to enable foreign keys")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS meetings (
            id TEXT PRIMARY KEY,
            title TEXT,
            host_id TEXT NOT NULL,
            room_code TEXT NOT NULL UNIQUE,
            is_live INTEGER NOT NULL DEFAULT 0,
            is_locked INTEGER NOT NULL DEFAULT 0,
            schedule_at TEXT NOT NULL,
            recurrence_rule TEXT,
            recurrence_end TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )
    .context("Failed to create meetings table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_meetings_host ON meetings(host_id, created_at DESC)",
        [],
    )
    .context("Failed to create meetings host index")?;

    // participantsId: every user ever added to the meeting
    conn.execute(
        "CREATE TABLE IF NOT EXISTS meeting_members (
            meeting_id TEXT NOT NULL REFERENCES meetings(id),
            user_id TEXT NOT NULL,
            added_at TEXT NOT NULL,
            PRIMARY KEY (meeting_id, user_id)
        )",
        [],
    )
    .context("Failed to create meeting_members table")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS participants (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            meeting_id TEXT NOT NULL REFERENCES meetings(id),
            user_id TEXT NOT NULL,
            joined_at TEXT NOT NULL,
            left_at TEXT,
            is_muted INTEGER NOT NULL DEFAULT 0,
            is_video_on INTEGER NOT NULL DEFAULT 1,
            role TEXT NOT NULL DEFAULT 'participant',
            socket_id TEXT,
            UNIQUE (meeting_id, user_id)
        )",
        [],
    )
    .context("Failed to create participants table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_participants_socket ON participants(meeting_id, socket_id)",
        [],
    )
    .context("Failed to create participants socket index")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS transcripts (
            id TEXT PRIMARY KEY,
            meeting_id TEXT NOT NULL REFERENCES meetings(id),
            created_by TEXT,
            full_text TEXT NOT NULL DEFAULT '',
            segments TEXT NOT NULL DEFAULT '[]',
            is_final INTEGER NOT NULL DEFAULT 0,
            meta TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )
    .context("Failed to create transcripts table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transcripts_open ON transcripts(meeting_id, is_final, created_at DESC)",
        [],
    )
    .context("Failed to create transcripts index")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        for table in ["meetings", "meeting_members", "participants", "transcripts"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {}", table);
        }
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
    }

    #[test]
    fn test_open_db_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("huddle.db");
        open_db(&path).unwrap();
        assert!(path.exists());
    }
}
