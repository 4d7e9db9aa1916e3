//! Transcript record persistence.
//!
//! A meeting has at most one open (non-final) transcript. Appends go to the
//! newest open one; once finalized a transcript is never written again.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{json, Value};

use super::schemas::{now_timestamp, Transcript, TranscriptAppend};

const TRANSCRIPT_COLUMNS: &str =
    "id, meeting_id, created_by, full_text, segments, is_final, meta, created_at, updated_at";

fn map_transcript(row: &Row<'_>) -> rusqlite::Result<Transcript> {
    let segments: String = row.get(4)?;
    let meta: String = row.get(6)?;

    Ok(Transcript {
        id: row.get(0)?,
        meeting_id: row.get(1)?,
        created_by: row.get(2)?,
        full_text: row.get(3)?,
        segments: serde_json::from_str(&segments).map_err(|_| rusqlite::Error::InvalidQuery)?,
        is_final: row.get(5)?,
        meta: serde_json::from_str(&meta).map_err(|_| rusqlite::Error::InvalidQuery)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// Repository for transcript records.
pub struct TranscriptRepository;

impl TranscriptRepository {
    pub fn find_latest_open(conn: &Connection, meeting_id: &str) -> Result<Option<Transcript>> {
        conn.query_row(
            &format!(
                "SELECT {} FROM transcripts WHERE meeting_id = ?1 AND is_final = 0 \
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                TRANSCRIPT_COLUMNS
            ),
            params![meeting_id],
            map_transcript,
        )
        .optional()
        .context("Failed to query open transcript")
    }

    pub fn get(conn: &Connection, id: &str) -> Result<Option<Transcript>> {
        conn.query_row(
            &format!("SELECT {} FROM transcripts WHERE id = ?1", TRANSCRIPT_COLUMNS),
            params![id],
            map_transcript,
        )
        .optional()
        .context("Failed to query transcript")
    }

    pub fn create(conn: &Connection, append: &TranscriptAppend) -> Result<Transcript> {
        let now = now_timestamp();
        let transcript = Transcript {
            id: uuid::Uuid::new_v4().to_string(),
            meeting_id: append.meeting_id.clone(),
            created_by: append.created_by.clone(),
            full_text: append.text.clone(),
            segments: append.segments.clone(),
            is_final: append.is_final,
            meta: json!({ "providerResponse": append.provider_response }),
            created_at: now.clone(),
            updated_at: now,
        };

        conn.execute(
            &format!(
                "INSERT INTO transcripts ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                TRANSCRIPT_COLUMNS
            ),
            params![
                transcript.id,
                transcript.meeting_id,
                transcript.created_by,
                transcript.full_text,
                serde_json::to_string(&transcript.segments)?,
                transcript.is_final,
                serde_json::to_string(&transcript.meta)?,
                transcript.created_at,
                transcript.updated_at,
            ],
        )
        .context("Failed to insert transcript")?;

        Ok(transcript)
    }

    /// Append to an open transcript and persist it.
    pub fn append_and_save(
        conn: &Connection,
        mut transcript: Transcript,
        append: &TranscriptAppend,
    ) -> Result<Transcript> {
        if transcript.is_final {
            anyhow::bail!("Transcript {} is final", transcript.id);
        }

        transcript.full_text = join_text(&transcript.full_text, &append.text);
        transcript
            .segments
            .extend(append.segments.iter().cloned());
        if append.is_final {
            transcript.is_final = true;
        }
        merge_meta(&mut transcript.meta, &append.provider_response);
        transcript.updated_at = now_timestamp();

        conn.execute(
            "UPDATE transcripts SET full_text = ?1, segments = ?2, is_final = ?3, meta = ?4, \
             updated_at = ?5 WHERE id = ?6 AND is_final = 0",
            params![
                transcript.full_text,
                serde_json::to_string(&transcript.segments)?,
                transcript.is_final,
                serde_json::to_string(&transcript.meta)?,
                transcript.updated_at,
                transcript.id,
            ],
        )
        .context("Failed to update transcript")?;

        Ok(transcript)
    }

    /// Find the meeting's open transcript (creating one if absent) and merge
    /// the new result into it, in one transaction.
    pub fn append(conn: &mut Connection, append: &TranscriptAppend) -> Result<Transcript> {
        let tx = conn.transaction().context("Failed to begin transaction")?;

        let transcript = match Self::find_latest_open(&tx, &append.meeting_id)? {
            Some(open) => Self::append_and_save(&tx, open, append)?,
            None => Self::create(&tx, append)?,
        };

        tx.commit().context("Failed to commit transcript append")?;
        Ok(transcript)
    }

    /// All transcripts of a meeting, oldest first.
    pub fn list_by_meeting(conn: &Connection, meeting_id: &str) -> Result<Vec<Transcript>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM transcripts WHERE meeting_id = ?1 ORDER BY created_at, rowid",
                TRANSCRIPT_COLUMNS
            ))
            .context("Failed to prepare transcripts query")?;

        let transcripts = stmt
            .query_map(params![meeting_id], map_transcript)
            .context("Failed to query transcripts")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to map transcripts")?;

        Ok(transcripts)
    }
}

fn join_text(existing: &str, addition: &str) -> String {
    if existing.is_empty() {
        addition.to_string()
    } else {
        format!("{}\n{}", existing, addition)
    }
}

fn merge_meta(meta: &mut Value, provider_response: &Value) {
    if !meta.is_object() {
        *meta = json!({});
    }
    if let Some(map) = meta.as_object_mut() {
        map.insert("lastProviderResponse".to_string(), provider_response.clone());
    }
}
