//! Transcript and segment persistence.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::{json_column, new_id, Store, StoreError, StoreResult};
use crate::domain::{Segment, Transcript, Word};

/// Transcript fields computed by the transcription pipeline
#[derive(Debug, Clone)]
pub struct NewTranscript {
    pub conversation_id: String,
    pub content: String,
    pub raw_content: String,
    pub processing_time_ms: u64,
    pub word_count: usize,
}

/// One speaker segment to persist with its transcript
#[derive(Debug, Clone)]
pub struct NewSegment {
    pub speaker_label: String,
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    pub confidence: f64,
    pub words: Vec<Word>,
}

const TRANSCRIPT_COLUMNS: &str =
    "id, conversation_id, content, raw_content, processing_time_ms, word_count, created_at";

fn transcript_from_row(row: &Row<'_>) -> rusqlite::Result<Transcript> {
    Ok(Transcript {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        content: row.get(2)?,
        raw_content: row.get(3)?,
        processing_time_ms: row.get(4)?,
        word_count: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn segment_from_row(row: &Row<'_>) -> rusqlite::Result<Segment> {
    Ok(Segment {
        id: row.get(0)?,
        transcript_id: row.get(1)?,
        speaker_label: row.get(2)?,
        text: row.get(3)?,
        start_time: row.get(4)?,
        end_time: row.get(5)?,
        confidence: row.get(6)?,
        words: json_column(7, row.get(7)?)?,
    })
}

impl Store {
    /// Insert a transcript and all of its segments in one transaction.
    ///
    /// A second transcript for the same conversation is rejected with
    /// [`StoreError::Conflict`] and nothing is written.
    pub async fn save_transcript(
        &self,
        new: NewTranscript,
        segments: Vec<NewSegment>,
    ) -> StoreResult<Transcript> {
        let transcript = Transcript {
            id: new_id(),
            conversation_id: new.conversation_id,
            content: new.content,
            raw_content: new.raw_content,
            processing_time_ms: new.processing_time_ms,
            word_count: new.word_count,
            created_at: Utc::now(),
        };

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let inserted = tx.execute(
            "INSERT INTO transcripts (id, conversation_id, content, raw_content,
                                      processing_time_ms, word_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                transcript.id,
                transcript.conversation_id,
                transcript.content,
                transcript.raw_content,
                transcript.processing_time_ms,
                transcript.word_count,
                transcript.created_at
            ],
        );
        if let Err(e) = inserted {
            let err = StoreError::from(e);
            if err.is_constraint_violation() {
                return Err(StoreError::Conflict(format!(
                    "Transcript already exists for conversation {}",
                    transcript.conversation_id
                )));
            }
            return Err(err);
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO segments (id, transcript_id, speaker_label, text,
                                       start_time, end_time, confidence, words)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for segment in &segments {
                stmt.execute(params![
                    new_id(),
                    transcript.id,
                    segment.speaker_label,
                    segment.text,
                    segment.start_time,
                    segment.end_time,
                    segment.confidence,
                    serde_json::to_string(&segment.words)?
                ])?;
            }
        }
        tx.commit()?;

        Ok(transcript)
    }

    pub async fn transcript_exists(&self, conversation_id: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().await;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM transcripts WHERE conversation_id = ?1",
                [conversation_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Transcript of a conversation with its segments in reading order
    pub async fn find_transcript(
        &self,
        conversation_id: &str,
    ) -> StoreResult<Option<(Transcript, Vec<Segment>)>> {
        let conn = self.conn.lock().await;
        let Some(transcript) = conn
            .query_row(
                &format!("SELECT {TRANSCRIPT_COLUMNS} FROM transcripts WHERE conversation_id = ?1"),
                [conversation_id],
                transcript_from_row,
            )
            .optional()?
        else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT id, transcript_id, speaker_label, text, start_time, end_time, confidence, words
             FROM segments WHERE transcript_id = ?1 ORDER BY start_time",
        )?;
        let segments = stmt
            .query_map([&transcript.id], segment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some((transcript, segments)))
    }
}
