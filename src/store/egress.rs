//! Egress (capture) job persistence.
//!
//! The capture outcome columns are written once: every update that touches
//! them is guarded by `status NOT IN ('COMPLETED', 'FAILED')`.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{new_id, status_column, Store, StoreResult};
use crate::domain::{EgressJob, EgressOutcome, EgressStatus, TranscriptionStatus};

/// Fields required to record a capture attempt
#[derive(Debug, Clone)]
pub struct NewEgressJob {
    pub external_egress_id: String,
    pub conversation_id: String,
    pub participant_id: String,
    pub status: EgressStatus,
    pub error: Option<String>,
}

impl NewEgressJob {
    /// A capture the platform accepted
    pub fn running(
        external_egress_id: impl Into<String>,
        conversation_id: impl Into<String>,
        participant_id: impl Into<String>,
    ) -> Self {
        Self {
            external_egress_id: external_egress_id.into(),
            conversation_id: conversation_id.into(),
            participant_id: participant_id.into(),
            status: EgressStatus::Running,
            error: None,
        }
    }

    /// A capture that failed to start
    pub fn failed(
        external_egress_id: impl Into<String>,
        conversation_id: impl Into<String>,
        participant_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            external_egress_id: external_egress_id.into(),
            conversation_id: conversation_id.into(),
            participant_id: participant_id.into(),
            status: EgressStatus::Failed,
            error: Some(error.into()),
        }
    }
}

const EGRESS_COLUMNS: &str = "id, external_egress_id, conversation_id, participant_id, status, \
     audio_file_url, error, completed_at, transcription_status, transcription_error, transcribed_at";

fn egress_from_row(row: &Row<'_>) -> rusqlite::Result<EgressJob> {
    let status: String = row.get(4)?;
    let transcription_status: String = row.get(8)?;
    Ok(EgressJob {
        id: row.get(0)?,
        external_egress_id: row.get(1)?,
        conversation_id: row.get(2)?,
        participant_id: row.get(3)?,
        status: status_column(4, EgressStatus::parse(&status))?,
        audio_file_url: row.get(5)?,
        error: row.get(6)?,
        completed_at: row.get(7)?,
        transcription_status: status_column(8, TranscriptionStatus::parse(&transcription_status))?,
        transcription_error: row.get(9)?,
        transcribed_at: row.get(10)?,
    })
}

impl Store {
    pub async fn create_egress_job(&self, new: NewEgressJob) -> StoreResult<EgressJob> {
        let now = Utc::now();
        let job = EgressJob {
            id: new_id(),
            external_egress_id: new.external_egress_id,
            conversation_id: new.conversation_id,
            participant_id: new.participant_id,
            status: new.status,
            audio_file_url: None,
            error: new.error,
            completed_at: new.status.is_terminal().then_some(now),
            transcription_status: TranscriptionStatus::Pending,
            transcription_error: None,
            transcribed_at: None,
        };

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO egress_jobs (id, external_egress_id, conversation_id, participant_id,
                                      status, error, completed_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                job.id,
                job.external_egress_id,
                job.conversation_id,
                job.participant_id,
                job.status.as_str(),
                job.error,
                job.completed_at,
                now
            ],
        )?;

        Ok(job)
    }

    pub async fn get_egress_job(&self, id: &str) -> StoreResult<Option<EgressJob>> {
        let conn = self.conn.lock().await;
        let job = conn
            .query_row(
                &format!("SELECT {EGRESS_COLUMNS} FROM egress_jobs WHERE id = ?1"),
                [id],
                egress_from_row,
            )
            .optional()?;
        Ok(job)
    }

    pub async fn find_egress_by_external_id(
        &self,
        external_egress_id: &str,
    ) -> StoreResult<Option<EgressJob>> {
        let conn = self.conn.lock().await;
        let job = conn
            .query_row(
                &format!("SELECT {EGRESS_COLUMNS} FROM egress_jobs WHERE external_egress_id = ?1"),
                [external_egress_id],
                egress_from_row,
            )
            .optional()?;
        Ok(job)
    }

    /// RUNNING egress jobs of any conversation in the room
    pub async fn list_active_egress_for_room(&self, room_id: &str) -> StoreResult<Vec<EgressJob>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EGRESS_COLUMNS} FROM egress_jobs
             WHERE status = ?1
               AND conversation_id IN (SELECT id FROM conversations WHERE room_id = ?2)
             ORDER BY created_at"
        ))?;
        let rows = stmt
            .query_map(
                params![EgressStatus::Running.as_str(), room_id],
                egress_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub async fn list_egress_for_conversation(
        &self,
        conversation_id: &str,
    ) -> StoreResult<Vec<EgressJob>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EGRESS_COLUMNS} FROM egress_jobs
             WHERE conversation_id = ?1 ORDER BY created_at"
        ))?;
        let rows = stmt
            .query_map([conversation_id], egress_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Write the capture outcome if the job is not yet terminal.
    ///
    /// Returns false when the job was already COMPLETED or FAILED, leaving
    /// `audio_file_url`, `error` and `completed_at` untouched.
    pub async fn complete_egress(
        &self,
        id: &str,
        outcome: &EgressOutcome,
        completed_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let (status, audio_file_url, error) = match outcome {
            EgressOutcome::Completed { audio_file_url } => {
                (EgressStatus::Completed, Some(audio_file_url.as_str()), None)
            }
            EgressOutcome::Failed { error } => (EgressStatus::Failed, None, Some(error.as_str())),
        };

        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE egress_jobs
             SET status = ?1, audio_file_url = ?2, error = ?3, completed_at = ?4
             WHERE id = ?5 AND status NOT IN (?6, ?7)",
            params![
                status.as_str(),
                audio_file_url,
                error,
                completed_at,
                id,
                EgressStatus::Completed.as_str(),
                EgressStatus::Failed.as_str()
            ],
        )?;
        Ok(changed == 1)
    }

    /// Record transcription progress for a captured recording
    pub async fn set_transcription_status(
        &self,
        id: &str,
        status: TranscriptionStatus,
        error: Option<&str>,
        at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE egress_jobs
             SET transcription_status = ?1, transcription_error = ?2,
                 transcribed_at = COALESCE(?3, transcribed_at)
             WHERE id = ?4",
            params![status.as_str(), error, at, id],
        )?;
        Ok(())
    }
}
