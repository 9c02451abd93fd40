//! SQLite persistence for rooms, conversations, captures and transcripts.
//!
//! All mutation of contended rows (egress jobs, conversations) goes through
//! single-statement conditional updates so repeated or concurrent webhook
//! deliveries cannot overwrite a terminal state.

pub mod conversations;
pub mod egress;
pub mod notifications;
pub mod rooms;
pub mod transcripts;

use std::path::Path;
use std::sync::Arc;

use rusqlite::types::Type;
use rusqlite::Connection;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::domain::{Conversation, Organization, Room, UnknownStatus};

pub use conversations::NewConversation;
pub use egress::NewEgressJob;
pub use rooms::NewRoom;
pub use transcripts::{NewSegment, NewTranscript};

/// Errors that can occur in the state store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    /// True for unique-constraint violations
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Conversation with the room and organization it belongs to
#[derive(Debug, Clone)]
pub struct ConversationContext {
    pub conversation: Conversation,
    pub room: Room,
    pub organization: Organization,
}

/// Handle to the relational state store
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database file and apply the schema
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    /// In-memory database (tests, dry runs)
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Shared connection, for components that keep their own tables (job queue)
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    /// Load a conversation together with its room and organization
    pub async fn conversation_context(
        &self,
        conversation_id: &str,
    ) -> StoreResult<Option<ConversationContext>> {
        let Some(conversation) = self.get_conversation(conversation_id).await? else {
            return Ok(None);
        };
        let Some(room) = self.get_room(&conversation.room_id).await? else {
            return Ok(None);
        };
        let Some(organization) = self.get_organization(&room.organization_id).await? else {
            return Ok(None);
        };

        Ok(Some(ConversationContext {
            conversation,
            room,
            organization,
        }))
    }
}

/// Create all tables and indexes
pub fn migrate(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS organizations (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT,
            owner_user_id TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS rooms (
            id TEXT PRIMARY KEY,
            external_room_id TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            status TEXT NOT NULL,
            organization_id TEXT NOT NULL REFERENCES organizations(id),
            created_at TEXT NOT NULL,
            ended_at TEXT
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            room_id TEXT NOT NULL REFERENCES rooms(id),
            start_time TEXT NOT NULL,
            end_time TEXT,
            status TEXT NOT NULL,
            participant_count INTEGER NOT NULL DEFAULT 0,
            metadata TEXT NOT NULL DEFAULT '{}',
            transcribed_at TEXT
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_conversations_open
            ON conversations(room_id) WHERE end_time IS NULL;

        CREATE INDEX IF NOT EXISTS idx_conversations_room_start
            ON conversations(room_id, start_time DESC);

        CREATE TABLE IF NOT EXISTS participants (
            id TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            external_identity TEXT NOT NULL,
            name TEXT NOT NULL,
            joined_at TEXT NOT NULL,
            left_at TEXT,
            UNIQUE (conversation_id, external_identity)
        );

        CREATE TABLE IF NOT EXISTS egress_jobs (
            id TEXT PRIMARY KEY,
            external_egress_id TEXT NOT NULL UNIQUE,
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            participant_id TEXT NOT NULL,
            status TEXT NOT NULL,
            audio_file_url TEXT,
            error TEXT,
            completed_at TEXT,
            created_at TEXT NOT NULL,
            transcription_status TEXT NOT NULL DEFAULT 'PENDING',
            transcription_error TEXT,
            transcribed_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_egress_jobs_conversation
            ON egress_jobs(conversation_id);

        CREATE TABLE IF NOT EXISTS transcripts (
            id TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL UNIQUE REFERENCES conversations(id),
            content TEXT NOT NULL,
            raw_content TEXT NOT NULL,
            processing_time_ms INTEGER NOT NULL,
            word_count INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS segments (
            id TEXT PRIMARY KEY,
            transcript_id TEXT NOT NULL REFERENCES transcripts(id),
            speaker_label TEXT NOT NULL,
            text TEXT NOT NULL,
            start_time REAL NOT NULL,
            end_time REAL NOT NULL,
            confidence REAL NOT NULL,
            words TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_segments_transcript
            ON segments(transcript_id, start_time);

        CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            read INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_user
            ON notifications(user_id, created_at DESC);",
    )?;

    Ok(())
}

/// Map a status parse failure into a column conversion error
pub(crate) fn status_column<T>(idx: usize, parsed: Result<T, UnknownStatus>) -> rusqlite::Result<T> {
    parsed.map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Decode a JSON text column
pub(crate) fn json_column<T: serde::de::DeserializeOwned>(
    idx: usize,
    raw: String,
) -> rusqlite::Result<T> {
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
