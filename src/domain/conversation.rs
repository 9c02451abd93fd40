//! Conversations (recording sessions) and their participants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UnknownStatus;

/// Status of a conversation as it moves through the pipeline
///
/// RECORDING → PROCESSING → COMPLETED | FAILED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationStatus {
    /// Captures are running
    Recording,

    /// Capture finished (or room ended); awaiting transcript
    Processing,

    /// Transcript persisted
    Completed,

    /// Unrecoverable transcription or capture failure
    Failed,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recording => "RECORDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Result<Self, UnknownStatus> {
        match value {
            "RECORDING" => Ok(Self::Recording),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(UnknownStatus {
                kind: "conversation",
                value: other.to_string(),
            }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One recording session inside a room
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,

    pub room_id: String,

    pub start_time: DateTime<Utc>,

    /// Set when the conversation stops recording; `None` means "open"
    pub end_time: Option<DateTime<Utc>>,

    pub status: ConversationStatus,

    pub participant_count: u32,

    /// Opaque key-value data (includes the `interactions` log)
    pub metadata: serde_json::Value,

    /// When the transcript was confirmed by the notification stage
    pub transcribed_at: Option<DateTime<Utc>>,
}

impl Conversation {
    /// Seconds between start and end (or now, if still open)
    pub fn duration_seconds(&self) -> i64 {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).num_seconds().max(0)
    }
}

/// A participant sighted within a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,

    pub conversation_id: String,

    /// Identity on the media platform; unique within a conversation
    pub external_identity: String,

    pub name: String,

    pub joined_at: DateTime<Utc>,

    pub left_at: Option<DateTime<Utc>>,
}
