//! Typed job payloads for the three pipeline queues.
//!
//! Job keys are derived from the payload variant and are for observability
//! only; the queue never deduplicates on them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Capture queue payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum CaptureJob {
    /// Start recording one participant's audio track
    Start {
        room_id: String,
        conversation_id: String,
        participant_id: String,
        participant_identity: String,
        track_id: String,
    },

    /// Stop every running capture in the room
    Stop {
        room_id: String,
        conversation_id: String,
    },
}

impl CaptureJob {
    pub fn key(&self) -> String {
        match self {
            Self::Start {
                conversation_id,
                participant_id,
                ..
            } => format!("capture-start-{}-{}", conversation_id, participant_id),
            Self::Stop { room_id, .. } => format!("capture-stop-{}", room_id),
        }
    }

    pub fn room_id(&self) -> &str {
        match self {
            Self::Start { room_id, .. } | Self::Stop { room_id, .. } => room_id,
        }
    }

    pub fn conversation_id(&self) -> &str {
        match self {
            Self::Start {
                conversation_id, ..
            }
            | Self::Stop {
                conversation_id, ..
            } => conversation_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Stop { .. } => "stop",
        }
    }
}

/// Transcription queue payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionJob {
    pub egress_job_id: String,
    pub recording_url: String,
    pub conversation_id: String,
}

impl TranscriptionJob {
    pub fn key(&self) -> String {
        format!("transcription-{}", self.conversation_id)
    }
}

/// Notification event carried by a notification job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "metadata", rename_all = "snake_case")]
pub enum NotificationEvent {
    TranscriptionComplete(TranscriptionCompleteMeta),
    TranscriptionFailed(FailureMeta),
    EgressComplete(EgressCompleteMeta),
    EgressFailed(FailureMeta),
}

impl NotificationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TranscriptionComplete(_) => "transcription_complete",
            Self::TranscriptionFailed(_) => "transcription_failed",
            Self::EgressComplete(_) => "egress_complete",
            Self::EgressFailed(_) => "egress_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionCompleteMeta {
    pub transcript_id: String,
    pub word_count: usize,
    pub duration: f64,
    pub speaker_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureMeta {
    pub error: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub egress_job_id: Option<String>,

    /// Stage that failed (`start`, `stop`, `capture`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

impl FailureMeta {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            room_id: None,
            participant_id: None,
            egress_job_id: None,
            stage: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EgressCompleteMeta {
    pub room_id: String,
    pub stopped: usize,
}

/// Notification queue payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationJob {
    pub conversation_id: String,

    #[serde(flatten)]
    pub event: NotificationEvent,
}

impl NotificationJob {
    pub fn new(conversation_id: impl Into<String>, event: NotificationEvent) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            event,
        }
    }

    pub fn key(&self) -> String {
        format!("notification-{}-{}", self.event.name(), self.conversation_id)
    }

    /// Metadata object as sent on the wire
    pub fn metadata(&self) -> Value {
        serde_json::to_value(&self.event)
            .ok()
            .and_then(|v| v.get("metadata").cloned())
            .unwrap_or(Value::Null)
    }
}
