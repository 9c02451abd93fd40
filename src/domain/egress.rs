//! Per-participant audio capture ("egress") records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UnknownStatus;

/// Capture status of an egress job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EgressStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl EgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Result<Self, UnknownStatus> {
        match value {
            "PENDING" => Ok(Self::Pending),
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(UnknownStatus {
                kind: "egress",
                value: other.to_string(),
            }),
        }
    }

    /// Terminal capture states are written once and never change
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Transcription stage of a captured recording.
///
/// Kept apart from [`EgressStatus`] so the capture outcome stays immutable
/// once the egress completion path has written it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TranscriptionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TranscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Result<Self, UnknownStatus> {
        match value {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(UnknownStatus {
                kind: "transcription",
                value: other.to_string(),
            }),
        }
    }
}

/// One capture attempt for one participant
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EgressJob {
    pub id: String,

    /// Egress id assigned by the media platform (synthetic for failed starts)
    pub external_egress_id: String,

    pub conversation_id: String,

    pub participant_id: String,

    pub status: EgressStatus,

    /// Location of the finished recording
    pub audio_file_url: Option<String>,

    pub error: Option<String>,

    pub completed_at: Option<DateTime<Utc>>,

    pub transcription_status: TranscriptionStatus,

    pub transcription_error: Option<String>,

    pub transcribed_at: Option<DateTime<Utc>>,
}

/// Outcome written by the egress completion path
#[derive(Debug, Clone, PartialEq)]
pub enum EgressOutcome {
    /// Capture produced a file
    Completed { audio_file_url: String },

    /// Capture failed (or finished without a file)
    Failed { error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_egress_status_terminal() {
        assert!(!EgressStatus::Pending.is_terminal());
        assert!(!EgressStatus::Running.is_terminal());
        assert!(EgressStatus::Completed.is_terminal());
        assert!(EgressStatus::Failed.is_terminal());
    }

    #[test]
    fn test_transcription_status_parse() {
        assert_eq!(
            TranscriptionStatus::parse("PROCESSING").unwrap(),
            TranscriptionStatus::Processing
        );
        assert!(TranscriptionStatus::parse("TRANSCRIBED").is_err());
    }
}
