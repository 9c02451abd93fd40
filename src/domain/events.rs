//! Webhook event types sent by the media platform.
//!
//! The platform posts JSON with an `event` discriminator plus `room`,
//! `participant` or `egressInfo` objects. Numeric timestamps may arrive as
//! numbers or numeric strings, so they are decoded leniently.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::egress::EgressOutcome;

/// A typed webhook event, one variant per handled discriminator
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    RoomStarted(RoomEvent),
    RoomFinished(RoomEvent),
    ParticipantJoined(ParticipantEvent),
    ParticipantLeft(ParticipantEvent),
    EgressStarted(EgressEvent),
    EgressUpdated(EgressEvent),
    EgressEnded(EgressEvent),

    /// Discriminator this service does not handle
    Unknown(String),
}

impl WebhookEvent {
    /// Wire name of the event
    pub fn name(&self) -> &str {
        match self {
            Self::RoomStarted(_) => "room_started",
            Self::RoomFinished(_) => "room_finished",
            Self::ParticipantJoined(_) => "participant_joined",
            Self::ParticipantLeft(_) => "participant_left",
            Self::EgressStarted(_) => "egress_started",
            Self::EgressUpdated(_) => "egress_updated",
            Self::EgressEnded(_) => "egress_ended",
            Self::Unknown(name) => name,
        }
    }
}

/// Room snapshot attached to room and participant events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    #[serde(default)]
    pub sid: String,

    /// Platform room name (our `external_room_id`)
    pub name: String,

    #[serde(default, deserialize_with = "lenient_i64")]
    pub creation_time: Option<i64>,

    #[serde(default)]
    pub num_participants: Option<u32>,

    #[serde(default)]
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomEvent {
    pub room: RoomInfo,
}

/// Participant snapshot attached to participant events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    #[serde(default)]
    pub sid: String,

    pub identity: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub metadata: Option<String>,

    /// Unix seconds
    #[serde(default, deserialize_with = "lenient_i64")]
    pub joined_at: Option<i64>,

    #[serde(default)]
    pub state: Option<String>,
}

impl ParticipantInfo {
    /// Display name, falling back to identity
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.identity,
        }
    }

    /// Join time as a timestamp (now if absent or out of range)
    pub fn joined_at_utc(&self) -> DateTime<Utc> {
        self.joined_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantEvent {
    pub room: RoomInfo,
    pub participant: ParticipantInfo,
}

/// Terminal/intermediate status reported for an egress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EgressResultStatus {
    EgressStarting,
    EgressActive,
    EgressEnding,
    EgressComplete,
    EgressFailed,
    EgressAborted,
    EgressLimitReached,
    #[serde(other)]
    Unknown,
}

/// A file written by an egress
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResult {
    #[serde(default)]
    pub filename: String,

    #[serde(default)]
    pub location: String,

    #[serde(default, deserialize_with = "lenient_i64")]
    pub size: Option<i64>,
}

/// Egress snapshot attached to egress events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EgressInfo {
    pub egress_id: String,

    #[serde(default)]
    pub room_id: String,

    #[serde(default)]
    pub room_name: String,

    pub status: EgressResultStatus,

    #[serde(default)]
    pub file_results: Vec<FileResult>,

    /// Older platform versions report a single `file`
    #[serde(default)]
    pub file: Option<FileResult>,

    #[serde(default)]
    pub error: Option<String>,
}

impl EgressInfo {
    /// Resolve the capture outcome: a file location on success, else an error
    pub fn outcome(&self) -> EgressOutcome {
        let location = self
            .file_results
            .first()
            .or(self.file.as_ref())
            .map(|f| f.location.as_str())
            .filter(|l| !l.is_empty());

        match (self.status, location) {
            (EgressResultStatus::EgressComplete, Some(url)) => EgressOutcome::Completed {
                audio_file_url: url.to_string(),
            },
            _ => EgressOutcome::Failed {
                error: self
                    .error
                    .clone()
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| "Egress failed without error message".to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EgressEvent {
    pub egress_info: EgressInfo,
}

/// Accept an integer encoded as a JSON number or a numeric string
fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(i64),
        Text(String),
    }

    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::Text(s)) if s.is_empty() => Ok(None),
        Some(NumberOrString::Text(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}
