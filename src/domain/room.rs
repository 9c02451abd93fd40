//! Rooms and the organizations that own them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UnknownStatus;

/// Lifecycle of a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    /// Room exists on the media platform and accepts participants
    Active,

    /// Room finished; terminal unless archived externally
    Ended,

    /// Archived by an operator
    Archived,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Ended => "ENDED",
            Self::Archived => "ARCHIVED",
        }
    }

    pub fn parse(value: &str) -> Result<Self, UnknownStatus> {
        match value {
            "ACTIVE" => Ok(Self::Active),
            "ENDED" => Ok(Self::Ended),
            "ARCHIVED" => Ok(Self::Archived),
            other => Err(UnknownStatus {
                kind: "room",
                value: other.to_string(),
            }),
        }
    }
}

/// A media room tracked by the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,

    /// Room name on the media platform (webhooks refer to rooms by this)
    pub external_room_id: String,

    /// Display name
    pub name: String,

    pub status: RoomStatus,

    pub organization_id: String,

    pub created_at: DateTime<Utc>,

    pub ended_at: Option<DateTime<Utc>>,
}

/// Owner of rooms; notification recipient
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,

    pub name: String,

    /// Address for email notifications (optional)
    pub email: Option<String>,

    /// User that receives in-app notifications
    pub owner_user_id: String,
}
