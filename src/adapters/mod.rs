//! Adapter interfaces for external systems.
//!
//! The pipeline consumes three capabilities: a media platform (rooms,
//! participants, per-track audio capture), object storage (signed download
//! URLs for captured audio) and a speech recognizer. Each is a trait so the
//! processors and handlers can be exercised with in-process fakes.

#[cfg(test)]
pub(crate) mod fakes;
pub mod livekit;
pub mod speech;
pub mod storage;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ParticipantInfo, RoomInfo, Word};
use crate::transcription::TranscribeOptions;

// Re-export the HTTP implementations
pub use livekit::LiveKitClient;
pub use speech::GoogleSpeechClient;
pub use storage::S3Storage;

/// Errors raised by the HTTP adapters
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("Token error: {0}")]
    Token(#[from] crate::token::TokenError),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Request signing failed")]
    Signing,

    #[error("{0}")]
    InvalidResponse(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Parameters for creating a room on the media platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub name: String,
    pub empty_timeout: u32,
    pub max_participants: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

/// Per-participant audio capture request
#[derive(Debug, Clone, PartialEq)]
pub struct TrackCaptureRequest {
    /// Platform room name
    pub room_name: String,
    pub track_id: String,
    pub participant_identity: String,
    /// Internal participant id (used in the object key)
    pub participant_id: String,
}

/// Participant permissions that may be changed at runtime
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_publish: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_subscribe: Option<bool>,
}

/// Real-time media platform (rooms, participants, egress)
#[async_trait]
pub trait MediaPlatform: Send + Sync {
    async fn create_room(&self, request: &CreateRoomRequest) -> Result<RoomInfo>;

    async fn list_rooms(&self) -> Result<Vec<RoomInfo>>;

    async fn list_participants(&self, room_name: &str) -> Result<Vec<ParticipantInfo>>;

    async fn remove_participant(&self, room_name: &str, identity: &str) -> Result<()>;

    async fn update_participant(
        &self,
        room_name: &str,
        identity: &str,
        update: &ParticipantUpdate,
    ) -> Result<ParticipantInfo>;

    /// Start capturing one audio track; returns the platform egress id
    async fn start_track_capture(&self, request: &TrackCaptureRequest) -> Result<String>;

    async fn stop_capture(&self, egress_id: &str) -> Result<()>;

    /// Access token letting `identity` join `room_name`
    fn generate_access_token(&self, room_name: &str, identity: &str, name: &str)
        -> Result<String>;
}

/// Object storage holding captured audio
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Time-limited download URL for an object key
    async fn signed_download_url(&self, key: &str) -> Result<String>;

    /// Object key for a stored location; non-URLs are returned unchanged
    fn extract_key_from_url(&self, location: &str) -> String {
        extract_key(location)
    }
}

/// Speech-to-text service
#[async_trait]
pub trait SpeechTranscriber: Send + Sync {
    /// Recognize the audio at `url`, returning words with timing and speaker tags
    async fn transcribe(&self, url: &str, options: &TranscribeOptions) -> Result<Vec<Word>>;
}

/// URL path without its leading slash, or the input itself when it is not a URL
pub fn extract_key(location: &str) -> String {
    match url::Url::parse(location) {
        Ok(parsed) => {
            let path = parsed.path().trim_start_matches('/');
            urlencoding::decode(path)
                .map(|p| p.into_owned())
                .unwrap_or_else(|_| path.to_string())
        }
        Err(_) => location.to_string(),
    }
}
