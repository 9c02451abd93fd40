//! Domain types for the recording pipeline.
//!
//! This module contains the core data structures:
//! - Room / Organization: the media room and its owner
//! - Conversation / Participant: one recording session inside a room
//! - EgressJob: one per-participant audio capture attempt
//! - Transcript / Segment: persisted transcription output
//! - Events: typed webhook events from the media platform

pub mod conversation;
pub mod egress;
pub mod events;
pub mod room;
pub mod transcript;

// Re-export commonly used types
pub use conversation::{Conversation, ConversationStatus, Participant};
pub use egress::{EgressJob, EgressOutcome, EgressStatus, TranscriptionStatus};
pub use events::{
    EgressEvent, EgressInfo, EgressResultStatus, ParticipantEvent, ParticipantInfo, RoomEvent,
    RoomInfo, WebhookEvent,
};
pub use room::{Organization, Room, RoomStatus};
pub use transcript::{
    parse_transcript_content, serialize_transcript_content, ContentSegment, Segment, Transcript,
    TranscriptContent, Word,
};

/// Error returned when a stored status string is not a known variant
#[derive(Debug, thiserror::Error)]
#[error("Unknown {kind} status: {value}")]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
}
