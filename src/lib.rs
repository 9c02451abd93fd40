//! roomscribe - Recording and transcription pipeline for media rooms
//!
//! Receives signed webhooks from a real-time media platform, captures each
//! participant's audio track, transcribes the recordings with speaker
//! separation and notifies the room's organization when a transcript is
//! ready.
//!
//! # Architecture
//!
//! Webhook handlers only record state transitions and enqueue work; three
//! durable queues (capture, transcription, notification) carry everything
//! that talks to an external service:
//! - Entity rows move forward through conditional updates, so repeated or
//!   reordered webhook deliveries cannot undo a terminal state
//! - Failed jobs are retried with exponential backoff up to an attempt cap
//! - Capture and transcription failures are recorded on the owning entity
//!   and always followed by a notification job
//!
//! # Modules
//!
//! - `webhooks`: Signature verification, parsing, per-event handlers
//! - `queue`: SQLite-backed job queues and worker loops
//! - `processors`: Capture, transcription and notification job handlers
//! - `adapters`: Media platform, object storage and speech clients
//! - `store`: SQLite persistence of rooms, conversations and transcripts
//! - `api`: HTTP surface
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run the webhook server and workers
//! roomscribe serve --bind 0.0.0.0:3000
//!
//! # Check a job
//! roomscribe jobs status <job-id>
//! ```

pub mod adapters;
pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod notify;
pub mod processors;
pub mod queue;
pub mod store;
pub mod token;
pub mod transcription;
pub mod webhooks;

// Re-export main types at crate root for convenience
pub use domain::{Conversation, ConversationStatus, EgressJob, Room, Transcript, WebhookEvent};
pub use queue::{JobService, WorkerSet};
pub use store::Store;
