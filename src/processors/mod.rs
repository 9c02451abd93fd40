//! Job processors for the capture, transcription and notification queues.
//!
//! Each processor implements [`JobHandler`](crate::queue::JobHandler) and is
//! driven by one worker loop. Errors are re-raised so the queue retries the
//! job; failures that a human should hear about are additionally turned
//! into notification jobs before re-raising.

pub mod capture;
pub mod notification;
pub mod transcription;

pub use capture::CaptureProcessor;
pub use notification::NotificationProcessor;
pub use transcription::TranscriptionProcessor;
