//! Durable job queues.
//!
//! This module contains:
//! - broker: SQLite-backed named queue (enqueue, claim, retry, status, clean)
//! - payload: typed payloads for the capture, transcription and notification queues
//! - retry: exponential backoff policy
//! - service: typed producer facade used by handlers and processors
//! - worker: per-queue worker loop and graceful shutdown

pub mod broker;
pub mod payload;
pub mod retry;
pub mod service;
pub mod types;
pub mod worker;

// Re-export commonly used types
pub use broker::JobQueue;
pub use payload::{
    CaptureJob, EgressCompleteMeta, FailureMeta, NotificationEvent, NotificationJob,
    TranscriptionCompleteMeta, TranscriptionJob,
};
pub use retry::RetryPolicy;
pub use service::JobService;
pub use types::{Job, JobOptions, JobRef, JobState, JobStatus, QueueError, QueueName, Retention};
pub use worker::{JobContext, JobHandler, WorkerSet};
