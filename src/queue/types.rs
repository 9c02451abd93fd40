//! Job queue data types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::retry::RetryPolicy;

/// Errors that can occur in the job queue
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Queue is closed: {0}")]
    Closed(QueueName),

    #[error("Unknown job state: {0}")]
    UnknownState(String),
}

/// The three pipeline queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    Capture,
    Transcription,
    Notification,
}

impl QueueName {
    pub const ALL: [QueueName; 3] = [Self::Capture, Self::Transcription, Self::Notification];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Capture => "capture",
            Self::Transcription => "transcription",
            Self::Notification => "notification",
        }
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Delayed => "delayed",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Result<Self, QueueError> {
        match value {
            "waiting" => Ok(Self::Waiting),
            "delayed" => Ok(Self::Delayed),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(QueueError::UnknownState(other.to_string())),
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Per-job enqueue options
#[derive(Debug, Clone, Copy, Default)]
pub struct JobOptions {
    /// Delay before the first run (0 = run as soon as a worker is free)
    pub delay_ms: u64,

    pub retry: RetryPolicy,
}

impl JobOptions {
    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

/// Handle returned by enqueue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRef {
    pub id: String,
    pub queue: QueueName,
    pub key: String,
}

/// A job claimed by a worker
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub queue: QueueName,
    pub key: String,
    pub payload: Value,

    /// Attempts made, including the current one
    pub attempts: u32,

    pub max_attempts: u32,
}

/// Externally visible job status
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub id: String,

    /// Composite key, e.g. `transcription-{conversationId}`
    pub name: String,

    pub data: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Value>,

    pub state: JobState,

    pub attempts_made: u32,

    pub failed_reason: Option<String>,

    /// Unix milliseconds of the latest claim
    pub processed_on: Option<i64>,

    /// Unix milliseconds of completion or final failure
    pub finished_on: Option<i64>,
}

/// Count-based retention of finished jobs
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Retention {
    #[serde(default = "default_keep_completed")]
    pub keep_completed: usize,

    #[serde(default = "default_keep_failed")]
    pub keep_failed: usize,
}

fn default_keep_completed() -> usize {
    100
}
fn default_keep_failed() -> usize {
    500
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            keep_completed: default_keep_completed(),
            keep_failed: default_keep_failed(),
        }
    }
}
