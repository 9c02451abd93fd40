//! Typed producer facade over the three pipeline queues.

use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::info;

use super::broker::JobQueue;
use super::payload::{CaptureJob, NotificationJob, TranscriptionJob};
use super::types::{JobOptions, JobRef, JobState, JobStatus, QueueError, QueueName};
use crate::config::QueueConfig;

/// Producer-side handle to the capture, transcription and notification queues
#[derive(Clone)]
pub struct JobService {
    capture: JobQueue,
    transcription: JobQueue,
    notification: JobQueue,
    transcription_delay_ms: u64,
}

impl JobService {
    /// Open all three queues on a shared connection
    pub async fn open(conn: Arc<Mutex<Connection>>, config: &QueueConfig) -> Result<Self, QueueError> {
        let defaults = JobOptions {
            delay_ms: 0,
            retry: config.retry,
        };
        let open = |name| JobQueue::open(name, conn.clone(), defaults, config.retention);

        Ok(Self {
            capture: open(QueueName::Capture).await?,
            transcription: open(QueueName::Transcription).await?,
            notification: open(QueueName::Notification).await?,
            transcription_delay_ms: config.transcription_delay_ms,
        })
    }

    pub fn queue(&self, name: QueueName) -> &JobQueue {
        match name {
            QueueName::Capture => &self.capture,
            QueueName::Transcription => &self.transcription,
            QueueName::Notification => &self.notification,
        }
    }

    pub async fn add_capture_job(&self, job: &CaptureJob) -> Result<JobRef, QueueError> {
        self.capture.enqueue(&job.key(), job, None).await
    }

    /// Enqueue a transcription, delayed by `delay_ms` or the configured default
    pub async fn add_transcription_job(
        &self,
        job: &TranscriptionJob,
        delay_ms: Option<u64>,
    ) -> Result<JobRef, QueueError> {
        let delay = match delay_ms {
            Some(ms) if ms > 0 => ms,
            _ => self.transcription_delay_ms,
        };
        let options = self.transcription.defaults().with_delay(delay);
        self.transcription
            .enqueue(&job.key(), job, Some(options))
            .await
    }

    pub async fn add_notification_job(&self, job: &NotificationJob) -> Result<JobRef, QueueError> {
        self.notification.enqueue(&job.key(), job, None).await
    }

    /// Look a job up in the capture queue, then the transcription queue
    pub async fn find_job_status(&self, id: &str) -> Result<Option<JobStatus>, QueueError> {
        if let Some(status) = self.capture.get_status(id).await? {
            return Ok(Some(status));
        }
        self.transcription.get_status(id).await
    }

    /// Remove finished jobs older than `grace` from every queue
    pub async fn clean_queues(&self, grace: Duration) -> Result<usize, QueueError> {
        let mut removed = 0;
        for name in QueueName::ALL {
            for state in [JobState::Completed, JobState::Failed] {
                removed += self.queue(name).clean(grace, state).await?;
            }
        }
        info!(removed, "Cleaned queues");
        Ok(removed)
    }

    /// Stop accepting new jobs on every queue
    pub fn close(&self) {
        for name in QueueName::ALL {
            self.queue(name).close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::payload::{FailureMeta, NotificationEvent};

    async fn service() -> JobService {
        let conn = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        JobService::open(conn, &QueueConfig::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_transcription_job_has_default_delay() {
        let jobs = service().await;
        let job_ref = jobs
            .add_transcription_job(
                &TranscriptionJob {
                    egress_job_id: "e1".to_string(),
                    recording_url: "https://bucket/a.ogg".to_string(),
                    conversation_id: "c1".to_string(),
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(job_ref.key, "transcription-c1");
        let status = jobs.find_job_status(&job_ref.id).await.unwrap().unwrap();
        assert_eq!(status.state, JobState::Delayed);
        assert_eq!(status.data["recordingUrl"], "https://bucket/a.ogg");
    }

    #[tokio::test]
    async fn test_find_job_status_searches_capture_then_transcription() {
        let jobs = service().await;
        let capture = jobs
            .add_capture_job(&CaptureJob::Stop {
                room_id: "r1".to_string(),
                conversation_id: "c1".to_string(),
            })
            .await
            .unwrap();
        let notification = jobs
            .add_notification_job(&NotificationJob::new(
                "c1",
                NotificationEvent::EgressFailed(FailureMeta::new("boom")),
            ))
            .await
            .unwrap();

        assert_eq!(
            jobs.find_job_status(&capture.id).await.unwrap().unwrap().name,
            "capture-stop-r1"
        );
        // Notification jobs are not visible through the status lookup
        assert!(jobs.find_job_status(&notification.id).await.unwrap().is_none());
        assert!(jobs.find_job_status("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_rejects_new_jobs() {
        let jobs = service().await;
        jobs.close();
        let err = jobs
            .add_capture_job(&CaptureJob::Stop {
                room_id: "r1".to_string(),
                conversation_id: "c1".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Closed(QueueName::Capture)));
    }
}
