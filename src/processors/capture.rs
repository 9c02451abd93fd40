//! Capture queue processor: starts and stops per-participant audio egress.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{error, info, instrument};

use crate::adapters::{MediaPlatform, TrackCaptureRequest};
use crate::queue::{
    CaptureJob, EgressCompleteMeta, FailureMeta, JobContext, JobHandler, JobService,
    NotificationEvent, NotificationJob,
};
use crate::store::{NewEgressJob, Store};

/// Handles `start` and `stop` capture jobs
pub struct CaptureProcessor {
    store: Store,
    platform: Arc<dyn MediaPlatform>,
    jobs: JobService,
}

struct StartCapture<'a> {
    room_id: &'a str,
    conversation_id: &'a str,
    participant_id: &'a str,
    participant_identity: &'a str,
    track_id: &'a str,
}

impl CaptureProcessor {
    pub fn new(store: Store, platform: Arc<dyn MediaPlatform>, jobs: JobService) -> Self {
        Self {
            store,
            platform,
            jobs,
        }
    }

    #[instrument(skip(self, start), fields(conversation_id = %start.conversation_id, participant_id = %start.participant_id))]
    async fn start(&self, start: StartCapture<'_>) -> Result<Value> {
        match self.try_start(&start).await {
            Ok((job_id, egress_id)) => {
                info!(%egress_id, "Capture started");
                Ok(json!({ "egressId": egress_id, "egressJobId": job_id }))
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                error!(error = %reason, "Capture start failed");

                let failed_id = format!(
                    "failed-{}-{}",
                    Utc::now().timestamp_millis(),
                    start.participant_id
                );
                if let Err(se) = self
                    .store
                    .create_egress_job(NewEgressJob::failed(
                        failed_id,
                        start.conversation_id,
                        start.participant_id,
                        reason.clone(),
                    ))
                    .await
                {
                    error!(error = %se, "Failed to record failed capture");
                }

                let mut meta = FailureMeta::new(reason);
                meta.room_id = Some(start.room_id.to_string());
                meta.participant_id = Some(start.participant_id.to_string());
                meta.stage = Some("start".to_string());
                self.notify_failure(start.conversation_id, meta).await;

                Err(e)
            }
        }
    }

    async fn try_start(&self, start: &StartCapture<'_>) -> Result<(String, String)> {
        let room = self
            .store
            .get_room(start.room_id)
            .await?
            .with_context(|| format!("Room {} not found", start.room_id))?;

        let egress_id = self
            .platform
            .start_track_capture(&TrackCaptureRequest {
                room_name: room.external_room_id,
                track_id: start.track_id.to_string(),
                participant_identity: start.participant_identity.to_string(),
                participant_id: start.participant_id.to_string(),
            })
            .await?;

        let job = self
            .store
            .create_egress_job(NewEgressJob::running(
                egress_id.clone(),
                start.conversation_id,
                start.participant_id,
            ))
            .await
            .context("Failed to record capture")?;

        Ok((job.id, egress_id))
    }

    #[instrument(skip(self))]
    async fn stop(&self, room_id: &str, conversation_id: &str) -> Result<Value> {
        match self.try_stop(room_id).await {
            Ok(stopped) => {
                info!(stopped, "Captures stopped");
                let event = NotificationEvent::EgressComplete(EgressCompleteMeta {
                    room_id: room_id.to_string(),
                    stopped,
                });
                self.jobs
                    .add_notification_job(&NotificationJob::new(conversation_id, event))
                    .await?;
                Ok(json!({ "stopped": stopped }))
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                error!(error = %reason, "Capture stop failed");

                let mut meta = FailureMeta::new(reason);
                meta.room_id = Some(room_id.to_string());
                meta.stage = Some("stop".to_string());
                self.notify_failure(conversation_id, meta).await;

                Err(e)
            }
        }
    }

    async fn try_stop(&self, room_id: &str) -> Result<usize> {
        let active = self.store.list_active_egress_for_room(room_id).await?;
        for job in &active {
            self.platform
                .stop_capture(&job.external_egress_id)
                .await
                .with_context(|| format!("Failed to stop capture {}", job.id))?;
        }
        Ok(active.len())
    }

    /// Best effort: a lost notification must not mask the capture error
    async fn notify_failure(&self, conversation_id: &str, meta: FailureMeta) {
        let job = NotificationJob::new(conversation_id, NotificationEvent::EgressFailed(meta));
        if let Err(e) = self.jobs.add_notification_job(&job).await {
            error!(error = %e, "Failed to enqueue capture failure notification");
        }
    }
}

#[async_trait]
impl JobHandler for CaptureProcessor {
    type Payload = CaptureJob;

    async fn handle(&self, _ctx: &JobContext, payload: CaptureJob) -> Result<Value> {
        match &payload {
            CaptureJob::Start {
                room_id,
                conversation_id,
                participant_id,
                participant_identity,
                track_id,
            } => {
                self.start(StartCapture {
                    room_id,
                    conversation_id,
                    participant_id,
                    participant_identity,
                    track_id,
                })
                .await
            }
            CaptureJob::Stop {
                room_id,
                conversation_id,
            } => self.stop(room_id, conversation_id).await,
        }
    }
}
