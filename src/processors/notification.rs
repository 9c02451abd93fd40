//! Notification queue processor: conversation status transitions plus
//! fan-out to the notification service.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::notify::NotificationService;
use crate::queue::{JobContext, JobHandler, NotificationEvent, NotificationJob};
use crate::store::Store;

pub struct NotificationProcessor {
    store: Store,
    notifier: NotificationService,
}

impl NotificationProcessor {
    pub fn new(store: Store, notifier: NotificationService) -> Self {
        Self { store, notifier }
    }
}

#[async_trait]
impl JobHandler for NotificationProcessor {
    type Payload = NotificationJob;

    #[instrument(skip(self, _ctx, job), fields(conversation_id = %job.conversation_id, kind = job.event.name()))]
    async fn handle(&self, _ctx: &JobContext, job: NotificationJob) -> Result<Value> {
        let context = self
            .store
            .conversation_context(&job.conversation_id)
            .await?
            .with_context(|| format!("Conversation {} not found", job.conversation_id))?;
        let org = &context.organization;
        let title = context.room.name.as_str();

        match &job.event {
            NotificationEvent::TranscriptionComplete(meta) => {
                let completed = self
                    .store
                    .mark_conversation_completed(&job.conversation_id, Utc::now())
                    .await?;
                if !completed {
                    anyhow::bail!(
                        "Conversation {} has no transcript to complete",
                        job.conversation_id
                    );
                }
                self.notifier
                    .notify_transcription_complete(org, title, &meta.transcript_id)
                    .await;
            }
            NotificationEvent::TranscriptionFailed(meta) => {
                if !self
                    .store
                    .mark_conversation_failed(&job.conversation_id)
                    .await?
                {
                    warn!("Conversation already completed, keeping status");
                }
                self.notifier
                    .notify_transcription_failed(org, title, &meta.error)
                    .await;
            }
            NotificationEvent::EgressComplete(_) => {
                self.notifier
                    .notify_room_ended(org, title, context.conversation.duration_seconds())
                    .await;
            }
            NotificationEvent::EgressFailed(meta) => {
                self.notifier
                    .notify_capture_failed(org, title, meta.participant_id.as_deref(), &meta.error)
                    .await;
            }
        }

        info!(organization = %org.name, "Notification processed");
        Ok(json!({ "notified": true }))
    }
}
