//! Egress (capture) events.
//!
//! `egress_ended` records the capture outcome once, then re-reads every
//! capture of the conversation. When all of them are terminal the
//! conversation moves to PROCESSING and a transcription job is enqueued.
//! Captures of one conversation end in any order and the same event may be
//! delivered more than once, so nothing here relies on earlier deliveries.

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::domain::{EgressEvent, EgressJob, EgressOutcome};
use crate::queue::{
    FailureMeta, JobService, NotificationEvent, NotificationJob, TranscriptionJob,
};
use crate::store::Store;

pub struct EgressHandler {
    store: Store,
    jobs: JobService,
}

impl EgressHandler {
    pub fn new(store: Store, jobs: JobService) -> Self {
        Self { store, jobs }
    }

    pub async fn egress_started(&self, event: &EgressEvent) -> Result<()> {
        info!(egress_id = %event.egress_info.egress_id, "Egress started");
        Ok(())
    }

    pub async fn egress_updated(&self, event: &EgressEvent) -> Result<()> {
        debug!(
            egress_id = %event.egress_info.egress_id,
            status = ?event.egress_info.status,
            "Egress updated"
        );
        Ok(())
    }

    #[instrument(skip(self, event), fields(egress_id = %event.egress_info.egress_id))]
    pub async fn egress_ended(&self, event: &EgressEvent) -> Result<()> {
        let info = &event.egress_info;
        let Some(job) = self.store.find_egress_by_external_id(&info.egress_id).await? else {
            warn!("Unknown egress, ignoring");
            return Ok(());
        };

        let outcome = info.outcome();
        let recorded = self
            .store
            .complete_egress(&job.id, &outcome, Utc::now())
            .await?;
        match (&outcome, recorded) {
            (_, false) => info!(egress_job_id = %job.id, "Capture already terminal"),
            (EgressOutcome::Completed { audio_file_url }, true) => {
                info!(egress_job_id = %job.id, %audio_file_url, "Capture completed")
            }
            (EgressOutcome::Failed { error }, true) => {
                warn!(egress_job_id = %job.id, %error, "Capture failed")
            }
        }

        self.advance_conversation(&job).await
    }

    /// Move the conversation on once every capture has finished
    async fn advance_conversation(&self, trigger: &EgressJob) -> Result<()> {
        let conversation_id = &trigger.conversation_id;
        let captures = self
            .store
            .list_egress_for_conversation(conversation_id)
            .await?;

        let pending = captures.iter().filter(|j| !j.status.is_terminal()).count();
        if pending > 0 {
            debug!(%conversation_id, pending, "Waiting for remaining captures");
            return Ok(());
        }

        if self
            .store
            .mark_conversation_processing(conversation_id, Utc::now())
            .await?
        {
            info!(%conversation_id, "All captures finished, conversation processing");
        }

        match recording_source(trigger, &captures) {
            Some((source, recording_url)) => {
                let job_ref = self
                    .jobs
                    .add_transcription_job(
                        &TranscriptionJob {
                            egress_job_id: source.id.clone(),
                            recording_url: recording_url.to_string(),
                            conversation_id: conversation_id.clone(),
                        },
                        None,
                    )
                    .await?;
                info!(%conversation_id, job_id = %job_ref.id, "Transcription queued");
            }
            None => {
                warn!(%conversation_id, "No capture produced a recording");
                let mut meta = FailureMeta::new("No capture produced a recording");
                meta.egress_job_id = Some(trigger.id.clone());
                meta.stage = Some("capture".to_string());
                self.jobs
                    .add_notification_job(&NotificationJob::new(
                        conversation_id,
                        NotificationEvent::EgressFailed(meta),
                    ))
                    .await?;
                self.store.mark_conversation_failed(conversation_id).await?;
            }
        }
        Ok(())
    }
}

/// The triggering capture's recording, else the most recently completed one
fn recording_source<'a>(
    trigger: &EgressJob,
    captures: &'a [EgressJob],
) -> Option<(&'a EgressJob, &'a str)> {
    let with_audio = |j: &'a EgressJob| j.audio_file_url.as_deref().map(|url| (j, url));

    captures
        .iter()
        .find(|j| j.id == trigger.id)
        .and_then(with_audio)
        .or_else(|| {
            captures
                .iter()
                .filter(|j| j.audio_file_url.is_some())
                .max_by_key(|j| j.completed_at)
                .and_then(with_audio)
        })
}
