//! Transcription queue processor.
//!
//! Signs the recording URL, runs speech recognition, groups words into
//! speaker segments and persists the transcript with its segments. A
//! conversation that already has a transcript is not transcribed again, so
//! duplicate transcription jobs are harmless. If that conversation never
//! reached COMPLETED, its completion notification is queued again.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};

use crate::adapters::{ObjectStorage, SpeechTranscriber};
use crate::domain::{
    parse_transcript_content, serialize_transcript_content, ConversationStatus, TranscriptionStatus,
};
use crate::queue::{
    FailureMeta, JobContext, JobHandler, JobService, NotificationEvent, NotificationJob,
    TranscriptionCompleteMeta, TranscriptionJob,
};
use crate::store::{NewSegment, NewTranscript, Store, StoreError};
use crate::transcription::{
    build_segments, segment_confidence, speaker_label, summarize, TranscribeOptions,
};

pub struct TranscriptionProcessor {
    store: Store,
    storage: Arc<dyn ObjectStorage>,
    transcriber: Arc<dyn SpeechTranscriber>,
    jobs: JobService,
    options: TranscribeOptions,
}

impl TranscriptionProcessor {
    pub fn new(
        store: Store,
        storage: Arc<dyn ObjectStorage>,
        transcriber: Arc<dyn SpeechTranscriber>,
        jobs: JobService,
        options: TranscribeOptions,
    ) -> Self {
        Self {
            store,
            storage,
            transcriber,
            jobs,
            options,
        }
    }

    async fn progress(&self, ctx: &JobContext, stage: &str, percent: u8) {
        if let Err(e) = ctx
            .progress(json!({ "stage": stage, "percent": percent }))
            .await
        {
            warn!(error = %e, "Failed to report progress");
        }
    }

    async fn transcribe(&self, ctx: &JobContext, job: &TranscriptionJob) -> Result<Value> {
        let started = Instant::now();
        self.store
            .set_transcription_status(&job.egress_job_id, TranscriptionStatus::Processing, None, None)
            .await?;

        self.progress(ctx, "signing", 10).await;
        let key = self.storage.extract_key_from_url(&job.recording_url);
        let url = self
            .storage
            .signed_download_url(&key)
            .await
            .with_context(|| format!("Failed to sign download URL for {}", key))?;

        self.progress(ctx, "transcribing", 30).await;
        let words = self.transcriber.transcribe(&url, &self.options).await?;

        self.progress(ctx, "saving", 80).await;
        let content = summarize(build_segments(words), &self.options.language_code);
        let segments = content
            .segments
            .iter()
            .map(|segment| NewSegment {
                speaker_label: speaker_label(segment.speaker_tag),
                text: segment.text.clone(),
                start_time: segment.start_time,
                end_time: segment.end_time,
                confidence: segment_confidence(segment),
                words: segment.words.clone(),
            })
            .collect();

        let saved = self
            .store
            .save_transcript(
                NewTranscript {
                    conversation_id: job.conversation_id.clone(),
                    content: serialize_transcript_content(&content),
                    raw_content: content.full_text.clone(),
                    processing_time_ms: started.elapsed().as_millis() as u64,
                    word_count: content.word_count,
                },
                segments,
            )
            .await;
        let transcript = match saved {
            Ok(transcript) => transcript,
            Err(StoreError::Conflict(reason)) => {
                // Another job for this conversation won the race
                info!(%reason, "Transcript already saved");
                return Ok(json!({ "skipped": true }));
            }
            Err(e) => return Err(e).context("Failed to save transcript"),
        };

        self.store
            .set_transcription_status(
                &job.egress_job_id,
                TranscriptionStatus::Completed,
                None,
                Some(Utc::now()),
            )
            .await?;
        self.progress(ctx, "done", 100).await;

        let event = NotificationEvent::TranscriptionComplete(TranscriptionCompleteMeta {
            transcript_id: transcript.id.clone(),
            word_count: content.word_count,
            duration: content.duration,
            speaker_count: content.speaker_count,
        });
        self.jobs
            .add_notification_job(&NotificationJob::new(&job.conversation_id, event))
            .await?;

        info!(
            transcript_id = %transcript.id,
            words = content.word_count,
            speakers = content.speaker_count,
            "Transcript saved"
        );
        Ok(json!({
            "transcriptId": transcript.id,
            "wordCount": content.word_count,
            "duration": content.duration,
        }))
    }

    /// Transcript saved by an earlier attempt. Re-queue its completion unless
    /// the conversation already completed.
    async fn resume_existing(&self, job: &TranscriptionJob) -> Result<Value> {
        let conversation = self
            .store
            .get_conversation(&job.conversation_id)
            .await?
            .with_context(|| format!("Conversation {} not found", job.conversation_id))?;
        if conversation.status == ConversationStatus::Completed {
            info!("Transcript already exists, skipping");
            return Ok(json!({ "skipped": true }));
        }

        let (transcript, _) = self
            .store
            .find_transcript(&job.conversation_id)
            .await?
            .with_context(|| format!("Transcript for {} disappeared", job.conversation_id))?;
        let content = parse_transcript_content(&transcript.content);

        self.store
            .set_transcription_status(
                &job.egress_job_id,
                TranscriptionStatus::Completed,
                None,
                Some(Utc::now()),
            )
            .await?;

        let event = NotificationEvent::TranscriptionComplete(TranscriptionCompleteMeta {
            transcript_id: transcript.id.clone(),
            word_count: transcript.word_count,
            duration: content.as_ref().map_or(0.0, |c| c.duration),
            speaker_count: content.as_ref().map_or(0, |c| c.speaker_count),
        });
        self.jobs
            .add_notification_job(&NotificationJob::new(&job.conversation_id, event))
            .await?;

        warn!(
            transcript_id = %transcript.id,
            status = conversation.status.as_str(),
            "Transcript exists for an unfinished conversation, completion re-queued"
        );
        Ok(json!({ "skipped": true, "transcriptId": transcript.id }))
    }

    async fn record_failure(&self, job: &TranscriptionJob, reason: &str) {
        if let Err(e) = self
            .store
            .set_transcription_status(
                &job.egress_job_id,
                TranscriptionStatus::Failed,
                Some(reason),
                Some(Utc::now()),
            )
            .await
        {
            error!(error = %e, "Failed to record transcription failure");
        }

        let mut meta = FailureMeta::new(reason);
        meta.egress_job_id = Some(job.egress_job_id.clone());
        let notification =
            NotificationJob::new(&job.conversation_id, NotificationEvent::TranscriptionFailed(meta));
        if let Err(e) = self.jobs.add_notification_job(&notification).await {
            error!(error = %e, "Failed to enqueue transcription failure notification");
        }
    }
}

#[async_trait]
impl JobHandler for TranscriptionProcessor {
    type Payload = TranscriptionJob;

    #[instrument(skip(self, ctx, job), fields(conversation_id = %job.conversation_id, egress_job_id = %job.egress_job_id))]
    async fn handle(&self, ctx: &JobContext, job: TranscriptionJob) -> Result<Value> {
        if self.store.transcript_exists(&job.conversation_id).await? {
            return self.resume_existing(&job).await;
        }

        match self.transcribe(ctx, &job).await {
            Ok(result) => Ok(result),
            Err(e) => {
                let reason = format!("{:#}", e);
                error!(error = %reason, "Transcription failed");
                self.record_failure(&job, &reason).await;
                Err(e)
            }
        }
    }
}
