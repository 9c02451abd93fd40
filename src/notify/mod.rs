//! User-facing notifications.
//!
//! [`NotificationService`] fans a pipeline event out to email and in-app
//! channels. Delivery failures are logged and never propagated: the pipeline
//! state transition that triggered the notification has already happened.

pub mod in_app;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::domain::Organization;

pub use in_app::{
    InAppNotification, InMemoryNotificationRepository, ListOptions, NotificationRepository,
    DEFAULT_LIST_LIMIT,
};

/// Kind of user-facing notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    TranscriptionComplete,
    TranscriptionFailed,
    RoomEnded,
    EgressStarted,
    EgressFailed,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TranscriptionComplete => "TRANSCRIPTION_COMPLETE",
            Self::TranscriptionFailed => "TRANSCRIPTION_FAILED",
            Self::RoomEnded => "ROOM_ENDED",
            Self::EgressStarted => "EGRESS_STARTED",
            Self::EgressFailed => "EGRESS_FAILED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "TRANSCRIPTION_COMPLETE" => Some(Self::TranscriptionComplete),
            "TRANSCRIPTION_FAILED" => Some(Self::TranscriptionFailed),
            "ROOM_ENDED" => Some(Self::RoomEnded),
            "EGRESS_STARTED" => Some(Self::EgressStarted),
            "EGRESS_FAILED" => Some(Self::EgressFailed),
            _ => None,
        }
    }
}

/// Channel-independent notification body
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationData {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub metadata: serde_json::Value,
}

/// An email ready to hand to a sender
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: NotificationData,
}

/// Outbound email transport
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: &EmailMessage) -> Result<()>;
}

/// Email sender that only logs; used until a mail provider is configured
#[derive(Debug, Default, Clone)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, email: &EmailMessage) -> Result<()> {
        info!(
            to = %email.to,
            subject = %email.subject,
            kind = email.body.kind.as_str(),
            "Sending email notification"
        );
        Ok(())
    }
}

/// Fan-out over email and in-app channels
#[derive(Clone)]
pub struct NotificationService {
    email: Arc<dyn EmailSender>,
    in_app: Arc<dyn NotificationRepository>,
}

impl NotificationService {
    pub fn new(email: Arc<dyn EmailSender>, in_app: Arc<dyn NotificationRepository>) -> Self {
        Self { email, in_app }
    }

    pub fn in_app(&self) -> &Arc<dyn NotificationRepository> {
        &self.in_app
    }

    pub async fn notify_transcription_complete(
        &self,
        org: &Organization,
        conversation_title: &str,
        transcript_id: &str,
    ) {
        let metadata = json!({
            "transcriptId": transcript_id,
            "conversationTitle": conversation_title,
        });
        let email = NotificationData {
            kind: NotificationKind::TranscriptionComplete,
            title: "Your transcription is ready!".to_string(),
            message: format!(
                "The transcription for \"{}\" has been completed and is now available for viewing.",
                conversation_title
            ),
            metadata: metadata.clone(),
        };
        let in_app = NotificationData {
            kind: NotificationKind::TranscriptionComplete,
            title: "Transcription Complete".to_string(),
            message: format!(
                "Your transcription for \"{}\" is ready to view.",
                conversation_title
            ),
            metadata,
        };

        self.deliver(
            org,
            format!("Transcription Ready: {}", conversation_title),
            email,
            in_app,
        )
        .await;
    }

    pub async fn notify_transcription_failed(
        &self,
        org: &Organization,
        conversation_title: &str,
        reason: &str,
    ) {
        let metadata = json!({
            "conversationTitle": conversation_title,
            "error": reason,
        });
        let email = NotificationData {
            kind: NotificationKind::TranscriptionFailed,
            title: "Transcription failed".to_string(),
            message: format!(
                "We encountered an error while transcribing \"{}\". Error: {}",
                conversation_title, reason
            ),
            metadata: metadata.clone(),
        };
        let in_app = NotificationData {
            kind: NotificationKind::TranscriptionFailed,
            title: "Transcription Failed".to_string(),
            message: format!("Failed to transcribe \"{}\": {}", conversation_title, reason),
            metadata,
        };

        self.deliver(
            org,
            format!("Transcription Failed: {}", conversation_title),
            email,
            in_app,
        )
        .await;
    }

    /// `duration_secs` is the recorded conversation length
    pub async fn notify_room_ended(&self, org: &Organization, room_name: &str, duration_secs: i64) {
        let minutes = duration_secs.max(0) / 60;
        let metadata = json!({
            "roomName": room_name,
            "duration": duration_secs,
        });
        let email = NotificationData {
            kind: NotificationKind::RoomEnded,
            title: "Your room has ended".to_string(),
            message: format!(
                "The room \"{}\" has ended after {} minutes. The recording is being processed.",
                room_name, minutes
            ),
            metadata: metadata.clone(),
        };
        let in_app = NotificationData {
            kind: NotificationKind::RoomEnded,
            title: "Room Ended".to_string(),
            message: format!("\"{}\" ended after {} minutes.", room_name, minutes),
            metadata,
        };

        self.deliver(org, format!("Room Ended: {}", room_name), email, in_app)
            .await;
    }

    pub async fn notify_capture_failed(
        &self,
        org: &Organization,
        room_name: &str,
        participant_id: Option<&str>,
        reason: &str,
    ) {
        let metadata = json!({
            "roomName": room_name,
            "participantId": participant_id,
            "error": reason,
        });
        let message = format!("Recording failed in \"{}\": {}", room_name, reason);
        let data = NotificationData {
            kind: NotificationKind::EgressFailed,
            title: "Recording Failed".to_string(),
            message,
            metadata,
        };

        self.deliver(
            org,
            format!("Recording Failed: {}", room_name),
            data.clone(),
            data,
        )
        .await;
    }

    async fn deliver(
        &self,
        org: &Organization,
        subject: String,
        email: NotificationData,
        in_app: NotificationData,
    ) {
        let kind = in_app.kind.as_str();

        let send_email = async {
            let Some(to) = org.email.as_deref() else {
                return;
            };
            let message = EmailMessage {
                to: to.to_string(),
                subject,
                body: email,
            };
            if let Err(e) = self.email.send(&message).await {
                error!(org_id = %org.id, kind, error = %e, "Failed to send email notification");
            }
        };
        let store_in_app = async {
            if let Err(e) = self.in_app.create(&org.owner_user_id, in_app).await {
                error!(org_id = %org.id, kind, error = %e, "Failed to store in-app notification");
            }
        };

        tokio::join!(send_email, store_in_app);
    }
}
