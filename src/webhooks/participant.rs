//! Participant presence events.

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, instrument};

use crate::domain::{Conversation, ParticipantEvent};
use crate::store::Store;

pub struct ParticipantHandler {
    store: Store,
}

impl ParticipantHandler {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Most recent recording conversation of the event's room
    async fn recording_conversation(&self, event: &ParticipantEvent) -> Result<Option<Conversation>> {
        let Some(room) = self.store.find_room_by_external_id(&event.room.name).await? else {
            debug!("Room not tracked");
            return Ok(None);
        };
        let conversation = self.store.find_recording_conversation(&room.id).await?;
        if conversation.is_none() {
            debug!(room_id = %room.id, "No recording conversation");
        }
        Ok(conversation)
    }

    #[instrument(skip(self, event), fields(room = %event.room.name, identity = %event.participant.identity))]
    pub async fn participant_joined(&self, event: &ParticipantEvent) -> Result<()> {
        let Some(conversation) = self.recording_conversation(event).await? else {
            return Ok(());
        };

        let (participant, created) = self
            .store
            .add_participant_if_absent(
                &conversation.id,
                &event.participant.identity,
                event.participant.display_name(),
                event.participant.joined_at_utc(),
            )
            .await?;
        if created {
            info!(participant_id = %participant.id, conversation_id = %conversation.id, "Participant joined");
        }
        Ok(())
    }

    #[instrument(skip(self, event), fields(room = %event.room.name, identity = %event.participant.identity))]
    pub async fn participant_left(&self, event: &ParticipantEvent) -> Result<()> {
        let Some(conversation) = self.recording_conversation(event).await? else {
            return Ok(());
        };

        let updated = self
            .store
            .mark_participant_left(&conversation.id, &event.participant.identity, Utc::now())
            .await?;
        info!(conversation_id = %conversation.id, updated, "Participant left");
        Ok(())
    }
}
