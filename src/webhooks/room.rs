//! Room lifecycle events.

use anyhow::Result;
use chrono::Utc;
use tracing::{error, info, instrument};

use crate::domain::RoomEvent;
use crate::store::Store;

pub struct RoomHandler {
    store: Store,
}

impl RoomHandler {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Rooms are persisted when created through the API; this only logs
    #[instrument(skip(self, event), fields(room = %event.room.name))]
    pub async fn room_started(&self, event: &RoomEvent) -> Result<()> {
        match self.store.find_room_by_external_id(&event.room.name).await? {
            Some(room) => info!(room_id = %room.id, "Room is now active"),
            None => info!("Room started but is not tracked"),
        }
        Ok(())
    }

    /// Room → ENDED and its recording conversations → PROCESSING
    #[instrument(skip(self, event), fields(room = %event.room.name))]
    pub async fn room_finished(&self, event: &RoomEvent) -> Result<()> {
        let Some(room) = self.store.find_room_by_external_id(&event.room.name).await? else {
            error!("Room not found");
            return Ok(());
        };

        let now = Utc::now();
        if !self.store.end_room(&room.id, now).await? {
            info!(room_id = %room.id, "Room was already ended");
        }
        let finished = self.store.finish_recording_conversations(&room.id, now).await?;

        info!(room_id = %room.id, conversations = finished, "Room marked as ended");
        Ok(())
    }
}
