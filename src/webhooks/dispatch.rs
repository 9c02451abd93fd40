//! Webhook body parsing and routing.

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use super::{EgressHandler, ParticipantHandler, RoomHandler};
use crate::domain::WebhookEvent;

/// Decode a webhook body into a typed event.
///
/// Returns `None` for malformed JSON, a missing `event` discriminator, or a
/// known event whose payload does not match its shape. Unknown
/// discriminators decode to [`WebhookEvent::Unknown`].
pub fn parse(body: &[u8]) -> Option<WebhookEvent> {
    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Failed to parse webhook body");
            return None;
        }
    };
    let Some(name) = value.get("event").and_then(Value::as_str).map(str::to_string) else {
        warn!("Webhook body has no event type");
        return None;
    };

    fn decode<T: DeserializeOwned>(name: &str, value: Value) -> Option<T> {
        serde_json::from_value(value)
            .map_err(|e| warn!(event = name, error = %e, "Invalid webhook event payload"))
            .ok()
    }

    let event = match name.as_str() {
        "room_started" => WebhookEvent::RoomStarted(decode(&name, value)?),
        "room_finished" => WebhookEvent::RoomFinished(decode(&name, value)?),
        "participant_joined" => WebhookEvent::ParticipantJoined(decode(&name, value)?),
        "participant_left" => WebhookEvent::ParticipantLeft(decode(&name, value)?),
        "egress_started" => WebhookEvent::EgressStarted(decode(&name, value)?),
        "egress_updated" => WebhookEvent::EgressUpdated(decode(&name, value)?),
        "egress_ended" => WebhookEvent::EgressEnded(decode(&name, value)?),
        _ => WebhookEvent::Unknown(name),
    };
    Some(event)
}

/// Routes typed events to their handlers
pub struct Dispatcher {
    rooms: RoomHandler,
    participants: ParticipantHandler,
    egress: EgressHandler,
}

impl Dispatcher {
    pub fn new(rooms: RoomHandler, participants: ParticipantHandler, egress: EgressHandler) -> Self {
        Self {
            rooms,
            participants,
            egress,
        }
    }

    /// Run the handler for `event` to completion
    pub async fn dispatch(&self, event: &WebhookEvent) -> Result<()> {
        info!(event = event.name(), "Received webhook event");
        match event {
            WebhookEvent::RoomStarted(e) => self.rooms.room_started(e).await,
            WebhookEvent::RoomFinished(e) => self.rooms.room_finished(e).await,
            WebhookEvent::ParticipantJoined(e) => self.participants.participant_joined(e).await,
            WebhookEvent::ParticipantLeft(e) => self.participants.participant_left(e).await,
            WebhookEvent::EgressStarted(e) => self.egress.egress_started(e).await,
            WebhookEvent::EgressUpdated(e) => self.egress.egress_updated(e).await,
            WebhookEvent::EgressEnded(e) => self.egress.egress_ended(e).await,
            WebhookEvent::Unknown(name) => {
                info!(event = %name, "Unhandled event type");
                Ok(())
            }
        }
    }
}
