//! Inbound webhooks from the media platform.
//!
//! This module contains:
//! - verify: signature check on the raw body
//! - dispatch: body parsing and routing to the handlers
//! - room, participant, egress: event-specific state transitions

pub mod dispatch;
pub mod egress;
pub mod participant;
pub mod room;
pub mod verify;

pub use dispatch::{parse, Dispatcher};
pub use egress::EgressHandler;
pub use participant::ParticipantHandler;
pub use room::RoomHandler;
pub use verify::WebhookVerifier;

use crate::queue::JobService;
use crate::store::Store;

impl Dispatcher {
    /// Dispatcher with all handlers sharing one store and job service
    pub fn from_parts(store: Store, jobs: JobService) -> Self {
        Self::new(
            RoomHandler::new(store.clone()),
            ParticipantHandler::new(store.clone()),
            EgressHandler::new(store, jobs),
        )
    }
}
