//! HTTP API for roomscribe.
//!
//! Provides endpoints for:
//! - Media platform webhooks
//! - Job status
//! - Room management
//! - Conversations and transcripts
//! - In-app notifications

pub mod error;
pub mod routes;

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::adapters::MediaPlatform;
use crate::config::LiveKitConfig;
use crate::notify::NotificationRepository;
use crate::queue::JobService;
use crate::store::Store;
use crate::webhooks::{Dispatcher, WebhookVerifier};

/// Room creation limits applied to every new platform room
#[derive(Debug, Clone, Copy)]
pub struct RoomDefaults {
    pub empty_timeout_secs: u32,
    pub max_participants: u32,
}

impl From<&LiveKitConfig> for RoomDefaults {
    fn from(config: &LiveKitConfig) -> Self {
        Self {
            empty_timeout_secs: config.empty_timeout_secs,
            max_participants: config.max_participants,
        }
    }
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub jobs: JobService,
    pub platform: Arc<dyn MediaPlatform>,
    pub verifier: WebhookVerifier,
    pub dispatcher: Arc<Dispatcher>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub room_defaults: RoomDefaults,
}

impl AppState {
    pub fn new(
        store: Store,
        jobs: JobService,
        platform: Arc<dyn MediaPlatform>,
        verifier: WebhookVerifier,
        notifications: Arc<dyn NotificationRepository>,
        room_defaults: RoomDefaults,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::from_parts(store.clone(), jobs.clone()));
        Self {
            store,
            jobs,
            platform,
            verifier,
            dispatcher,
            notifications,
            room_defaults,
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(status))
        .merge(routes::webhooks::router())
        .merge(routes::jobs::router())
        .merge(routes::rooms::router())
        .merge(routes::conversations::router())
        .merge(routes::notifications::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until `shutdown` resolves
pub async fn serve(
    state: AppState,
    bind: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;

    info!("API server listening on http://{}", listener.local_addr()?);
    info!("Endpoints:");
    info!("  POST   /webhooks/livekit                         - Media platform webhook");
    info!("  GET    /jobs/{{id}}                                - Job status");
    info!("  POST   /rooms                                    - Create room");
    info!("  GET    /rooms/live                               - List platform rooms");
    info!("  POST   /rooms/{{id}}/end                           - End room");
    info!("  POST   /rooms/{{id}}/token                         - Participant token");
    info!("  GET    /rooms/{{id}}/participants                  - List participants");
    info!("  POST   /conversations                            - Start conversation");
    info!("  POST   /conversations/{{id}}/start-recording       - Start captures");
    info!("  POST   /conversations/{{id}}/stop-recording        - Stop captures");
    info!("  GET    /conversations/{{id}}/transcript            - Transcript");
    info!("  GET    /notifications/{{user_id}}                  - Notifications");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server failed")?;

    info!("API server stopped");
    Ok(())
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "roomscribe",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}
