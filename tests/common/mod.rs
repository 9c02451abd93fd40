//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::Mutex;

use roomscribe::adapters::{
    CreateRoomRequest, MediaPlatform, ObjectStorage, ParticipantUpdate, SpeechTranscriber,
    TrackCaptureRequest,
};
use roomscribe::api::{AppState, RoomDefaults};
use roomscribe::config::{LiveKitConfig, QueueConfig};
use roomscribe::domain::{Organization, ParticipantInfo, Room, RoomInfo, Word};
use roomscribe::notify::InMemoryNotificationRepository;
use roomscribe::queue::{JobService, QueueName, RetryPolicy};
use roomscribe::store::{NewRoom, Store};
use roomscribe::token::{body_digest, sign, Claims};
use roomscribe::transcription::TranscribeOptions;
use roomscribe::webhooks::WebhookVerifier;

pub const API_KEY: &str = "APIkey";
pub const API_SECRET: &str = "secret";
pub const OWNER: &str = "owner-1";

/// On-disk store and queues with fast retries
pub struct TestEnv {
    pub _dir: TempDir,
    pub store: Store,
    pub jobs: JobService,
    pub room: Room,
}

pub fn fast_queue_config() -> QueueConfig {
    QueueConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            initial_delay_ms: 50,
            max_delay_ms: 200,
            backoff_multiplier: 2.0,
        },
        transcription_delay_ms: 10,
        poll_interval_ms: 20,
        ..QueueConfig::default()
    }
}

pub async fn test_env_with(config: QueueConfig) -> TestEnv {
    let dir = TempDir::new().unwrap();
    let store = Store::open(&dir.path().join("state.db")).unwrap();
    store
        .insert_organization(&Organization {
            id: "org-1".to_string(),
            name: "Acme".to_string(),
            email: Some("ops@acme.test".to_string()),
            owner_user_id: OWNER.to_string(),
        })
        .await
        .unwrap();
    let room = store
        .create_room(NewRoom {
            external_room_id: "standup".to_string(),
            name: "Daily standup".to_string(),
            organization_id: "org-1".to_string(),
        })
        .await
        .unwrap();
    let jobs = JobService::open(store.connection(), &config).await.unwrap();

    TestEnv {
        _dir: dir,
        store,
        jobs,
        room,
    }
}

pub async fn test_env() -> TestEnv {
    test_env_with(fast_queue_config()).await
}

impl TestEnv {
    pub fn app_state(&self, platform: Arc<dyn MediaPlatform>) -> AppState {
        AppState::new(
            self.store.clone(),
            self.jobs.clone(),
            platform,
            WebhookVerifier::new(API_KEY, API_SECRET),
            Arc::new(InMemoryNotificationRepository::new()),
            RoomDefaults::from(&LiveKitConfig::default()),
        )
    }

    /// Payloads queued on `name`, oldest first
    pub async fn queued(&self, name: QueueName) -> Vec<Value> {
        let mut statuses = self.jobs.queue(name).list(None, 100).await.unwrap();
        statuses.reverse();
        statuses.into_iter().map(|s| s.data).collect()
    }
}

/// Signature token for a webhook body
pub fn sign_body(body: &str) -> String {
    let mut claims = Claims::new(API_KEY, 300);
    claims.sha256 = Some(body_digest(body.as_bytes()));
    sign(&claims, API_SECRET).unwrap()
}

/// Poll `check` until it returns true or `timeout` passes
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check().await
}

/// Media platform that records calls; optionally refuses to start captures
#[derive(Default)]
pub struct RecordingPlatform {
    pub fail_start: bool,
    pub started: Mutex<Vec<TrackCaptureRequest>>,
    pub stopped: Mutex<Vec<String>>,
    pub next_egress: AtomicU32,
}

#[async_trait]
impl MediaPlatform for RecordingPlatform {
    async fn create_room(&self, request: &CreateRoomRequest) -> Result<RoomInfo> {
        Ok(RoomInfo {
            sid: format!("RM_{}", request.name),
            name: request.name.clone(),
            creation_time: None,
            num_participants: Some(0),
            metadata: request.metadata.clone(),
        })
    }

    async fn list_rooms(&self) -> Result<Vec<RoomInfo>> {
        Ok(Vec::new())
    }

    async fn list_participants(&self, _room_name: &str) -> Result<Vec<ParticipantInfo>> {
        Ok(Vec::new())
    }

    async fn remove_participant(&self, _room_name: &str, _identity: &str) -> Result<()> {
        Ok(())
    }

    async fn update_participant(
        &self,
        _room_name: &str,
        identity: &str,
        _update: &ParticipantUpdate,
    ) -> Result<ParticipantInfo> {
        anyhow::bail!("participant {} not connected", identity)
    }

    async fn start_track_capture(&self, request: &TrackCaptureRequest) -> Result<String> {
        self.started.lock().await.push(request.clone());
        if self.fail_start {
            anyhow::bail!("egress service unavailable");
        }
        let n = self.next_egress.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("EG_{}", n))
    }

    async fn stop_capture(&self, egress_id: &str) -> Result<()> {
        self.stopped.lock().await.push(egress_id.to_string());
        Ok(())
    }

    fn generate_access_token(&self, room_name: &str, identity: &str, _name: &str) -> Result<String> {
        Ok(format!("token-{}-{}", room_name, identity))
    }
}

/// Storage that signs by appending a marker
pub struct StaticStorage;

#[async_trait]
impl ObjectStorage for StaticStorage {
    async fn signed_download_url(&self, key: &str) -> Result<String> {
        Ok(format!("https://signed.test/{}?sig=1", key))
    }
}

/// Transcriber returning fixed words
pub struct ScriptedTranscriber {
    pub words: Vec<Word>,
    pub calls: AtomicU32,
}

impl ScriptedTranscriber {
    /// Words as (text, speaker tag, confidence), half a second apart
    pub fn new(words: &[(&str, i32, f64)]) -> Self {
        let words = words
            .iter()
            .enumerate()
            .map(|(i, (text, tag, confidence))| Word {
                word: text.to_string(),
                start_time: i as f64 * 0.5,
                end_time: i as f64 * 0.5 + 0.4,
                confidence: Some(*confidence),
                speaker_tag: Some(*tag),
            })
            .collect();
        Self {
            words,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl SpeechTranscriber for ScriptedTranscriber {
    async fn transcribe(&self, _url: &str, _options: &TranscribeOptions) -> Result<Vec<Word>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.words.clone())
    }
}
