//! In-process capability fakes that record their calls.

use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{
    CreateRoomRequest, MediaPlatform, ObjectStorage, ParticipantUpdate, SpeechTranscriber,
    TrackCaptureRequest,
};
use crate::domain::{ParticipantInfo, RoomInfo, Word};
use crate::transcription::TranscribeOptions;

#[derive(Default)]
pub struct FakePlatform {
    pub fail_start: bool,
    pub fail_stop: bool,
    pub started: Mutex<Vec<TrackCaptureRequest>>,
    pub stopped: Mutex<Vec<String>>,
    pub rooms: Mutex<Vec<RoomInfo>>,
    pub removed: Mutex<Vec<(String, String)>>,
    pub next_egress: AtomicU32,
}

impl FakePlatform {
    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl MediaPlatform for FakePlatform {
    async fn create_room(&self, request: &CreateRoomRequest) -> Result<RoomInfo> {
        let room = RoomInfo {
            sid: format!("RM_{}", request.name),
            name: request.name.clone(),
            creation_time: Some(1_700_000_000),
            num_participants: Some(0),
            metadata: request.metadata.clone(),
        };
        self.rooms.lock().await.push(room.clone());
        Ok(room)
    }

    async fn list_rooms(&self) -> Result<Vec<RoomInfo>> {
        Ok(self.rooms.lock().await.clone())
    }

    async fn list_participants(&self, _room_name: &str) -> Result<Vec<ParticipantInfo>> {
        Ok(Vec::new())
    }

    async fn remove_participant(&self, room_name: &str, identity: &str) -> Result<()> {
        self.removed
            .lock()
            .await
            .push((room_name.to_string(), identity.to_string()));
        Ok(())
    }

    async fn update_participant(
        &self,
        _room_name: &str,
        identity: &str,
        update: &ParticipantUpdate,
    ) -> Result<ParticipantInfo> {
        Ok(ParticipantInfo {
            sid: format!("PA_{}", identity),
            identity: identity.to_string(),
            name: update.name.clone(),
            metadata: update.metadata.clone(),
            joined_at: None,
            state: None,
        })
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
        if self.fail_stop {
            anyhow::bail!("egress {} not found", egress_id);
        }
        self.stopped.lock().await.push(egress_id.to_string());
        Ok(())
    }

    fn generate_access_token(&self, room_name: &str, identity: &str, _name: &str) -> Result<String> {
        Ok(format!("token-{}-{}", room_name, identity))
    }
}

#[derive(Default)]
pub struct FakeStorage {
    pub signed: Mutex<Vec<String>>,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn signed_download_url(&self, key: &str) -> Result<String> {
        self.signed.lock().await.push(key.to_string());
        Ok(format!("https://signed.test/{}?sig=1", key))
    }
}

#[derive(Default)]
pub struct FakeTranscriber {
    pub words: Vec<Word>,
    pub fail: Option<String>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeTranscriber {
    pub fn with_words(words: &[(&str, i32, f64)]) -> Self {
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
            ..Default::default()
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            fail: Some(reason.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl SpeechTranscriber for FakeTranscriber {
    async fn transcribe(&self, url: &str, _options: &TranscribeOptions) -> Result<Vec<Word>> {
        self.calls.lock().await.push(url.to_string());
        if let Some(reason) = &self.fail {
            anyhow::bail!("{}", reason);
        }
        Ok(self.words.clone())
    }
}
