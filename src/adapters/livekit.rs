//! LiveKit media platform adapter.
//!
//! Talks to the server's Twirp JSON API (`/twirp/livekit.RoomService/*`,
//! `/twirp/livekit.Egress/*`) authenticated with a short-lived server token.
//! Track captures are written straight to the recordings bucket as OGG.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{
    AdapterError, CreateRoomRequest, MediaPlatform, ParticipantUpdate, TrackCaptureRequest,
};
use crate::config::{LiveKitConfig, StorageConfig};
use crate::domain::{ParticipantInfo, RoomInfo};
use crate::token::{self, Claims, VideoGrant};

/// Lifetime of the tokens used to call the server API
const SERVER_TOKEN_TTL_SECS: u64 = 600;

const ROOM_SERVICE: &str = "livekit.RoomService";
const EGRESS_SERVICE: &str = "livekit.Egress";

#[derive(Debug, Deserialize)]
struct ListRoomsResponse {
    #[serde(default)]
    rooms: Vec<RoomInfo>,
}

#[derive(Debug, Deserialize)]
struct ListParticipantsResponse {
    #[serde(default)]
    participants: Vec<ParticipantInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EgressStarted {
    egress_id: String,
}

/// Upload target for direct file captures
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct S3Upload {
    access_key: String,
    secret: String,
    region: String,
    bucket: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,
}

impl From<&StorageConfig> for S3Upload {
    fn from(config: &StorageConfig) -> Self {
        Self {
            access_key: config.access_key_id.clone(),
            secret: config.secret_access_key.clone(),
            region: config.region.clone(),
            bucket: config.bucket.clone(),
            endpoint: config.endpoint.clone(),
        }
    }
}

/// LiveKit server API client
pub struct LiveKitClient {
    config: LiveKitConfig,
    upload: S3Upload,
    http: Client,
}

impl LiveKitClient {
    pub fn new(config: LiveKitConfig, storage: &StorageConfig) -> Result<Self, AdapterError> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            config,
            upload: S3Upload::from(storage),
            http,
        })
    }

    /// Bearer token for server API calls, scoped to `room` when given
    fn server_token(&self, room: Option<&str>) -> Result<String, AdapterError> {
        let mut claims = Claims::new(&self.config.api_key, SERVER_TOKEN_TTL_SECS);
        claims.video = Some(VideoGrant::server(room));
        Ok(token::sign(&claims, &self.config.api_secret)?)
    }

    fn twirp_url(&self, service: &str, method: &str) -> String {
        format!(
            "{}/twirp/{}/{}",
            self.config.url.trim_end_matches('/'),
            service,
            method
        )
    }

    async fn call<T: DeserializeOwned>(
        &self,
        service: &str,
        method: &str,
        room: Option<&str>,
        body: &Value,
    ) -> Result<T, AdapterError> {
        let url = self.twirp_url(service, method);
        debug!(%url, "LiveKit request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.server_token(room)?)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Status {
                service: "livekit",
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }

    /// Object key for a participant's capture
    fn capture_key(request: &TrackCaptureRequest, timestamp_ms: i64) -> String {
        format!(
            "recordings/{}/{}/{}.ogg",
            request.room_name, request.participant_id, timestamp_ms
        )
    }

    fn track_egress_body(&self, request: &TrackCaptureRequest, timestamp_ms: i64) -> Value {
        json!({
            "roomName": request.room_name,
            "trackId": request.track_id,
            "file": {
                "filepath": Self::capture_key(request, timestamp_ms),
                "s3": self.upload,
            },
        })
    }
}

#[async_trait]
impl MediaPlatform for LiveKitClient {
    async fn create_room(&self, request: &CreateRoomRequest) -> Result<RoomInfo> {
        let body = serde_json::to_value(request)?;
        let room: RoomInfo = self
            .call(ROOM_SERVICE, "CreateRoom", None, &body)
            .await
            .with_context(|| format!("Failed to create room '{}'", request.name))?;
        info!(room = %room.name, sid = %room.sid, "Created room");
        Ok(room)
    }

    async fn list_rooms(&self) -> Result<Vec<RoomInfo>> {
        let response: ListRoomsResponse = self
            .call(ROOM_SERVICE, "ListRooms", None, &json!({}))
            .await
            .context("Failed to list rooms")?;
        Ok(response.rooms)
    }

    async fn list_participants(&self, room_name: &str) -> Result<Vec<ParticipantInfo>> {
        let response: ListParticipantsResponse = self
            .call(
                ROOM_SERVICE,
                "ListParticipants",
                Some(room_name),
                &json!({ "room": room_name }),
            )
            .await
            .with_context(|| format!("Failed to list participants of '{}'", room_name))?;
        Ok(response.participants)
    }

    async fn remove_participant(&self, room_name: &str, identity: &str) -> Result<()> {
        let _: Value = self
            .call(
                ROOM_SERVICE,
                "RemoveParticipant",
                Some(room_name),
                &json!({ "room": room_name, "identity": identity }),
            )
            .await
            .with_context(|| format!("Failed to remove '{}' from '{}'", identity, room_name))?;
        Ok(())
    }

    async fn update_participant(
        &self,
        room_name: &str,
        identity: &str,
        update: &ParticipantUpdate,
    ) -> Result<ParticipantInfo> {
        let mut body = json!({ "room": room_name, "identity": identity });
        if let Some(name) = &update.name {
            body["name"] = json!(name);
        }
        if let Some(metadata) = &update.metadata {
            body["metadata"] = json!(metadata);
        }
        if update.can_publish.is_some() || update.can_subscribe.is_some() {
            body["permission"] = json!({
                "canPublish": update.can_publish.unwrap_or(true),
                "canSubscribe": update.can_subscribe.unwrap_or(true),
            });
        }

        self.call(ROOM_SERVICE, "UpdateParticipant", Some(room_name), &body)
            .await
            .with_context(|| format!("Failed to update '{}' in '{}'", identity, room_name))
    }

    async fn start_track_capture(&self, request: &TrackCaptureRequest) -> Result<String> {
        let body = self.track_egress_body(request, Utc::now().timestamp_millis());
        let started: EgressStarted = self
            .call(EGRESS_SERVICE, "StartTrackEgress", Some(&request.room_name), &body)
            .await
            .with_context(|| {
                format!(
                    "Failed to start capture of track '{}' in '{}'",
                    request.track_id, request.room_name
                )
            })?;
        info!(
            egress_id = %started.egress_id,
            room = %request.room_name,
            participant = %request.participant_identity,
            "Started track capture"
        );
        Ok(started.egress_id)
    }

    async fn stop_capture(&self, egress_id: &str) -> Result<()> {
        let _: Value = self
            .call(
                EGRESS_SERVICE,
                "StopEgress",
                None,
                &json!({ "egressId": egress_id }),
            )
            .await
            .with_context(|| format!("Failed to stop egress '{}'", egress_id))?;
        Ok(())
    }

    fn generate_access_token(&self, room_name: &str, identity: &str, name: &str) -> Result<String> {
        let mut claims = Claims::new(&self.config.api_key, self.config.token_ttl_secs);
        claims.sub = Some(identity.to_string());
        claims.name = Some(name.to_string());
        claims.video = Some(VideoGrant::participant(room_name));
        Ok(token::sign(&claims, &self.config.api_secret)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> LiveKitClient {
        let config = LiveKitConfig {
            url: "http://localhost:7880/".to_string(),
            api_key: "APIkey".to_string(),
            api_secret: "secret".to_string(),
            ..Default::default()
        };
        let storage = StorageConfig {
            bucket: "recordings-bucket".to_string(),
            access_key_id: "AKID".to_string(),
            secret_access_key: "SECRET".to_string(),
            ..Default::default()
        };
        LiveKitClient::new(config, &storage).unwrap()
    }

    fn capture_request() -> TrackCaptureRequest {
        TrackCaptureRequest {
            room_name: "standup".to_string(),
            track_id: "TR_audio".to_string(),
            participant_identity: "alice".to_string(),
            participant_id: "p-1".to_string(),
        }
    }

    #[test]
    fn test_twirp_url() {
        assert_eq!(
            client().twirp_url(ROOM_SERVICE, "CreateRoom"),
            "http://localhost:7880/twirp/livekit.RoomService/CreateRoom"
        );
    }

    #[test]
    fn test_track_egress_body() {
        let body = client().track_egress_body(&capture_request(), 1_700_000_000_000);

        assert_eq!(body["roomName"], "standup");
        assert_eq!(body["trackId"], "TR_audio");
        assert_eq!(
            body["file"]["filepath"],
            "recordings/standup/p-1/1700000000000.ogg"
        );
        assert_eq!(body["file"]["s3"]["bucket"], "recordings-bucket");
        assert_eq!(body["file"]["s3"]["accessKey"], "AKID");
        assert!(body["file"]["s3"].get("endpoint").is_none());
    }

    #[test]
    fn test_server_token_grants() {
        let token = client().server_token(Some("standup")).unwrap();
        let claims = token::verify(&token, "secret").unwrap();
        let video = claims.video.unwrap();

        assert_eq!(claims.iss, "APIkey");
        assert_eq!(video.room.as_deref(), Some("standup"));
        assert_eq!(video.room_admin, Some(true));
        assert_eq!(video.room_record, Some(true));
    }

    #[test]
    fn test_participant_access_token() {
        let token = client()
            .generate_access_token("standup", "alice", "Alice")
            .unwrap();
        let claims = token::verify(&token, "secret").unwrap();

        assert_eq!(claims.sub.as_deref(), Some("alice"));
        assert_eq!(claims.name.as_deref(), Some("Alice"));
        let video = claims.video.unwrap();
        assert_eq!(video.room_join, Some(true));
        assert_eq!(video.can_publish, Some(true));
        assert_eq!(claims.exp.unwrap() - claims.nbf.unwrap(), 36_000);
    }
}
