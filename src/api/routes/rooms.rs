//! Room management API routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::adapters::{CreateRoomRequest, ParticipantUpdate};
use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::domain::{ParticipantInfo, Room, RoomInfo, RoomStatus};
use crate::queue::CaptureJob;
use crate::store::NewRoom;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/live", get(live_rooms))
        .route("/rooms/{id}/end", post(end_room))
        .route("/rooms/{id}/token", post(issue_token))
        .route("/rooms/{id}/participants", get(list_participants))
        .route(
            "/rooms/{id}/participants/{identity}",
            patch(update_participant).delete(remove_participant),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomBody {
    pub name: String,
    pub organization_id: String,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
pub struct TokenBody {
    pub identity: String,
    pub name: String,
}

/// Platform room name: `room-{unix ms}-{7 random chars}`
fn platform_room_name() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("room-{}-{}", Utc::now().timestamp_millis(), &suffix[..7])
}

async fn load_room(state: &AppState, id: &str) -> ApiResult<Room> {
    state
        .store
        .get_room(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Room not found"))
}

/// POST /rooms - Create a room on the platform and track it.
async fn create_room(
    State(state): State<AppState>,
    Json(body): Json<CreateRoomBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let name = body.name.trim();
    if name.is_empty() || name.len() > 255 {
        return Err(ApiError::bad_request("Invalid request"));
    }
    if state
        .store
        .get_organization(&body.organization_id)
        .await?
        .is_none()
    {
        return Err(ApiError::not_found("Organization not found"));
    }

    let mut metadata = body.metadata.unwrap_or_default();
    metadata.insert("organizationId".to_string(), json!(body.organization_id));
    metadata.insert("roomName".to_string(), json!(name));

    let request = CreateRoomRequest {
        name: platform_room_name(),
        empty_timeout: state.room_defaults.empty_timeout_secs,
        max_participants: state.room_defaults.max_participants,
        metadata: Some(Value::Object(metadata).to_string()),
    };
    let livekit_room = state.platform.create_room(&request).await?;

    let room = state
        .store
        .create_room(NewRoom {
            external_room_id: request.name,
            name: name.to_string(),
            organization_id: body.organization_id,
        })
        .await?;
    info!(room_id = %room.id, external_room_id = %room.external_room_id, "Room created");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "room": room, "livekitRoom": livekit_room })),
    ))
}

/// GET /rooms/live - Rooms currently open on the platform.
async fn live_rooms(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let rooms: Vec<RoomInfo> = state.platform.list_rooms().await?;
    Ok(Json(json!({ "rooms": rooms })))
}

/// POST /rooms/{id}/end - End a room and stop its captures.
async fn end_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let room = load_room(&state, &id).await?;
    let now = Utc::now();

    let open = state.store.find_open_conversation(&room.id).await?;
    if !state.store.end_room(&room.id, now).await? {
        info!(room_id = %room.id, "Room was already ended");
    }
    let finished = state
        .store
        .finish_recording_conversations(&room.id, now)
        .await?;

    if let Some(conversation) = open {
        let job = state
            .jobs
            .add_capture_job(&CaptureJob::Stop {
                room_id: room.id.clone(),
                conversation_id: conversation.id,
            })
            .await?;
        info!(room_id = %room.id, job_id = %job.id, "Capture stop queued");
    }

    // Participants are removed best effort; the room is already ENDED
    match state.platform.list_participants(&room.external_room_id).await {
        Ok(participants) => {
            for participant in participants {
                if let Err(e) = state
                    .platform
                    .remove_participant(&room.external_room_id, &participant.identity)
                    .await
                {
                    warn!(identity = %participant.identity, error = %e, "Failed to remove participant");
                }
            }
        }
        Err(e) => warn!(room_id = %room.id, error = %e, "Failed to list participants"),
    }

    Ok(Json(json!({ "success": true, "conversations": finished })))
}

/// POST /rooms/{id}/token - Access token for joining the room.
async fn issue_token(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<TokenBody>,
) -> ApiResult<Json<Value>> {
    if body.identity.is_empty() || body.name.is_empty() {
        return Err(ApiError::bad_request("Invalid request"));
    }
    let room = load_room(&state, &id).await?;
    if room.status != RoomStatus::Active {
        return Err(ApiError::bad_request("Room is not active"));
    }

    let token =
        state
            .platform
            .generate_access_token(&room.external_room_id, &body.identity, &body.name)?;

    Ok(Json(json!({
        "token": token,
        "room": {
            "id": room.id,
            "name": room.name,
            "liveKitRoomId": room.external_room_id,
        }
    })))
}

/// GET /rooms/{id}/participants - Participants connected on the platform.
async fn list_participants(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let room = load_room(&state, &id).await?;
    let participants: Vec<ParticipantInfo> = state
        .platform
        .list_participants(&room.external_room_id)
        .await?;
    Ok(Json(json!({ "participants": participants })))
}

/// PATCH /rooms/{id}/participants/{identity} - Change name, metadata or permissions.
async fn update_participant(
    State(state): State<AppState>,
    Path((id, identity)): Path<(String, String)>,
    Json(update): Json<ParticipantUpdate>,
) -> ApiResult<Json<ParticipantInfo>> {
    let room = load_room(&state, &id).await?;
    let participant = state
        .platform
        .update_participant(&room.external_room_id, &identity, &update)
        .await?;
    Ok(Json(participant))
}

/// DELETE /rooms/{id}/participants/{identity} - Disconnect a participant.
async fn remove_participant(
    State(state): State<AppState>,
    Path((id, identity)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let room = load_room(&state, &id).await?;
    state
        .platform
        .remove_participant(&room.external_room_id, &identity)
        .await?;
    info!(room_id = %room.id, %identity, "Participant removed");
    Ok(Json(json!({ "success": true })))
}
