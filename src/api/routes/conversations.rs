//! Conversation API routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::domain::{
    parse_transcript_content, Conversation, ConversationStatus, RoomStatus, Segment, Transcript,
};
use crate::queue::CaptureJob;
use crate::store::NewConversation;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/conversations", post(create_conversation))
        .route("/conversations/interactions", post(record_interaction))
        .route("/conversations/{id}", get(get_conversation))
        .route("/conversations/{id}/start-recording", post(start_recording))
        .route("/conversations/{id}/stop-recording", post(stop_recording))
        .route("/conversations/{id}/transcript", get(get_transcript))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationBody {
    pub room_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingParticipant {
    pub identity: String,
    pub name: String,
    pub track_id: String,
}

#[derive(Debug, Deserialize)]
pub struct StartRecordingBody {
    pub participants: Vec<RecordingParticipant>,
}

/// Agent or bot utterance logged against the room's open conversation
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionBody {
    /// Platform room name
    pub room_id: String,
    pub speaker: String,
    pub text: String,
    pub timestamp: Value,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Transcript with its content decoded
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptView {
    #[serde(flatten)]
    pub transcript: Transcript,
    /// Parsed content; `null` when the stored JSON is unreadable
    #[serde(rename = "parsedContent")]
    pub parsed: Option<Value>,
    pub segments: Vec<Segment>,
}

async fn load_conversation(state: &AppState, id: &str) -> ApiResult<Conversation> {
    state
        .store
        .get_conversation(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Conversation not found"))
}

/// POST /conversations - Open a RECORDING conversation in an active room.
async fn create_conversation(
    State(state): State<AppState>,
    Json(body): Json<CreateConversationBody>,
) -> ApiResult<(StatusCode, Json<Conversation>)> {
    let room = state
        .store
        .get_room(&body.room_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Room not found"))?;
    if room.status != RoomStatus::Active {
        return Err(ApiError::bad_request("Room is not active"));
    }

    let conversation = state
        .store
        .create_conversation(NewConversation::new(&room.id))
        .await?;
    info!(conversation_id = %conversation.id, room_id = %room.id, "Conversation started");

    Ok((StatusCode::CREATED, Json(conversation)))
}

/// GET /conversations/{id} - Conversation with its participants.
async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let conversation = load_conversation(&state, &id).await?;
    let participants = state.store.list_participants(&conversation.id).await?;
    Ok(Json(json!({
        "conversation": conversation,
        "participants": participants,
    })))
}

/// POST /conversations/{id}/start-recording - Record participants and queue a
/// capture for each of their audio tracks.
async fn start_recording(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StartRecordingBody>,
) -> ApiResult<Json<Value>> {
    let conversation = load_conversation(&state, &id).await?;
    if conversation.status != ConversationStatus::Recording {
        return Err(ApiError::bad_request(
            "Conversation is not in recording state",
        ));
    }

    let mut participants = Vec::with_capacity(body.participants.len());
    let mut jobs = Vec::with_capacity(body.participants.len());
    for requested in body.participants {
        let (participant, _) = state
            .store
            .add_participant_if_absent(
                &conversation.id,
                &requested.identity,
                &requested.name,
                Utc::now(),
            )
            .await?;

        let job = state
            .jobs
            .add_capture_job(&CaptureJob::Start {
                room_id: conversation.room_id.clone(),
                conversation_id: conversation.id.clone(),
                participant_id: participant.id.clone(),
                participant_identity: requested.identity,
                track_id: requested.track_id,
            })
            .await?;

        jobs.push(json!({ "jobId": job.id, "participantId": participant.id }));
        participants.push(participant);
    }
    info!(conversation_id = %conversation.id, captures = jobs.len(), "Recording requested");

    Ok(Json(json!({
        "success": true,
        "participants": participants,
        "jobs": jobs,
    })))
}

/// POST /conversations/{id}/stop-recording - Queue a stop of the room's captures.
async fn stop_recording(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let conversation = load_conversation(&state, &id).await?;
    let job = state
        .jobs
        .add_capture_job(&CaptureJob::Stop {
            room_id: conversation.room_id.clone(),
            conversation_id: conversation.id.clone(),
        })
        .await?;
    info!(conversation_id = %conversation.id, job_id = %job.id, "Capture stop queued");

    Ok(Json(json!({ "success": true, "jobId": job.id })))
}

/// POST /conversations/interactions - Append to the open conversation's log.
async fn record_interaction(
    State(state): State<AppState>,
    Json(body): Json<InteractionBody>,
) -> ApiResult<Json<Value>> {
    let room = state
        .store
        .find_room_by_external_id(&body.room_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Room not found"))?;
    let conversation = state
        .store
        .find_open_conversation(&room.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Active conversation not found"))?;

    let interaction = json!({
        "speaker": body.speaker,
        "text": body.text,
        "timestamp": body.timestamp,
        "metadata": body.metadata,
    });
    state
        .store
        .append_interaction(&conversation.id, interaction, body.timestamp)
        .await?;

    Ok(Json(json!({
        "success": true,
        "conversationId": conversation.id,
    })))
}

/// GET /conversations/{id}/transcript - Transcript with segments in time order.
async fn get_transcript(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let conversation = load_conversation(&state, &id).await?;
    let (transcript, segments) = state
        .store
        .find_transcript(&conversation.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Transcript not available"))?;

    let parsed = parse_transcript_content(&transcript.content)
        .and_then(|content| serde_json::to_value(content).ok());
    let view = TranscriptView {
        transcript,
        parsed,
        segments,
    };
    Ok(Json(json!({ "transcript": view })))
}
