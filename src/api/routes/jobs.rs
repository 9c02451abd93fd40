//! Job status API routes.

use axum::{
    extract::{Path, State},
    response::Json,
    routing::get,
    Router,
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::queue::JobStatus;

pub fn router() -> Router<AppState> {
    Router::new().route("/jobs/{id}", get(job_status))
}

/// GET /jobs/{id} - Status of a capture or transcription job.
async fn job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobStatus>> {
    let status = state
        .jobs
        .find_job_status(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Job not found"))?;

    Ok(Json(status))
}

#[cfg(test)]
mod tests {
    use crate::api::routes::testing::{get, send};
    use crate::api::testing::test_app;
    use crate::queue::{
        CaptureJob, FailureMeta, NotificationEvent, NotificationJob, TranscriptionJob,
    };
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let app = test_app().await;
        let (status, body) = send(app.router(), get("/jobs/missing")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Job not found");
    }

    #[tokio::test]
    async fn test_capture_and_transcription_jobs_are_visible() {
        let app = test_app().await;
        let jobs = &app.state.jobs;

        let capture = jobs
            .add_capture_job(&CaptureJob::Stop {
                room_id: app.room.id.clone(),
                conversation_id: "c1".to_string(),
            })
            .await
            .unwrap();
        let transcription = jobs
            .add_transcription_job(
                &TranscriptionJob {
                    egress_job_id: "e1".to_string(),
                    recording_url: "https://bucket/a.ogg".to_string(),
                    conversation_id: "c1".to_string(),
                },
                None,
            )
            .await
            .unwrap();

        let (status, body) = send(app.router(), get(&format!("/jobs/{}", capture.id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], capture.id.as_str());
        assert_eq!(body["data"]["type"], "stop");
        assert_eq!(body["state"], "waiting");
        assert!(body["failedReason"].is_null());

        let (status, body) = send(app.router(), get(&format!("/jobs/{}", transcription.id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "delayed");
        assert_eq!(body["data"]["recordingUrl"], "https://bucket/a.ogg");
    }

    #[tokio::test]
    async fn test_notification_jobs_are_not_searched() {
        let app = test_app().await;
        let job = app
            .state
            .jobs
            .add_notification_job(&NotificationJob::new(
                "c1",
                NotificationEvent::EgressFailed(FailureMeta::new("boom")),
            ))
            .await
            .unwrap();

        let (status, _) = send(app.router(), get(&format!("/jobs/{}", job.id))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
