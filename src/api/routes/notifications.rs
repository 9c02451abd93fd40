//! In-app notification API routes.

use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::notify::{ListOptions, DEFAULT_LIST_LIMIT};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications/{user_id}", get(list_notifications))
        .route("/notifications/{user_id}/read", post(mark_read))
}

/// Query parameters for notification listings.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NotificationQueryParams {
    #[serde(default)]
    pub unread_only: bool,
    /// Maximum results (default 50)
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadBody {
    pub notification_id: Option<String>,
    #[serde(default)]
    pub mark_all: bool,
}

/// GET /notifications/{user_id} - Newest first, with the unread count.
async fn list_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<NotificationQueryParams>,
) -> ApiResult<Json<Value>> {
    let options = ListOptions {
        limit: params.limit.unwrap_or(DEFAULT_LIST_LIMIT),
        unread_only: params.unread_only,
    };
    let notifications = state.notifications.list(&user_id, options).await?;
    let unread_count = state.notifications.unread_count(&user_id).await?;

    Ok(Json(json!({
        "notifications": notifications,
        "unreadCount": unread_count,
    })))
}

/// POST /notifications/{user_id}/read - Mark one or all notifications read.
async fn mark_read(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<MarkReadBody>,
) -> ApiResult<Json<Value>> {
    if body.mark_all {
        let updated = state.notifications.mark_all_read(&user_id).await?;
        return Ok(Json(json!({ "success": true, "updated": updated })));
    }

    let Some(id) = body.notification_id else {
        return Err(ApiError::bad_request("Invalid request body"));
    };
    if !state.notifications.mark_read(&user_id, &id).await? {
        return Err(ApiError::not_found("Notification not found"));
    }
    Ok(Json(json!({ "success": true, "updated": 1 })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::testing::{get as get_req, post_json, send};
    use crate::api::testing::test_app;
    use crate::notify::{NotificationData, NotificationKind, NotificationRepository};
    use axum::http::StatusCode;

    fn data(title: &str) -> NotificationData {
        NotificationData {
            kind: NotificationKind::TranscriptionComplete,
            title: title.to_string(),
            message: "ready".to_string(),
            metadata: json!({ "conversationId": "c1" }),
        }
    }

    #[tokio::test]
    async fn test_list_and_mark_read() {
        let app = test_app().await;
        let first = app.notifications.create("user-1", data("first")).await.unwrap();
        app.notifications.create("user-1", data("second")).await.unwrap();

        let (status, body) = send(app.router(), get_req("/notifications/user-1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["unreadCount"], 2);
        assert_eq!(body["notifications"][0]["title"], "second");
        assert_eq!(body["notifications"][0]["type"], "TRANSCRIPTION_COMPLETE");

        let (status, _) = send(
            app.router(),
            post_json("/notifications/user-1/read", json!({ "notificationId": first.id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(
            app.router(),
            get_req("/notifications/user-1?unreadOnly=true&limit=10"),
        )
        .await;
        assert_eq!(body["unreadCount"], 1);
        assert_eq!(body["notifications"].as_array().unwrap().len(), 1);

        let (_, body) = send(
            app.router(),
            post_json("/notifications/user-1/read", json!({ "markAll": true })),
        )
        .await;
        assert_eq!(body["updated"], 1);
    }

    #[tokio::test]
    async fn test_mark_read_validation() {
        let app = test_app().await;

        let (status, body) =
            send(app.router(), post_json("/notifications/user-1/read", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid request body");

        let (status, _) = send(
            app.router(),
            post_json("/notifications/user-1/read", json!({ "notificationId": "nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
