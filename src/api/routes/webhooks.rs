//! Media platform webhook endpoint.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Json,
    routing::post,
    Router,
};
use serde_json::{json, Value};

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::webhooks;

/// Header names carrying the signature token and delivery timestamp, with
/// the platform-prefixed variants accepted as fallbacks
const SIGNATURE_HEADERS: [&str; 2] = ["signature", "x-livekit-signature"];
const TIMESTAMP_HEADERS: [&str; 2] = ["timestamp", "x-livekit-timestamp"];

pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks/livekit", post(receive))
}

fn first_header<'a>(headers: &'a HeaderMap, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
}

/// POST /webhooks/livekit - Verify, parse and handle one event.
///
/// The handler runs to completion before responding; any follow-up work is
/// queued rather than awaited.
async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let signature = first_header(&headers, &SIGNATURE_HEADERS);
    let timestamp = first_header(&headers, &TIMESTAMP_HEADERS);
    if !state.verifier.verify(&body, signature, timestamp) {
        return Err(ApiError::unauthorized("Invalid signature"));
    }

    let event = webhooks::parse(&body).ok_or_else(|| ApiError::bad_request("Invalid event data"))?;
    state.dispatcher.dispatch(&event).await?;

    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::testing::send;
    use crate::api::testing::{test_app, API_KEY, API_SECRET};
    use crate::domain::RoomStatus;
    use crate::token::{body_digest, sign, Claims};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    fn signed(body: &str) -> String {
        let mut claims = Claims::new(API_KEY, 300);
        claims.sha256 = Some(body_digest(body.as_bytes()));
        sign(&claims, API_SECRET).unwrap()
    }

    fn webhook(body: &str, signature: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhooks/livekit")
            .header("timestamp", "1700000000");
        if let Some(signature) = signature {
            builder = builder.header("signature", signature);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_signed_event_is_handled() {
        let app = test_app().await;
        let body = r#"{"event":"room_finished","room":{"sid":"RM_1","name":"standup"}}"#;

        let (status, json) = send(app.router(), webhook(body, Some(&signed(body)))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({ "success": true }));

        let room = app.state.store.get_room(&app.room.id).await.unwrap().unwrap();
        assert_eq!(room.status, RoomStatus::Ended);
    }

    #[tokio::test]
    async fn test_rejects_bad_or_missing_signature() {
        let app = test_app().await;
        let body = r#"{"event":"room_finished","room":{"name":"standup"}}"#;

        let (status, json) = send(app.router(), webhook(body, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Invalid signature");

        let other = r#"{"event":"room_started","room":{"name":"standup"}}"#;
        let (status, _) = send(app.router(), webhook(body, Some(&signed(other)))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let room = app.state.store.get_room(&app.room.id).await.unwrap().unwrap();
        assert_eq!(room.status, RoomStatus::Active);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let app = test_app().await;
        let body = r#"{"room":{"name":"standup"}}"#;

        let (status, json) = send(app.router(), webhook(body, Some(&signed(body)))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid event data");
    }

    #[tokio::test]
    async fn test_unknown_event_is_accepted() {
        let app = test_app().await;
        let body = r#"{"event":"track_published","room":{"name":"standup"}}"#;

        let (status, json) = send(app.router(), webhook(body, Some(&signed(body)))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
    }

    #[tokio::test]
    async fn test_prefixed_headers_are_accepted() {
        let app = test_app().await;
        let body = r#"{"event":"room_started","room":{"name":"standup"}}"#;
        let request = Request::builder()
            .method("POST")
            .uri("/webhooks/livekit")
            .header("x-livekit-signature", signed(body))
            .header("x-livekit-timestamp", "1700000000")
            .body(Body::from(body))
            .unwrap();

        let (status, _) = send(app.router(), request).await;
        assert_eq!(status, StatusCode::OK);
    }
}
