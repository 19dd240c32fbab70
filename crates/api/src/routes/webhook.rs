//! Google Calendar push notification endpoint
//!
//! Status codes steer the provider's retry behavior: 2xx acknowledges the
//! notification (including ignorable ones, so dead channels stop retrying),
//! while genuine failures return an error status and the provider retries.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use calsync_domain::{CalSyncError, PushNotification, Result};
use serde_json::json;
use tracing::{debug, error, warn};

use crate::state::AppState;

/// `POST /api/webhook/google-calendar`
pub async fn google_calendar_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let notification = match parse_notification(&headers) {
        Ok(notification) => notification,
        Err(err) => {
            warn!(error = %err, "rejecting webhook with invalid headers");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"message": "Invalid request headers"})),
            )
                .into_response();
        }
    };

    match state.webhook.handle_notification(&notification).await {
        Ok(outcome) => {
            debug!(
                channel_id = %notification.channel_id,
                sync_actions = ?outcome.sync_actions,
                events_synced = outcome.events_synced,
                "webhook processed"
            );
            (StatusCode::OK, Json(json!({"message": "ok"}))).into_response()
        }
        Err(err) => error_response(&notification, &err),
    }
}

fn error_response(notification: &PushNotification, err: &CalSyncError) -> Response {
    let channel_id = notification.channel_id.as_str();
    let resource_id = notification.resource_id.as_str();

    match err {
        CalSyncError::Ignorable(reason) => {
            // Acknowledge so the provider does not retry a dead channel.
            debug!(channel_id, resource_id, reason, "ignorable webhook condition");
            (StatusCode::OK, Json(json!({"message": "ok"}))).into_response()
        }
        CalSyncError::Auth(_) => {
            error!(channel_id, resource_id, "webhook token verification failed");
            (StatusCode::FORBIDDEN, Json(json!({"message": "Invalid API key"}))).into_response()
        }
        CalSyncError::InvalidInput(reason) => {
            warn!(channel_id, resource_id, reason, "invalid webhook input");
            (StatusCode::BAD_REQUEST, Json(json!({"message": "Invalid request"})))
                .into_response()
        }
        other => {
            error!(channel_id, resource_id, error = %other, "error processing webhook");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"message": "Internal server error"})),
            )
                .into_response()
        }
    }
}

fn parse_notification(headers: &HeaderMap) -> Result<PushNotification> {
    Ok(PushNotification {
        channel_id: required_header(headers, "x-goog-channel-id")?,
        resource_id: required_header(headers, "x-goog-resource-id")?,
        channel_token: required_header(headers, "x-goog-channel-token")?,
        message_number: required_header(headers, "x-goog-message-number")?,
        resource_state: required_header(headers, "x-goog-resource-state")?.parse()?,
        resource_uri: required_header(headers, "x-goog-resource-uri")?,
        channel_expiration: required_header(headers, "x-goog-channel-expiration")?,
    })
}

fn required_header(headers: &HeaderMap, name: &str) -> Result<String> {
    optional_header(headers, name)
        .ok_or_else(|| CalSyncError::InvalidInput(format!("missing or malformed header: {name}")))
}

fn optional_header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
