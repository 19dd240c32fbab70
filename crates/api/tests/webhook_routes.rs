//! Route-level tests for the webhook endpoint
//!
//! Drives the axum router with in-memory ports behind the webhook service,
//! asserting the status-code contract the provider's retry behavior depends
//! on.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use calsync_api::{router, AppState};
use calsync_core::testing::{
    MockCachedEventRepository, MockCalendarClientFactory, MockCalendarProviderClient,
    MockCredentialResolver, MockSelectedCalendarRepository, MockSubscriptionRepository,
    RecordingDownstreamSync,
};
use calsync_core::WebhookService;
use calsync_domain::{
    CalendarCredential, ProviderType, SelectedCalendar, Subscription, SubscriptionStatus,
};
use calsync_infra::DbManager;
use tempfile::TempDir;
use tower::ServiceExt;

const TOKEN: &str = "shared-secret";

fn subscription(external_calendar_id: &str) -> Subscription {
    Subscription {
        id: "sub-1".to_string(),
        credential_id: 3,
        external_calendar_id: external_calendar_id.to_string(),
        provider_type: ProviderType::Google,
        status: SubscriptionStatus::Active,
        provider_subscription_id: Some("chan-1".to_string()),
        provider_subscription_kind: Some("api#channel".to_string()),
        provider_resource_id: Some("res-1".to_string()),
        provider_resource_uri: Some("https://example.com/res-1".to_string()),
        provider_expiration: Some(1_900_000_000),
        activated_at: Some(1_700_000_000),
        last_sync_at: None,
        last_synced_down_at: None,
        last_sync_direction: None,
        watch_error: None,
        created_at: 1_700_000_000,
        updated_at: 1_700_000_000,
    }
}

fn selected_calendar(external_id: &str) -> SelectedCalendar {
    SelectedCalendar {
        id: "sc-1".to_string(),
        user_id: 7,
        credential_id: Some(3),
        external_id: external_id.to_string(),
        integration: ProviderType::Google,
        channel_id: Some("chan-1".to_string()),
        channel_kind: Some("api#channel".to_string()),
        channel_resource_id: Some("res-1".to_string()),
        channel_resource_uri: Some("https://example.com/res-1".to_string()),
        channel_expiration: Some(1_900_000_000),
    }
}

fn credential() -> CalendarCredential {
    CalendarCredential {
        id: 3,
        provider_type: ProviderType::Google,
        account_email: "user@example.com".to_string(),
        access_token: "ya29.test".to_string(),
        delegated: false,
    }
}

fn app_state(
    subscriptions: MockSubscriptionRepository,
    selected_calendars: MockSelectedCalendarRepository,
) -> (AppState, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Arc::new(DbManager::new(temp_dir.path().join("test.db"), 2).unwrap());
    db.run_migrations().unwrap();

    let webhook = Arc::new(WebhookService::new(
        Arc::new(subscriptions),
        Arc::new(selected_calendars),
        Arc::new(MockCachedEventRepository::new()),
        Arc::new(MockCredentialResolver::new().with_credential(credential())),
        Arc::new(MockCalendarClientFactory::with_client(Arc::new(
            MockCalendarProviderClient::new(),
        ))),
        Arc::new(RecordingDownstreamSync::new()),
        TOKEN,
    ));

    (AppState::new(webhook, db), temp_dir)
}

fn webhook_request(token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/webhook/google-calendar")
        .header("x-goog-channel-id", "chan-1")
        .header("x-goog-resource-id", "res-1")
        .header("x-goog-channel-token", token)
        .header("x-goog-message-number", "398005")
        .header("x-goog-resource-state", "exists")
        .header("x-goog-resource-uri", "https://example.com/res-1")
        .header("x-goog-channel-expiration", "Sat, 22 Mar 2025 19:14:43 GMT")
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn valid_notification_is_acknowledged() {
    let (state, _temp) = app_state(
        MockSubscriptionRepository::new().with_subscription(subscription("user@example.com")),
        MockSelectedCalendarRepository::new(),
    );

    let response = router(state).oneshot(webhook_request(TOKEN)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!({"message": "ok"}));
}

#[tokio::test]
async fn invalid_token_is_forbidden() {
    let (state, _temp) = app_state(
        MockSubscriptionRepository::new().with_subscription(subscription("user@example.com")),
        MockSelectedCalendarRepository::new(),
    );

    let response = router(state).oneshot(webhook_request("wrong")).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn missing_headers_are_a_client_error() {
    let (state, _temp) =
        app_state(MockSubscriptionRepository::new(), MockSelectedCalendarRepository::new());

    let request = Request::builder()
        .method("POST")
        .uri("/api/webhook/google-calendar")
        .header("x-goog-channel-id", "chan-1")
        .body(Body::empty())
        .unwrap();

    let response = router(state).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_channel_is_acknowledged_so_the_provider_stops_retrying() {
    let (state, _temp) =
        app_state(MockSubscriptionRepository::new(), MockSelectedCalendarRepository::new());

    let response = router(state).oneshot(webhook_request(TOKEN)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!({"message": "ok"}));
}

#[tokio::test]
async fn conflicting_records_are_a_server_error() {
    let (state, _temp) = app_state(
        MockSubscriptionRepository::new().with_subscription(subscription("synced@example.com")),
        MockSelectedCalendarRepository::new()
            .with_calendar(selected_calendar("selected@example.com")),
    );

    let response = router(state).oneshot(webhook_request(TOKEN)).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let (state, _temp) =
        app_state(MockSubscriptionRepository::new(), MockSelectedCalendarRepository::new());

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = router(state).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!({"status": "ok"}));
}
