//! Integration tests for the webhook ingestion pipeline
//!
//! Exercises the full notification state machine against in-memory ports:
//! authentication, channel resolution, action classification, delta
//! application, downstream forwarding and best-effort bookkeeping.

use std::sync::Arc;

use calsync_core::testing::{
    MockCachedEventRepository, MockCalendarClientFactory, MockCalendarProviderClient,
    MockCredentialResolver, MockSelectedCalendarRepository, MockSubscriptionRepository,
    RecordingDownstreamSync,
};
use calsync_core::WebhookService;
use calsync_domain::{
    CalSyncError, CalendarCredential, EventDelta, EventStatus, ProviderType, PushNotification,
    ResourceState, SelectedCalendar, Subscription, SubscriptionStatus, SyncAction, SyncDirection,
    Transparency,
};

const TOKEN: &str = "shared-secret";
const CALENDAR: &str = "user@example.com";
const CHANNEL: &str = "chan-1";
const RESOURCE: &str = "res-1";

fn credential(id: i64) -> CalendarCredential {
    CalendarCredential {
        id,
        provider_type: ProviderType::Google,
        account_email: CALENDAR.to_string(),
        access_token: "ya29.test".to_string(),
        delegated: false,
    }
}

fn subscription(id: &str, external_calendar_id: &str, credential_id: i64) -> Subscription {
    Subscription {
        id: id.to_string(),
        credential_id,
        external_calendar_id: external_calendar_id.to_string(),
        provider_type: ProviderType::Google,
        status: SubscriptionStatus::Active,
        provider_subscription_id: Some(CHANNEL.to_string()),
        provider_subscription_kind: Some("api#channel".to_string()),
        provider_resource_id: Some(RESOURCE.to_string()),
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

fn selected_calendar(external_id: &str, credential_id: Option<i64>) -> SelectedCalendar {
    SelectedCalendar {
        id: "sc-1".to_string(),
        user_id: 7,
        credential_id,
        external_id: external_id.to_string(),
        integration: ProviderType::Google,
        channel_id: Some(CHANNEL.to_string()),
        channel_kind: Some("api#channel".to_string()),
        channel_resource_id: Some(RESOURCE.to_string()),
        channel_resource_uri: Some("https://example.com/res-1".to_string()),
        channel_expiration: Some(1_900_000_000),
    }
}

fn notification(token: &str, state: ResourceState) -> PushNotification {
    PushNotification {
        channel_id: CHANNEL.to_string(),
        resource_id: RESOURCE.to_string(),
        channel_token: token.to_string(),
        message_number: "398005".to_string(),
        resource_state: state,
        resource_uri: "https://example.com/res-1".to_string(),
        channel_expiration: "Sat, 22 Mar 2025 19:14:43 GMT".to_string(),
    }
}

fn delta(provider_event_id: &str, start_ts: i64, end_ts: i64) -> EventDelta {
    EventDelta {
        provider_event_id: provider_event_id.to_string(),
        summary: Some("Meeting".to_string()),
        start_ts,
        end_ts,
        status: EventStatus::Confirmed,
        transparency: Transparency::Opaque,
        payload: serde_json::json!({"id": provider_event_id}),
    }
}

struct Harness {
    subscriptions: Arc<MockSubscriptionRepository>,
    events: Arc<MockCachedEventRepository>,
    client: Arc<MockCalendarProviderClient>,
    downstream: Arc<RecordingDownstreamSync>,
    service: WebhookService,
}

fn harness(
    subscriptions: MockSubscriptionRepository,
    selected_calendars: MockSelectedCalendarRepository,
    events: MockCachedEventRepository,
    credentials: MockCredentialResolver,
    client: MockCalendarProviderClient,
) -> Harness {
    let subscriptions = Arc::new(subscriptions);
    let events = Arc::new(events);
    let client = Arc::new(client);
    let downstream = Arc::new(RecordingDownstreamSync::new());

    let service = WebhookService::new(
        subscriptions.clone(),
        Arc::new(selected_calendars),
        events.clone(),
        Arc::new(credentials),
        Arc::new(MockCalendarClientFactory::with_client(client.clone())),
        downstream.clone(),
        TOKEN,
    );

    Harness { subscriptions, events, client, downstream, service }
}

#[tokio::test]
async fn invalid_token_rejects_before_touching_any_repository() {
    let h = harness(
        MockSubscriptionRepository::new().with_subscription(subscription("sub-1", CALENDAR, 3)),
        MockSelectedCalendarRepository::new(),
        MockCachedEventRepository::new(),
        MockCredentialResolver::new().with_credential(credential(3)),
        MockCalendarProviderClient::new(),
    );

    let err = h
        .service
        .handle_notification(&notification("wrong-token", ResourceState::Exists))
        .await
        .unwrap_err();

    assert!(matches!(err, CalSyncError::Auth(_)));
    assert_eq!(h.subscriptions.channel_lookups(), 0);
}

#[tokio::test]
async fn unregistered_channel_is_ignorable() {
    let h = harness(
        MockSubscriptionRepository::new(),
        MockSelectedCalendarRepository::new(),
        MockCachedEventRepository::new(),
        MockCredentialResolver::new(),
        MockCalendarProviderClient::new(),
    );

    let err = h
        .service
        .handle_notification(&notification(TOKEN, ResourceState::Exists))
        .await
        .unwrap_err();

    assert!(matches!(err, CalSyncError::Ignorable(_)));
}

#[tokio::test]
async fn handshake_notification_skips_events_sync() {
    let h = harness(
        MockSubscriptionRepository::new().with_subscription(subscription("sub-1", CALENDAR, 3)),
        MockSelectedCalendarRepository::new()
            .with_calendar(selected_calendar(CALENDAR, Some(3))),
        MockCachedEventRepository::new(),
        MockCredentialResolver::new().with_credential(credential(3)),
        MockCalendarProviderClient::new(),
    );

    let outcome = h
        .service
        .handle_notification(&notification(TOKEN, ResourceState::Sync))
        .await
        .unwrap();

    assert_eq!(outcome.sync_actions, vec![SyncAction::AvailabilityCache]);
    let changes = h.client.changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].sync_actions, vec![SyncAction::AvailabilityCache]);
}

#[tokio::test]
async fn conflicting_external_ids_fail_without_mutation() {
    let h = harness(
        MockSubscriptionRepository::new()
            .with_subscription(subscription("sub-1", "synced@example.com", 3)),
        MockSelectedCalendarRepository::new()
            .with_calendar(selected_calendar("selected@example.com", Some(3))),
        MockCachedEventRepository::new(),
        MockCredentialResolver::new().with_credential(credential(3)),
        MockCalendarProviderClient::new().with_deltas(vec![delta("evt-1", 100, 200)]),
    );

    let err = h
        .service
        .handle_notification(&notification(TOKEN, ResourceState::Exists))
        .await
        .unwrap_err();

    assert!(matches!(err, CalSyncError::Consistency(_)));
    assert!(h.client.changes().is_empty(), "provider must not be called");
    assert!(h.events.events().is_empty(), "no events may be written");
    assert!(h.subscriptions.get("sub-1").unwrap().last_sync_at.is_none());
}

#[tokio::test]
async fn credential_mismatch_is_tolerated_and_subscription_credential_wins() {
    // Resolver only knows the subscription's credential; success proves it
    // was the one used.
    let h = harness(
        MockSubscriptionRepository::new().with_subscription(subscription("sub-1", CALENDAR, 9)),
        MockSelectedCalendarRepository::new()
            .with_calendar(selected_calendar(CALENDAR, Some(3))),
        MockCachedEventRepository::new(),
        MockCredentialResolver::new().with_credential(credential(9)),
        MockCalendarProviderClient::new(),
    );

    let outcome = h
        .service
        .handle_notification(&notification(TOKEN, ResourceState::Exists))
        .await
        .unwrap();

    assert_eq!(
        outcome.sync_actions,
        vec![SyncAction::AvailabilityCache, SyncAction::EventsSync]
    );
}

#[tokio::test]
async fn returned_deltas_are_cached_and_forwarded_downstream() {
    let h = harness(
        MockSubscriptionRepository::new().with_subscription(subscription("sub-1", CALENDAR, 3)),
        MockSelectedCalendarRepository::new()
            .with_calendar(selected_calendar(CALENDAR, Some(3))),
        MockCachedEventRepository::new(),
        MockCredentialResolver::new().with_credential(credential(3)),
        MockCalendarProviderClient::new()
            .with_deltas(vec![delta("evt-1", 100, 200), delta("evt-2", 300, 400)]),
    );

    let outcome = h
        .service
        .handle_notification(&notification(TOKEN, ResourceState::Exists))
        .await
        .unwrap();

    assert_eq!(outcome.events_synced, 2);
    assert_eq!(h.events.events().len(), 2);

    let batches = h.downstream.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].0.len(), 2);
    assert_eq!(batches[0].1.app_type, "google_calendar");

    let row = h.subscriptions.get("sub-1").unwrap();
    assert!(row.last_sync_at.is_some());
    assert!(row.last_synced_down_at.is_some());
    assert_eq!(row.last_sync_direction, Some(SyncDirection::Downstream));
}

#[tokio::test]
async fn duplicate_delivery_is_idempotent() {
    let h = harness(
        MockSubscriptionRepository::new().with_subscription(subscription("sub-1", CALENDAR, 3)),
        MockSelectedCalendarRepository::new(),
        MockCachedEventRepository::new(),
        MockCredentialResolver::new().with_credential(credential(3)),
        MockCalendarProviderClient::new().with_deltas(vec![delta("evt-1", 100, 200)]),
    );

    let notification = notification(TOKEN, ResourceState::Exists);
    h.service.handle_notification(&notification).await.unwrap();
    let first_state: Vec<_> = {
        let mut events = h.events.events();
        events.sort_by(|a, b| a.provider_event_id.cmp(&b.provider_event_id));
        events.into_iter().map(|e| (e.provider_event_id, e.start_ts, e.end_ts)).collect()
    };

    h.service.handle_notification(&notification).await.unwrap();
    let second_state: Vec<_> = {
        let mut events = h.events.events();
        events.sort_by(|a, b| a.provider_event_id.cmp(&b.provider_event_id));
        events.into_iter().map(|e| (e.provider_event_id, e.start_ts, e.end_ts)).collect()
    };

    assert_eq!(first_state, second_state);
    assert_eq!(h.events.events().len(), 1);
}

#[tokio::test]
async fn bookkeeping_failure_after_successful_sync_is_swallowed() {
    let h = harness(
        MockSubscriptionRepository::new()
            .with_subscription(subscription("sub-1", CALENDAR, 3))
            .fail_record_sync(),
        MockSelectedCalendarRepository::new(),
        MockCachedEventRepository::new(),
        MockCredentialResolver::new().with_credential(credential(3)),
        MockCalendarProviderClient::new().with_deltas(vec![delta("evt-1", 100, 200)]),
    );

    // The primary side effect succeeded, so the notification must too.
    let outcome = h
        .service
        .handle_notification(&notification(TOKEN, ResourceState::Exists))
        .await
        .unwrap();

    assert_eq!(outcome.events_synced, 1);
    assert_eq!(h.events.events().len(), 1);
}

#[tokio::test]
async fn missing_credential_is_a_dependency_error() {
    let h = harness(
        MockSubscriptionRepository::new().with_subscription(subscription("sub-1", CALENDAR, 3)),
        MockSelectedCalendarRepository::new(),
        MockCachedEventRepository::new(),
        MockCredentialResolver::new(),
        MockCalendarProviderClient::new(),
    );

    let err = h
        .service
        .handle_notification(&notification(TOKEN, ResourceState::Exists))
        .await
        .unwrap_err();

    assert!(matches!(err, CalSyncError::Dependency(_)));
}

#[tokio::test]
async fn missing_provider_client_is_a_dependency_error() {
    let subscriptions =
        Arc::new(MockSubscriptionRepository::new().with_subscription(subscription(
            "sub-1", CALENDAR, 3,
        )));
    let service = WebhookService::new(
        subscriptions,
        Arc::new(MockSelectedCalendarRepository::new()),
        Arc::new(MockCachedEventRepository::new()),
        Arc::new(MockCredentialResolver::new().with_credential(credential(3))),
        Arc::new(MockCalendarClientFactory::empty()),
        Arc::new(RecordingDownstreamSync::new()),
        TOKEN,
    );

    let err = service
        .handle_notification(&notification(TOKEN, ResourceState::Exists))
        .await
        .unwrap_err();

    assert!(matches!(err, CalSyncError::Dependency(_)));
}

#[tokio::test]
async fn selected_calendar_only_notification_refreshes_availability() {
    let h = harness(
        MockSubscriptionRepository::new(),
        MockSelectedCalendarRepository::new()
            .with_calendar(selected_calendar(CALENDAR, Some(3))),
        MockCachedEventRepository::new(),
        MockCredentialResolver::new().with_credential(credential(3)),
        MockCalendarProviderClient::new(),
    );

    let outcome = h
        .service
        .handle_notification(&notification(TOKEN, ResourceState::Exists))
        .await
        .unwrap();

    assert_eq!(outcome.sync_actions, vec![SyncAction::AvailabilityCache]);
    assert_eq!(outcome.events_synced, 0);

    // All selected calendars sharing the credential ride along.
    let changes = h.client.changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].calendar_id, CALENDAR);
    assert_eq!(changes[0].selected_calendar_count, 1);
}
