//! Mock port implementations for testing
//!
//! Provides in-memory mocks for all core ports, enabling deterministic
//! tests without database or network dependencies.
#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use calsync_domain::{
    CachedEvent, CachedEventParams, CalSyncError, CalendarCredential, DownstreamApp, EventDelta,
    EventStatus, NewSubscription, ProviderChannelDetails, ProviderType, Result, SelectedCalendar,
    Subscription, SubscriptionStatus, SyncAction, SyncDirection,
};
use chrono::Utc;
use uuid::Uuid;

use crate::events::ports::{CachedEventRepository, DownstreamSync, ErrorTracker};
use crate::subscriptions::ports::{
    CalendarClientFactory, CalendarProviderClient, CredentialResolver,
    SelectedCalendarRepository, SubscriptionRepository, WatchedCalendarChange,
    WatchedCalendarChangeResult,
};

/// In-memory mock for `SubscriptionRepository`.
#[derive(Default)]
pub struct MockSubscriptionRepository {
    rows: Mutex<Vec<Subscription>>,
    fail_record_sync: AtomicBool,
    channel_lookups: AtomicUsize,
}

impl MockSubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience helper for seeding a subscription row.
    pub fn with_subscription(self, subscription: Subscription) -> Self {
        self.rows.lock().unwrap().push(subscription);
        self
    }

    /// Make `record_sync` fail, for exercising best-effort bookkeeping.
    pub fn fail_record_sync(self) -> Self {
        self.fail_record_sync.store(true, Ordering::SeqCst);
        self
    }

    /// Snapshot of all rows.
    pub fn rows(&self) -> Vec<Subscription> {
        self.rows.lock().unwrap().clone()
    }

    /// Look a row up by id.
    pub fn get(&self, id: &str) -> Option<Subscription> {
        self.rows.lock().unwrap().iter().find(|s| s.id == id).cloned()
    }

    /// Number of channel lookups issued so far.
    pub fn channel_lookups(&self) -> usize {
        self.channel_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubscriptionRepository for MockSubscriptionRepository {
    async fn find_active(
        &self,
        external_calendar_id: &str,
        provider: ProviderType,
    ) -> Result<Option<Subscription>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|s| {
                s.status == SubscriptionStatus::Active
                    && s.external_calendar_id == external_calendar_id
                    && s.provider_type == provider
            })
            .cloned())
    }

    async fn find_by_channel(
        &self,
        channel_id: &str,
        resource_id: &str,
    ) -> Result<Option<Subscription>> {
        self.channel_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|s| {
                s.provider_subscription_id.as_deref() == Some(channel_id)
                    && s.provider_resource_id.as_deref() == Some(resource_id)
            })
            .cloned())
    }

    async fn upsert(&self, subscription: NewSubscription) -> Result<Subscription> {
        let mut rows = self.rows.lock().unwrap();
        let now = Utc::now().timestamp();

        if let Some(existing) = rows.iter_mut().find(|s| {
            s.credential_id == subscription.credential_id
                && s.external_calendar_id == subscription.external_calendar_id
        }) {
            if let Some(ref channel) = subscription.channel {
                existing.status = subscription.status;
                existing.provider_subscription_id = Some(channel.id.clone());
                existing.provider_subscription_kind = Some(channel.kind.clone());
                existing.provider_resource_id = Some(channel.resource_id.clone());
                existing.provider_resource_uri = Some(channel.resource_uri.clone());
                existing.provider_expiration = Some(channel.expiration);
                existing.activated_at = Some(now);
            } else if existing.status == SubscriptionStatus::Inactive {
                // A deactivated row is revived so re-selecting a calendar
                // restarts the watch lifecycle.
                existing.status = SubscriptionStatus::Pending;
            }
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let channel = subscription.channel;
        let row = Subscription {
            id: Uuid::now_v7().to_string(),
            credential_id: subscription.credential_id,
            external_calendar_id: subscription.external_calendar_id,
            provider_type: subscription.provider_type,
            status: subscription.status,
            provider_subscription_id: channel.as_ref().map(|c| c.id.clone()),
            provider_subscription_kind: channel.as_ref().map(|c| c.kind.clone()),
            provider_resource_id: channel.as_ref().map(|c| c.resource_id.clone()),
            provider_resource_uri: channel.as_ref().map(|c| c.resource_uri.clone()),
            provider_expiration: channel.as_ref().map(|c| c.expiration),
            activated_at: channel.as_ref().map(|_| now),
            last_sync_at: None,
            last_synced_down_at: None,
            last_sync_direction: None,
            watch_error: None,
            created_at: now,
            updated_at: now,
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn activate(&self, id: &str, details: &ProviderChannelDetails) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| CalSyncError::NotFound(format!("subscription {id}")))?;

        let now = Utc::now().timestamp();
        row.status = SubscriptionStatus::Active;
        row.provider_subscription_id = Some(details.id.clone());
        row.provider_subscription_kind = Some(details.kind.clone());
        row.provider_resource_id = Some(details.resource_id.clone());
        row.provider_resource_uri = Some(details.resource_uri.clone());
        row.provider_expiration = Some(details.expiration);
        row.activated_at = Some(now);
        row.updated_at = now;
        Ok(())
    }

    async fn deactivate(&self, id: &str) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| CalSyncError::NotFound(format!("subscription {id}")))?;
        row.status = SubscriptionStatus::Inactive;
        row.updated_at = Utc::now().timestamp();
        Ok(())
    }

    async fn find_requiring_renewal_or_activation(
        &self,
        batch_size: usize,
        expiring_before: i64,
    ) -> Result<Vec<Subscription>> {
        let mut due: Vec<Subscription> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|s| match s.status {
                SubscriptionStatus::Pending => true,
                SubscriptionStatus::Active => {
                    s.provider_expiration.is_some_and(|exp| exp <= expiring_before)
                }
                SubscriptionStatus::Inactive => false,
            })
            .cloned()
            .collect();
        due.sort_by_key(|s| (s.last_sync_at.unwrap_or(0), s.created_at));
        due.truncate(batch_size);
        Ok(due)
    }

    async fn record_sync(&self, id: &str, at: i64) -> Result<()> {
        if self.fail_record_sync.load(Ordering::SeqCst) {
            return Err(CalSyncError::Database("record_sync failed (mock)".into()));
        }
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| CalSyncError::NotFound(format!("subscription {id}")))?;
        row.last_sync_at = Some(at);
        row.updated_at = at;
        Ok(())
    }

    async fn record_synced_down(&self, id: &str, at: i64) -> Result<()> {
        if self.fail_record_sync.load(Ordering::SeqCst) {
            return Err(CalSyncError::Database("record_synced_down failed (mock)".into()));
        }
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| CalSyncError::NotFound(format!("subscription {id}")))?;
        row.last_synced_down_at = Some(at);
        row.last_sync_direction = Some(SyncDirection::Downstream);
        row.updated_at = at;
        Ok(())
    }

    async fn set_watch_error(&self, id: &str, error: &str) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| CalSyncError::NotFound(format!("subscription {id}")))?;
        row.watch_error = Some(error.to_string());
        Ok(())
    }

    async fn clear_watch_error(&self, id: &str) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| CalSyncError::NotFound(format!("subscription {id}")))?;
        row.watch_error = None;
        Ok(())
    }
}

/// In-memory mock for `SelectedCalendarRepository`.
#[derive(Default)]
pub struct MockSelectedCalendarRepository {
    rows: Mutex<Vec<SelectedCalendar>>,
}

impl MockSelectedCalendarRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience helper for seeding a legacy record.
    pub fn with_calendar(self, calendar: SelectedCalendar) -> Self {
        self.rows.lock().unwrap().push(calendar);
        self
    }
}

#[async_trait]
impl SelectedCalendarRepository for MockSelectedCalendarRepository {
    async fn find_by_channel(
        &self,
        channel_id: &str,
        resource_id: &str,
    ) -> Result<Option<SelectedCalendar>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|c| {
                c.channel_id.as_deref() == Some(channel_id)
                    && c.channel_resource_id.as_deref() == Some(resource_id)
            })
            .cloned())
    }

    async fn find_with_channel(
        &self,
        external_id: &str,
        provider: ProviderType,
    ) -> Result<Option<SelectedCalendar>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|c| {
                c.external_id == external_id
                    && c.integration == provider
                    && c.channel_id.is_some()
            })
            .cloned())
    }

    async fn find_by_credential_id(&self, credential_id: i64) -> Result<Vec<SelectedCalendar>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.credential_id == Some(credential_id))
            .cloned()
            .collect())
    }
}

/// In-memory mock for `CachedEventRepository`.
#[derive(Default)]
pub struct MockCachedEventRepository {
    events: Mutex<HashMap<(String, String), CachedEvent>>,
    upsert_calls: AtomicUsize,
    fail_upserts: AtomicBool,
}

impl MockCachedEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every upsert fail, for exercising propagation paths.
    pub fn fail_upserts(self) -> Self {
        self.fail_upserts.store(true, Ordering::SeqCst);
        self
    }

    /// Snapshot of all cached events.
    pub fn events(&self) -> Vec<CachedEvent> {
        self.events.lock().unwrap().values().cloned().collect()
    }

    /// Number of upsert attempts seen so far.
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CachedEventRepository for MockCachedEventRepository {
    async fn upsert_event(&self, params: &CachedEventParams) -> Result<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(CalSyncError::Database("upsert_event failed (mock)".into()));
        }

        let key = (params.subscription_id.clone(), params.provider_event_id.clone());
        let now = Utc::now().timestamp();
        let mut events = self.events.lock().unwrap();
        let created_at = events.get(&key).map_or(now, |e| e.created_at);
        events.insert(
            key,
            CachedEvent {
                id: Uuid::now_v7().to_string(),
                subscription_id: params.subscription_id.clone(),
                provider_event_id: params.provider_event_id.clone(),
                summary: params.summary.clone(),
                start_ts: params.start_ts,
                end_ts: params.end_ts,
                status: params.status,
                transparency: params.transparency,
                payload: params.payload.clone(),
                created_at,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn bulk_upsert_events(&self, events: &[CachedEventParams]) -> Result<()> {
        let mut first_error = None;
        for event in events {
            if let Err(err) = self.upsert_event(event).await {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn get_events_for_availability(
        &self,
        subscription_id: &str,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<Vec<CachedEvent>> {
        let now = Utc::now().timestamp();
        let mut matching: Vec<CachedEvent> = self
            .events
            .lock()
            .unwrap()
            .values()
            .filter(|e| {
                e.subscription_id == subscription_id
                    && e.counts_toward_busy()
                    && e.end_ts > now
                    && ((e.start_ts >= start_ts && e.start_ts < end_ts)
                        || (e.end_ts > start_ts && e.end_ts <= end_ts)
                        || (e.start_ts < start_ts && e.end_ts > end_ts))
            })
            .cloned()
            .collect();
        matching.sort_by_key(|e| e.start_ts);
        Ok(matching)
    }

    async fn delete_event(&self, subscription_id: &str, provider_event_id: &str) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .remove(&(subscription_id.to_string(), provider_event_id.to_string()));
        Ok(())
    }

    async fn cleanup_old_events(&self) -> Result<usize> {
        let now = Utc::now().timestamp();
        let mut events = self.events.lock().unwrap();
        let before = events.len();
        events.retain(|_, e| {
            !(e.end_ts < now
                || (e.status == EventStatus::Cancelled
                    && e.end_ts < now - calsync_domain::constants::CANCELLED_EVENT_RETENTION_SECS))
        });
        Ok(before - events.len())
    }
}

/// In-memory mock for `CredentialResolver`.
#[derive(Default)]
pub struct MockCredentialResolver {
    credentials: Mutex<HashMap<i64, CalendarCredential>>,
}

impl MockCredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience helper for seeding a credential.
    pub fn with_credential(self, credential: CalendarCredential) -> Self {
        self.credentials.lock().unwrap().insert(credential.id, credential);
        self
    }
}

#[async_trait]
impl CredentialResolver for MockCredentialResolver {
    async fn get_credential_for_calendar_cache(
        &self,
        credential_id: i64,
    ) -> Result<Option<CalendarCredential>> {
        Ok(self.credentials.lock().unwrap().get(&credential_id).cloned())
    }
}

/// A change notification as seen by the scripted provider client.
#[derive(Debug, Clone)]
pub struct RecordedChange {
    pub calendar_id: String,
    pub sync_actions: Vec<SyncAction>,
    pub selected_calendar_count: usize,
}

/// Scripted provider client: returns configured deltas and channel details,
/// recording every interaction.
#[derive(Default)]
pub struct MockCalendarProviderClient {
    deltas: Mutex<Option<Vec<EventDelta>>>,
    watch_details: Mutex<Option<ProviderChannelDetails>>,
    watch_calls: AtomicUsize,
    changes: Mutex<Vec<RecordedChange>>,
}

impl MockCalendarProviderClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the deltas returned from `on_watched_calendar_change`.
    pub fn with_deltas(self, deltas: Vec<EventDelta>) -> Self {
        *self.deltas.lock().unwrap() = Some(deltas);
        self
    }

    /// Script the channel details returned from `watch_calendar`. Without
    /// this, watch calls fail with a network error.
    pub fn with_watch_details(self, details: ProviderChannelDetails) -> Self {
        *self.watch_details.lock().unwrap() = Some(details);
        self
    }

    /// Number of watch calls issued so far.
    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    /// All change notifications the client has seen.
    pub fn changes(&self) -> Vec<RecordedChange> {
        self.changes.lock().unwrap().clone()
    }
}

#[async_trait]
impl CalendarProviderClient for MockCalendarProviderClient {
    async fn watch_calendar(
        &self,
        _external_calendar_id: &str,
    ) -> Result<ProviderChannelDetails> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        self.watch_details
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| CalSyncError::Network("watch failed (mock)".into()))
    }

    async fn stop_channel(&self, _channel_id: &str, _resource_id: &str) -> Result<()> {
        Ok(())
    }

    async fn on_watched_calendar_change(
        &self,
        change: WatchedCalendarChange<'_>,
    ) -> Result<WatchedCalendarChangeResult> {
        self.changes.lock().unwrap().push(RecordedChange {
            calendar_id: change.calendar_id.to_string(),
            sync_actions: change.sync_actions.to_vec(),
            selected_calendar_count: change.selected_calendars.len(),
        });
        Ok(WatchedCalendarChangeResult { events_to_sync: self.deltas.lock().unwrap().clone() })
    }
}

/// Factory handing out one scripted client for every credential.
#[derive(Default)]
pub struct MockCalendarClientFactory {
    client: Option<Arc<MockCalendarProviderClient>>,
}

impl MockCalendarClientFactory {
    /// A factory that cannot initialize any client.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_client(client: Arc<MockCalendarProviderClient>) -> Self {
        Self { client: Some(client) }
    }
}

#[async_trait]
impl CalendarClientFactory for MockCalendarClientFactory {
    async fn client_for(
        &self,
        _credential: &CalendarCredential,
    ) -> Result<Option<Arc<dyn CalendarProviderClient>>> {
        Ok(self
            .client
            .as_ref()
            .map(|c| Arc::clone(c) as Arc<dyn CalendarProviderClient>))
    }
}

/// Downstream sync that records every forwarded batch.
#[derive(Default)]
pub struct RecordingDownstreamSync {
    batches: Mutex<Vec<(Vec<EventDelta>, DownstreamApp)>>,
}

impl RecordingDownstreamSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<(Vec<EventDelta>, DownstreamApp)> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl DownstreamSync for RecordingDownstreamSync {
    async fn sync_downstream(&self, events: &[EventDelta], app: &DownstreamApp) -> Result<()> {
        self.batches.lock().unwrap().push((events.to_vec(), app.clone()));
        Ok(())
    }
}

/// Error tracker that records every captured failure.
#[derive(Default)]
pub struct RecordingErrorTracker {
    captured: Mutex<Vec<(String, String)>>,
}

impl RecordingErrorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn captured(&self) -> Vec<(String, String)> {
        self.captured.lock().unwrap().clone()
    }
}

impl ErrorTracker for RecordingErrorTracker {
    fn capture(&self, error: &CalSyncError, context: &str) {
        self.captured.lock().unwrap().push((error.to_string(), context.to_string()));
    }
}
