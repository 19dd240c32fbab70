//! Port interfaces for subscription reconciliation
//!
//! These traits define the boundaries between core business logic
//! and infrastructure implementations.

use std::sync::Arc;

use async_trait::async_trait;
use calsync_domain::{
    CalendarCredential, EventDelta, NewSubscription, ProviderChannelDetails, ProviderType, Result,
    SelectedCalendar, Subscription, SyncAction,
};

/// Persistent store of subscription records.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Find the ACTIVE subscription for an external calendar, if any.
    async fn find_active(
        &self,
        external_calendar_id: &str,
        provider: ProviderType,
    ) -> Result<Option<Subscription>>;

    /// Find the subscription bound to a provider channel.
    async fn find_by_channel(
        &self,
        channel_id: &str,
        resource_id: &str,
    ) -> Result<Option<Subscription>>;

    /// Create the row, or return the existing one for the same
    /// (credential, external calendar) pair. When `channel` details are
    /// supplied the row is created (or updated) as ACTIVE.
    async fn upsert(&self, subscription: NewSubscription) -> Result<Subscription>;

    /// PENDING → ACTIVE, stamping `activated_at` and all channel fields.
    async fn activate(&self, id: &str, details: &ProviderChannelDetails) -> Result<()>;

    /// Any status → INACTIVE. The row is kept as an audit trail.
    async fn deactivate(&self, id: &str) -> Result<()>;

    /// PENDING rows plus ACTIVE rows whose channel expires before
    /// `expiring_before`, least recently synced first, bounded by
    /// `batch_size`.
    async fn find_requiring_renewal_or_activation(
        &self,
        batch_size: usize,
        expiring_before: i64,
    ) -> Result<Vec<Subscription>>;

    /// Stamp `last_sync_at`.
    async fn record_sync(&self, id: &str, at: i64) -> Result<()>;

    /// Stamp `last_synced_down_at` and mark the last direction DOWNSTREAM.
    async fn record_synced_down(&self, id: &str, at: i64) -> Result<()>;

    async fn set_watch_error(&self, id: &str, error: &str) -> Result<()>;

    async fn clear_watch_error(&self, id: &str) -> Result<()>;
}

/// Legacy per-calendar records that may still carry channel details.
#[async_trait]
pub trait SelectedCalendarRepository: Send + Sync {
    /// Find the legacy record bound to a provider channel.
    async fn find_by_channel(
        &self,
        channel_id: &str,
        resource_id: &str,
    ) -> Result<Option<SelectedCalendar>>;

    /// Find a legacy record with a registered channel for an external
    /// calendar.
    async fn find_with_channel(
        &self,
        external_id: &str,
        provider: ProviderType,
    ) -> Result<Option<SelectedCalendar>>;

    /// All selected calendars sharing one credential, so a single push can
    /// refresh every downstream consumer.
    async fn find_by_credential_id(&self, credential_id: i64) -> Result<Vec<SelectedCalendar>>;
}

/// Resolves a credential id to an authenticated credential.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// `None` when the credential no longer exists (e.g. a delegation
    /// credential was disabled) — the channel is orphaned in that case.
    async fn get_credential_for_calendar_cache(
        &self,
        credential_id: i64,
    ) -> Result<Option<CalendarCredential>>;
}

/// Everything a provider client needs to process a change notification.
#[derive(Debug)]
pub struct WatchedCalendarChange<'a> {
    pub calendar_id: &'a str,
    pub sync_actions: &'a [SyncAction],
    pub selected_calendars: &'a [SelectedCalendar],
}

/// Result of handling a change notification.
#[derive(Debug, Default)]
pub struct WatchedCalendarChangeResult {
    /// Changed events to apply to the local cache and forward downstream.
    pub events_to_sync: Option<Vec<EventDelta>>,
}

/// Provider-side channel operations, reachable only through a resolved
/// credential.
#[async_trait]
pub trait CalendarProviderClient: Send + Sync {
    /// Register a push channel for the calendar.
    async fn watch_calendar(&self, external_calendar_id: &str)
        -> Result<ProviderChannelDetails>;

    /// Tear down a push channel.
    async fn stop_channel(&self, channel_id: &str, resource_id: &str) -> Result<()>;

    /// Handle a change notification for a watched calendar.
    async fn on_watched_calendar_change(
        &self,
        change: WatchedCalendarChange<'_>,
    ) -> Result<WatchedCalendarChangeResult>;
}

/// Builds a provider client for a resolved credential.
#[async_trait]
pub trait CalendarClientFactory: Send + Sync {
    /// `None` when no client can be initialised for the credential's
    /// provider.
    async fn client_for(
        &self,
        credential: &CalendarCredential,
    ) -> Result<Option<Arc<dyn CalendarProviderClient>>>;
}
