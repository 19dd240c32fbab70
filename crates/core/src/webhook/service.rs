//! Webhook ingestion service - core business logic
//!
//! Processes one provider push notification end to end: authenticate,
//! resolve the channel against both storage locations, classify the sync
//! work, fetch the credential and provider client, apply the change, and
//! persist side effects. Failure semantics follow the error taxonomy:
//! authentication and consistency errors surface to the caller, ignorable
//! conditions are acknowledged as success, and bookkeeping failures after a
//! successful sync are logged but never escalated.

use std::sync::Arc;

use calsync_domain::{
    CalSyncError, DownstreamApp, PushNotification, Result, Subscription, SyncAction,
};
use chrono::Utc;
use tracing::{debug, error, instrument};

use crate::events::ports::{CachedEventRepository, DownstreamSync};
use crate::subscriptions::ports::{
    CalendarClientFactory, CredentialResolver, SelectedCalendarRepository, SubscriptionRepository,
    WatchedCalendarChange,
};
use crate::webhook::classify::classify_actions;

/// Outcome of one processed notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookOutcome {
    pub sync_actions: Vec<SyncAction>,
    /// Number of event deltas applied to the local cache.
    pub events_synced: usize,
}

/// Webhook ingestion service
pub struct WebhookService {
    subscriptions: Arc<dyn SubscriptionRepository>,
    selected_calendars: Arc<dyn SelectedCalendarRepository>,
    events: Arc<dyn CachedEventRepository>,
    credentials: Arc<dyn CredentialResolver>,
    clients: Arc<dyn CalendarClientFactory>,
    downstream: Arc<dyn DownstreamSync>,
    /// Shared channel secret, injected as configuration.
    channel_token: String,
}

impl WebhookService {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        selected_calendars: Arc<dyn SelectedCalendarRepository>,
        events: Arc<dyn CachedEventRepository>,
        credentials: Arc<dyn CredentialResolver>,
        clients: Arc<dyn CalendarClientFactory>,
        downstream: Arc<dyn DownstreamSync>,
        channel_token: impl Into<String>,
    ) -> Self {
        Self {
            subscriptions,
            selected_calendars,
            events,
            credentials,
            clients,
            downstream,
            channel_token: channel_token.into(),
        }
    }

    /// Process one push notification.
    #[instrument(
        skip(self, notification),
        fields(
            channel_id = %notification.channel_id,
            resource_id = %notification.resource_id,
            resource_state = %notification.resource_state,
        )
    )]
    pub async fn handle_notification(
        &self,
        notification: &PushNotification,
    ) -> Result<WebhookOutcome> {
        // Authenticate before touching any repository.
        if notification.channel_token != self.channel_token {
            return Err(CalSyncError::Auth("invalid channel token".into()));
        }

        // Resolve the channel against both storage locations.
        let (subscription, selected_calendar) = tokio::try_join!(
            self.subscriptions
                .find_by_channel(&notification.channel_id, &notification.resource_id),
            self.selected_calendars
                .find_by_channel(&notification.channel_id, &notification.resource_id),
        )?;

        let classified = classify_actions(
            &notification.channel_id,
            &notification.resource_id,
            selected_calendar.as_ref(),
            subscription.as_ref(),
            notification.resource_state,
        )?;

        // Fetch the credential for the resolved credential id.
        let credential = self
            .credentials
            .get_credential_for_calendar_cache(classified.credential_id)
            .await?
            .ok_or_else(|| {
                // Happens when e.g. a delegation credential was disabled
                // after the channel was registered.
                error!(
                    credential_id = classified.credential_id,
                    "no credential found for push notification"
                );
                CalSyncError::Dependency(format!(
                    "no credential found for credential id {}",
                    classified.credential_id
                ))
            })?;

        let client = self.clients.client_for(&credential).await?.ok_or_else(|| {
            error!(credential_id = credential.id, "failed to initialize calendar client");
            CalSyncError::Dependency(format!(
                "failed to initialize calendar client for credential {}",
                credential.id
            ))
        })?;

        // One push may refresh several downstream consumers sharing the
        // credential.
        let related_selected_calendars =
            self.selected_calendars.find_by_credential_id(classified.credential_id).await?;

        let change_result = client
            .on_watched_calendar_change(WatchedCalendarChange {
                calendar_id: &classified.external_calendar_id,
                sync_actions: &classified.sync_actions,
                selected_calendars: &related_selected_calendars,
            })
            .await?;

        // Apply returned deltas: idempotent cache upsert, then forward to
        // the downstream pipeline.
        let mut events_synced = 0;
        if let Some(deltas) = change_result.events_to_sync {
            if !deltas.is_empty() {
                if let Some(ref subscription) = subscription {
                    let params: Vec<_> =
                        deltas.iter().cloned().map(|d| d.into_params(&subscription.id)).collect();
                    self.events.bulk_upsert_events(&params).await?;
                    events_synced = params.len();
                }

                self.downstream
                    .sync_downstream(
                        &deltas,
                        &DownstreamApp::for_provider(credential.provider_type),
                    )
                    .await?;
            }
        }

        // Best-effort bookkeeping: the primary side effect already
        // succeeded, so a failure here must not fail the notification.
        if let Some(ref subscription) = subscription {
            let events_sync_ran =
                classified.sync_actions.contains(&SyncAction::EventsSync);
            if let Err(err) = self.update_bookkeeping(subscription, events_sync_ran).await {
                error!(
                    subscription_id = %subscription.id,
                    error = %err,
                    "failed to update sync bookkeeping after successful webhook"
                );
            }
        } else {
            debug!("no subscription matched; processed for selected calendar only");
        }

        debug!(
            sync_actions = ?classified.sync_actions,
            events_synced,
            external_calendar_id = %classified.external_calendar_id,
            "successfully processed webhook"
        );

        Ok(WebhookOutcome { sync_actions: classified.sync_actions, events_synced })
    }

    async fn update_bookkeeping(
        &self,
        subscription: &Subscription,
        events_sync_ran: bool,
    ) -> Result<()> {
        let now = Utc::now().timestamp();
        self.subscriptions.record_sync(&subscription.id, now).await?;
        if events_sync_ran {
            self.subscriptions.record_synced_down(&subscription.id, now).await?;
        }
        Ok(())
    }
}
