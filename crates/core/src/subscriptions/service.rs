//! Subscription reconciliation service - core business logic
//!
//! Centralizes subscription management across calendar providers: finding,
//! reusing, and creating push-channel subscriptions. Arbitrates between the
//! subscription table and the legacy per-calendar channel fields left behind
//! by the migration.

use std::sync::Arc;

use calsync_domain::constants::RENEWAL_WINDOW_SECS;
use calsync_domain::{
    CalSyncError, NewSubscription, ProviderChannelDetails, ProviderType, Result, Subscription,
    SubscriptionStatus,
};
use chrono::Utc;
use tracing::{debug, error, info, instrument};

use super::ports::{SelectedCalendarRepository, SubscriptionRepository};

/// Subscription reconciliation service
pub struct SubscriptionService {
    subscriptions: Arc<dyn SubscriptionRepository>,
    selected_calendars: Arc<dyn SelectedCalendarRepository>,
}

impl SubscriptionService {
    /// Create a new reconciliation service
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        selected_calendars: Arc<dyn SelectedCalendarRepository>,
    ) -> Self {
        Self { subscriptions, selected_calendars }
    }

    /// Find the single logical subscription for an external calendar,
    /// creating one when none exists.
    ///
    /// Lookup order: an ACTIVE row in the subscription table always wins.
    /// Otherwise the legacy per-calendar record is consulted; a complete set
    /// of channel fields there is materialized into an ACTIVE subscription
    /// without a new provider call, while an incomplete set is an unusable
    /// channel and fails loudly. With neither source present a PENDING row
    /// is created — provider registration happens in a separate watch step.
    #[instrument(skip(self), fields(external_calendar_id, provider = %provider))]
    pub async fn find_or_create_active_subscription(
        &self,
        external_calendar_id: &str,
        provider: ProviderType,
        credential_id: i64,
    ) -> Result<Subscription> {
        if let Some(existing) =
            self.subscriptions.find_active(external_calendar_id, provider).await?
        {
            debug!(
                subscription_id = %existing.id,
                provider_subscription_id = ?existing.provider_subscription_id,
                "found existing subscription in subscription table"
            );

            if existing.credential_id != credential_id {
                // Two credential instances may legitimately point at the
                // same external resource; the stored record wins.
                info!(
                    subscription_credential_id = existing.credential_id,
                    requested_credential_id = credential_id,
                    "credential mismatch between caller and subscription record"
                );
            }

            return Ok(existing);
        }

        if let Some(legacy) =
            self.selected_calendars.find_with_channel(external_calendar_id, provider).await?
        {
            debug!(
                selected_calendar_id = %legacy.id,
                channel_id = ?legacy.channel_id,
                "found existing channel in legacy selected-calendar record"
            );

            let details = legacy.channel_details().ok_or_else(|| {
                error!(
                    selected_calendar_id = %legacy.id,
                    missing_kind = legacy.channel_kind.is_none(),
                    missing_resource_id = legacy.channel_resource_id.is_none(),
                    missing_resource_uri = legacy.channel_resource_uri.is_none(),
                    missing_expiration = legacy.channel_expiration.is_none(),
                    "legacy channel record has missing provider details"
                );
                CalSyncError::Dependency(format!(
                    "selected calendar {} has an unusable channel: missing provider details",
                    legacy.id
                ))
            })?;

            if legacy.credential_id.is_some_and(|cid| cid != credential_id) {
                info!(
                    legacy_credential_id = ?legacy.credential_id,
                    requested_credential_id = credential_id,
                    "credential mismatch between legacy record and caller"
                );
            }

            debug!("materializing active subscription from legacy channel record");
            return self
                .subscriptions
                .upsert(NewSubscription {
                    credential_id,
                    external_calendar_id: external_calendar_id.to_string(),
                    provider_type: provider,
                    status: SubscriptionStatus::Active,
                    channel: Some(details),
                })
                .await;
        }

        debug!("no existing channel found; creating pending subscription");
        self.subscriptions
            .upsert(NewSubscription {
                credential_id,
                external_calendar_id: external_calendar_id.to_string(),
                provider_type: provider,
                status: SubscriptionStatus::Pending,
                channel: None,
            })
            .await
    }

    /// Transition a PENDING subscription to ACTIVE with freshly obtained
    /// provider channel details.
    #[instrument(skip(self, details), fields(subscription_id))]
    pub async fn activate_subscription(
        &self,
        subscription_id: &str,
        details: &ProviderChannelDetails,
    ) -> Result<()> {
        debug!(channel_id = %details.id, "activating subscription");
        self.subscriptions.activate(subscription_id, details).await
    }

    /// Mark a subscription INACTIVE. The row is kept for audit.
    #[instrument(skip(self), fields(subscription_id))]
    pub async fn deactivate_subscription(&self, subscription_id: &str) -> Result<()> {
        debug!("deactivating subscription");
        self.subscriptions.deactivate(subscription_id).await
    }

    /// Subscriptions that are PENDING or ACTIVE-but-expiring-soon, ordered
    /// for fair processing and bounded by `batch_size`.
    pub async fn find_all_requiring_renewal_or_activation(
        &self,
        batch_size: usize,
    ) -> Result<Vec<Subscription>> {
        let expiring_before = Utc::now().timestamp() + RENEWAL_WINDOW_SECS;
        self.subscriptions.find_requiring_renewal_or_activation(batch_size, expiring_before).await
    }
}
