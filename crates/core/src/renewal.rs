//! Subscription renewal worker - core business logic
//!
//! Re-issues provider watch calls for subscriptions that are still PENDING
//! or whose channel is about to expire. Each subscription is processed
//! independently so one failing credential cannot stall the batch.

use std::sync::Arc;

use calsync_domain::{CalSyncError, Result, Subscription};
use tracing::{debug, error, info, instrument, warn};

use crate::subscriptions::ports::{
    CalendarClientFactory, CredentialResolver, SubscriptionRepository,
};
use crate::subscriptions::service::SubscriptionService;

/// Outcome summary of one renewal batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenewalSummary {
    pub processed: usize,
    pub renewed: usize,
    pub failed: usize,
}

/// Subscription renewal worker
pub struct RenewalService {
    service: Arc<SubscriptionService>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    credentials: Arc<dyn CredentialResolver>,
    clients: Arc<dyn CalendarClientFactory>,
}

impl RenewalService {
    pub fn new(
        service: Arc<SubscriptionService>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        credentials: Arc<dyn CredentialResolver>,
        clients: Arc<dyn CalendarClientFactory>,
    ) -> Self {
        Self { service, subscriptions, credentials, clients }
    }

    /// Process one renewal batch.
    #[instrument(skip(self))]
    pub async fn run_once(&self, batch_size: usize) -> Result<RenewalSummary> {
        let due = self.service.find_all_requiring_renewal_or_activation(batch_size).await?;

        if due.is_empty() {
            debug!("no subscriptions require renewal or activation");
            return Ok(RenewalSummary::default());
        }

        info!(count = due.len(), "processing subscription renewal batch");

        let mut summary = RenewalSummary::default();
        for subscription in &due {
            summary.processed += 1;
            match self.renew_one(subscription).await {
                Ok(()) => summary.renewed += 1,
                Err(err) => {
                    summary.failed += 1;
                    warn!(
                        subscription_id = %subscription.id,
                        error = %err,
                        "subscription renewal failed"
                    );
                    if let Err(record_err) =
                        self.subscriptions.set_watch_error(&subscription.id, &err.to_string()).await
                    {
                        error!(
                            subscription_id = %subscription.id,
                            error = %record_err,
                            "failed to record watch error"
                        );
                    }
                }
            }
        }

        info!(
            processed = summary.processed,
            renewed = summary.renewed,
            failed = summary.failed,
            "renewal batch completed"
        );

        Ok(summary)
    }

    async fn renew_one(&self, subscription: &Subscription) -> Result<()> {
        let credential = self
            .credentials
            .get_credential_for_calendar_cache(subscription.credential_id)
            .await?
            .ok_or_else(|| {
                CalSyncError::Dependency(format!(
                    "no credential found for credential id {}",
                    subscription.credential_id
                ))
            })?;

        let client = self.clients.client_for(&credential).await?.ok_or_else(|| {
            CalSyncError::Dependency(format!(
                "failed to initialize calendar client for credential {}",
                credential.id
            ))
        })?;

        let details = client.watch_calendar(&subscription.external_calendar_id).await?;

        self.subscriptions.activate(&subscription.id, &details).await?;
        self.subscriptions.clear_watch_error(&subscription.id).await?;

        debug!(
            subscription_id = %subscription.id,
            channel_id = %details.id,
            expiration = details.expiration,
            "subscription channel registered"
        );

        Ok(())
    }
}
