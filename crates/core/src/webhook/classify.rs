//! Action classification for inbound push notifications
//!
//! A channel may be known to the legacy selected-calendar table, the
//! subscription table, or both. Classification derives the sync work to
//! perform from whichever records matched, with explicit rules for every
//! disagreement between the two sources.

use calsync_domain::{
    CalSyncError, ResourceState, Result, SelectedCalendar, Subscription, SyncAction,
};
use tracing::{debug, error, info, warn};

/// Outcome of classifying one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedActions {
    pub sync_actions: Vec<SyncAction>,
    pub external_calendar_id: String,
    pub credential_id: i64,
}

/// Derive the sync actions for a notification.
///
/// Rules:
/// - neither record matched → the channel is no longer registered with us;
///   ignorable, acknowledged without error so the provider stops retrying
/// - a legacy record matched → refresh the availability cache
/// - a subscription matched → sync events, unless the notification is the
///   initial subscribe handshake (`resource_state == sync`), which carries
///   no delta
/// - both matched but disagree on the external calendar → fatal consistency
///   error; never guess which side is authoritative
/// - both matched but disagree on the credential → tolerated; the
///   subscription's credential wins
pub fn classify_actions(
    channel_id: &str,
    resource_id: &str,
    selected_calendar: Option<&SelectedCalendar>,
    subscription: Option<&Subscription>,
    resource_state: ResourceState,
) -> Result<ClassifiedActions> {
    let mut sync_actions: Vec<SyncAction> = Vec::new();
    let mut external_calendar_id: Option<String> = None;
    let mut credential_id: Option<i64> = None;

    if selected_calendar.is_none() && subscription.is_none() {
        return Err(CalSyncError::Ignorable(
            "no selected calendar or subscription found for push notification".into(),
        ));
    }

    if let Some(selected) = selected_calendar {
        sync_actions.push(SyncAction::AvailabilityCache);
        external_calendar_id = Some(selected.external_id.clone());
        credential_id = selected.credential_id;
        debug!(
            channel_id,
            resource_id,
            selected_calendar_id = %selected.id,
            "found selected calendar record"
        );
    }

    if let Some(subscription) = subscription {
        // The subscribe handshake carries no delta, so there is nothing to
        // sync for it.
        if resource_state != ResourceState::Sync {
            sync_actions.push(SyncAction::EventsSync);
        }

        if let Some(ref selected_external_id) = external_calendar_id {
            if selected_external_id != &subscription.external_calendar_id {
                error!(
                    channel_id,
                    resource_id,
                    selected_external_id = %selected_external_id,
                    subscription_external_id = %subscription.external_calendar_id,
                    subscription_id = %subscription.id,
                    "selected calendar and subscription disagree on the external calendar for the same channel"
                );

                return Err(CalSyncError::Consistency(
                    "selected calendar external id and subscription external calendar id do not match for the same channel"
                        .into(),
                ));
            }
        }

        if credential_id.is_some_and(|cid| cid != subscription.credential_id) {
            // Both credentials may point at the same external resource.
            info!(
                channel_id,
                resource_id,
                selected_credential_id = ?credential_id,
                subscription_credential_id = subscription.credential_id,
                "credential mismatch between selected calendar and subscription records"
            );
        }

        external_calendar_id = Some(subscription.external_calendar_id.clone());
        credential_id = Some(subscription.credential_id);
        debug!(
            channel_id,
            resource_id,
            subscription_id = %subscription.id,
            "using subscription record"
        );
    }

    match (external_calendar_id, credential_id) {
        (Some(external_calendar_id), Some(credential_id)) if !sync_actions.is_empty() => {
            Ok(ClassifiedActions { sync_actions, external_calendar_id, credential_id })
        }
        (external_calendar_id, credential_id) => {
            warn!(
                channel_id,
                resource_id,
                ?sync_actions,
                ?external_calendar_id,
                ?credential_id,
                "no sync actions, credential id or external calendar id resolved for push notification"
            );
            Err(CalSyncError::Internal(
                "no sync actions, credential id or external calendar id resolved for push notification"
                    .into(),
            ))
        }
    }
}
