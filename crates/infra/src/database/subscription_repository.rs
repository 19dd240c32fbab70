//! SQLite-backed implementation of the SubscriptionRepository port.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use calsync_common::SqlitePool;
use calsync_core::SubscriptionRepository;
use calsync_domain::{
    NewSubscription, ProviderChannelDetails, ProviderType, Result, Subscription,
};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::errors::InfraError;

const SUBSCRIPTION_COLUMNS: &str = "id, credential_id, external_calendar_id, provider_type, \
     status, provider_subscription_id, provider_subscription_kind, provider_resource_id, \
     provider_resource_uri, provider_expiration, activated_at, last_sync_at, \
     last_synced_down_at, last_sync_direction, watch_error, created_at, updated_at";

/// Parse a TEXT column into a domain enum, surfacing parse failures as
/// sqlite conversion errors so they flow through the usual mapping.
pub(crate) fn parse_text<T>(value: String, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = calsync_domain::CalSyncError>,
{
    value.parse().map_err(|e: calsync_domain::CalSyncError| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn map_subscription_row(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    let provider_type: String = row.get(3)?;
    let status: String = row.get(4)?;
    let direction: Option<String> = row.get(13)?;

    Ok(Subscription {
        id: row.get(0)?,
        credential_id: row.get(1)?,
        external_calendar_id: row.get(2)?,
        provider_type: parse_text(provider_type, 3)?,
        status: parse_text(status, 4)?,
        provider_subscription_id: row.get(5)?,
        provider_subscription_kind: row.get(6)?,
        provider_resource_id: row.get(7)?,
        provider_resource_uri: row.get(8)?,
        provider_expiration: row.get(9)?,
        activated_at: row.get(10)?,
        last_sync_at: row.get(11)?,
        last_synced_down_at: row.get(12)?,
        last_sync_direction: direction.map(|d| parse_text(d, 13)).transpose()?,
        watch_error: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

/// SQLite implementation of SubscriptionRepository
pub struct SqliteSubscriptionRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteSubscriptionRepository {
    /// Create a new subscription repository
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionRepository for SqliteSubscriptionRepository {
    #[instrument(skip(self))]
    async fn find_active(
        &self,
        external_calendar_id: &str,
        provider: ProviderType,
    ) -> Result<Option<Subscription>> {
        let conn = self.pool.get().map_err(InfraError::from)?;

        let found = conn
            .query_row(
                &format!(
                    "SELECT {SUBSCRIPTION_COLUMNS} FROM calendar_subscriptions
                     WHERE external_calendar_id = ?1 AND provider_type = ?2 AND status = 'ACTIVE'
                     LIMIT 1"
                ),
                params![external_calendar_id, provider.as_str()],
                map_subscription_row,
            )
            .optional()
            .map_err(InfraError::from)?;

        debug!(external_calendar_id, found = found.is_some(), "looked up active subscription");
        Ok(found)
    }

    #[instrument(skip(self))]
    async fn find_by_channel(
        &self,
        channel_id: &str,
        resource_id: &str,
    ) -> Result<Option<Subscription>> {
        let conn = self.pool.get().map_err(InfraError::from)?;

        let found = conn
            .query_row(
                &format!(
                    "SELECT {SUBSCRIPTION_COLUMNS} FROM calendar_subscriptions
                     WHERE provider_subscription_id = ?1 AND provider_resource_id = ?2
                     LIMIT 1"
                ),
                params![channel_id, resource_id],
                map_subscription_row,
            )
            .optional()
            .map_err(InfraError::from)?;

        Ok(found)
    }

    #[instrument(skip(self, subscription), fields(external_calendar_id = %subscription.external_calendar_id))]
    async fn upsert(&self, subscription: NewSubscription) -> Result<Subscription> {
        let conn = self.pool.get().map_err(InfraError::from)?;

        let id = Uuid::now_v7().to_string();
        let now = Utc::now().timestamp();

        let row = if let Some(ref channel) = subscription.channel {
            conn.query_row(
                &format!(
                    "INSERT INTO calendar_subscriptions (
                        id, credential_id, external_calendar_id, provider_type, status,
                        provider_subscription_id, provider_subscription_kind,
                        provider_resource_id, provider_resource_uri, provider_expiration,
                        activated_at, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                    ON CONFLICT(credential_id, external_calendar_id) DO UPDATE SET
                        status = excluded.status,
                        provider_subscription_id = excluded.provider_subscription_id,
                        provider_subscription_kind = excluded.provider_subscription_kind,
                        provider_resource_id = excluded.provider_resource_id,
                        provider_resource_uri = excluded.provider_resource_uri,
                        provider_expiration = excluded.provider_expiration,
                        activated_at = excluded.activated_at,
                        updated_at = excluded.updated_at
                    RETURNING {SUBSCRIPTION_COLUMNS}"
                ),
                params![
                    id,
                    subscription.credential_id,
                    subscription.external_calendar_id,
                    subscription.provider_type.as_str(),
                    subscription.status.as_str(),
                    channel.id,
                    channel.kind,
                    channel.resource_id,
                    channel.resource_uri,
                    channel.expiration,
                    now,
                    now,
                    now,
                ],
                map_subscription_row,
            )
            .map_err(InfraError::from)?
        } else {
            // createIfNotExists: an existing PENDING/ACTIVE row is returned
            // untouched; a deactivated row is revived to PENDING so that
            // re-selecting a calendar restarts the watch lifecycle.
            conn.query_row(
                &format!(
                    "INSERT INTO calendar_subscriptions (
                        id, credential_id, external_calendar_id, provider_type, status,
                        created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    ON CONFLICT(credential_id, external_calendar_id) DO UPDATE SET
                        status = CASE WHEN calendar_subscriptions.status = 'INACTIVE'
                                      THEN 'PENDING'
                                      ELSE calendar_subscriptions.status END,
                        updated_at = excluded.updated_at
                    RETURNING {SUBSCRIPTION_COLUMNS}"
                ),
                params![
                    id,
                    subscription.credential_id,
                    subscription.external_calendar_id,
                    subscription.provider_type.as_str(),
                    subscription.status.as_str(),
                    now,
                    now,
                ],
                map_subscription_row,
            )
            .map_err(InfraError::from)?
        };

        debug!(subscription_id = %row.id, status = %row.status, "upserted subscription");
        Ok(row)
    }

    #[instrument(skip(self, details))]
    async fn activate(&self, id: &str, details: &ProviderChannelDetails) -> Result<()> {
        let conn = self.pool.get().map_err(InfraError::from)?;
        let now = Utc::now().timestamp();

        conn.execute(
            "UPDATE calendar_subscriptions SET
                status = 'ACTIVE',
                provider_subscription_id = ?1,
                provider_subscription_kind = ?2,
                provider_resource_id = ?3,
                provider_resource_uri = ?4,
                provider_expiration = ?5,
                activated_at = ?6,
                updated_at = ?6
             WHERE id = ?7",
            params![
                details.id,
                details.kind,
                details.resource_id,
                details.resource_uri,
                details.expiration,
                now,
                id,
            ],
        )
        .map_err(InfraError::from)?;

        debug!(subscription_id = id, channel_id = %details.id, "activated subscription");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn deactivate(&self, id: &str) -> Result<()> {
        let conn = self.pool.get().map_err(InfraError::from)?;
        let now = Utc::now().timestamp();

        conn.execute(
            "UPDATE calendar_subscriptions SET status = 'INACTIVE', updated_at = ?1 WHERE id = ?2",
            params![now, id],
        )
        .map_err(InfraError::from)?;

        debug!(subscription_id = id, "deactivated subscription");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_requiring_renewal_or_activation(
        &self,
        batch_size: usize,
        expiring_before: i64,
    ) -> Result<Vec<Subscription>> {
        let conn = self.pool.get().map_err(InfraError::from)?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SUBSCRIPTION_COLUMNS} FROM calendar_subscriptions
                 WHERE status = 'PENDING'
                    OR (status = 'ACTIVE'
                        AND provider_expiration IS NOT NULL
                        AND provider_expiration <= ?1)
                 ORDER BY COALESCE(last_sync_at, 0) ASC, created_at ASC
                 LIMIT ?2"
            ))
            .map_err(InfraError::from)?;

        let rows = stmt
            .query_map(params![expiring_before, batch_size as i64], map_subscription_row)
            .map_err(InfraError::from)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(InfraError::from)?;

        debug!(count = rows.len(), batch_size, "found subscriptions requiring renewal");
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn record_sync(&self, id: &str, at: i64) -> Result<()> {
        let conn = self.pool.get().map_err(InfraError::from)?;
        conn.execute(
            "UPDATE calendar_subscriptions SET last_sync_at = ?1, updated_at = ?1 WHERE id = ?2",
            params![at, id],
        )
        .map_err(InfraError::from)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn record_synced_down(&self, id: &str, at: i64) -> Result<()> {
        let conn = self.pool.get().map_err(InfraError::from)?;
        conn.execute(
            "UPDATE calendar_subscriptions SET
                last_synced_down_at = ?1,
                last_sync_direction = 'DOWNSTREAM',
                updated_at = ?1
             WHERE id = ?2",
            params![at, id],
        )
        .map_err(InfraError::from)?;
        Ok(())
    }

    #[instrument(skip(self, error))]
    async fn set_watch_error(&self, id: &str, error: &str) -> Result<()> {
        let conn = self.pool.get().map_err(InfraError::from)?;
        let now = Utc::now().timestamp();
        conn.execute(
            "UPDATE calendar_subscriptions SET watch_error = ?1, updated_at = ?2 WHERE id = ?3",
            params![error, now, id],
        )
        .map_err(InfraError::from)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear_watch_error(&self, id: &str) -> Result<()> {
        let conn = self.pool.get().map_err(InfraError::from)?;
        let now = Utc::now().timestamp();
        conn.execute(
            "UPDATE calendar_subscriptions SET watch_error = NULL, updated_at = ?1 WHERE id = ?2",
            params![now, id],
        )
        .map_err(InfraError::from)?;
        Ok(())
    }
}
