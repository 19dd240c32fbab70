//! SQLite-backed implementation of the CachedEventRepository port.

use std::sync::Arc;

use async_trait::async_trait;
use calsync_common::SqlitePool;
use calsync_core::CachedEventRepository;
use calsync_domain::constants::CANCELLED_EVENT_RETENTION_SECS;
use calsync_domain::{CachedEvent, CachedEventParams, CalSyncError, Result};
use chrono::Utc;
use rusqlite::{params, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::subscription_repository::parse_text;
use crate::errors::InfraError;

const EVENT_COLUMNS: &str = "id, subscription_id, provider_event_id, summary, start_ts, end_ts, \
     status, transparency, payload, created_at, updated_at";

fn map_event_row(row: &Row<'_>) -> rusqlite::Result<CachedEvent> {
    let status: String = row.get(6)?;
    let transparency: String = row.get(7)?;
    let payload: String = row.get(8)?;

    Ok(CachedEvent {
        id: row.get(0)?,
        subscription_id: row.get(1)?,
        provider_event_id: row.get(2)?,
        summary: row.get(3)?,
        start_ts: row.get(4)?,
        end_ts: row.get(5)?,
        status: parse_text(status, 6)?,
        transparency: parse_text(transparency, 7)?,
        payload: serde_json::from_str(&payload).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// SQLite implementation of CachedEventRepository
pub struct SqliteCachedEventRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteCachedEventRepository {
    /// Create a new cached event repository
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CachedEventRepository for SqliteCachedEventRepository {
    #[instrument(skip(self, params), fields(subscription_id = %params.subscription_id, provider_event_id = %params.provider_event_id))]
    async fn upsert_event(&self, params: &CachedEventParams) -> Result<()> {
        let conn = self.pool.get().map_err(InfraError::from)?;

        let now = Utc::now().timestamp();
        let payload = serde_json::to_string(&params.payload)
            .map_err(|e| CalSyncError::InvalidInput(format!("unserializable payload: {e}")))?;

        conn.execute(
            "INSERT INTO calendar_events (
                id, subscription_id, provider_event_id, summary, start_ts, end_ts,
                status, transparency, payload, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            ON CONFLICT(subscription_id, provider_event_id) DO UPDATE SET
                summary = excluded.summary,
                start_ts = excluded.start_ts,
                end_ts = excluded.end_ts,
                status = excluded.status,
                transparency = excluded.transparency,
                payload = excluded.payload,
                updated_at = excluded.updated_at",
            params![
                Uuid::now_v7().to_string(),
                params.subscription_id,
                params.provider_event_id,
                params.summary,
                params.start_ts,
                params.end_ts,
                params.status.as_str(),
                params.transparency.as_str(),
                payload,
                now,
            ],
        )
        .map_err(InfraError::from)?;

        debug!("upserted cached event");
        Ok(())
    }

    #[instrument(skip(self, events), fields(count = events.len()))]
    async fn bulk_upsert_events(&self, events: &[CachedEventParams]) -> Result<()> {
        // Events are applied independently: one failure does not block the
        // rest, but the first error is re-raised once the batch is done.
        let mut first_error = None;

        for event in events {
            if let Err(err) = self.upsert_event(event).await {
                debug!(
                    provider_event_id = %event.provider_event_id,
                    error = %err,
                    "failed to upsert event in batch"
                );
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    #[instrument(skip(self))]
    async fn get_events_for_availability(
        &self,
        subscription_id: &str,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<Vec<CachedEvent>> {
        let conn = self.pool.get().map_err(InfraError::from)?;
        let now = Utc::now().timestamp();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM calendar_events
                 WHERE subscription_id = ?1
                   AND status != 'cancelled'
                   AND transparency = 'opaque'
                   AND end_ts > ?4
                   AND (
                        (start_ts >= ?2 AND start_ts < ?3)
                     OR (end_ts > ?2 AND end_ts <= ?3)
                     OR (start_ts < ?2 AND end_ts > ?3)
                   )
                 ORDER BY start_ts ASC"
            ))
            .map_err(InfraError::from)?;

        let rows = stmt
            .query_map(params![subscription_id, start_ts, end_ts, now], map_event_row)
            .map_err(InfraError::from)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(InfraError::from)?;

        debug!(subscription_id, start_ts, end_ts, count = rows.len(), "retrieved busy events");
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn delete_event(&self, subscription_id: &str, provider_event_id: &str) -> Result<()> {
        let conn = self.pool.get().map_err(InfraError::from)?;

        conn.execute(
            "DELETE FROM calendar_events WHERE subscription_id = ?1 AND provider_event_id = ?2",
            params![subscription_id, provider_event_id],
        )
        .map_err(InfraError::from)?;

        debug!(subscription_id, provider_event_id, "deleted cached event");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn cleanup_old_events(&self) -> Result<usize> {
        let conn = self.pool.get().map_err(InfraError::from)?;
        let now = Utc::now().timestamp();
        let cancelled_cutoff = now - CANCELLED_EVENT_RETENTION_SECS;

        let deleted = conn
            .execute(
                "DELETE FROM calendar_events
                 WHERE (status = 'cancelled' AND end_ts < ?1)
                    OR end_ts < ?2",
                params![cancelled_cutoff, now],
            )
            .map_err(InfraError::from)?;

        debug!(deleted, "cleaned up old cached events");
        Ok(deleted)
    }
}
