//! SQLite-backed implementation of the SelectedCalendarRepository port.
//!
//! Selected calendars are owned by the calendar-selection flow; this
//! repository only reads the legacy channel fields the sync engine
//! arbitrates against. `insert` exists for wiring and test setup.

use std::sync::Arc;

use async_trait::async_trait;
use calsync_common::SqlitePool;
use calsync_core::SelectedCalendarRepository;
use calsync_domain::{ProviderType, Result, SelectedCalendar};
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, instrument};

use super::subscription_repository::parse_text;
use crate::errors::InfraError;

const SELECTED_CALENDAR_COLUMNS: &str = "id, user_id, credential_id, external_id, integration, \
     channel_id, channel_kind, channel_resource_id, channel_resource_uri, channel_expiration";

fn map_selected_calendar_row(row: &Row<'_>) -> rusqlite::Result<SelectedCalendar> {
    let integration: String = row.get(4)?;

    Ok(SelectedCalendar {
        id: row.get(0)?,
        user_id: row.get(1)?,
        credential_id: row.get(2)?,
        external_id: row.get(3)?,
        integration: parse_text(integration, 4)?,
        channel_id: row.get(5)?,
        channel_kind: row.get(6)?,
        channel_resource_id: row.get(7)?,
        channel_resource_uri: row.get(8)?,
        channel_expiration: row.get(9)?,
    })
}

/// SQLite implementation of SelectedCalendarRepository
pub struct SqliteSelectedCalendarRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteSelectedCalendarRepository {
    /// Create a new selected calendar repository
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Insert or replace a selected calendar row.
    pub fn insert(&self, calendar: &SelectedCalendar) -> Result<()> {
        let conn = self.pool.get().map_err(InfraError::from)?;

        conn.execute(
            "INSERT OR REPLACE INTO selected_calendars (
                id, user_id, credential_id, external_id, integration,
                channel_id, channel_kind, channel_resource_id,
                channel_resource_uri, channel_expiration
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                calendar.id,
                calendar.user_id,
                calendar.credential_id,
                calendar.external_id,
                calendar.integration.as_str(),
                calendar.channel_id,
                calendar.channel_kind,
                calendar.channel_resource_id,
                calendar.channel_resource_uri,
                calendar.channel_expiration,
            ],
        )
        .map_err(InfraError::from)?;

        Ok(())
    }
}

#[async_trait]
impl SelectedCalendarRepository for SqliteSelectedCalendarRepository {
    #[instrument(skip(self))]
    async fn find_by_channel(
        &self,
        channel_id: &str,
        resource_id: &str,
    ) -> Result<Option<SelectedCalendar>> {
        let conn = self.pool.get().map_err(InfraError::from)?;

        let found = conn
            .query_row(
                &format!(
                    "SELECT {SELECTED_CALENDAR_COLUMNS} FROM selected_calendars
                     WHERE channel_id = ?1 AND channel_resource_id = ?2
                     LIMIT 1"
                ),
                params![channel_id, resource_id],
                map_selected_calendar_row,
            )
            .optional()
            .map_err(InfraError::from)?;

        Ok(found)
    }

    #[instrument(skip(self))]
    async fn find_with_channel(
        &self,
        external_id: &str,
        provider: ProviderType,
    ) -> Result<Option<SelectedCalendar>> {
        let conn = self.pool.get().map_err(InfraError::from)?;

        let found = conn
            .query_row(
                &format!(
                    "SELECT {SELECTED_CALENDAR_COLUMNS} FROM selected_calendars
                     WHERE external_id = ?1 AND integration = ?2 AND channel_id IS NOT NULL
                     LIMIT 1"
                ),
                params![external_id, provider.as_str()],
                map_selected_calendar_row,
            )
            .optional()
            .map_err(InfraError::from)?;

        debug!(external_id, found = found.is_some(), "looked up legacy channel record");
        Ok(found)
    }

    #[instrument(skip(self))]
    async fn find_by_credential_id(&self, credential_id: i64) -> Result<Vec<SelectedCalendar>> {
        let conn = self.pool.get().map_err(InfraError::from)?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SELECTED_CALENDAR_COLUMNS} FROM selected_calendars
                 WHERE credential_id = ?1
                 ORDER BY external_id ASC"
            ))
            .map_err(InfraError::from)?;

        let rows = stmt
            .query_map(params![credential_id], map_selected_calendar_row)
            .map_err(InfraError::from)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(InfraError::from)?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::database::manager::DbManager;

    fn setup_test_db() -> (Arc<SqlitePool>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let manager = DbManager::new(&db_path, 4).unwrap();
        manager.run_migrations().unwrap();

        (manager.pool().clone(), temp_dir)
    }

    fn calendar(id: &str, external_id: &str, channel_id: Option<&str>) -> SelectedCalendar {
        SelectedCalendar {
            id: id.to_string(),
            user_id: 7,
            credential_id: Some(3),
            external_id: external_id.to_string(),
            integration: ProviderType::Google,
            channel_id: channel_id.map(str::to_string),
            channel_kind: channel_id.map(|_| "api#channel".to_string()),
            channel_resource_id: channel_id.map(|c| format!("{c}-res")),
            channel_resource_uri: channel_id.map(|c| format!("https://example.com/{c}")),
            channel_expiration: channel_id.map(|_| 1_900_000_000),
        }
    }

    #[tokio::test]
    async fn find_by_channel_matches_both_ids() {
        let (pool, _temp) = setup_test_db();
        let repo = SqliteSelectedCalendarRepository::new(pool);

        repo.insert(&calendar("sc-1", "cal@example.com", Some("chan-1"))).unwrap();

        let found = repo.find_by_channel("chan-1", "chan-1-res").await.unwrap();
        assert_eq!(found.unwrap().id, "sc-1");

        assert!(repo.find_by_channel("chan-1", "other-res").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_with_channel_skips_records_without_one() {
        let (pool, _temp) = setup_test_db();
        let repo = SqliteSelectedCalendarRepository::new(pool);

        repo.insert(&calendar("sc-plain", "plain@example.com", None)).unwrap();
        repo.insert(&calendar("sc-chan", "watched@example.com", Some("chan-1"))).unwrap();

        assert!(repo
            .find_with_channel("plain@example.com", ProviderType::Google)
            .await
            .unwrap()
            .is_none());

        let found =
            repo.find_with_channel("watched@example.com", ProviderType::Google).await.unwrap();
        assert_eq!(found.unwrap().id, "sc-chan");
    }

    #[tokio::test]
    async fn find_by_credential_id_returns_all_related_calendars() {
        let (pool, _temp) = setup_test_db();
        let repo = SqliteSelectedCalendarRepository::new(pool);

        repo.insert(&calendar("sc-1", "a@example.com", Some("chan-1"))).unwrap();
        repo.insert(&calendar("sc-2", "b@example.com", None)).unwrap();

        let mut other = calendar("sc-3", "c@example.com", None);
        other.credential_id = Some(99);
        repo.insert(&other).unwrap();

        let related = repo.find_by_credential_id(3).await.unwrap();
        let ids: Vec<_> = related.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["sc-1", "sc-2"]);
    }
}
