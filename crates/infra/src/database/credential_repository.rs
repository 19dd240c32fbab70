//! SQLite-backed implementation of the CredentialResolver port.
//!
//! Token lifecycle (OAuth flows, refresh) is owned elsewhere; this store
//! only resolves credential ids to the minimal shape the sync engine needs.

use std::sync::Arc;

use async_trait::async_trait;
use calsync_common::SqlitePool;
use calsync_core::CredentialResolver;
use calsync_domain::{CalendarCredential, Result};
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, instrument};

use super::subscription_repository::parse_text;
use crate::errors::InfraError;

fn map_credential_row(row: &Row<'_>) -> rusqlite::Result<CalendarCredential> {
    let provider_type: String = row.get(1)?;

    Ok(CalendarCredential {
        id: row.get(0)?,
        provider_type: parse_text(provider_type, 1)?,
        account_email: row.get(2)?,
        access_token: row.get(3)?,
        delegated: row.get(4)?,
    })
}

/// SQLite implementation of CredentialResolver
pub struct SqliteCredentialRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteCredentialRepository {
    /// Create a new credential repository
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Insert or replace a credential row.
    pub fn upsert_credential(&self, credential: &CalendarCredential) -> Result<()> {
        let conn = self.pool.get().map_err(InfraError::from)?;

        conn.execute(
            "INSERT OR REPLACE INTO calendar_credentials (
                id, provider_type, account_email, access_token, delegated
            ) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                credential.id,
                credential.provider_type.as_str(),
                credential.account_email,
                credential.access_token,
                credential.delegated,
            ],
        )
        .map_err(InfraError::from)?;

        Ok(())
    }
}

#[async_trait]
impl CredentialResolver for SqliteCredentialRepository {
    #[instrument(skip(self))]
    async fn get_credential_for_calendar_cache(
        &self,
        credential_id: i64,
    ) -> Result<Option<CalendarCredential>> {
        let conn = self.pool.get().map_err(InfraError::from)?;

        let found = conn
            .query_row(
                "SELECT id, provider_type, account_email, access_token, delegated
                 FROM calendar_credentials WHERE id = ?1",
                params![credential_id],
                map_credential_row,
            )
            .optional()
            .map_err(InfraError::from)?;

        debug!(credential_id, found = found.is_some(), "resolved credential");
        Ok(found)
    }
}
