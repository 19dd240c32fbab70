//! SQLite connection pool
//!
//! Provides r2d2-based connection pooling for SQLite databases. Each pooled
//! connection has the configured pragmas applied before first use.

use std::path::Path;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::{debug, info, instrument, warn};

use super::config::SqlitePoolConfig;
use super::error::{StorageError, StorageResult};
use super::pragmas::apply_connection_pragmas;

/// A connection checked out of the pool. Returned automatically on drop.
pub type PooledSqliteConnection = PooledConnection<SqliteConnectionManager>;

/// SQLite connection pool
///
/// Manages a pool of SQLite connections using r2d2:
/// - Connection pooling (default: 10 connections)
/// - WAL mode for concurrency
/// - Connection timeout handling
/// - Structured tracing and logging
#[derive(Debug)]
pub struct SqlitePool {
    pool: Pool<SqliteConnectionManager>,
    config: SqlitePoolConfig,
}

impl SqlitePool {
    /// Create a new SQLite connection pool
    ///
    /// # Errors
    /// Returns an error if:
    /// - The database file can't be accessed
    /// - Pool creation fails
    /// - The verification query on a fresh connection fails
    #[instrument(skip(config), fields(db_path = ?path, pool_size = config.max_size))]
    pub fn new(path: &Path, config: SqlitePoolConfig) -> StorageResult<Self> {
        info!("Creating SQLite connection pool");

        let pool_config = config.clone();
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            apply_connection_pragmas(conn, &pool_config)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(config.max_size)
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .map_err(|e| {
                warn!("Failed to create connection pool: {}", e);
                StorageError::Connection(format!("Failed to create pool: {}", e))
            })?;

        // Verify the pool hands out working connections before returning it
        {
            let conn = pool.get().map_err(StorageError::from)?;
            conn.query_row("SELECT 1", [], |row| row.get::<_, i32>(0))
                .map_err(StorageError::from)?;
        }

        debug!("SQLite connection pool ready");
        Ok(Self { pool, config })
    }

    /// Check a connection out of the pool.
    pub fn get(&self) -> StorageResult<PooledSqliteConnection> {
        self.pool.get().map_err(|e| {
            warn!("Connection pool checkout failed: {}", e);
            StorageError::PoolExhausted
        })
    }

    /// Maximum number of connections the pool will hold.
    pub fn max_size(&self) -> u32 {
        self.config.max_size
    }

    /// Number of idle connections currently in the pool.
    pub fn idle_connections(&self) -> u32 {
        self.pool.state().idle_connections
    }
}
