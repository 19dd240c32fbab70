//! SQLite pragma management
//!
//! Applies per-connection pragmas for optimal performance and safety.

use rusqlite::Connection;

use super::config::SqlitePoolConfig;
use super::error::{StorageError, StorageResult};

/// Apply connection-level pragmas
///
/// These pragmas are applied to each connection in the pool:
/// - WAL mode for better concurrency
/// - NORMAL synchronous mode for balanced safety/performance
/// - WAL autocheckpoint for automatic checkpoint management
/// - Foreign key constraints enabled
/// - Busy timeout for handling lock contention
pub fn apply_connection_pragmas(
    conn: &Connection,
    config: &SqlitePoolConfig,
) -> StorageResult<()> {
    let mut pragma_sql = String::new();

    // Journal mode (WAL for concurrency)
    if config.enable_wal {
        pragma_sql.push_str("PRAGMA journal_mode=WAL;\n");
        // WAL autocheckpoint (checkpoint after 1000 pages)
        pragma_sql.push_str("PRAGMA wal_autocheckpoint=1000;\n");
    }

    // Synchronous mode (NORMAL for balance)
    pragma_sql.push_str("PRAGMA synchronous=NORMAL;\n");

    // Foreign keys
    if config.enable_foreign_keys {
        pragma_sql.push_str("PRAGMA foreign_keys=ON;\n");
    }

    conn.execute_batch(&pragma_sql)
        .map_err(|e| StorageError::Query(format!("Failed to apply pragmas: {}", e)))?;

    // Busy timeout takes a parameter, so it is a separate call
    conn.busy_timeout(config.busy_timeout)
        .map_err(|e| StorageError::Query(format!("Failed to set busy timeout: {}", e)))?;

    Ok(())
}
