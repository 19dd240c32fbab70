//! Pooled SQLite storage
//!
//! Provides r2d2-based connection pooling for SQLite databases, with WAL
//! journaling and busy-timeout handling applied to every pooled connection.

pub mod config;
pub mod error;
pub mod pool;
pub mod pragmas;

pub use config::SqlitePoolConfig;
pub use error::{StorageError, StorageResult};
pub use pool::{PooledSqliteConnection, SqlitePool};
