//! # CalSync Common
//!
//! Shared infrastructure plumbing for the CalSync workspace.
//!
//! This crate contains:
//! - Pooled SQLite storage (r2d2-backed connection pool with per-connection
//!   pragmas)
//! - Storage error types
//!
//! ## Architecture
//! - No dependencies on other CalSync crates
//! - Consumed by `calsync-infra` for repository implementations

pub mod storage;

pub use storage::{SqlitePool, SqlitePoolConfig, StorageError, StorageResult};
