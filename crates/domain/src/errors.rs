//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for CalSync
///
/// The first four variants carry webhook-specific semantics: `Auth` is never
/// retried, `Ignorable` is acknowledged as success so the provider stops
/// retrying, `Consistency` must alert and is never auto-resolved, and
/// `Dependency` marks a missing collaborator for the current notification.
#[derive(Error, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum CalSyncError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Ignorable: {0}")]
    Ignorable(String),

    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Dependency error: {0}")]
    Dependency(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for CalSync operations
pub type Result<T> = std::result::Result<T, CalSyncError>;
