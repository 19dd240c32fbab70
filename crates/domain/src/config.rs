//! Application configuration structures

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_RENEWAL_BATCH_SIZE;

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub renewal: RenewalConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub downstream: DownstreamConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    pub path: String,
    /// Connection pool size
    pub pool_size: u32,
}

/// Inbound webhook settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Shared secret verified against the channel token of every push
    /// notification. Injected here so handlers never read ambient state.
    pub channel_token: String,
    /// Public URL the provider delivers push notifications to; registered
    /// with every watch call.
    pub callback_url: String,
}

/// Subscription renewal batch job settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalConfig {
    /// Cron expression describing the execution schedule
    pub cron_expression: String,
    /// Maximum subscriptions processed per run
    pub batch_size: usize,
    pub enabled: bool,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            cron_expression: "0 */10 * * * *".into(), // every 10 minutes
            batch_size: DEFAULT_RENEWAL_BATCH_SIZE,
            enabled: true,
        }
    }
}

/// Event cache retention job settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Cron expression describing the execution schedule
    pub cron_expression: String,
    pub enabled: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            cron_expression: "0 0 * * * *".into(), // hourly
            enabled: true,
        }
    }
}

/// Downstream event-sync pipeline settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownstreamConfig {
    /// Endpoint synced events are forwarded to. When absent, events are
    /// logged and dropped.
    pub url: Option<String>,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_addr: "127.0.0.1:8080".into() }
    }
}
