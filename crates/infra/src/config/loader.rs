//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `CALSYNC_DB_PATH`: Database file path
//! - `CALSYNC_DB_POOL_SIZE`: Connection pool size
//! - `CALSYNC_WEBHOOK_TOKEN`: Shared channel secret verified on every push
//! - `CALSYNC_WEBHOOK_CALLBACK_URL`: Public URL registered with watch calls
//! - `CALSYNC_BIND_ADDR`: HTTP server bind address (optional)
//! - `CALSYNC_RENEWAL_CRON`: Renewal job cron expression (optional)
//! - `CALSYNC_RENEWAL_BATCH_SIZE`: Subscriptions per renewal batch (optional)
//! - `CALSYNC_RENEWAL_ENABLED`: Whether renewal runs (optional, default true)
//! - `CALSYNC_CLEANUP_CRON`: Cleanup job cron expression (optional)
//! - `CALSYNC_CLEANUP_ENABLED`: Whether cleanup runs (optional, default true)
//! - `CALSYNC_DOWNSTREAM_URL`: Downstream sync endpoint (optional)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.json` or `./config.toml` (current working directory)
//! 2. `./calsync.json` or `./calsync.toml` (current working directory)
//! 3. `../config.json` or `../config.toml` (parent directory)
//! 4. `../../config.json` or `../../config.toml` (grandparent directory)

use std::path::{Path, PathBuf};

use calsync_domain::{
    CalSyncError, CleanupConfig, Config, DatabaseConfig, DownstreamConfig, RenewalConfig, Result,
    ServerConfig, WebhookConfig,
};

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `CalSyncError::Config` if configuration cannot be loaded from
/// either source.
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns `CalSyncError::Config` if required variables are missing or have
/// invalid values.
pub fn load_from_env() -> Result<Config> {
    let db_path = env_var("CALSYNC_DB_PATH")?;
    let db_pool_size = env_var("CALSYNC_DB_POOL_SIZE").and_then(|s| {
        s.parse::<u32>().map_err(|e| CalSyncError::Config(format!("Invalid pool size: {}", e)))
    })?;

    let channel_token = env_var("CALSYNC_WEBHOOK_TOKEN")?;
    let callback_url = env_var("CALSYNC_WEBHOOK_CALLBACK_URL")?;

    let renewal_defaults = RenewalConfig::default();
    let renewal = RenewalConfig {
        cron_expression: std::env::var("CALSYNC_RENEWAL_CRON")
            .unwrap_or(renewal_defaults.cron_expression),
        batch_size: match std::env::var("CALSYNC_RENEWAL_BATCH_SIZE") {
            Ok(value) => value.parse::<usize>().map_err(|e| {
                CalSyncError::Config(format!("Invalid renewal batch size: {}", e))
            })?,
            Err(_) => renewal_defaults.batch_size,
        },
        enabled: env_bool("CALSYNC_RENEWAL_ENABLED", true),
    };

    let cleanup_defaults = CleanupConfig::default();
    let cleanup = CleanupConfig {
        cron_expression: std::env::var("CALSYNC_CLEANUP_CRON")
            .unwrap_or(cleanup_defaults.cron_expression),
        enabled: env_bool("CALSYNC_CLEANUP_ENABLED", true),
    };

    Ok(Config {
        database: DatabaseConfig { path: db_path, pool_size: db_pool_size },
        webhook: WebhookConfig { channel_token, callback_url },
        renewal,
        cleanup,
        downstream: DownstreamConfig { url: std::env::var("CALSYNC_DOWNSTREAM_URL").ok() },
        server: ServerConfig {
            bind_addr: std::env::var("CALSYNC_BIND_ADDR")
                .unwrap_or_else(|_| ServerConfig::default().bind_addr),
        },
    })
}

/// Load configuration from a file
///
/// When `path` is `None`, probes the default locations. The format is chosen
/// by file extension (`.json` or `.toml`).
///
/// # Errors
/// Returns `CalSyncError::Config` if no file is found or parsing fails.
pub fn load_from_file(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => probe_config_paths().ok_or_else(|| {
            CalSyncError::Config("no configuration file found in probed locations".into())
        })?,
    };

    let contents = std::fs::read_to_string(&path).map_err(|e| {
        CalSyncError::Config(format!("failed to read config file {}: {}", path.display(), e))
    })?;

    let config = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str::<Config>(&contents).map_err(|e| {
            CalSyncError::Config(format!("invalid JSON config {}: {}", path.display(), e))
        })?,
        Some("toml") => toml::from_str::<Config>(&contents).map_err(|e| {
            CalSyncError::Config(format!("invalid TOML config {}: {}", path.display(), e))
        })?,
        other => {
            return Err(CalSyncError::Config(format!(
                "unsupported config format: {:?} ({})",
                other,
                path.display()
            )))
        }
    };

    tracing::info!(path = %path.display(), "Configuration loaded from file");
    Ok(config)
}

fn probe_config_paths() -> Option<PathBuf> {
    const CANDIDATES: &[&str] = &[
        "config.json",
        "config.toml",
        "calsync.json",
        "calsync.toml",
        "../config.json",
        "../config.toml",
        "../../config.json",
        "../../config.toml",
    ];

    CANDIDATES.iter().copied().map(PathBuf::from).find(|p| p.exists())
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| CalSyncError::Config(format!("missing environment variable: {name}")))
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}
