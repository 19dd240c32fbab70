//! Application constants
//!
//! Centralized location for all domain-level constants used throughout the
//! application.

// Renewal batch processing
pub const DEFAULT_RENEWAL_BATCH_SIZE: usize = 50;

/// ACTIVE subscriptions whose channel expires within this window are renewed
/// early, before the provider silently stops delivering notifications.
pub const RENEWAL_WINDOW_SECS: i64 = 24 * 60 * 60;

/// Cancelled events are retained this long past their end before the cleanup
/// job purges them.
pub const CANCELLED_EVENT_RETENTION_SECS: i64 = 24 * 60 * 60;

// Provider channel registration
pub const CHANNEL_KIND_WEB_HOOK: &str = "web_hook";
