//! Observability helpers

use calsync_core::ErrorTracker;
use calsync_domain::CalSyncError;
use tracing::error;

/// Error tracker that reports captured failures through structured logging.
///
/// A deployment with a dedicated error-tracking backend substitutes its own
/// implementation; the decorator only sees the trait.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorTracker;

impl TracingErrorTracker {
    pub fn new() -> Self {
        Self
    }
}

impl ErrorTracker for TracingErrorTracker {
    fn capture(&self, error: &CalSyncError, context: &str) {
        error!(context, error = %error, "captured repository failure");
    }
}
