//! Scheduling infrastructure for automated task execution
//!
//! Cron-based schedulers for the sync engine's background jobs:
//! - Subscription renewal (PENDING activation + expiring-channel renewal)
//! - Event cache cleanup (standing retention policy)
//!
//! All schedulers follow the same runtime rules: explicit lifecycle
//! management (start/stop), join handles for spawned tasks, cancellation
//! token support, and timeout wrapping on every async operation.

pub mod cleanup_scheduler;
pub mod error;
pub mod renewal_scheduler;

pub use cleanup_scheduler::{CleanupScheduler, CleanupSchedulerConfig};
pub use error::{SchedulerError, SchedulerResult};
pub use renewal_scheduler::{RenewalScheduler, RenewalSchedulerConfig};
