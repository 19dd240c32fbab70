//! # CalSync Core
//!
//! Business logic for the calendar subscription sync engine.
//!
//! This crate contains:
//! - Subscription reconciliation (find-or-create, activation, renewal
//!   batching)
//! - Webhook ingestion (validation, channel resolution, action
//!   classification, delta application)
//! - Event cache maintenance and availability computation
//!
//! ## Architecture
//! - Depends only on `calsync-domain`
//! - All I/O goes through the port traits implemented by `calsync-infra`
//! - `testing` hosts in-memory port implementations shared by the test
//!   suites across the workspace

pub mod availability;
pub mod events;
pub mod renewal;
pub mod subscriptions;
pub mod testing;
pub mod webhook;

// Re-export commonly used items
pub use availability::AvailabilityService;
pub use events::ports::{CachedEventRepository, DownstreamSync, ErrorTracker};
pub use renewal::{RenewalService, RenewalSummary};
pub use subscriptions::ports::{
    CalendarClientFactory, CalendarProviderClient, CredentialResolver,
    SelectedCalendarRepository, SubscriptionRepository, WatchedCalendarChange,
    WatchedCalendarChangeResult,
};
pub use subscriptions::service::SubscriptionService;
pub use webhook::classify::{classify_actions, ClassifiedActions};
pub use webhook::service::{WebhookOutcome, WebhookService};
