//! # CalSync API
//!
//! HTTP surface of the calendar subscription sync engine: the provider
//! webhook endpoint and a health probe, plus the process wiring that
//! assembles repositories, services and schedulers.

pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;

pub use state::AppState;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .route(
            "/api/webhook/google-calendar",
            post(routes::webhook::google_calendar_webhook),
        )
        .with_state(state)
}
