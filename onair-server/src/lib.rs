//! # onair server
//!
//! axum service in front of the onair core:
//!
//! - `GET /feed` serves the versioned near-term schedule with conditional
//!   caching, a token-bucket limiter and a circuit breaker that falls back to
//!   the last good snapshot.
//! - `POST /schedule/diff` and `POST /schedule/apply` reconcile the
//!   automation engine against the content system for the current envelope.
//! - `GET /health` reports breaker state.

pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::AppState;
