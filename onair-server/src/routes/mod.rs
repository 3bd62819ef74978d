use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::{
    AppState,
    handlers::{feed, health, schedule},
};

pub mod paths {
    pub const FEED: &str = "/feed";
    pub const SCHEDULE_DIFF: &str = "/schedule/diff";
    pub const SCHEDULE_APPLY: &str = "/schedule/apply";
    pub const HEALTH: &str = "/health";
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(paths::FEED, get(feed::get_feed))
        .route(paths::SCHEDULE_DIFF, post(schedule::diff_schedule))
        .route(paths::SCHEDULE_APPLY, post(schedule::apply_schedule))
        .route(paths::HEALTH, get(health::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
