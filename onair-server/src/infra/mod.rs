pub mod app_state;
pub mod auth;
pub mod cache;
pub mod errors;
pub mod middleware;
pub mod refresher;
