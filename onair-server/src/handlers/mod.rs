pub mod feed;
pub mod health;
pub mod schedule;

pub const FEED_VERSION_HEADER: &str = "x-feed-version";
pub const FEED_STATUS_HEADER: &str = "x-feed-status";
