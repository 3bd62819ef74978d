//! Media existence checks.
//!
//! The feed builder and the diff engine both ask a [`MediaProbe`] whether an
//! item's media can be trusted before publishing or queueing it.

mod fs;

pub use fs::{FsMediaChecker, MediaCheckSettings};

use async_trait::async_trait;
use onair_model::MediaStatus;

/// Boundary operation answering "can this media reference be aired?".
///
/// Implementations never fail: anything other than a confirmed, settled file
/// is reported as [`MediaStatus::Missing`] or [`MediaStatus::Grace`].
#[async_trait]
pub trait MediaProbe: Send + Sync + std::fmt::Debug {
    async fn check(&self, media_ref: &str) -> MediaStatus;
}

/// Probe that trusts every reference. Used when no media root is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumePresent;

#[async_trait]
impl MediaProbe for AssumePresent {
    async fn check(&self, _media_ref: &str) -> MediaStatus {
        MediaStatus::Present
    }
}
