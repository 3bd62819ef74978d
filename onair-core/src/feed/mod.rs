//! Deterministic feed building.

mod builder;
mod pipeline;

pub use builder::{FeedBuilder, FeedOptions, VersionLedger};
pub use pipeline::{FeedPipeline, SnapshotSource};

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// A clamped feed request. Also the key the builder versions snapshots by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedQuery {
    pub lookahead_minutes: u32,
    pub max_items: u32,
}

/// Server-side limits applied to caller-supplied feed parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedBounds {
    pub default_lookahead_minutes: u32,
    pub min_lookahead_minutes: u32,
    pub max_lookahead_minutes: u32,
    pub default_max_items: u32,
    pub min_items: u32,
    pub max_items: u32,
}

impl Default for FeedBounds {
    fn default() -> Self {
        Self {
            default_lookahead_minutes: 180,
            min_lookahead_minutes: 1,
            max_lookahead_minutes: 1_440,
            default_max_items: 50,
            min_items: 1,
            max_items: 500,
        }
    }
}

impl FeedBounds {
    pub fn default_query(&self) -> FeedQuery {
        self.clamp(None, None)
    }

    /// Missing values take the defaults; everything is forced into range.
    pub fn clamp(&self, lookahead: Option<i64>, max_items: Option<i64>) -> FeedQuery {
        FeedQuery {
            lookahead_minutes: clamp_one(
                lookahead,
                self.default_lookahead_minutes,
                self.min_lookahead_minutes,
                self.max_lookahead_minutes,
            ),
            max_items: clamp_one(
                max_items,
                self.default_max_items,
                self.min_items,
                self.max_items,
            ),
        }
    }
}

fn clamp_one(value: Option<i64>, default: u32, min: u32, max: u32) -> u32 {
    let value = value.unwrap_or(i64::from(default));
    let clamped = value.clamp(i64::from(min), i64::from(max.max(min)));
    u32::try_from(clamped).unwrap_or(max)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    /// Any non-present media fails the whole build.
    pub strict_mode: bool,
    #[serde(flatten)]
    pub bounds: FeedBounds,
    /// Background rebuild period for the default query; 0 disables.
    pub refresh_interval_secs: u64,
    /// How long a built snapshot is served before the next request rebuilds.
    pub cache_ttl_secs: u64,
    /// Concurrent media checks per build.
    pub probe_concurrency: usize,
    pub fetch: RetryPolicy,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            strict_mode: false,
            bounds: FeedBounds::default(),
            refresh_interval_secs: 30,
            cache_ttl_secs: 5,
            probe_concurrency: 16,
            fetch: RetryPolicy {
                max_attempts: 2,
                ..RetryPolicy::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_applies_defaults_and_bounds() {
        let bounds = FeedBounds::default();
        assert_eq!(
            bounds.clamp(None, None),
            FeedQuery {
                lookahead_minutes: 180,
                max_items: 50
            }
        );
        assert_eq!(
            bounds.clamp(Some(-30), Some(0)),
            FeedQuery {
                lookahead_minutes: 1,
                max_items: 1
            }
        );
        assert_eq!(
            bounds.clamp(Some(i64::MAX), Some(9_999)),
            FeedQuery {
                lookahead_minutes: 1_440,
                max_items: 500
            }
        );
    }
}
