use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ItemId;

/// Result of asking whether a media file can be trusted for airing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MediaStatus {
    Present,
    Missing,
    /// The file exists but was modified inside the grace window, so a writer
    /// may still be producing it.
    Grace,
}

impl MediaStatus {
    pub fn is_present(self) -> bool {
        matches!(self, MediaStatus::Present)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaStatus::Present => "present",
            MediaStatus::Missing => "missing",
            MediaStatus::Grace => "grace",
        }
    }
}

/// Feed-level health marker, also emitted as the `X-Feed-Status` header.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum FeedStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "partial")]
    Partial,
    #[serde(rename = "error")]
    Error,
    /// A last-known-good snapshot served while the circuit breaker is open.
    #[serde(rename = "degraded-cb")]
    DegradedCb,
}

impl FeedStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedStatus::Ok => "ok",
            FeedStatus::Partial => "partial",
            FeedStatus::Error => "error",
            FeedStatus::DegradedCb => "degraded-cb",
        }
    }
}

impl std::fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One upcoming airing as seen by feed consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub id: ItemId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub title: String,
    pub media_ref: String,
    pub media_status: MediaStatus,
}

/// Versioned, hashed, ordered view of the near-term schedule.
///
/// `etag` is the quoted content hash of everything except `schedule_version`,
/// `etag` and `generated_at`, so identical content hashes identically no
/// matter when it was built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSnapshot {
    pub items: Vec<FeedItem>,
    #[serde(rename = "scheduleVersion")]
    pub schedule_version: u64,
    #[serde(rename = "feedStatus")]
    pub feed_status: FeedStatus,
    pub etag: String,
    pub missing_count: usize,
    pub total_count: usize,
    pub missing_ids: Vec<ItemId>,
    #[serde(rename = "generatedAt")]
    pub generated_at: DateTime<Utc>,
}

impl FeedSnapshot {
    /// The content hash without the entity-tag quotes.
    pub fn content_hash(&self) -> &str {
        self.etag.trim_matches('"')
    }
}
