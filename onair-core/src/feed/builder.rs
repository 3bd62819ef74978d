use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chrono::{DateTime, Duration, Utc};
use futures::{StreamExt, stream};
use onair_model::{FeedItem, FeedSnapshot, FeedStatus, ItemId, MediaStatus, ScheduleItem};
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::FeedQuery;
use crate::{
    error::{FeedError, FeedResult},
    media::MediaProbe,
};

#[derive(Debug, Clone, Copy)]
pub struct FeedOptions {
    pub now: DateTime<Utc>,
    pub query: FeedQuery,
}

/// Remembers the last content hash per query and hands out versions from a
/// single counter, so a version only moves when content moves and never
/// repeats across queries.
///
/// Versions are ordered only within one `(lookahead, max_items)` query. The
/// counter is shared, so a client switching queries can see a lower version
/// than the one it held.
#[derive(Debug, Default)]
pub struct VersionLedger {
    counter: u64,
    by_query: HashMap<FeedQuery, (String, u64)>,
}

impl VersionLedger {
    pub fn observe(&mut self, query: FeedQuery, hash: &str) -> u64 {
        if let Some((known, version)) = self.by_query.get(&query)
            && known == hash
        {
            return *version;
        }
        self.counter += 1;
        self.by_query.insert(query, (hash.to_string(), self.counter));
        self.counter
    }

    pub fn current(&self) -> u64 {
        self.counter
    }
}

/// The fields the entity tag is computed over.
#[derive(Serialize)]
struct HashedContent<'a> {
    items: &'a [FeedItem],
    feed_status: FeedStatus,
    missing_ids: &'a [ItemId],
    missing_count: usize,
    total_count: usize,
}

#[derive(Debug)]
pub struct FeedBuilder {
    probe: Arc<dyn MediaProbe>,
    strict: bool,
    concurrency: usize,
    ledger: Mutex<VersionLedger>,
}

impl FeedBuilder {
    pub fn new(probe: Arc<dyn MediaProbe>, strict: bool, concurrency: usize) -> Self {
        Self {
            probe,
            strict,
            concurrency: concurrency.max(1),
            ledger: Mutex::new(VersionLedger::default()),
        }
    }

    pub fn strict(&self) -> bool {
        self.strict
    }

    pub async fn build(
        &self,
        candidates: Vec<ScheduleItem>,
        options: &FeedOptions,
    ) -> FeedResult<FeedSnapshot> {
        let now = options.now;
        let horizon = now + Duration::minutes(i64::from(options.query.lookahead_minutes));

        let mut retained: Vec<ScheduleItem> = candidates
            .into_iter()
            .filter(|item| {
                let ok = item.is_well_formed();
                if !ok {
                    warn!(item_id = %item.id, "dropping schedule item with start >= end");
                }
                ok
            })
            .filter(|item| item.end > now && item.start <= horizon)
            .collect();
        retained.sort_by_key(|item| (item.start, item.id));

        let mut seen = HashSet::with_capacity(retained.len());
        retained.retain(|item| {
            let first = seen.insert(item.id);
            if !first {
                warn!(item_id = %item.id, "dropping duplicate schedule item");
            }
            first
        });
        retained.truncate(options.query.max_items as usize);

        let media_refs: Vec<String> = retained.iter().map(|item| item.media_ref.clone()).collect();
        let statuses: Vec<MediaStatus> = stream::iter(media_refs.into_iter().map(|media_ref| {
            let probe = Arc::clone(&self.probe);
            async move { probe.check(&media_ref).await }
        }))
        .buffered(self.concurrency)
        .collect()
        .await;

        let items: Vec<FeedItem> = retained
            .into_iter()
            .zip(statuses)
            .map(|(item, media_status)| FeedItem {
                id: item.id,
                start: item.start,
                end: item.end,
                title: item.title,
                media_ref: item.media_ref,
                media_status,
            })
            .collect();

        let missing_ids: Vec<ItemId> = items
            .iter()
            .filter(|item| !item.media_status.is_present())
            .map(|item| item.id)
            .collect();

        if self.strict && !missing_ids.is_empty() {
            warn!(
                missing = missing_ids.len(),
                "strict mode rejected feed build with unavailable media"
            );
            return Err(FeedError::StrictViolation { missing_ids });
        }

        let feed_status = if missing_ids.is_empty() {
            FeedStatus::Ok
        } else {
            FeedStatus::Partial
        };

        let hash = content_hash(&HashedContent {
            items: &items,
            feed_status,
            missing_ids: &missing_ids,
            missing_count: missing_ids.len(),
            total_count: items.len(),
        })?;
        let schedule_version = self.ledger.lock().observe(options.query, &hash);

        debug!(
            version = schedule_version,
            total = items.len(),
            missing = missing_ids.len(),
            status = %feed_status,
            "feed built"
        );

        Ok(FeedSnapshot {
            missing_count: missing_ids.len(),
            total_count: items.len(),
            items,
            schedule_version,
            feed_status,
            etag: format!("\"{hash}\""),
            missing_ids,
            generated_at: now,
        })
    }
}

fn content_hash(content: &HashedContent<'_>) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(content)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;

    #[derive(Debug, Default)]
    struct TableProbe {
        statuses: HashMap<String, MediaStatus>,
    }

    impl TableProbe {
        fn with(entries: &[(&str, MediaStatus)]) -> Arc<Self> {
            Arc::new(Self {
                statuses: entries
                    .iter()
                    .map(|(path, status)| (path.to_string(), *status))
                    .collect(),
            })
        }
    }

    #[async_trait]
    impl MediaProbe for TableProbe {
        async fn check(&self, media_ref: &str) -> MediaStatus {
            self.statuses
                .get(media_ref)
                .copied()
                .unwrap_or(MediaStatus::Present)
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
    }

    fn item(id: u64, start_min: i64, len_min: i64) -> ScheduleItem {
        let start = now() + Duration::minutes(start_min);
        ScheduleItem {
            id: ItemId(id),
            start,
            end: start + Duration::minutes(len_min),
            media_ref: format!("shows/{id}.mp3"),
            remote_track_ref: None,
            remote_instance_ref: None,
            title: format!("Show {id}"),
        }
    }

    fn options(at: DateTime<Utc>, lookahead: u32, max_items: u32) -> FeedOptions {
        FeedOptions {
            now: at,
            query: FeedQuery {
                lookahead_minutes: lookahead,
                max_items,
            },
        }
    }

    #[tokio::test]
    async fn orders_by_start_then_id_and_truncates_after_sorting() {
        let builder = FeedBuilder::new(TableProbe::with(&[]), false, 4);
        let candidates = vec![item(9, 60, 30), item(3, 30, 30), item(2, 30, 30), item(1, 90, 30)];

        let snapshot = builder.build(candidates, &options(now(), 180, 3)).await.unwrap();

        let ids: Vec<u64> = snapshot.items.iter().map(|i| i.id.get()).collect();
        assert_eq!(ids, vec![2, 3, 9]);
        assert_eq!(snapshot.total_count, 3);
        assert_eq!(snapshot.feed_status, FeedStatus::Ok);
    }

    #[tokio::test]
    async fn filters_to_lookahead_and_keeps_the_airing_item() {
        let builder = FeedBuilder::new(TableProbe::with(&[]), false, 4);
        let candidates = vec![
            item(1, -60, 30), // finished
            item(2, -10, 30), // on air
            item(3, 50, 30),
            item(4, 61, 30), // past the horizon
        ];

        let snapshot = builder.build(candidates, &options(now(), 60, 50)).await.unwrap();

        let ids: Vec<u64> = snapshot.items.iter().map(|i| i.id.get()).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn empty_input_is_an_ok_feed() {
        let builder = FeedBuilder::new(TableProbe::with(&[]), true, 4);
        let snapshot = builder.build(Vec::new(), &options(now(), 60, 10)).await.unwrap();

        assert_eq!(snapshot.feed_status, FeedStatus::Ok);
        assert_eq!(snapshot.total_count, 0);
        assert_eq!(snapshot.missing_count, 0);
    }

    #[tokio::test]
    async fn missing_media_makes_partial_feed() {
        let probe = TableProbe::with(&[
            ("shows/2.mp3", MediaStatus::Missing),
            ("shows/3.mp3", MediaStatus::Grace),
        ]);
        let builder = FeedBuilder::new(probe, false, 4);
        let candidates = vec![item(1, 0, 30), item(2, 30, 30), item(3, 60, 30)];

        let snapshot = builder.build(candidates, &options(now(), 180, 50)).await.unwrap();

        assert_eq!(snapshot.feed_status, FeedStatus::Partial);
        assert_eq!(snapshot.missing_count, 2);
        assert_eq!(snapshot.missing_ids, vec![ItemId(2), ItemId(3)]);
        assert_eq!(snapshot.items.len(), 3);
        assert_eq!(snapshot.items[2].media_status, MediaStatus::Grace);
    }

    #[tokio::test]
    async fn strict_mode_fails_on_any_unavailable_media() {
        let probe = TableProbe::with(&[("shows/2.mp3", MediaStatus::Grace)]);
        let builder = FeedBuilder::new(probe, true, 4);
        let candidates = vec![item(1, 0, 30), item(2, 30, 30)];

        let err = builder
            .build(candidates, &options(now(), 180, 50))
            .await
            .unwrap_err();

        match err {
            FeedError::StrictViolation { missing_ids } => assert_eq!(missing_ids, vec![ItemId(2)]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn identical_content_hashes_identically_across_build_times() {
        let builder = FeedBuilder::new(TableProbe::with(&[]), false, 4);
        let candidates = vec![item(1, 120, 30), item(2, 150, 30)];

        let first = builder
            .build(candidates.clone(), &options(now(), 600, 50))
            .await
            .unwrap();
        let later = now() + Duration::minutes(5);
        let second = builder.build(candidates, &options(later, 600, 50)).await.unwrap();

        assert_eq!(first.etag, second.etag);
        assert_eq!(first.schedule_version, second.schedule_version);
        assert!(first.etag.starts_with('"') && first.etag.ends_with('"'));
        assert_ne!(first.generated_at, second.generated_at);
    }

    #[tokio::test]
    async fn version_increases_only_when_content_changes() {
        let builder = FeedBuilder::new(TableProbe::with(&[]), false, 4);
        let opts = options(now(), 180, 50);

        let v1 = builder.build(vec![item(1, 0, 30)], &opts).await.unwrap();
        let v1_again = builder.build(vec![item(1, 0, 30)], &opts).await.unwrap();
        let v2 = builder
            .build(vec![item(1, 0, 30), item(2, 30, 30)], &opts)
            .await
            .unwrap();

        assert_eq!(v1.schedule_version, v1_again.schedule_version);
        assert!(v2.schedule_version > v1.schedule_version);
        assert_ne!(v1.etag, v2.etag);
    }

    #[tokio::test]
    async fn malformed_and_duplicate_items_are_dropped() {
        let builder = FeedBuilder::new(TableProbe::with(&[]), false, 4);
        let mut backwards = item(5, 40, 30);
        backwards.end = backwards.start;
        let candidates = vec![item(1, 0, 30), item(1, 10, 30), backwards];

        let snapshot = builder.build(candidates, &options(now(), 180, 50)).await.unwrap();

        assert_eq!(snapshot.total_count, 1);
        assert_eq!(snapshot.items[0].start, now());
    }

    #[test]
    fn ledger_never_reuses_versions_across_queries() {
        let mut ledger = VersionLedger::default();
        let a = FeedQuery {
            lookahead_minutes: 60,
            max_items: 10,
        };
        let b = FeedQuery {
            lookahead_minutes: 120,
            max_items: 10,
        };

        assert_eq!(ledger.observe(a, "h1"), 1);
        assert_eq!(ledger.observe(b, "h1"), 2);
        assert_eq!(ledger.observe(a, "h1"), 1);
        assert_eq!(ledger.observe(a, "h2"), 3);
        assert_eq!(ledger.current(), 3);
    }

    #[test]
    fn version_is_monotonic_per_query_only() {
        let mut ledger = VersionLedger::default();
        let narrow = FeedQuery {
            lookahead_minutes: 60,
            max_items: 5,
        };
        let wide = FeedQuery {
            lookahead_minutes: 60,
            max_items: 50,
        };

        let narrow_v = ledger.observe(narrow, "n1");
        let wide_v = ledger.observe(wide, "w1");
        let wide_v2 = ledger.observe(wide, "w2");
        assert!(wide_v2 > wide_v);

        // A client moving from `wide` back to `narrow` sees a lower number.
        assert!(ledger.observe(narrow, "n1") < wide_v2);
        assert_eq!(ledger.observe(narrow, "n1"), narrow_v);
    }

    #[tokio::test]
    async fn build_runs_on_a_spawned_task() {
        let probe = TableProbe::with(&[("shows/2.mp3", MediaStatus::Missing)]);
        let builder = Arc::new(FeedBuilder::new(probe, false, 2));
        let candidates = vec![item(1, 0, 30), item(2, 30, 30), item(3, 60, 30)];

        let task = tokio::spawn({
            let builder = Arc::clone(&builder);
            async move { builder.build(candidates, &options(now(), 180, 50)).await }
        });
        let snapshot = task.await.unwrap().unwrap();

        assert_eq!(snapshot.missing_ids, vec![ItemId(2)]);
        assert_eq!(snapshot.total_count, 3);
    }
}
