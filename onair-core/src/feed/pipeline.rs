use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use onair_model::{EnvelopeWindow, FeedSnapshot};
use tokio_util::sync::CancellationToken;

use super::{FeedBuilder, FeedOptions, FeedQuery};
use crate::{
    clock::SharedClock, error::FeedResult, remote::ContentSource, retry::RetryPolicy,
};

/// Anything that can produce a fresh snapshot for a query. The serving layer's
/// cache and breaker wrap one of these.
#[async_trait]
pub trait SnapshotSource: Send + Sync + std::fmt::Debug {
    async fn build(
        &self,
        query: FeedQuery,
        cancel: &CancellationToken,
    ) -> FeedResult<FeedSnapshot>;
}

/// Fetches candidates from the content system and runs them through the
/// [`FeedBuilder`].
#[derive(Debug)]
pub struct FeedPipeline {
    content: Arc<dyn ContentSource>,
    builder: FeedBuilder,
    retry: RetryPolicy,
    clock: SharedClock,
}

impl FeedPipeline {
    pub fn new(
        content: Arc<dyn ContentSource>,
        builder: FeedBuilder,
        retry: RetryPolicy,
        clock: SharedClock,
    ) -> Self {
        Self {
            content,
            builder,
            retry,
            clock,
        }
    }
}

#[async_trait]
impl SnapshotSource for FeedPipeline {
    async fn build(
        &self,
        query: FeedQuery,
        cancel: &CancellationToken,
    ) -> FeedResult<FeedSnapshot> {
        let now = self.clock.now();
        let window = EnvelopeWindow::new(
            now,
            now + Duration::minutes(i64::from(query.lookahead_minutes)),
            "feed",
        );
        let content = &self.content;
        let candidates = self
            .retry
            .run("content.list_scheduled", cancel, || content.list_scheduled(&window))
            .await?;

        self.builder
            .build(candidates, &FeedOptions { now, query })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::{Clock, ManualClock},
        error::{FeedError, RemoteError},
        media::AssumePresent,
        remote::memory::InMemoryContentSource,
    };
    use chrono::{TimeZone, Utc};
    use onair_model::{ItemId, ScheduleItem};

    fn pipeline(content: Arc<InMemoryContentSource>, clock: &ManualClock) -> FeedPipeline {
        FeedPipeline::new(
            content,
            FeedBuilder::new(Arc::new(AssumePresent), false, 4),
            RetryPolicy {
                max_attempts: 2,
                base_delay_ms: 1,
                max_delay_ms: 1,
                attempt_timeout_ms: 500,
            },
            clock.shared(),
        )
    }

    #[tokio::test]
    async fn retries_transient_content_failures() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap());
        let start = clock.now() + Duration::minutes(10);
        let content = Arc::new(InMemoryContentSource::new(vec![ScheduleItem {
            id: ItemId(1),
            start,
            end: start + Duration::minutes(30),
            media_ref: "a.mp3".into(),
            remote_track_ref: None,
            remote_instance_ref: None,
            title: "A".into(),
        }]));
        content.fail_next(RemoteError::Transient("503".into()));
        let pipeline = pipeline(Arc::clone(&content), &clock);
        let query = FeedQuery {
            lookahead_minutes: 60,
            max_items: 10,
        };

        let snapshot = pipeline.build(query, &CancellationToken::new()).await.unwrap();

        assert_eq!(snapshot.total_count, 1);
        assert_eq!(content.calls(), 2);
    }

    #[tokio::test]
    async fn surfaces_exhausted_content_failures() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap());
        let content = Arc::new(InMemoryContentSource::new(Vec::new()));
        content.fail_next(RemoteError::Transient("503".into()));
        content.fail_next(RemoteError::Transient("503".into()));
        let pipeline = pipeline(Arc::clone(&content), &clock);
        let query = FeedQuery {
            lookahead_minutes: 60,
            max_items: 10,
        };

        let err = pipeline
            .build(query, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, FeedError::Source(RemoteError::Transient(_))));
    }
}
