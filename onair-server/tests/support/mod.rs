//! Shared harness for the HTTP tests: in-memory remotes, a frozen clock and a
//! temporary media root checked through the real filesystem probe.

#![allow(dead_code)]

use std::{fs, sync::Arc};

use anyhow::{Context, Result};
use axum_test::TestServer;
use chrono::{DateTime, Duration, TimeZone, Utc};
use onair_config::{BucketSpec, CircuitBreakerConfig};
use onair_core::{
    ManualClock, RetryPolicy,
    media::{FsMediaChecker, MediaCheckSettings},
    remote::memory::{InMemoryAutomationEngine, InMemoryContentSource},
};
use onair_model::{ItemId, ScheduleItem};
use onair_server::{
    AppState,
    infra::{
        app_state::{Collaborators, ServiceSettings},
        auth::StaticTokenAuthorizer,
    },
    routes::create_router,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const FEED_TOKEN: &str = "feed-token";
pub const ADMIN_TOKEN: &str = "admin-token";

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

/// A Wednesday, so the envelope covers the rest of this week and two more.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap()
}

pub fn media_ref(id: u64) -> String {
    format!("shows/{id}.mp3")
}

/// `len_min` minutes of airtime starting `start_min` minutes from [`now`].
pub fn item(id: u64, start_min: i64, len_min: i64) -> ScheduleItem {
    let start = now() + Duration::minutes(start_min);
    ScheduleItem {
        id: ItemId(id),
        start,
        end: start + Duration::minutes(len_min),
        media_ref: media_ref(id),
        remote_track_ref: None,
        remote_instance_ref: None,
        title: format!("Show {id}"),
    }
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay_ms: 1,
        max_delay_ms: 2,
        attempt_timeout_ms: 2_000,
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub clock: ManualClock,
    pub content: Arc<InMemoryContentSource>,
    pub engine: Arc<InMemoryAutomationEngine>,
    pub media: TempDir,
    pub shutdown: CancellationToken,
}

impl TestApp {
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder::default()
    }

    /// Makes `item`'s media file exist under the media root.
    pub fn write_media(&self, item: &ScheduleItem) -> Result<()> {
        let path = self.media.path().join(&item.media_ref);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, b"audio").with_context(|| format!("writing {}", path.display()))
    }

    /// Publishes `item` in the content system with its media on disk.
    pub fn schedule(&self, item: ScheduleItem) -> Result<()> {
        self.write_media(&item)?;
        self.content.upsert(item);
        Ok(())
    }
}

pub struct TestAppBuilder {
    settings: ServiceSettings,
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        let mut settings = ServiceSettings::default();
        settings.feed.cache_ttl_secs = 0;
        settings.feed.fetch = fast_retry(1);
        settings.reconcile.retry = fast_retry(3);
        Self { settings }
    }
}

impl TestAppBuilder {
    pub fn strict(mut self) -> Self {
        self.settings.feed.strict_mode = true;
        self
    }

    pub fn breaker(mut self, failure_threshold: u32, cooldown_secs: u64) -> Self {
        self.settings.circuit_breaker = CircuitBreakerConfig {
            failure_threshold,
            cooldown_secs,
        };
        self
    }

    pub fn feed_bucket(mut self, capacity: f64, refill_per_second: f64) -> Self {
        self.settings.rate_limit.feed = BucketSpec {
            capacity,
            refill_per_second,
        };
        self
    }

    pub fn schedule_bucket(mut self, capacity: f64, refill_per_second: f64) -> Self {
        self.settings.rate_limit.schedule = BucketSpec {
            capacity,
            refill_per_second,
        };
        self
    }

    pub fn build(self) -> Result<TestApp> {
        let clock = ManualClock::new(now());
        let media = TempDir::new()?;
        let content = Arc::new(InMemoryContentSource::default());
        let engine = Arc::new(InMemoryAutomationEngine::new());
        let probe = FsMediaChecker::new(
            &MediaCheckSettings {
                root: media.path().to_path_buf(),
                grace_secs: 0,
                ..MediaCheckSettings::default()
            },
            clock.shared(),
        );
        let authorizer =
            StaticTokenAuthorizer::new([FEED_TOKEN.to_string()], [ADMIN_TOKEN.to_string()]);

        let shutdown = CancellationToken::new();
        let state = AppState::assemble(
            self.settings,
            Collaborators {
                content: content.clone(),
                automation: engine.clone(),
                probe: Arc::new(probe),
                authorizer: Arc::new(authorizer),
                clock: clock.shared(),
            },
            shutdown.clone(),
        );

        let server = TestServer::new(create_router(state.clone()))
            .map_err(|err| anyhow::anyhow!(err.to_string()))?;

        Ok(TestApp {
            server,
            state,
            clock,
            content,
            engine,
            media,
            shutdown,
        })
    }
}
