//! Last-known-good feed cache wrapped in a circuit breaker.
//!
//! Closed: every call past the freshness TTL runs a real build. After
//! `failure_threshold` consecutive failed builds the breaker opens and calls
//! are answered from the last good snapshot, marked `degraded-cb`, without
//! building. Once the cooldown has elapsed a single caller probes with a real
//! build while everyone else keeps getting the fallback; success closes the
//! breaker, failure re-opens it for another cooldown.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use onair_config::CircuitBreakerConfig;
use onair_core::{
    FeedError, RemoteError, SharedClock,
    feed::{FeedQuery, SnapshotSource},
};
use onair_model::{FeedSnapshot, FeedStatus};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerState {
    pub consecutive_errors: u32,
    pub open: bool,
    pub opened_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct CachedSnapshot {
    snapshot: FeedSnapshot,
    built_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct CacheState {
    breaker: BreakerState,
    last_good: HashMap<FeedQuery, CachedSnapshot>,
    latest: Option<FeedSnapshot>,
    probing: bool,
}

impl CacheState {
    /// The last good snapshot for `query`, else the latest for any query,
    /// re-labelled as circuit-broken.
    fn fallback(&self, query: &FeedQuery) -> Option<FeedSnapshot> {
        self.last_good
            .get(query)
            .map(|cached| &cached.snapshot)
            .or(self.latest.as_ref())
            .map(|snapshot| FeedSnapshot {
                feed_status: FeedStatus::DegradedCb,
                ..snapshot.clone()
            })
    }
}

enum Admission {
    Serve(FeedSnapshot),
    Build { probe: bool },
}

/// Clears the half-open probe flag even if the probing request is dropped.
struct ProbeReset<'a> {
    state: &'a Mutex<CacheState>,
    armed: bool,
}

impl Drop for ProbeReset<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.lock().probing = false;
        }
    }
}

#[derive(Debug)]
pub struct FeedCache {
    source: Arc<dyn SnapshotSource>,
    clock: SharedClock,
    failure_threshold: u32,
    cooldown: Duration,
    fresh_for: Duration,
    state: Mutex<CacheState>,
}

impl FeedCache {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        breaker: CircuitBreakerConfig,
        cache_ttl_secs: u64,
        clock: SharedClock,
    ) -> Self {
        Self {
            source,
            clock,
            failure_threshold: breaker.failure_threshold.max(1),
            cooldown: seconds(breaker.cooldown_secs),
            fresh_for: seconds(cache_ttl_secs),
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Snapshot for `query`, reusing one built within the freshness TTL.
    pub async fn get(
        &self,
        query: FeedQuery,
        cancel: &CancellationToken,
    ) -> Result<FeedSnapshot, FeedError> {
        self.run(query, cancel, true).await
    }

    /// Forces a build through the breaker, ignoring the freshness TTL.
    pub async fn refresh(
        &self,
        query: FeedQuery,
        cancel: &CancellationToken,
    ) -> Result<FeedSnapshot, FeedError> {
        self.run(query, cancel, false).await
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.state.lock().breaker.clone()
    }

    pub fn last_good_version(&self) -> Option<u64> {
        self.state
            .lock()
            .latest
            .as_ref()
            .map(|snapshot| snapshot.schedule_version)
    }

    async fn run(
        &self,
        query: FeedQuery,
        cancel: &CancellationToken,
        allow_fresh: bool,
    ) -> Result<FeedSnapshot, FeedError> {
        let probe = match self.admit(&query, allow_fresh)? {
            Admission::Serve(snapshot) => return Ok(snapshot),
            Admission::Build { probe } => probe,
        };
        let _reset = ProbeReset {
            state: &self.state,
            armed: probe,
        };

        let result = self.source.build(query, cancel).await;
        self.record(query, probe, result)
    }

    fn admit(&self, query: &FeedQuery, allow_fresh: bool) -> Result<Admission, FeedError> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if state.breaker.open {
            let cooled = state
                .breaker
                .opened_at
                .is_none_or(|opened| now - opened >= self.cooldown);
            if cooled && !state.probing {
                state.probing = true;
                info!("feed circuit half-open; probing with a real build");
                return Ok(Admission::Build { probe: true });
            }
            return state
                .fallback(query)
                .map(Admission::Serve)
                .ok_or(FeedError::CircuitOpen);
        }

        if allow_fresh
            && !self.fresh_for.is_zero()
            && let Some(cached) = state.last_good.get(query)
            && now - cached.built_at < self.fresh_for
        {
            return Ok(Admission::Serve(cached.snapshot.clone()));
        }

        Ok(Admission::Build { probe: false })
    }

    fn record(
        &self,
        query: FeedQuery,
        probe: bool,
        result: Result<FeedSnapshot, FeedError>,
    ) -> Result<FeedSnapshot, FeedError> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        match result {
            Ok(snapshot) => {
                if state.breaker.open {
                    info!(version = snapshot.schedule_version, "feed circuit closed");
                }
                state.breaker = BreakerState::default();
                state.last_good.insert(
                    query,
                    CachedSnapshot {
                        snapshot: snapshot.clone(),
                        built_at: now,
                    },
                );
                state.latest = Some(snapshot.clone());
                Ok(snapshot)
            }
            // Shutdown is not a failure of the feed.
            Err(FeedError::Source(RemoteError::Cancelled)) => {
                Err(FeedError::Source(RemoteError::Cancelled))
            }
            Err(err) => {
                let breaker = &mut state.breaker;
                breaker.consecutive_errors = breaker.consecutive_errors.saturating_add(1);
                let tripped = !breaker.open
                    && breaker.consecutive_errors >= self.failure_threshold;

                if probe || tripped {
                    breaker.open = true;
                    breaker.opened_at = Some(now);
                    warn!(
                        consecutive_errors = breaker.consecutive_errors,
                        cooldown_secs = self.cooldown.num_seconds(),
                        error = %err,
                        "feed circuit opened"
                    );
                    if let Some(fallback) = state.fallback(&query) {
                        return Ok(fallback);
                    }
                } else {
                    warn!(
                        consecutive_errors = breaker.consecutive_errors,
                        threshold = self.failure_threshold,
                        error = %err,
                        "feed build failed"
                    );
                }
                Err(err)
            }
        }
    }
}

fn seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}
