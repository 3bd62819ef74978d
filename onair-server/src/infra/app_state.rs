use std::{fmt, sync::Arc};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use onair_config::{CircuitBreakerConfig, Config, RateLimitConfig, RemoteConfig};
use onair_core::{
    SharedClock, SystemClock,
    feed::{FeedBounds, FeedBuilder, FeedPipeline, FeedSettings},
    media::{FsMediaChecker, MediaProbe},
    reconcile::{ApplyEngine, DiffEngine, ReconcileSettings, Reconciler},
    remote::{
        AutomationEngine, ContentSource,
        http::{HttpAutomationEngine, HttpContentSource, HttpEndpoint},
    },
};
use tokio_util::sync::CancellationToken;

use super::{
    auth::{Authorizer, HttpAuthorizer, StaticTokenAuthorizer},
    cache::FeedCache,
    middleware::rate_limit::TokenBucket,
};

/// The subset of [`Config`] the running service needs.
#[derive(Debug, Clone, Default)]
pub struct ServiceSettings {
    pub feed: FeedSettings,
    pub circuit_breaker: CircuitBreakerConfig,
    pub rate_limit: RateLimitConfig,
    pub reconcile: ReconcileSettings,
}

impl From<&Config> for ServiceSettings {
    fn from(config: &Config) -> Self {
        Self {
            feed: config.feed.clone(),
            circuit_breaker: config.circuit_breaker,
            rate_limit: config.rate_limit,
            reconcile: config.reconcile.clone(),
        }
    }
}

/// External systems the service talks to.
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub content: Arc<dyn ContentSource>,
    pub automation: Arc<dyn AutomationEngine>,
    pub probe: Arc<dyn MediaProbe>,
    pub authorizer: Arc<dyn Authorizer>,
    pub clock: SharedClock,
}

#[derive(Clone)]
pub struct AppState {
    pub feed: Arc<FeedCache>,
    pub feed_bounds: FeedBounds,
    pub reconciler: Arc<Reconciler>,
    pub authorizer: Arc<dyn Authorizer>,
    pub feed_limiter: Arc<TokenBucket>,
    pub schedule_limiter: Arc<TokenBucket>,
    pub settings: Arc<ServiceSettings>,
    /// Cancelled on shutdown; request work runs on child tokens.
    pub shutdown: CancellationToken,
    pub started_at: DateTime<Utc>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("feed_bounds", &self.feed_bounds)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Wires the feed and reconciliation engines around `collaborators`.
    pub fn assemble(
        settings: ServiceSettings,
        collaborators: Collaborators,
        shutdown: CancellationToken,
    ) -> Self {
        let Collaborators {
            content,
            automation,
            probe,
            authorizer,
            clock,
        } = collaborators;

        let builder = FeedBuilder::new(
            Arc::clone(&probe),
            settings.feed.strict_mode,
            settings.feed.probe_concurrency,
        );
        let pipeline = FeedPipeline::new(
            Arc::clone(&content),
            builder,
            settings.feed.fetch,
            Arc::clone(&clock),
        );
        let feed = FeedCache::new(
            Arc::new(pipeline),
            settings.circuit_breaker,
            settings.feed.cache_ttl_secs,
            Arc::clone(&clock),
        );

        let diff = DiffEngine::new(
            content,
            Arc::clone(&automation),
            probe,
            settings.reconcile.retry,
            Arc::clone(&clock),
            settings.reconcile.protected_window_minutes,
        );
        let apply = ApplyEngine::new(automation, settings.reconcile.retry);
        let reconciler = Reconciler::new(
            diff,
            apply,
            Arc::clone(&clock),
            settings.reconcile.clone(),
        );

        Self {
            feed: Arc::new(feed),
            feed_bounds: settings.feed.bounds,
            reconciler: Arc::new(reconciler),
            authorizer,
            feed_limiter: Arc::new(TokenBucket::new(
                settings.rate_limit.feed,
                Arc::clone(&clock),
            )),
            schedule_limiter: Arc::new(TokenBucket::new(
                settings.rate_limit.schedule,
                Arc::clone(&clock),
            )),
            settings: Arc::new(settings),
            started_at: clock.now(),
            shutdown,
        }
    }

    /// Production wiring: HTTP adapters, filesystem media checks, wall clock.
    pub fn from_config(config: &Config, shutdown: CancellationToken) -> Result<Self> {
        let clock: SharedClock = Arc::new(SystemClock);

        let content = HttpContentSource::new(endpoint(&config.content, "content system")?);
        let automation =
            HttpAutomationEngine::new(endpoint(&config.automation, "automation engine")?);
        let probe = FsMediaChecker::new(&config.media, Arc::clone(&clock));

        let authorizer: Arc<dyn Authorizer> = match &config.auth.authorizer_url {
            Some(url) => Arc::new(
                HttpAuthorizer::new(url.clone(), config.content.request_timeout())
                    .context("failed to build authorizer client")?,
            ),
            None => Arc::new(StaticTokenAuthorizer::new(
                config.auth.feed_tokens.iter().cloned(),
                config.auth.admin_tokens.iter().cloned(),
            )),
        };

        Ok(Self::assemble(
            ServiceSettings::from(config),
            Collaborators {
                content: Arc::new(content),
                automation: Arc::new(automation),
                probe: Arc::new(probe),
                authorizer,
                clock,
            },
            shutdown,
        ))
    }
}

fn endpoint(remote: &RemoteConfig, name: &str) -> Result<HttpEndpoint> {
    let base = remote
        .base_url
        .clone()
        .with_context(|| format!("{name} base URL is not configured"))?;
    HttpEndpoint::new(base, remote.token.clone(), remote.request_timeout())
        .with_context(|| format!("failed to build {name} client"))
}
