use std::{path::PathBuf, time::Duration};

use onair_core::{
    feed::FeedSettings, media::MediaCheckSettings, reconcile::ReconcileSettings,
};
use serde::{Deserialize, Serialize};
use url::Url;

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub content: RemoteConfig,
    pub automation: RemoteConfig,
    pub media: MediaCheckSettings,
    pub feed: FeedSettings,
    pub circuit_breaker: CircuitBreakerConfig,
    pub rate_limit: RateLimitConfig,
    pub reconcile: ReconcileSettings,
    pub auth: AuthConfig,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Connection details for the content system or the automation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub base_url: Option<Url>,
    pub token: Option<String>,
    pub request_timeout_ms: u64,
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failed builds before the breaker opens.
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_secs: 30,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Token bucket parameters. A capacity of zero or less disables the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketSpec {
    pub capacity: f64,
    pub refill_per_second: f64,
}

impl BucketSpec {
    pub fn is_disabled(&self) -> bool {
        self.capacity <= 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub feed: BucketSpec,
    pub schedule: BucketSpec,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            feed: BucketSpec {
                capacity: 60.0,
                refill_per_second: 20.0,
            },
            schedule: BucketSpec {
                capacity: 5.0,
                refill_per_second: 0.2,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthConfig {
    /// Tokens accepted for `GET /feed`.
    pub feed_tokens: Vec<String>,
    /// Tokens accepted for the schedule endpoints. Also valid for the feed.
    pub admin_tokens: Vec<String>,
    /// External authorization check. When set, it replaces the static tokens.
    pub authorizer_url: Option<Url>,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
