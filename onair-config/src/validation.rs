use thiserror::Error;

use crate::models::{BucketSpec, Config, RemoteConfig};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigGuardRailError {
    #[error("{system} base URL is not configured (set {env_var} or [{section}].base_url)")]
    MissingRemoteUrl {
        system: &'static str,
        env_var: &'static str,
        section: &'static str,
    },
    #[error("circuit_breaker.failure_threshold must be at least 1")]
    ZeroFailureThreshold,
    #[error("{field}: minimum {min} exceeds maximum {max}")]
    InvertedBounds {
        field: &'static str,
        min: u32,
        max: u32,
    },
    #[error("{field}: default {value} is outside [{min}, {max}]")]
    DefaultOutOfBounds {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
    #[error("{section}.max_attempts must be at least 1")]
    ZeroAttempts { section: &'static str },
    #[error("rate_limit.{bucket} {reason}")]
    InvalidBucket {
        bucket: &'static str,
        reason: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }
}

pub fn apply_guard_rails(
    config: &Config,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    require_url(&config.content, "content system", "CONTENT_API_URL", "content")?;
    require_url(
        &config.automation,
        "automation engine",
        "AUTOMATION_API_URL",
        "automation",
    )?;

    if config.circuit_breaker.failure_threshold == 0 {
        return Err(ConfigGuardRailError::ZeroFailureThreshold);
    }

    let bounds = &config.feed.bounds;
    check_bounds(
        "feed.lookahead_minutes",
        bounds.default_lookahead_minutes,
        bounds.min_lookahead_minutes,
        bounds.max_lookahead_minutes,
    )?;
    check_bounds(
        "feed.max_items",
        bounds.default_max_items,
        bounds.min_items,
        bounds.max_items,
    )?;

    if config.feed.fetch.max_attempts == 0 {
        return Err(ConfigGuardRailError::ZeroAttempts {
            section: "feed.fetch",
        });
    }
    if config.reconcile.retry.max_attempts == 0 {
        return Err(ConfigGuardRailError::ZeroAttempts {
            section: "reconcile.retry",
        });
    }

    check_bucket("feed", &config.rate_limit.feed, &mut warnings)?;
    check_bucket("schedule", &config.rate_limit.schedule, &mut warnings)?;

    let auth = &config.auth;
    if auth.authorizer_url.is_none() && auth.feed_tokens.is_empty() && auth.admin_tokens.is_empty() {
        warnings.push_with_hint(
            "No access tokens or authorizer configured; every request will be rejected with 401",
            "Set ONAIR_FEED_TOKENS / ONAIR_ADMIN_TOKENS or ONAIR_AUTHORIZER_URL",
        );
    } else if auth.authorizer_url.is_some()
        && !(auth.feed_tokens.is_empty() && auth.admin_tokens.is_empty())
    {
        warnings.push(
            "Static tokens are ignored while an external authorizer is configured",
        );
    }

    if config.feed.strict_mode {
        warnings.push_with_hint(
            "Feed strict mode is on; a single missing media file fails the whole feed",
            "Disable feed.strict_mode to serve partial feeds instead",
        );
    }

    if config.media.grace_secs == 0 {
        warnings.push(
            "media.grace_secs is 0; files still being written may be published",
        );
    }

    if config.reconcile.protected_window_minutes == 0 {
        warnings.push_with_hint(
            "reconcile.protected_window_minutes is 0; entries on air can be deleted",
            "Use a protected window of at least the longest expected item",
        );
    }

    Ok(warnings)
}

fn require_url(
    remote: &RemoteConfig,
    system: &'static str,
    env_var: &'static str,
    section: &'static str,
) -> Result<(), ConfigGuardRailError> {
    if remote.base_url.is_none() {
        return Err(ConfigGuardRailError::MissingRemoteUrl {
            system,
            env_var,
            section,
        });
    }
    Ok(())
}

fn check_bounds(
    field: &'static str,
    value: u32,
    min: u32,
    max: u32,
) -> Result<(), ConfigGuardRailError> {
    if min > max {
        return Err(ConfigGuardRailError::InvertedBounds { field, min, max });
    }
    if value < min || value > max {
        return Err(ConfigGuardRailError::DefaultOutOfBounds {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn check_bucket(
    name: &'static str,
    bucket: &BucketSpec,
    warnings: &mut ConfigWarnings,
) -> Result<(), ConfigGuardRailError> {
    if !bucket.capacity.is_finite() || !bucket.refill_per_second.is_finite() {
        return Err(ConfigGuardRailError::InvalidBucket {
            bucket: name,
            reason: "must use finite numbers",
        });
    }
    if bucket.is_disabled() {
        warnings.push(format!(
            "rate_limit.{name} capacity is {}; rate limiting is disabled for it",
            bucket.capacity
        ));
        return Ok(());
    }
    if bucket.refill_per_second <= 0.0 {
        return Err(ConfigGuardRailError::InvalidBucket {
            bucket: name,
            reason: "refill_per_second must be positive when capacity is positive",
        });
    }
    Ok(())
}
