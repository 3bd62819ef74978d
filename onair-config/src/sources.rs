use std::path::PathBuf;

use onair_core::{feed::FeedSettings, reconcile::ReconcileSettings};
use serde::{Deserialize, Serialize};

use crate::models::{CircuitBreakerConfig, RateLimitConfig};

/// Raw configuration as written in `onair.toml`.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub content: FileRemoteConfig,
    #[serde(default)]
    pub automation: FileRemoteConfig,
    #[serde(default)]
    pub media: FileMediaConfig,
    pub feed: Option<FeedSettings>,
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    pub rate_limit: Option<RateLimitConfig>,
    pub reconcile: Option<ReconcileSettings>,
    #[serde(default)]
    pub auth: FileAuthConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileRemoteConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileMediaConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grace_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileAuthConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_tokens: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_tokens: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorizer_url: Option<String>,
}

/// Values picked up from the process environment.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub content_url: Option<String>,
    pub content_token: Option<String>,
    pub automation_url: Option<String>,
    pub automation_token: Option<String>,
    pub media_root: Option<PathBuf>,
    pub feed_strict_mode: Option<bool>,
    pub feed_tokens: Option<Vec<String>>,
    pub admin_tokens: Option<Vec<String>>,
    pub authorizer_url: Option<String>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the overlay from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Self {
            config_path: non_empty("ONAIR_CONFIG").map(PathBuf::from),
            server_host: non_empty("ONAIR_HOST"),
            server_port: non_empty("ONAIR_PORT").and_then(|s| s.trim().parse().ok()),
            content_url: non_empty("CONTENT_API_URL"),
            content_token: non_empty("CONTENT_API_TOKEN"),
            automation_url: non_empty("AUTOMATION_API_URL"),
            automation_token: non_empty("AUTOMATION_API_TOKEN"),
            media_root: non_empty("MEDIA_ROOT").map(PathBuf::from),
            feed_strict_mode: lookup("FEED_STRICT_MODE").and_then(|raw| parse_bool(&raw)),
            feed_tokens: lookup("ONAIR_FEED_TOKENS").map(|raw| parse_csv(&raw)),
            admin_tokens: lookup("ONAIR_ADMIN_TOKENS").map(|raw| parse_csv(&raw)),
            authorizer_url: non_empty("ONAIR_AUTHORIZER_URL"),
        }
    }
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|part| {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn parses_lists_and_flags() {
        let env = EnvConfig::from_lookup(lookup(&[
            ("ONAIR_FEED_TOKENS", " player-1, ,display-2 "),
            ("FEED_STRICT_MODE", "Yes"),
            ("ONAIR_PORT", "8088"),
        ]));

        assert_eq!(
            env.feed_tokens,
            Some(vec!["player-1".to_string(), "display-2".to_string()])
        );
        assert_eq!(env.feed_strict_mode, Some(true));
        assert_eq!(env.server_port, Some(8088));
    }

    #[test]
    fn blank_and_invalid_values_are_ignored() {
        let env = EnvConfig::from_lookup(lookup(&[
            ("ONAIR_HOST", "   "),
            ("ONAIR_PORT", "eighty"),
            ("FEED_STRICT_MODE", "maybe"),
        ]));

        assert_eq!(env.server_host, None);
        assert_eq!(env.server_port, None);
        assert_eq!(env.feed_strict_mode, None);
    }

    #[test]
    fn file_sections_are_optional() {
        let file: FileConfig = toml::from_str(
            r#"
            [server]
            port = 9000

            [feed]
            strict_mode = true
            max_items = 100
            "#,
        )
        .unwrap();

        assert_eq!(file.server.port, Some(9000));
        let feed = file.feed.unwrap();
        assert!(feed.strict_mode);
        assert_eq!(feed.bounds.max_items, 100);
        assert_eq!(feed.bounds.default_lookahead_minutes, 180);
        assert!(file.reconcile.is_none());
    }
}
