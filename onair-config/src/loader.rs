use std::{
    fs,
    path::{Path, PathBuf},
};

use onair_core::media::MediaCheckSettings;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
    models::{AuthConfig, Config, ConfigMetadata, RemoteConfig, ServerConfig},
    sources::{EnvConfig, FileConfig, FileRemoteConfig},
    validation::{self, ConfigGuardRailError, ConfigWarnings},
};

const DEFAULT_CONFIG_LOCATIONS: [&str; 2] = ["onair.toml", "config/onair.toml"];
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file {path} does not exist")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid URL in {key}: {source}")]
    InvalidUrl {
        key: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error(transparent)]
    GuardRail(#[from] ConfigGuardRailError),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

/// Where the config file path came from. Only paths the operator named
/// explicitly are required to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provenance {
    Explicit,
    Env,
    Default,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    /// Loads `.env`, then the process environment, then the config file.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true),
            None => dotenvy::dotenv().map(|_| true),
        }
        .or_else(|err| match err {
            dotenvy::Error::Io(_) => Ok(false),
            other => Err(other),
        })?;
        if env_file_loaded {
            info!(
                path = ?self.options.env_file,
                "loaded environment overrides from dotenv file"
            );
        }

        self.compose(EnvConfig::gather(), env_file_loaded)
    }

    /// Resolves configuration against an already gathered environment.
    pub fn load_with_env(&self, env: EnvConfig) -> Result<ConfigLoad, ConfigLoadError> {
        self.compose(env, false)
    }

    fn resolve_path(&self, env: &EnvConfig) -> Option<(PathBuf, Provenance)> {
        if let Some(explicit) = &self.options.config_path {
            return Some((explicit.clone(), Provenance::Explicit));
        }
        if let Some(from_env) = &env.config_path {
            return Some((from_env.clone(), Provenance::Env));
        }
        DEFAULT_CONFIG_LOCATIONS
            .iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.exists())
            .map(|path| (path, Provenance::Default))
    }

    fn load_file(
        &self,
        env: &EnvConfig,
    ) -> Result<Option<(FileConfig, PathBuf)>, ConfigLoadError> {
        let Some((path, provenance)) = self.resolve_path(env) else {
            return Ok(None);
        };

        if !path.exists() {
            if provenance == Provenance::Default {
                return Ok(None);
            }
            return Err(ConfigLoadError::MissingConfig { path });
        }
        debug!(path = %path.display(), ?provenance, "reading configuration file");

        let contents = fs::read_to_string(&path).map_err(|source| ConfigLoadError::Io {
            path: path.clone(),
            source,
        })?;
        let file: FileConfig =
            toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
                path: path.clone(),
                source,
            })?;
        Ok(Some((file, path)))
    }

    fn compose(
        &self,
        env: EnvConfig,
        env_file_loaded: bool,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let mut warnings = ConfigWarnings::default();

        let (file, config_path) = match self.load_file(&env)? {
            Some((file, path)) => (file, Some(path)),
            None => {
                warnings.push_with_hint(
                    "No onair.toml detected; using environment variables and defaults",
                    "Pass --config or set ONAIR_CONFIG to point at a configuration file",
                );
                (FileConfig::default(), None)
            }
        };

        let FileConfig {
            server: file_server,
            content: file_content,
            automation: file_automation,
            media: file_media,
            feed: file_feed,
            circuit_breaker: file_breaker,
            rate_limit: file_rate_limit,
            reconcile: file_reconcile,
            auth: file_auth,
        } = file;

        let server = ServerConfig {
            host: env
                .server_host
                .clone()
                .or(file_server.host)
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: env.server_port.or(file_server.port).unwrap_or(8080),
        };

        let content = remote_config(
            "CONTENT_API_URL",
            env.content_url.clone(),
            env.content_token.clone(),
            file_content,
        )?;
        let automation = remote_config(
            "AUTOMATION_API_URL",
            env.automation_url.clone(),
            env.automation_token.clone(),
            file_automation,
        )?;

        let media_defaults = MediaCheckSettings::default();
        let media = MediaCheckSettings {
            root: env
                .media_root
                .clone()
                .or(file_media.root)
                .unwrap_or(media_defaults.root),
            grace_secs: file_media.grace_secs.unwrap_or(media_defaults.grace_secs),
            check_timeout_ms: file_media
                .check_timeout_ms
                .unwrap_or(media_defaults.check_timeout_ms),
        };

        let mut feed = file_feed.unwrap_or_default();
        if let Some(strict) = env.feed_strict_mode {
            feed.strict_mode = strict;
        }

        let authorizer_url = env
            .authorizer_url
            .clone()
            .or(file_auth.authorizer_url)
            .map(|raw| parse_url("ONAIR_AUTHORIZER_URL", &raw))
            .transpose()?;
        let auth = AuthConfig {
            feed_tokens: env
                .feed_tokens
                .clone()
                .or(file_auth.feed_tokens)
                .unwrap_or_default(),
            admin_tokens: env
                .admin_tokens
                .clone()
                .or(file_auth.admin_tokens)
                .unwrap_or_default(),
            authorizer_url,
        };

        let config = Config {
            server,
            content,
            automation,
            media,
            feed,
            circuit_breaker: file_breaker.unwrap_or_default(),
            rate_limit: file_rate_limit.unwrap_or_default(),
            reconcile: file_reconcile.unwrap_or_default(),
            auth,
            metadata: ConfigMetadata {
                config_path,
                env_file_loaded,
            },
        };

        warnings.extend(validation::apply_guard_rails(&config)?);
        Ok(ConfigLoad { config, warnings })
    }
}

fn remote_config(
    key: &'static str,
    env_url: Option<String>,
    env_token: Option<String>,
    file: FileRemoteConfig,
) -> Result<RemoteConfig, ConfigLoadError> {
    let base_url = env_url
        .or(file.base_url)
        .map(|raw| parse_url(key, &raw))
        .transpose()?;
    Ok(RemoteConfig {
        base_url,
        token: env_token.or(file.token),
        request_timeout_ms: file
            .request_timeout_ms
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
    })
}

fn parse_url(key: &'static str, raw: &str) -> Result<Url, ConfigLoadError> {
    Url::parse(raw.trim()).map_err(|source| ConfigLoadError::InvalidUrl { key, source })
}

impl ConfigLoad {
    pub fn config_path(&self) -> Option<&Path> {
        self.config.metadata.config_path.as_deref()
    }
}
