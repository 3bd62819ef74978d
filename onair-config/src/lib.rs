//! Configuration for the onair service.
//!
//! [`ConfigLoader`] reads an optional `onair.toml`, overlays environment
//! variables (after loading `.env`), fills in defaults and runs the guard
//! rails in [`validation`]. Hard problems fail the load; soft ones come back
//! as [`ConfigWarnings`] for the caller to log.

pub mod loader;
pub mod models;
pub mod sources;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use models::{
    AuthConfig, BucketSpec, CircuitBreakerConfig, Config, ConfigMetadata,
    RateLimitConfig, RemoteConfig, ServerConfig,
};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
