//! Process configuration with layered loading.
//!
//! Configuration is assembled from three sources, highest precedence last:
//!
//! 1. Built-in defaults
//! 2. TOML config file (if `CACHET_CONFIG_FILE` is set)
//! 3. Environment variables (`CACHET_*`)
//!
//! Only the origin base URL is mandatory; everything else defaults to a
//! local development setup.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming the optional TOML config file.
const CONFIG_FILE_VAR: &str = "CACHET_CONFIG_FILE";

/// Prefix for configuration environment variables.
const ENV_PREFIX: &str = "CACHET_";

/// Configuration errors reported before the proxy starts serving.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Extraction(#[from] Box<figment::Error>),

    #[error("origin base URL must be set (CACHET_ORIGIN)")]
    MissingOrigin,

    #[error("origin base URL must start with http:// or https://, got {0:?}")]
    InvalidOrigin(String),
}

/// Proxy process configuration.
///
/// # Examples
///
/// ```rust,no_run
/// use cachet::config::ProxyConfig;
///
/// // Reads CACHET_* env vars and the optional CACHET_CONFIG_FILE.
/// let config = ProxyConfig::load()?;
/// # Ok::<(), cachet::config::ConfigError>(())
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Address the proxy listens on.
    ///
    /// Set via `CACHET_LISTEN`.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Base URL of the upstream origin server. Required.
    ///
    /// Set via `CACHET_ORIGIN`.
    #[serde(default)]
    pub origin: String,

    /// Redis connection URL for the shared cache store.
    ///
    /// Set via `CACHET_REDIS_URL`.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Timeout for a single origin request, in milliseconds.
    ///
    /// Set via `CACHET_ORIGIN_TIMEOUT_MS`.
    #[serde(default = "default_origin_timeout_ms")]
    pub origin_timeout_ms: u64,
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_owned()
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_owned()
}

fn default_origin_timeout_ms() -> u64 {
    10_000
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            origin: String::new(),
            redis_url: default_redis_url(),
            origin_timeout_ms: default_origin_timeout_ms(),
        }
    }
}

impl ProxyConfig {
    /// Loads configuration from defaults, the optional TOML file, and
    /// `CACHET_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a source fails to parse or the result
    /// fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Ok(path) = std::env::var(CONFIG_FILE_VAR) {
            figment = figment.merge(Toml::file(path));
        }
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants that figment extraction cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.origin.is_empty() {
            return Err(ConfigError::MissingOrigin);
        }
        if !self.origin.starts_with("http://") && !self.origin.starts_with("https://") {
            return Err(ConfigError::InvalidOrigin(self.origin.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_services() {
        let config = ProxyConfig::default();
        assert_eq!(config.listen, "127.0.0.1:8080");
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(config.origin_timeout_ms, 10_000);
    }

    #[test]
    fn missing_origin_fails_validation() {
        let config = ProxyConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingOrigin)
        ));
    }

    #[test]
    fn non_http_origin_fails_validation() {
        let config = ProxyConfig {
            origin: "localhost:3000".to_owned(),
            ..ProxyConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidOrigin(_))
        ));
    }

    #[test]
    fn http_origin_passes_validation() {
        let config = ProxyConfig {
            origin: "http://localhost:3000".to_owned(),
            ..ProxyConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
