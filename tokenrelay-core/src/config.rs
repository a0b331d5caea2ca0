//! Relay configuration handling.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt};
use url::Url;

use crate::reader::RetryPolicy;
use crate::search::SearchConfig;

#[cfg(feature = "oauth")]
use crate::refresh::ProviderConfig;

/// File name looked up in the platform configuration directory.
pub const CONFIG_FILE_NAME: &str = "relay.toml";

/// Largest accepted `expiry_buffer_secs` (one day).
pub const MAX_EXPIRY_BUFFER_SECS: i64 = 86_400;

/// Error type for configuration validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The login URL does not parse.
    #[error("invalid login URL {url:?}: {source}")]
    InvalidLoginUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// A setting has an unusable value.
    #[error("invalid setting {name}: {message}")]
    InvalidSetting { name: &'static str, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Logging level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Where principals are sent to (re)authorize.
    #[serde(default = "default_login_url")]
    pub login_url: String,

    /// Seconds before expiry at which an access token is already refreshed.
    #[serde(default)]
    pub expiry_buffer_secs: i64,

    /// Credential store read retries.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Fallback search settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// OAuth provider used for refresh exchanges.
    #[cfg(feature = "oauth")]
    #[serde(default)]
    pub provider: Option<ProviderConfig>,

    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: PathBuf,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_login_url() -> String {
    "http://localhost:8000/login".to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            login_url: default_login_url(),
            expiry_buffer_secs: 0,
            retry: RetryPolicy::default(),
            search: SearchConfig::default(),
            #[cfg(feature = "oauth")]
            provider: None,
            config_path: PathBuf::new(),
        }
    }
}

impl RelayConfig {
    /// Parsed login URL.
    pub fn login_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.login_url).map_err(|source| ConfigError::InvalidLoginUrl {
            url: self.login_url.clone(),
            source,
        })
    }

    /// Check settings that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.login_url()?;

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "retry.max_attempts",
                message: "must be at least 1".to_string(),
            });
        }

        if !(0..=MAX_EXPIRY_BUFFER_SECS).contains(&self.expiry_buffer_secs) {
            return Err(ConfigError::InvalidSetting {
                name: "expiry_buffer_secs",
                message: format!("must be between 0 and {}", MAX_EXPIRY_BUFFER_SECS),
            });
        }

        Ok(())
    }
}

/// Load configuration from the default location or create defaults.
pub fn load_config() -> Result<RelayConfig> {
    let config_path = project_dirs()
        .map(|d| d.config_dir().join(CONFIG_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));

    load_config_from_path(config_path)
}

/// Load configuration from an explicit path; a missing file yields defaults.
pub fn load_config_from_path(config_path: impl AsRef<Path>) -> Result<RelayConfig> {
    let config_path = config_path.as_ref();

    let mut config: RelayConfig = if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config from {:?}", config_path))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", config_path))?
    } else {
        RelayConfig::default()
    };

    config.config_path = config_path.to_path_buf();
    config
        .validate()
        .with_context(|| format!("Invalid config in {:?}", config_path))?;

    Ok(config)
}

/// Install a global fmt subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Calling this more
/// than once is harmless.
pub fn init_logging(config: &RelayConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "tokenrelay", "tokenrelay")
}
