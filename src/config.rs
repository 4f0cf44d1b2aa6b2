use alertsockets::{is_socket_url, resolve_endpoint, ExponentialBackoff, DEFAULT_DEV_HOST};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Environment variable holding the bearer token
pub const TOKEN_ENV_VAR: &str = "NOTIFIER_TOKEN";

/// Environment variable that overrides the socket URL
pub const URL_ENV_VAR: &str = "NOTIFIER_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Notification client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Host the application is served from; the socket endpoint is
    /// derived from it
    #[serde(default = "default_page_host")]
    pub page_host: String,

    /// Backend host used when `page_host` is a localhost address
    #[serde(default = "default_dev_host")]
    pub dev_host: String,

    /// Explicit socket URL, bypasses endpoint resolution
    #[serde(default)]
    pub url: Option<String>,

    /// Message `type` of entity updates
    #[serde(default = "default_entity_update_type")]
    pub entity_update_type: String,

    /// Base reconnect delay in milliseconds
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound for the reconnect delay (uncapped when absent)
    #[serde(default)]
    pub backoff_max_ms: Option<u64>,

    /// Credential refresh endpoint; no refresh when absent
    #[serde(default)]
    pub refresh_url: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seconds between status summaries in the tail binary
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

fn default_page_host() -> String {
    "localhost".to_string()
}

fn default_dev_host() -> String {
    DEFAULT_DEV_HOST.to_string()
}

fn default_entity_update_type() -> String {
    alertsockets::DEFAULT_ENTITY_UPDATE_TYPE.to_string()
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_heartbeat_secs() -> u64 {
    300
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            page_host: default_page_host(),
            dev_host: default_dev_host(),
            url: None,
            entity_update_type: default_entity_update_type(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: None,
            refresh_url: None,
            log_level: default_log_level(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

impl NotifierConfig {
    /// Load configuration from YAML file
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut config = Self::from_yaml(&yaml_content)?;

        // Override socket URL from environment if present
        if let Ok(url) = std::env::var(URL_ENV_VAR) {
            info!("Overriding socket URL from environment variable");
            config.url = Some(url);
        }

        config.validate()?;

        Ok(config)
    }

    /// Parse YAML without touching the environment or validating
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.backoff_base_ms == 0 {
            return Err(ConfigError::ValidationError(
                "backoff_base_ms must be greater than 0".to_string(),
            ));
        }

        if let Some(max) = self.backoff_max_ms {
            if max < self.backoff_base_ms {
                return Err(ConfigError::ValidationError(
                    "backoff_max_ms must not be below backoff_base_ms".to_string(),
                ));
            }
        }

        if let Some(url) = &self.url {
            if !is_socket_url(url) {
                return Err(ConfigError::ValidationError(format!(
                    "url must use ws:// or wss://, got '{}'",
                    url
                )));
            }
        }

        if self.entity_update_type.is_empty() {
            return Err(ConfigError::ValidationError(
                "entity_update_type must not be empty".to_string(),
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }

    /// Socket endpoint: the explicit `url`, or one derived from `page_host`
    pub fn endpoint(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => resolve_endpoint(&self.page_host, &self.dev_host),
        }
    }

    /// Reconnect policy described by the backoff settings
    pub fn backoff(&self) -> ExponentialBackoff {
        let backoff = ExponentialBackoff::new(Duration::from_millis(self.backoff_base_ms));
        match self.backoff_max_ms {
            Some(max) => backoff.with_max_delay(Duration::from_millis(max)),
            None => backoff,
        }
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Configuration loaded:");
        info!("  Socket endpoint: {}", self.endpoint());
        info!("  Entity update type: {}", self.entity_update_type);
        match self.backoff_max_ms {
            Some(max) => info!("  Backoff: {}ms base, {}ms cap", self.backoff_base_ms, max),
            None => info!("  Backoff: {}ms base, uncapped", self.backoff_base_ms),
        }
        info!(
            "  Credential refresh: {}",
            self.refresh_url.as_deref().unwrap_or("disabled")
        );
        info!("  Log level: {}", self.log_level);
    }
}

/// Bearer token from the environment; empty values count as absent
pub fn env_token() -> Option<String> {
    std::env::var(TOKEN_ENV_VAR)
        .ok()
        .filter(|token| !token.trim().is_empty())
}
