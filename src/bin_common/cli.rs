//! Config path resolution for binaries

use std::path::PathBuf;

/// Which configuration file a binary wants
#[derive(Debug, Clone)]
pub enum ConfigType {
    /// `config/notifier.yaml`, overridable with `NOTIFIER_CONFIG_PATH`
    Notifier,
    /// A fixed path, overridable with `CONFIG_PATH`
    Custom(String),
}

impl ConfigType {
    /// Path used when the environment does not name one
    pub fn default_path(&self) -> &str {
        match self {
            ConfigType::Notifier => "config/notifier.yaml",
            ConfigType::Custom(path) => path,
        }
    }

    /// Environment variable that overrides [`ConfigType::default_path`]
    pub fn env_var_name(&self) -> &str {
        match self {
            ConfigType::Notifier => "NOTIFIER_CONFIG_PATH",
            ConfigType::Custom(_) => "CONFIG_PATH",
        }
    }
}

/// Resolve the config path for `config_type`
///
/// ```
/// use triage_notifier::bin_common::{load_config_from_env, ConfigType};
///
/// let path = load_config_from_env(ConfigType::Notifier);
/// assert!(path.extension().is_some());
/// ```
pub fn load_config_from_env(config_type: ConfigType) -> PathBuf {
    match std::env::var(config_type.env_var_name()) {
        Ok(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(config_type.default_path()),
    }
}
