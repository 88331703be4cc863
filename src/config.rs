use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::models::User;
use crate::sync::{PollIntervals, PollRate};

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

const DEFAULT_SLOW_INTERVAL_SECS: u64 = 60;
const DEFAULT_INTERVAL_SECS: u64 = 6;

/// Sync scheduling
#[derive(Debug, Clone, Serialize)]
pub struct SyncConfig {
    pub poll_rate: ConfigValue<PollRate>,
    /// Seconds between cycles at the `slow` rate
    pub slow_interval_secs: u64,
    /// Seconds between cycles at the `default` rate
    pub default_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_rate: ConfigValue::new(PollRate::default(), ConfigSource::Default),
            slow_interval_secs: DEFAULT_SLOW_INTERVAL_SECS,
            default_interval_secs: DEFAULT_INTERVAL_SECS,
        }
    }
}

impl SyncConfig {
    pub fn intervals(&self) -> PollIntervals {
        PollIntervals {
            slow: Duration::from_secs(self.slow_interval_secs),
            default: Duration::from_secs(self.default_interval_secs),
        }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite database
    pub database_path: ConfigValue<PathBuf>,
    /// User the lists belong to; unset means the logged-out scope
    pub user_id: ConfigValue<Option<String>>,
    pub user_email: ConfigValue<Option<String>>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    pub sync: SyncConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    user_id: Option<String>,
    user_email: Option<String>,
    sync: Option<SyncConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SyncConfigFile {
    poll_rate: Option<PollRate>,
    slow_interval_secs: Option<u64>,
    default_interval_secs: Option<u64>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let default_db_path = Self::default_data_dir().join("lists.db");

        // Start with defaults
        let mut database_path = ConfigValue::new(default_db_path, ConfigSource::Default);
        let mut user_id = ConfigValue::new(None, ConfigSource::Default);
        let mut user_email = ConfigValue::new(None, ConfigSource::Default);
        let mut config_file = None;
        let mut sync = SyncConfig::default();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(db_path) = file_config.database_path {
                // Resolve relative paths against config file's directory
                let resolved_path = if db_path.is_relative() {
                    path.parent().map(|p| p.join(&db_path)).unwrap_or(db_path)
                } else {
                    db_path
                };
                database_path = ConfigValue::new(resolved_path, ConfigSource::File);
            }
            if let Some(id) = file_config.user_id {
                user_id = ConfigValue::new(Some(id), ConfigSource::File);
            }
            if let Some(email) = file_config.user_email {
                user_email = ConfigValue::new(Some(email), ConfigSource::File);
            }
            if let Some(sync_file) = file_config.sync {
                if let Some(rate) = sync_file.poll_rate {
                    sync.poll_rate = ConfigValue::new(rate, ConfigSource::File);
                }
                if let Some(secs) = sync_file.slow_interval_secs {
                    sync.slow_interval_secs = secs;
                }
                if let Some(secs) = sync_file.default_interval_secs {
                    sync.default_interval_secs = secs;
                }
            }
        }

        // Apply environment variable overrides
        if let Ok(db_path) = std::env::var("LISTSYNC_DATABASE_PATH") {
            database_path = ConfigValue::new(PathBuf::from(db_path), ConfigSource::Environment);
        }
        if let Ok(id) = std::env::var("LISTSYNC_USER_ID") {
            user_id = ConfigValue::new(Some(id), ConfigSource::Environment);
        }
        if let Ok(email) = std::env::var("LISTSYNC_USER_EMAIL") {
            user_email = ConfigValue::new(Some(email), ConfigSource::Environment);
        }
        if let Ok(rate) = std::env::var("LISTSYNC_POLL_RATE") {
            let rate = rate
                .parse::<PollRate>()
                .map_err(|e| ConfigError::InvalidValue("LISTSYNC_POLL_RATE", e))?;
            sync.poll_rate = ConfigValue::new(rate, ConfigSource::Environment);
        }

        Ok(Self {
            database_path,
            user_id,
            user_email,
            config_file,
            sync,
        })
    }

    /// The configured user, if a user id is set.
    pub fn user(&self) -> Option<User> {
        let id = self.user_id.value.as_ref()?;
        let email = self.user_email.value.clone().unwrap_or_default();
        Some(User::new(id.clone(), email))
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/listsync/
    /// - macOS: ~/Library/Application Support/listsync/
    /// - Windows: %APPDATA%/listsync/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("listsync")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/listsync/
    /// - macOS: ~/Library/Application Support/listsync/
    /// - Windows: %APPDATA%/listsync/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("listsync")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidValue(key, reason) => {
                write!(f, "Invalid value for {}: {}", key, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = Config::load(Some(config_path)).unwrap();
        assert!(config
            .database_path
            .value
            .to_string_lossy()
            .contains("lists.db"));
        assert_eq!(config.database_path.source, ConfigSource::Default);
        assert_eq!(config.config_file, None);
        assert_eq!(config.sync.poll_rate.value, PollRate::Default);
        assert_eq!(config.sync.intervals(), PollIntervals::default());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "database_path: /custom/path/db.sqlite").unwrap();
        writeln!(file, "user_id: u1").unwrap();
        writeln!(file, "user_email: u1@example.com").unwrap();
        writeln!(file, "sync:").unwrap();
        writeln!(file, "  poll_rate: slow").unwrap();
        writeln!(file, "  slow_interval_secs: 120").unwrap();

        let config = Config::load(Some(config_path.clone())).unwrap();
        assert_eq!(
            config.database_path.value,
            PathBuf::from("/custom/path/db.sqlite")
        );
        assert_eq!(config.database_path.source, ConfigSource::File);
        assert_eq!(config.user_id.source, ConfigSource::File);
        assert_eq!(config.config_file, Some(config_path));

        let user = config.user().unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.email, "u1@example.com");

        assert_eq!(config.sync.poll_rate.value, PollRate::Slow);
        assert_eq!(config.sync.poll_rate.source, ConfigSource::File);
        assert_eq!(config.sync.intervals().slow, Duration::from_secs(120));
        assert_eq!(config.sync.intervals().default, Duration::from_secs(6));
    }

    #[test]
    fn test_relative_database_path() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "database_path: data/lists.db\n").unwrap();

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(
            config.database_path.value,
            temp_dir.path().join("data/lists.db")
        );
    }

    #[test]
    fn test_no_user_configured() {
        let temp_dir = tempdir().unwrap();
        let config = Config::load(Some(temp_dir.path().join("missing.yaml"))).unwrap();
        assert!(config.user().is_none());
    }

    #[test]
    #[ignore] // Run with --ignored; env vars can pollute parallel tests
    fn test_env_var_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "user_id: fromfile").unwrap();

        std::env::set_var("LISTSYNC_USER_ID", "fromenv");
        std::env::set_var("LISTSYNC_POLL_RATE", "off");

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(config.user_id.value.as_deref(), Some("fromenv"));
        assert_eq!(config.user_id.source, ConfigSource::Environment);
        assert_eq!(config.sync.poll_rate.value, PollRate::Off);

        // Clean up
        std::env::remove_var("LISTSYNC_USER_ID");
        std::env::remove_var("LISTSYNC_POLL_RATE");
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = Config::load(Some(config_path));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_invalid_poll_rate_in_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "sync:\n  poll_rate: rapid\n").unwrap();

        assert!(Config::load(Some(config_path)).is_err());
    }
}
