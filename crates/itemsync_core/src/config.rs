//! # Application configuration (`itemsync.toml`)
//!
//! ```toml
//! [remote]
//! base_url = "https://firestore.googleapis.com/v1"
//! project_id = "my-project"
//! database_id = "(default)"
//! collection = "items"
//! # api_key = "..."
//! timeout_secs = 10
//!
//! [cache]
//! path = "itemsync.sqlite3"
//!
//! [sync]
//! cursor_mode = "exclusive"   # or "inclusive_dedup"
//!
//! [logging]
//! level = "info"
//! # dir = "/var/log/itemsync"
//! ```
//!
//! Every field has a default, so a missing or empty file is equivalent to
//! the default configuration. `project_id` has no usable default and must be
//! set before a remote store can be built.

use crate::logging::default_log_level;
use crate::remote::firestore::{
    FirestoreSettings, DEFAULT_BASE_URL, DEFAULT_COLLECTION, DEFAULT_DATABASE_ID,
};
use crate::sync::policy::CursorMode;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file name looked up by the CLI.
pub const CONFIG_FILE_NAME: &str = "itemsync.toml";

/// Configuration loading and validation errors.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(toml::de::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemSyncConfig {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Firestore connection section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default = "default_database_id")]
    pub database_id: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Local cache section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// SQLite file; relative paths resolve against the config file directory.
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

/// Sync policy section.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub cursor_mode: CursorMode,
}

/// Logging section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// Absolute directory for rolling log files; logging stays off when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_database_id() -> String {
    DEFAULT_DATABASE_ID.to_string()
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("itemsync.sqlite3")
}

fn default_level() -> String {
    default_log_level().to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            project_id: String::new(),
            database_id: default_database_id(),
            collection: default_collection(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            dir: None,
        }
    }
}

impl ItemSyncConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(ConfigError::Parse)
    }

    /// Serializes to a TOML document.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Loads `path`, or returns defaults when the file does not exist.
    ///
    /// A relative `cache.path` is resolved against the config file directory.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        if config.cache.path.is_relative() {
            if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                config.cache.path = parent.join(&config.cache.path);
            }
        }
        Ok(config)
    }

    /// Rejects configurations that cannot reach a store.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote.project_id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "remote.project_id must be set".to_string(),
            ));
        }
        if self.remote.collection.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "remote.collection must not be empty".to_string(),
            ));
        }
        if self.remote.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "remote.timeout_secs must be positive".to_string(),
            ));
        }
        if self.cache.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("cache.path must be set".to_string()));
        }
        Ok(())
    }

    /// Firestore adapter settings for the `[remote]` section.
    pub fn firestore_settings(&self) -> FirestoreSettings {
        FirestoreSettings {
            base_url: self.remote.base_url.clone(),
            project_id: self.remote.project_id.clone(),
            database_id: self.remote.database_id.clone(),
            collection: self.remote.collection.clone(),
            api_key: self.remote.api_key.clone().filter(|key| !key.is_empty()),
            timeout: Duration::from_secs(self.remote.timeout_secs),
        }
    }
}
