//! Configuration file management.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use tally_ledger::{AssetId, UserId, REWARD_ASSET};

use crate::ServiceError;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "TALLY_DATA_DIR";

/// Complete service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Who may register pools.
    #[serde(default)]
    pub access: AccessConfig,
    /// Ledger settings.
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Event broadcast settings.
    #[serde(default)]
    pub events: EventsConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
    /// Database file name inside the data directory.
    #[serde(default = "default_database_file")]
    pub database_file: String,
    /// Keep the database in memory (nothing survives a restart).
    #[serde(default)]
    pub in_memory: bool,
}

/// Access control configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Hex-encoded 32-byte ids allowed to register pools.
    #[serde(default)]
    pub admins: Vec<String>,
}

/// Ledger configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Hex-encoded asset handle rewards are paid in. Empty = all zeroes.
    #[serde(default)]
    pub reward_asset: String,
}

/// Event broadcast configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Per-subscriber buffer before lagging receivers drop events.
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace" | "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_database_file() -> String {
    "tally.db".to_string()
}

fn default_event_capacity() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: String::new(),
            database_file: default_database_file(),
            in_memory: false,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::default_data_dir().join("config.toml"))
    }

    /// Load configuration from `path`, falling back to defaults if absent.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: ServiceConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Configuration with an in-memory database, for tests and replay.
    pub fn in_memory() -> Self {
        let mut config = Self::default();
        config.storage.in_memory = true;
        config
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    /// Get the database file path.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join(&self.storage.database_file)
    }

    /// Decode the configured admin ids.
    pub fn admin_ids(&self) -> Result<Vec<UserId>, ServiceError> {
        self.access
            .admins
            .iter()
            .map(|admin| decode_id(admin, "admin id"))
            .collect()
    }

    /// Decode the configured reward asset.
    pub fn reward_asset(&self) -> Result<AssetId, ServiceError> {
        if self.ledger.reward_asset.is_empty() {
            return Ok(REWARD_ASSET);
        }
        decode_id(&self.ledger.reward_asset, "reward asset")
    }

    /// Platform default data directory.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            return PathBuf::from(dir);
        }
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".tally"))
            .unwrap_or_else(|_| PathBuf::from("/tmp/tally"))
    }
}

fn decode_id(value: &str, what: &str) -> Result<[u8; 32], ServiceError> {
    let bytes = hex::decode(value)
        .map_err(|e| ServiceError::Config(format!("{what} {value:?}: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| ServiceError::Config(format!("{what} {value:?}: expected 32 bytes")))
}
