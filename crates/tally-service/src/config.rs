//! # Service Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_DATABASE_PATH=/var/lib/tally/tally.db                        │
//! │     TALLY_LOG_LEVEL=debug                                              │
//! │                                                                         │
//! │  2. TOML Config File (tally.toml)                                      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "./tally.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [log]
//! level = "info"
//!
//! [inventory]
//! movements_page_default = 50
//! movements_page_max = 200
//! low_stock_limit = 100
//! recent_movements = 20
//!
//! [business]
//! default_id = "00000000-0000-0000-0000-000000000001"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tally_core::DEFAULT_BUSINESS_ID;
use tally_db::DbConfig;
use tracing::{debug, info};

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits for SQLite's write lock.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./tally.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSettings {
    /// Fallback filter when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings {
            level: default_log_level(),
        }
    }
}

/// Page sizes for the inventory read models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventorySettings {
    #[serde(default = "default_movements_page_default")]
    pub movements_page_default: i64,

    #[serde(default = "default_movements_page_max")]
    pub movements_page_max: i64,

    #[serde(default = "default_low_stock_limit")]
    pub low_stock_limit: i64,

    /// Movements shown on the product detail view.
    #[serde(default = "default_recent_movements")]
    pub recent_movements: i64,
}

fn default_movements_page_default() -> i64 {
    50
}

fn default_movements_page_max() -> i64 {
    200
}

fn default_low_stock_limit() -> i64 {
    100
}

fn default_recent_movements() -> i64 {
    20
}

impl Default for InventorySettings {
    fn default() -> Self {
        InventorySettings {
            movements_page_default: default_movements_page_default(),
            movements_page_max: default_movements_page_max(),
            low_stock_limit: default_low_stock_limit(),
            recent_movements: default_recent_movements(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessSettings {
    /// Business used by tools that run without an authenticated caller.
    #[serde(default = "default_business_id")]
    pub default_id: String,
}

fn default_business_id() -> String {
    DEFAULT_BUSINESS_ID.to_string()
}

impl Default for BusinessSettings {
    fn default() -> Self {
        BusinessSettings {
            default_id: default_business_id(),
        }
    }
}

// =============================================================================
// Service Configuration
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub log: LogSettings,

    #[serde(default)]
    pub inventory: InventorySettings,

    #[serde(default)]
    pub business: BusinessSettings,
}

impl ServiceConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file, if `config_path` is given and exists
    /// 3. `TALLY_*` environment variables
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) if path.exists() => {
                info!(?path, "Loading config from file");
                Self::from_toml(&std::fs::read_to_string(path)?)?
            }
            Some(path) => {
                debug!(?path, "Config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Applies `TALLY_*` overrides read through `var`.
    pub fn apply_overrides<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = var("TALLY_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }
        if let Some(raw) = var("TALLY_DB_MAX_CONNECTIONS") {
            self.database.max_connections = parse_var("TALLY_DB_MAX_CONNECTIONS", &raw)?;
        }
        if let Some(raw) = var("TALLY_DB_BUSY_TIMEOUT_MS") {
            self.database.busy_timeout_ms = parse_var("TALLY_DB_BUSY_TIMEOUT_MS", &raw)?;
        }
        if let Some(level) = var("TALLY_LOG_LEVEL") {
            self.log.level = level;
        }
        if let Some(raw) = var("TALLY_MOVEMENTS_PAGE_MAX") {
            self.inventory.movements_page_max = parse_var("TALLY_MOVEMENTS_PAGE_MAX", &raw)?;
        }
        if let Some(raw) = var("TALLY_LOW_STOCK_LIMIT") {
            self.inventory.low_stock_limit = parse_var("TALLY_LOW_STOCK_LIMIT", &raw)?;
        }
        if let Some(id) = var("TALLY_DEFAULT_BUSINESS_ID") {
            self.business.default_id = id;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired("database.path".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if self.inventory.movements_page_max < 1 {
            return Err(ConfigError::Invalid(
                "inventory.movements_page_max must be at least 1".into(),
            ));
        }
        if self.inventory.movements_page_default < 1
            || self.inventory.movements_page_default > self.inventory.movements_page_max
        {
            return Err(ConfigError::Invalid(
                "inventory.movements_page_default must be between 1 and movements_page_max".into(),
            ));
        }
        if self.inventory.low_stock_limit < 1 || self.inventory.recent_movements < 1 {
            return Err(ConfigError::Invalid(
                "inventory limits must be at least 1".into(),
            ));
        }
        if self.business.default_id.trim().is_empty() {
            return Err(ConfigError::MissingRequired("business.default_id".into()));
        }
        Ok(())
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
