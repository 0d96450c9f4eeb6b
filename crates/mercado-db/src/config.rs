//! Engine configuration.
//!
//! Loaded from environment variables with fallback to defaults.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use mercado_core::FREQUENT_PRODUCTS_LIMIT;

use crate::pool::DbConfig;

/// Settings a host process needs to open the engine's store.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Pool size
    pub max_connections: u32,

    /// How long a writer waits for the SQLite lock, in milliseconds
    pub busy_timeout_ms: u64,

    /// Best sellers tagged as frequent after each sale
    pub frequent_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            database_path: PathBuf::from("./mercado.db"),
            max_connections: 5,
            busy_timeout_ms: 5000,
            frequent_limit: FREQUENT_PRODUCTS_LIMIT,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// ## Environment Variables
    /// - `MERCADO_DB_PATH`: database file (default `./mercado.db`)
    /// - `MERCADO_DB_MAX_CONNECTIONS`: pool size (default 5)
    /// - `MERCADO_BUSY_TIMEOUT_MS`: writer lock wait (default 5000)
    /// - `MERCADO_FREQUENT_LIMIT`: frequent products (default 3)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = EngineConfig::default();

        let config = EngineConfig {
            database_path: lookup("MERCADO_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),

            max_connections: lookup("MERCADO_DB_MAX_CONNECTIONS")
                .unwrap_or_else(|| defaults.max_connections.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("MERCADO_DB_MAX_CONNECTIONS".to_string()))?,

            busy_timeout_ms: lookup("MERCADO_BUSY_TIMEOUT_MS")
                .unwrap_or_else(|| defaults.busy_timeout_ms.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("MERCADO_BUSY_TIMEOUT_MS".to_string()))?,

            frequent_limit: lookup("MERCADO_FREQUENT_LIMIT")
                .unwrap_or_else(|| defaults.frequent_limit.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("MERCADO_FREQUENT_LIMIT".to_string()))?,
        };

        if config.database_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired("MERCADO_DB_PATH".to_string()));
        }
        if config.max_connections == 0 {
            return Err(ConfigError::InvalidValue("MERCADO_DB_MAX_CONNECTIONS".to_string()));
        }

        Ok(config)
    }

    /// Pool configuration for these settings.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database_path.clone())
            .max_connections(self.max_connections)
            .busy_timeout(Duration::from_millis(self.busy_timeout_ms))
            .frequent_limit(self.frequent_limit)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
