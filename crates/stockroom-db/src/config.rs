//! Database configuration loaded from environment variables.
//!
//! Every variable is optional; unset variables keep the [`DbConfig::new`]
//! defaults.
//!
//! ```text
//! STOCKROOM_DATABASE_PATH         ./stockroom.db
//! STOCKROOM_MAX_CONNECTIONS       5
//! STOCKROOM_MIN_CONNECTIONS       1
//! STOCKROOM_CONNECT_TIMEOUT_SECS  30
//! STOCKROOM_PURCHASE_PREFIX       ORD
//! STOCKROOM_SALE_PREFIX           ORD
//! STOCKROOM_EVENT_CAPACITY        256
//! ```

use std::env;
use std::str::FromStr;
use std::time::Duration;

use stockroom_core::invoice::validate_prefix;

use crate::pool::DbConfig;

/// Default database file when `STOCKROOM_DATABASE_PATH` is unset.
pub const DEFAULT_DATABASE_PATH: &str = "./stockroom.db";

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Inconsistent configuration: {0}")]
    Inconsistent(String),
}

impl DbConfig {
    /// Loads configuration from environment variables.
    ///
    /// ## Errors
    /// `ConfigError::InvalidValue(var)` when a variable is set but does not
    /// parse, or a prefix is not 1-10 uppercase letters or digits.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = env::var("STOCKROOM_DATABASE_PATH")
            .unwrap_or_else(|_| DEFAULT_DATABASE_PATH.to_string());

        let mut config = DbConfig::new(path);

        config.max_connections = parse_var("STOCKROOM_MAX_CONNECTIONS", config.max_connections)?;
        config.min_connections = parse_var("STOCKROOM_MIN_CONNECTIONS", config.min_connections)?;
        config.connect_timeout = Duration::from_secs(parse_var(
            "STOCKROOM_CONNECT_TIMEOUT_SECS",
            config.connect_timeout.as_secs(),
        )?);
        config.event_capacity = parse_var("STOCKROOM_EVENT_CAPACITY", config.event_capacity)?;

        if let Ok(prefix) = env::var("STOCKROOM_PURCHASE_PREFIX") {
            validate_prefix(&prefix)
                .map_err(|_| ConfigError::InvalidValue("STOCKROOM_PURCHASE_PREFIX".to_string()))?;
            config.purchase_prefix = prefix;
        }

        if let Ok(prefix) = env::var("STOCKROOM_SALE_PREFIX") {
            validate_prefix(&prefix)
                .map_err(|_| ConfigError::InvalidValue("STOCKROOM_SALE_PREFIX".to_string()))?;
            config.sale_prefix = prefix;
        }

        if config.min_connections > config.max_connections {
            return Err(ConfigError::Inconsistent(format!(
                "min_connections ({}) exceeds max_connections ({})",
                config.min_connections, config.max_connections
            )));
        }

        if config.event_capacity == 0 {
            return Err(ConfigError::InvalidValue("STOCKROOM_EVENT_CAPACITY".to_string()));
        }

        Ok(config)
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(default),
    }
}
