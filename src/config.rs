//! Service configuration from environment variables

use std::env;

#[derive(Debug)]
pub enum ConfigError {
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Runtime configuration, loaded once at startup.
///
/// Environment variables:
/// - `CROPSTAT_DB_PATH` (default: cropstat.db)
/// - `RUST_LOG` (default: info)
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub db_path: String,
    pub rust_log: String,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_path = env::var("CROPSTAT_DB_PATH").unwrap_or_else(|_| "cropstat.db".to_string());
        if db_path.is_empty() {
            return Err(ConfigError::InvalidValue(
                "CROPSTAT_DB_PATH cannot be empty".to_string(),
            ));
        }

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(Self { db_path, rust_log })
    }
}
