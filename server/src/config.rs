//! Configuration management for the server.

use std::env;

/// Largest increment accepted when `MAX_INCREMENT` is unset.
pub const DEFAULT_MAX_INCREMENT: u64 = 8;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Upper bound for a single increment's amount
    pub max_increment: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;

        let max_increment = match env::var("MAX_INCREMENT") {
            Ok(value) => value
                .parse()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidMaxIncrement)?,
            Err(_) => DEFAULT_MAX_INCREMENT,
        };

        Ok(Self {
            host,
            port,
            database_url,
            max_increment,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("MAX_INCREMENT must be a positive integer")]
    InvalidMaxIncrement,
}
