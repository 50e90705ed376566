//! Database configuration.

use std::env;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub database_url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,

    /// Idle connection timeout in seconds
    pub idle_timeout_secs: u64,

    /// Maximum connection lifetime in seconds
    pub max_lifetime_secs: u64,
}

/// Problem reading database settings from the environment
#[derive(Debug, thiserror::Error)]
#[error("{var} is invalid: {reason}")]
pub struct DatabaseConfigError {
    pub var: &'static str,
    pub reason: String,
}

fn env_or<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, DatabaseConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(raw) => raw.parse().map_err(|e: T::Err| DatabaseConfigError {
            var,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

impl DatabaseConfig {
    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `DATABASE_URL`: PostgreSQL connection string (required)
    /// - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 20)
    /// - `DB_MIN_CONNECTIONS`: Minimum pool size (default: 2)
    /// - `DB_CONNECTION_TIMEOUT`: Connection timeout in seconds (default: 10)
    /// - `DB_IDLE_TIMEOUT`: Idle timeout in seconds (default: 600)
    /// - `DB_MAX_LIFETIME`: Max lifetime in seconds (default: 1800)
    pub fn from_env() -> Result<Self, DatabaseConfigError> {
        let database_url = env::var("DATABASE_URL").map_err(|_| DatabaseConfigError {
            var: "DATABASE_URL",
            reason: "must be set when STORAGE_BACKEND=postgres".to_string(),
        })?;

        Ok(Self {
            database_url,
            max_connections: env_or("DB_MAX_CONNECTIONS", 20)?,
            min_connections: env_or("DB_MIN_CONNECTIONS", 2)?,
            connection_timeout_secs: env_or("DB_CONNECTION_TIMEOUT", 10)?,
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT", 600)?,
            max_lifetime_secs: env_or("DB_MAX_LIFETIME", 1800)?,
        })
    }

    /// Local development defaults
    pub fn development() -> Self {
        Self {
            database_url: "postgres://postgres@localhost/race_cup".to_string(),
            max_connections: 20,
            min_connections: 2,
            connection_timeout_secs: 10,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::development()
    }
}
