//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use race_cup::{
    db::DatabaseConfig,
    tournament::{CoordinatorSettings, Seeding},
};
use std::{net::SocketAddr, str::FromStr, time::Duration};

/// Where tournaments and balances are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Process memory; everything is lost on restart
    Memory,
    /// PostgreSQL through sqlx
    Postgres,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            other => Err(ConfigError::Invalid {
                var: "STORAGE_BACKEND".to_string(),
                reason: format!("Unknown backend {other:?}, expected memory or postgres"),
            }),
        }
    }
}

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Storage backend
    pub storage: StorageBackend,
    /// Database configuration, present for the postgres backend
    pub database: Option<DatabaseConfig>,
    /// HS256 secret shared with the auth service that issues player tokens
    pub jwt_secret: String,
    /// Coins a player starts with the first time the ledger sees them
    pub opening_balance: i64,
    /// Tournament coordinator tuning
    pub coordinator: CoordinatorSettings,
    /// How often finished tournaments are swept
    pub cleanup_interval: Duration,
    /// Events buffered per WebSocket subscriber before it lags
    pub event_capacity: usize,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `storage_override` - Optional storage backend override (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        storage_override: Option<StorageBackend>,
    ) -> Result<Self, ConfigError> {
        let bind = match bind_override {
            Some(bind) => bind,
            None => parse_env("SERVER_BIND")?.unwrap_or(SocketAddr::from(([127, 0, 0, 1], 7070))),
        };

        let storage = match storage_override {
            Some(storage) => storage,
            None => parse_env("STORAGE_BACKEND")?.unwrap_or(StorageBackend::Memory),
        };

        let database = match storage {
            StorageBackend::Memory => None,
            StorageBackend::Postgres => {
                Some(DatabaseConfig::from_env().map_err(|e| ConfigError::Invalid {
                    var: e.var.to_string(),
                    reason: e.reason,
                })?)
            }
        };

        let jwt_secret = std::env::var("JWT_SECRET").map_err(|_| ConfigError::MissingRequired {
            var: "JWT_SECRET".to_string(),
            hint: "Use the same secret as the auth service".to_string(),
        })?;

        let seeding = match std::env::var("SEEDING") {
            Ok(v) => match v.to_lowercase().as_str() {
                "shuffled" | "random" => Seeding::Shuffled,
                "join_order" => Seeding::JoinOrder,
                other => {
                    return Err(ConfigError::Invalid {
                        var: "SEEDING".to_string(),
                        reason: format!("Unknown seeding {other:?}, expected shuffled or join_order"),
                    });
                }
            },
            Err(_) => Seeding::Shuffled,
        };

        let defaults = CoordinatorSettings::default();
        let coordinator = CoordinatorSettings {
            seeding,
            external_timeout: Duration::from_millis(parse_env_or(
                "EXTERNAL_TIMEOUT_MS",
                defaults.external_timeout.as_millis() as u64,
            )),
            inbox_capacity: parse_env_or("TOURNAMENT_INBOX_CAPACITY", defaults.inbox_capacity),
            retention: chrono::Duration::days(parse_env_or(
                "TOURNAMENT_RETENTION_DAYS",
                defaults.retention.num_days(),
            )),
        };

        Ok(ServerConfig {
            bind,
            storage,
            database,
            jwt_secret,
            opening_balance: parse_env_or("OPENING_BALANCE", 1000),
            coordinator,
            cleanup_interval: Duration::from_secs(parse_env_or("CLEANUP_INTERVAL_SECS", 3600)),
            event_capacity: parse_env_or("EVENT_BUFFER", 256),
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                var: "JWT_SECRET".to_string(),
                reason: "Must be at least 32 characters (128-bit security)".to_string(),
            });
        }

        if self.opening_balance < 0 {
            return Err(ConfigError::Invalid {
                var: "OPENING_BALANCE".to_string(),
                reason: "Must not be negative".to_string(),
            });
        }

        if self.coordinator.external_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: "EXTERNAL_TIMEOUT_MS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.coordinator.inbox_capacity == 0 {
            return Err(ConfigError::Invalid {
                var: "TOURNAMENT_INBOX_CAPACITY".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.coordinator.retention < chrono::Duration::zero() {
            return Err(ConfigError::Invalid {
                var: "TOURNAMENT_RETENTION_DAYS".to_string(),
                reason: "Must not be negative".to_string(),
            });
        }

        if self.cleanup_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "CLEANUP_INTERVAL_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse an optional variable, rejecting values that are set but malformed
fn parse_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(v) => v.parse().map(Some).map_err(|e: T::Err| ConfigError::Invalid {
            var: key.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(None),
    }
}
