//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where tracker data lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("'{}' is not one of postgres, memory", other)),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub store_backend: StoreBackend,
    /// Required when `store_backend` is `Postgres`.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub log_level: Level,
    /// Offset from UTC that decides which calendar day "today" is.
    pub utc_offset_minutes: i32,
    pub session_ttl_days: i64,
    pub cors_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. `from_env` passes the
    /// process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server ---
        let bind_address = parse_or(&lookup, "BIND_ADDRESS", SocketAddr::from(([0, 0, 0, 0], 3000)))?;
        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        // --- Storage ---
        let store_backend = parse_or(&lookup, "STORE_BACKEND", StoreBackend::Postgres)?;
        let database_url = lookup("DATABASE_URL");
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingVar("DATABASE_URL".to_string()));
        }
        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", 5u32)?;

        // --- Logging ---
        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Tracker ---
        let utc_offset_minutes = parse_or(&lookup, "UTC_OFFSET_MINUTES", 0i32)?;
        if !(-24 * 60 < utc_offset_minutes && utc_offset_minutes < 24 * 60) {
            return Err(ConfigError::InvalidValue(
                "UTC_OFFSET_MINUTES".to_string(),
                format!("{} is outside +/- 24 hours", utc_offset_minutes),
            ));
        }
        let session_ttl_days = parse_or(&lookup, "SESSION_TTL_DAYS", 30i64)?;
        if session_ttl_days <= 0 {
            return Err(ConfigError::InvalidValue(
                "SESSION_TTL_DAYS".to_string(),
                "must be positive".to_string(),
            ));
        }

        Ok(Self {
            bind_address,
            store_backend,
            database_url,
            db_max_connections,
            log_level,
            utc_offset_minutes,
            session_ttl_days,
            cors_origin,
        })
    }
}

/// Parses `key` when set, otherwise uses `default`.
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: ToString,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}
