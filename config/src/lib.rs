//! # Configuration Management for QueryHaus
//!
//! This crate provides centralized configuration structures for all QueryHaus
//! components, including database, result cache, and signal system settings.
//!
//! ## Quick Start
//!
//! ### Programmatic Configuration
//! ```rust
//! use config::{DatabaseConfig, CacheConfig, SignalConfig};
//!
//! // Database configuration
//! let db_config = DatabaseConfig::new(
//!     "postgres".to_string(),
//!     "localhost".to_string(), 5432, "myapp".to_string(),
//!     "postgres".to_string(), "password".to_string(),
//!     1, 10, 30,
//! );
//!
//! // Result cache configuration
//! let cache_config = CacheConfig::new(true, 30_000, 10_000);
//!
//! // Signal configuration
//! let signal_config = SignalConfig::new(30, 100);
//! ```
//!
//! ### TOML File Configuration
//! ```toml
//! [database]
//! dialect = "postgres"
//! host = "localhost"
//! port = 5432
//! database = "myapp"
//! username = "postgres"
//! password = "password"
//! min_connections = 1
//! max_connections = 10
//! connection_timeout_seconds = 30
//!
//! [cache]
//! enabled = true
//! default_ttl_ms = 30000
//! max_entries = 10000
//!
//! [signal]
//! subscriber_timeout_seconds = 30
//! max_subscribers = 100
//! ```
//!
//! Load configuration:
//! ```rust,no_run
//! use config::AppConfig;
//!
//! // Load from queryhaus.toml
//! let config = AppConfig::load().unwrap();
//!
//! // Or load from custom path
//! let config = AppConfig::from_file("config/production.toml").unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::{env, path::Path};
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "./queryhaus.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Environment variable error: {0}")]
    Env(#[from] env::VarError),
    #[error("Dotenvy error: {0}")]
    Dotenvy(#[from] dotenvy::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub signal: SignalConfig,
}

/// Database configuration
///
/// `dialect` selects the SQL surface queries are rendered for (e.g.
/// "postgres", "mysql", "sqlite", "mssql"); parsing the tag is the job of
/// the query-object crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub dialect: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub connection_timeout_seconds: u64,
}

/// Query result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub default_ttl_ms: u64,
    pub max_entries: usize,
}

/// Signal system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    pub subscriber_timeout_seconds: u64,
    pub max_subscribers: usize,
}

impl AppConfig {
    /// Load configuration from TOML file specified in .env or defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config = {
            dotenvy::dotenv()?;

            // Try to load .env file for QUERYHAUS_CONFIG path
            if let Ok(config_path) = env::var("QUERYHAUS_CONFIG") {
                Self::from_file(&config_path)
            }
            // Try to load config from DEFAULT_CONFIG_PATH
            else if Path::new(DEFAULT_CONFIG_PATH).exists() {
                Self::from_file(DEFAULT_CONFIG_PATH)
            }
            // Return error if neither .env file nor default config file exists
            else {
                Err(ConfigError::Invalid(format!(
                    "Config path must be specified in .env file as QUERYHAUS_CONFIG or in {} file",
                    DEFAULT_CONFIG_PATH
                )))
            }
        }?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<(), ConfigError> {
        // Database validations
        if self.database.dialect.is_empty() {
            return Err(ConfigError::Invalid(
                "Database dialect cannot be empty".to_string(),
            ));
        }
        if self.database.host.is_empty() {
            return Err(ConfigError::Invalid(
                "Database host cannot be empty".to_string(),
            ));
        }
        if self.database.port == 0 {
            return Err(ConfigError::Invalid(
                "Database port cannot be zero".to_string(),
            ));
        }
        if self.database.database.is_empty() {
            return Err(ConfigError::Invalid(
                "Database name cannot be empty".to_string(),
            ));
        }
        if self.database.username.is_empty() {
            return Err(ConfigError::Invalid(
                "Database username cannot be empty".to_string(),
            ));
        }
        if self.database.min_connections == 0 {
            return Err(ConfigError::Invalid(
                "Database min_connections must be greater than 0".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "Database max_connections must be greater than 0".to_string(),
            ));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid(
                "Database min_connections cannot be greater than max_connections".to_string(),
            ));
        }
        if self.database.connection_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "Database connection_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        // Cache validations
        if self.cache.enabled && self.cache.default_ttl_ms == 0 {
            return Err(ConfigError::Invalid(
                "Cache default_ttl_ms must be greater than 0 when the cache is enabled".to_string(),
            ));
        }
        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid(
                "Cache max_entries must be greater than 0 when the cache is enabled".to_string(),
            ));
        }

        // Signal validations
        if self.signal.max_subscribers == 0 {
            return Err(ConfigError::Invalid(
                "Signal max_subscribers must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl CacheConfig {
    /// Create a new cache configuration
    pub fn new(enabled: bool, default_ttl_ms: u64, max_entries: usize) -> Self {
        Self {
            enabled,
            default_ttl_ms,
            max_entries,
        }
    }
}

impl SignalConfig {
    /// Create a new signal configuration
    pub fn new(subscriber_timeout_seconds: u64, max_subscribers: usize) -> Self {
        Self {
            subscriber_timeout_seconds,
            max_subscribers,
        }
    }
}

impl DatabaseConfig {
    /// Create a new database configuration
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dialect: String,
        host: String,
        port: u16,
        database: String,
        username: String,
        password: String,
        min_connections: u32,
        max_connections: u32,
        connection_timeout_seconds: u64,
    ) -> Self {
        Self {
            dialect,
            host,
            port,
            database,
            username,
            password,
            min_connections,
            max_connections,
            connection_timeout_seconds,
        }
    }

    /// Build connection string
    pub fn connection_string(&self) -> String {
        format!(
            "{}://{}:{}@{}:{}/{}",
            self.dialect, self.username, self.password, self.host, self.port, self.database
        )
    }
}
