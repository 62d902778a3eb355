//! Configuration management for the warehouse ledger service
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with WMS_ prefix

use config::{ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{validate_thresholds, AlertThresholds};

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Authentication gate configuration
    pub auth: AuthConfig,

    /// Inventory defaults
    pub inventory: InventoryConfig,

    /// Fallback alert thresholds
    pub alerts: AlertConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Secret key for verifying HS256 bearer tokens
    pub jwt_secret: String,

    /// Static key accepted in the X-API-Key header
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InventoryConfig {
    /// Warehouse used when neither the request nor the order names one
    pub default_warehouse_code: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertConfig {
    pub global_min_qty: Decimal,
    pub expiry_days: i64,
    pub slow_days: i64,
}

impl AlertConfig {
    /// The fallback thresholds obey the same bounds as stored ones.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_thresholds(&AlertThresholds::from(self))
            .map_err(|msg| ConfigError::Message(format!("alerts: {}", msg)))
    }
}

impl From<&AlertConfig> for AlertThresholds {
    fn from(config: &AlertConfig) -> Self {
        AlertThresholds {
            global_min_qty: config.global_min_qty,
            expiry_days: config.expiry_days,
            slow_days: config.slow_days,
        }
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("WMS_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("auth.jwt_secret", "development-secret-key")?
            .set_default("inventory.default_warehouse_code", "MAIN")?
            .set_default("alerts.global_min_qty", "0")?
            .set_default("alerts.expiry_days", 30)?
            .set_default("alerts.slow_days", 0)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (WMS_ prefix)
            .add_source(
                Environment::with_prefix("WMS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.alerts.validate()?;
        Ok(config)
    }

    /// Configuration for tests and tooling that never touches the environment
    pub fn for_tests(database_url: &str) -> Self {
        Self {
            environment: "test".to_string(),
            server: ServerConfig::default(),
            database: DatabaseConfig {
                url: database_url.to_string(),
                max_connections: 1,
                min_connections: 0,
            },
            auth: AuthConfig {
                jwt_secret: "test-secret".to_string(),
                api_key: Some("test-api-key".to_string()),
            },
            inventory: InventoryConfig {
                default_warehouse_code: "MAIN".to_string(),
            },
            alerts: AlertConfig {
                global_min_qty: Decimal::ZERO,
                expiry_days: 30,
                slow_days: 0,
            },
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}
