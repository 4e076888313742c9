//! Configuration management for the inventory backend
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with INV_ prefix

use std::time::Duration;

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use shared::OverdrawPolicy;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Inventory behaviour
    pub inventory: InventoryConfig,
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
pub struct InventoryConfig {
    /// Lifetime of cached read views, in seconds
    pub cache_ttl_secs: u64,

    /// Policy for decrements that exceed stock when the caller does not pick one
    pub overdraw_policy: OverdrawPolicy,

    /// Reorder quantity for products without one
    pub default_suggested_quantity: i64,

    /// Supplier lead time for products without one
    pub default_lead_time_days: i32,

    /// Interval between background reorder sweeps, in seconds
    pub sweep_interval_secs: u64,

    /// Buffered live-update events per subscriber
    pub broadcast_capacity: usize,
}

impl InventoryConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            overdraw_policy: OverdrawPolicy::Clamp,
            default_suggested_quantity: shared::DEFAULT_SUGGESTED_QUANTITY,
            default_lead_time_days: shared::DEFAULT_LEAD_TIME_DAYS,
            sweep_interval_secs: 900,
            broadcast_capacity: 256,
        }
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("INV_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("inventory.cache_ttl_secs", 300)?
            .set_default("inventory.overdraw_policy", "clamp")?
            .set_default("inventory.default_suggested_quantity", shared::DEFAULT_SUGGESTED_QUANTITY)?
            .set_default("inventory.default_lead_time_days", shared::DEFAULT_LEAD_TIME_DAYS as i64)?
            .set_default("inventory.sweep_interval_secs", 900)?
            .set_default("inventory.broadcast_capacity", 256)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (INV_ prefix)
            .add_source(
                Environment::with_prefix("INV")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
