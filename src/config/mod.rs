//! Configuration management for blockyard
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use blockyard::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Wait period: {}", config.compactor.wait_period);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `BLOCKYARD__<section>__<key>`
//!
//! Examples:
//! - `BLOCKYARD__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `BLOCKYARD__COMPACTOR__WAIT_PERIOD=30m`
//! - `BLOCKYARD__STORAGE__PROVIDER=s3`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/blockyard.toml`.
//! This can be overridden using the `BLOCKYARD_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

// Re-export public types
pub use crate::humanize::HumanDuration;
pub use models::{
    CompactorConfig, Config, FetcherConfig, ServerConfig, StorageConfig, StorageProvider,
    TelemetryConfig, TenantOverrides,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`BLOCKYARD__*`)
    /// 2. TOML file (default: `config/blockyard.toml`)
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_path(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Object prefix holding the given tenant's blocks
    pub fn tenant_prefix(&self, tenant: &str) -> String {
        self.tenants
            .get(tenant)
            .and_then(|o| o.prefix.as_deref())
            .map(|p| p.trim_matches('/').to_string())
            .unwrap_or_else(|| tenant.to_string())
    }
}
