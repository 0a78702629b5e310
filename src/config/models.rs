use crate::humanize::HumanDuration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub compactor: CompactorConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    /// Per-tenant overrides keyed by tenant ID
    #[serde(default)]
    pub tenants: HashMap<String, TenantOverrides>,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Storage provider type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    S3,
    #[default]
    Filesystem,
    Memory,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Root directory for the filesystem provider
    #[serde(default = "default_root")]
    pub root: PathBuf,
    pub endpoint: Option<String>,
    /// S3 access key (loaded from environment, not from config file)
    #[serde(skip)]
    pub access_key: Option<String>,
    /// S3 secret key (loaded from environment, not from config file)
    #[serde(skip)]
    pub secret_key: Option<String>,
    pub region: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::default(),
            bucket: default_bucket(),
            root: default_root(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            region: None,
        }
    }
}

fn default_bucket() -> String {
    "blocks".to_string()
}

fn default_root() -> PathBuf {
    PathBuf::from("data/blocks")
}

/// Compaction planning configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompactorConfig {
    /// Minimum age of level-1 blocks before they can be compacted. 0 disables the check.
    #[serde(default = "default_wait_period")]
    pub wait_period: HumanDuration,
    #[serde(default = "default_sync_interval")]
    pub sync_interval: HumanDuration,
    /// Number of tenants synced in parallel
    #[serde(default = "default_tenant_concurrency")]
    pub tenant_concurrency: usize,
    /// Number of meta-file attribute lookups in flight per job
    #[serde(default = "default_attributes_concurrency")]
    pub attributes_concurrency: usize,
    /// Explicit tenant allow-list; empty means discover from the bucket
    #[serde(default)]
    pub tenants: Vec<String>,
}

impl Default for CompactorConfig {
    fn default() -> Self {
        Self {
            wait_period: default_wait_period(),
            sync_interval: default_sync_interval(),
            tenant_concurrency: default_tenant_concurrency(),
            attributes_concurrency: default_attributes_concurrency(),
            tenants: Vec::new(),
        }
    }
}

fn default_wait_period() -> HumanDuration {
    HumanDuration::from_secs(15 * 60)
}

fn default_sync_interval() -> HumanDuration {
    HumanDuration::from_secs(60 * 60)
}

fn default_tenant_concurrency() -> usize {
    4
}

fn default_attributes_concurrency() -> usize {
    8
}

/// Metadata fetcher filter settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetcherConfig {
    /// Exclude ingester blocks whose min time is newer than this. 0 disables.
    #[serde(default)]
    pub min_time_limit: HumanDuration,
    /// Exclude blocks whose max time is older than this. 0 disables.
    #[serde(default)]
    pub retention: HumanDuration,
    /// Blocks marked for deletion longer than this are excluded
    #[serde(default = "default_deletion_delay")]
    pub deletion_delay: HumanDuration,
    #[serde(default)]
    pub exclude_out_of_order: bool,
    #[serde(default = "default_true")]
    pub deduplicate: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            min_time_limit: HumanDuration::ZERO,
            retention: HumanDuration::ZERO,
            deletion_delay: default_deletion_delay(),
            exclude_out_of_order: false,
            deduplicate: true,
        }
    }
}

fn default_deletion_delay() -> HumanDuration {
    HumanDuration::from_secs(12 * 60 * 60)
}

fn default_true() -> bool {
    true
}

/// Per-tenant overrides
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TenantOverrides {
    /// Object prefix holding the tenant's blocks; defaults to the tenant ID
    pub prefix: Option<String>,
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.compactor.wait_period.as_duration(), Duration::from_secs(900));
        assert_eq!(config.compactor.tenant_concurrency, 4);
        assert_eq!(config.storage.provider, StorageProvider::Filesystem);
        assert!(config.fetcher.deduplicate);
        assert!(config.fetcher.retention.is_zero());
    }
}
