use std::path::PathBuf;

use common::RetryPolicy;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    /// Allowed origins. Empty disables the CORS layer; `"*"` allows any.
    #[serde(default)]
    pub allow_origins: Vec<String>,
    #[serde(default = "default_cors_max_age")]
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: Vec::new(),
            max_age: default_cors_max_age(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

/// Where blob bytes live and how large an upload may be.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub root: PathBuf,
    /// Upload cap in bytes. Default: 10 MiB.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct SearchConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

/// Retry bounds for hash-creation races, and bulk limits.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct DedupConfig {
    /// Upper bound on ids accepted by one bulk delete.
    #[serde(default = "default_max_bulk_ids")]
    pub max_bulk_ids: usize,
    #[serde(default = "default_max_create_retries")]
    pub max_create_retries: u8,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
}

impl DedupConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_create_retries.max(1),
            base_ms: self.retry_base_ms,
            max_ms: self.retry_max_ms,
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            max_bulk_ids: default_max_bulk_ids(),
            max_create_retries: default_max_create_retries(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_ms: default_retry_max_ms(),
        }
    }
}

/// Background orphan scan. Disabled unless an interval is set.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ReconcileConfig {
    pub scan_interval_secs: Option<u64>,
    /// Free zero-reference blobs found by the periodic scan.
    #[serde(default)]
    pub auto_collect: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("database.url", "sqlite://./data/catalog.db?mode=rwc")?
            .set_default("storage.root", "./data/blobs")?
            // Load from config/config.toml
            .add_source(File::with_name("config/config").required(false))
            // Override from environment (e.g., DEDUPE__STORAGE__MAX_UPLOAD_SIZE)
            .add_source(Environment::with_prefix("DEDUPE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

fn default_cors_max_age() -> u64 {
    3600
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    1
}
fn default_max_upload_size() -> u64 {
    10 * 1024 * 1024
}
fn default_page_size() -> u64 {
    20
}
fn default_max_page_size() -> u64 {
    100
}
fn default_max_bulk_ids() -> usize {
    100
}
fn default_max_create_retries() -> u8 {
    3
}
fn default_retry_base_ms() -> u64 {
    10
}
fn default_retry_max_ms() -> u64 {
    200
}
