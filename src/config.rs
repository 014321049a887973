//! # Configuration System
//!
//! One JSON document maps onto the [`Config`] struct below. The loader reads
//! the file, deserializes it, and validates the handful of fields whose
//! absence can only be discovered at runtime otherwise (RPC endpoint, chain
//! id, database coordinates).

use std::path::{Path, PathBuf};

use ethers::types::Address;
use eyre::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::types::{PoolKind, PoolVersion};

/// Worker count used when `scanner.workers` is zero or absent.
pub const DEFAULT_SCAN_WORKERS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub blockchain: BlockchainConfig,
    pub syncswap: SyncswapConfig,
    pub scanner: ScannerConfig,
    pub abi: AbiConfig,
    pub database: DatabaseConfig,
    /// Parsed for compatibility with existing deployments; the indexer never
    /// opens a Redis connection.
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub environment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockchainConfig {
    #[serde(default)]
    pub network: String,
    pub chain_id: u64,
    pub rpc_url: String,
    #[serde(default)]
    pub rpc_backups: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncswapConfig {
    pub factories: ContractSet,
    pub pool_masters: ContractSet,
    /// Router addresses ride along in the document but are not indexed.
    #[serde(default)]
    pub routers: Option<RouterConfig>,
}

/// The nine tracked contract addresses, one per (pool kind, version) pair.
/// The same shape serves both the factories and the pool masters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractSet {
    pub classic_v1: Address,
    pub stable_v1: Address,
    pub classic_v2: Address,
    pub stable_v2: Address,
    pub aqua_v2: Address,
    pub classic_v2_1: Address,
    pub stable_v2_1: Address,
    pub aqua_v2_1: Address,
    pub range_v3: Address,
}

impl ContractSet {
    /// Addresses tagged with the (kind, version) tuple they decode for.
    pub fn entries(&self) -> [(PoolKind, PoolVersion, Address); 9] {
        [
            (PoolKind::Classic, PoolVersion::V1, self.classic_v1),
            (PoolKind::Stable, PoolVersion::V1, self.stable_v1),
            (PoolKind::Classic, PoolVersion::V2, self.classic_v2),
            (PoolKind::Stable, PoolVersion::V2, self.stable_v2),
            (PoolKind::Aqua, PoolVersion::V2, self.aqua_v2),
            (PoolKind::Classic, PoolVersion::V2_1, self.classic_v2_1),
            (PoolKind::Stable, PoolVersion::V2_1, self.stable_v2_1),
            (PoolKind::Aqua, PoolVersion::V2_1, self.aqua_v2_1),
            (PoolKind::Range, PoolVersion::V3, self.range_v3),
        ]
    }

    pub fn all(&self) -> [Address; 9] {
        self.entries().map(|(_, _, address)| address)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub v1: Option<Address>,
    #[serde(default)]
    pub v2: Option<Address>,
    #[serde(default)]
    pub v3: Option<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub start_block: u64,
    pub batch_size: u64,
    pub batch_interval_size: u64,
    #[serde(default)]
    pub workers: usize,
}

impl ScannerConfig {
    pub fn workers(&self) -> usize {
        if self.workers == 0 {
            DEFAULT_SCAN_WORKERS
        } else {
            self.workers
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbiConfig {
    pub auto_download: bool,
    pub getabi_endpoint: String,
    pub save_dir: PathBuf,
    /// Union of the factory and pool-master addresses.
    pub addresses: Vec<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub db: i64,
    #[serde(default)]
    pub pool_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
    #[serde(default)]
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: String::new() }
    }
}

impl Config {
    /// Load and validate the configuration from a single JSON file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from JSON: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.blockchain.rpc_url.is_empty() {
            bail!("blockchain.rpc_url must not be empty");
        }
        if self.blockchain.chain_id == 0 {
            bail!("blockchain.chain_id must not be zero");
        }
        if self.database.host.is_empty() {
            bail!("database.host must not be empty");
        }
        if self.database.dbname.is_empty() {
            bail!("database.dbname must not be empty");
        }
        if self.scanner.batch_size == 0 {
            bail!("scanner.batch_size must be at least 1");
        }
        if self.abi.auto_download && self.abi.getabi_endpoint.is_empty() {
            bail!("abi.getabi_endpoint is required when abi.auto_download is enabled");
        }
        Ok(())
    }
}
