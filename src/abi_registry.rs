//! # ABI Registry
//!
//! Per-address decoding schemas for the tracked contracts, loaded from disk
//! at startup and optionally fetched from a block-explorer `getabi` endpoint
//! when a file is missing. Read-only once built, so lookups are plain map
//! reads with no locking.
//!
//! Two logical tables hang off the schemas: the factory descriptors (which
//! event name to decode as PoolCreated, and whether the payload carries a fee
//! field) and the pool-master table that maps a `(pool kind, version)` tuple
//! to the contract whose ABI describes the Swap event for every pool of that
//! shape.

use std::collections::HashMap;
use std::path::Path;

use ethers::abi::Abi;
use ethers::types::Address;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::{AbiConfig, SyncswapConfig};
use crate::errors::AbiError;
use crate::types::{addr_hex, PoolKind, PoolVersion};

/// How to interpret logs emitted by one tracked factory.
#[derive(Debug, Clone)]
pub struct FactoryInfo {
    pub pool_kind: PoolKind,
    pub version: PoolVersion,
    pub event_name: String,
    /// Name of a fee field in the PoolCreated payload, when the factory
    /// emits one. Absent field means a null fee, not a zero fee.
    pub fee_field: Option<String>,
}

/// The explorer `getabi` response envelope.
#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    status: String,
    message: String,
    result: String,
}

#[derive(Debug)]
pub struct AbiRegistry {
    abis: HashMap<Address, Abi>,
    factories: HashMap<Address, FactoryInfo>,
    pool_masters: HashMap<(PoolKind, PoolVersion), Address>,
}

impl AbiRegistry {
    /// Build a registry from pre-parsed parts. Production goes through
    /// [`AbiRegistry::load`]; this is the seam the tests use.
    pub fn new(
        abis: HashMap<Address, Abi>,
        factories: HashMap<Address, FactoryInfo>,
        pool_masters: HashMap<(PoolKind, PoolVersion), Address>,
    ) -> Self {
        Self { abis, factories, pool_masters }
    }

    /// Populate the registry for every configured address, downloading
    /// missing ABI files from the explorer when auto-download is enabled.
    pub async fn load(abi_config: &AbiConfig, syncswap: &SyncswapConfig) -> Result<Self, AbiError> {
        tokio::fs::create_dir_all(&abi_config.save_dir).await.map_err(|source| AbiError::Io {
            path: abi_config.save_dir.display().to_string(),
            source,
        })?;

        let client = reqwest::Client::new();
        let mut abis = HashMap::new();
        for address in &abi_config.addresses {
            let file = abi_config.save_dir.join(format!("{}.json", addr_hex(address)));
            if !file.exists() {
                if !abi_config.auto_download {
                    return Err(AbiError::Missing(addr_hex(address)));
                }
                download_abi(&client, &abi_config.getabi_endpoint, *address, &file).await?;
                info!(address = %addr_hex(address), file = %file.display(), "downloaded ABI");
            }
            abis.insert(*address, load_abi_file(*address, &file).await?);
        }
        info!(count = abis.len(), "ABI registry loaded");

        let mut factories = HashMap::new();
        for (pool_kind, version, address) in syncswap.factories.entries() {
            factories.insert(
                address,
                FactoryInfo {
                    pool_kind,
                    version,
                    event_name: "PoolCreated".to_string(),
                    fee_field: None,
                },
            );
        }

        let mut pool_masters = HashMap::new();
        for (pool_kind, version, address) in syncswap.pool_masters.entries() {
            pool_masters.insert((pool_kind, version), address);
        }

        Ok(Self::new(abis, factories, pool_masters))
    }

    /// Decoding schema for a contract address, if one was loaded.
    pub fn abi(&self, address: Address) -> Option<&Abi> {
        self.abis.get(&address)
    }

    /// Descriptor for a tracked factory address.
    pub fn factory(&self, address: Address) -> Option<&FactoryInfo> {
        self.factories.get(&address)
    }

    /// Pool-master address whose ABI describes Swap for this pool shape.
    pub fn pool_master(&self, pool_kind: PoolKind, version: PoolVersion) -> Option<Address> {
        self.pool_masters.get(&(pool_kind, version)).copied()
    }

    pub fn len(&self) -> usize {
        self.abis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.abis.is_empty()
    }
}

async fn download_abi(
    client: &reqwest::Client,
    endpoint: &str,
    address: Address,
    file: &Path,
) -> Result<(), AbiError> {
    let url = format!("{endpoint}{}", addr_hex(&address));
    debug!(%url, "requesting ABI from explorer");
    let response: ExplorerResponse = client.get(&url).send().await?.json().await?;
    if response.status != "1" {
        return Err(AbiError::Explorer { address: addr_hex(&address), message: response.message });
    }
    tokio::fs::write(file, response.result.as_bytes()).await.map_err(|source| AbiError::Io {
        path: file.display().to_string(),
        source,
    })
}

async fn load_abi_file(address: Address, file: &Path) -> Result<Abi, AbiError> {
    let json = tokio::fs::read_to_string(file).await.map_err(|source| AbiError::Io {
        path: file.display().to_string(),
        source,
    })?;
    serde_json::from_str(&json).map_err(|source| AbiError::Parse {
        address: addr_hex(&address),
        source,
    })
}
