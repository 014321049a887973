//! Domain model: pools, swap events and scan progress.
//!
//! Addresses and hashes are `ethers` types in memory and lowercase hex
//! strings at the database boundary; amounts are decimal strings wide enough
//! for a 256-bit integer.

use std::fmt;
use std::str::FromStr;

use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};

/// Task name of the persisted stable-scan cursor.
pub const STABLE_SCAN_TASK: &str = "stable_scan";

/// SyncSwap pool family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolKind {
    Classic,
    Stable,
    Aqua,
    Range,
}

impl PoolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::Stable => "stable",
            Self::Aqua => "aqua",
            Self::Range => "range",
        }
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "classic" => Ok(Self::Classic),
            "stable" => Ok(Self::Stable),
            "aqua" => Ok(Self::Aqua),
            "range" => Ok(Self::Range),
            other => Err(format!("unknown pool type: {other}")),
        }
    }
}

/// Contract generation of a pool, as deployed by its factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolVersion {
    #[serde(rename = "v1")]
    V1,
    #[serde(rename = "v2")]
    V2,
    #[serde(rename = "v2.1")]
    V2_1,
    #[serde(rename = "v3")]
    V3,
}

impl PoolVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
            Self::V2_1 => "v2.1",
            Self::V3 => "v3",
        }
    }
}

impl fmt::Display for PoolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "v1" => Ok(Self::V1),
            "v2" => Ok(Self::V2),
            "v2.1" => Ok(Self::V2_1),
            "v3" => Ok(Self::V3),
            other => Err(format!("unknown pool version: {other}")),
        }
    }
}

/// Finality state of a persisted swap row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Finality {
    /// At or below the network's safe head at write time.
    Safe,
    /// Above the safe head; rewritten or deleted by later sweeps.
    Pending,
}

impl Finality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Pending => "pending",
        }
    }
}

impl fmt::Display for Finality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Finality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "safe" => Ok(Self::Safe),
            "pending" => Ok(Self::Pending),
            other => Err(format!("unknown finality status: {other}")),
        }
    }
}

/// A pool deployed by one of the tracked factories.
///
/// Created once on observing a PoolCreated log and never mutated by the
/// indexer; soft deletion belongs to external tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    pub pool_address: Address,
    pub factory_address: Address,
    pub pool_kind: PoolKind,
    pub version: PoolVersion,
    pub token0: Address,
    pub token1: Address,
    /// Nullable by design: absence of a fee field is not a zero fee.
    pub fee_rate: Option<i32>,
    pub created_tx: H256,
    pub created_block: u64,
}

/// A single decoded swap, identified by `(tx_hash, log_index)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapEvent {
    pub block_number: u64,
    pub block_timestamp: i64,
    pub tx_hash: H256,
    pub log_index: u64,
    pub pool_address: Address,
    pub sender: Address,
    pub recipient: Address,
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: String,
    pub amount_out: String,
    pub finality: Finality,
}

/// Lowercase `0x…` rendering used for every address column.
pub fn addr_hex(address: &Address) -> String {
    format!("{address:#x}")
}

/// Lowercase `0x…` rendering used for every hash column.
pub fn hash_hex(hash: &H256) -> String {
    format!("{hash:#x}")
}
