//! # Centralized Error Handling
//!
//! One typed error enum per subsystem, folded into the top-level
//! [`IndexerError`]. Keeping the hierarchy typed (instead of matching on
//! error message strings) is what lets the persistence layer distinguish a
//! unique-constraint conflict from a real failure.

use thiserror::Error;

/// The top-level error type for daemon startup and worker supervision.
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Blockchain error: {0}")]
    Blockchain(#[from] BlockchainError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("ABI registry error: {0}")]
    Abi(#[from] AbiError),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors from the chain access layer.
#[derive(Error, Debug)]
pub enum BlockchainError {
    #[error("RPC provider error: {0}")]
    Provider(String),
    #[error("chain id mismatch: node reports {actual}, config expects {expected}")]
    ChainIdMismatch { expected: u64, actual: u64 },
    #[error("block {0} not found")]
    BlockNotFound(u64),
    #[error("invalid RPC response: {0}")]
    InvalidResponse(String),
}

/// Errors from the persistence layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),
    #[error("database pool build error: {0}")]
    Build(#[from] deadpool_postgres::CreatePoolError),
    #[error("database query error: {0}")]
    Query(#[from] tokio_postgres::Error),
    #[error("database row error: {0}")]
    Row(String),
}

/// Errors from ABI loading and the explorer download path.
#[derive(Error, Debug)]
pub enum AbiError {
    #[error("failed to read ABI file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse ABI for {address}: {source}")]
    Parse {
        address: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("ABI for {0} is missing and auto-download is disabled")]
    Missing(String),
    #[error("explorer request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("explorer rejected ABI request for {address}: {message}")]
    Explorer { address: String, message: String },
}
