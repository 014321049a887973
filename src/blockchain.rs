//! # Chain Access Layer
//!
//! A thin, retrying interface over the rollup's JSON-RPC API. The network
//! carries non-standard transaction types, so block receipts cannot come from
//! `eth_getBlockReceipts`: the client first fetches the block with only its
//! transaction-hash list, then fetches each receipt individually. Both steps
//! retry transient failures with a linear backoff before surfacing the error
//! to the scanner.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{TransactionReceipt, H256, U64};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::BlockchainConfig;
use crate::errors::BlockchainError;

/// Attempts per RPC call; backoff between attempts is 1s, 2s, 3s.
const RPC_MAX_ATTEMPTS: u64 = 3;

/// Read access to the chain, mockable in tests.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Height of the most recent block.
    async fn latest_block_number(&self) -> Result<u64, BlockchainError>;
    /// Height finalized under the network's "safe" tag.
    async fn safe_block_number(&self) -> Result<u64, BlockchainError>;
    /// Header timestamp of a block, in seconds.
    async fn block_timestamp(&self, block_number: u64) -> Result<u64, BlockchainError>;
    /// All transaction receipts of a block.
    async fn block_receipts(&self, block_number: u64)
        -> Result<Vec<TransactionReceipt>, BlockchainError>;
}

/// Block body reduced to the transaction-hash list (`full = false`).
#[derive(Debug, Serialize, Deserialize)]
struct BlockTxHashes {
    transactions: Vec<H256>,
}

/// Block header reduced to its number, for tag lookups.
#[derive(Debug, Serialize, Deserialize)]
struct BlockNumberOnly {
    number: U64,
}

#[derive(Debug, Clone)]
pub struct ChainClient {
    provider: Arc<Provider<Http>>,
    chain_id: u64,
}

impl ChainClient {
    /// Connect to the RPC endpoint and verify its chain id against the
    /// configuration. A mismatch is startup-fatal.
    pub async fn connect(config: &BlockchainConfig) -> Result<Self, BlockchainError> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| BlockchainError::Provider(e.to_string()))?;
        let reported = provider
            .get_chainid()
            .await
            .map_err(|e| BlockchainError::Provider(e.to_string()))?
            .as_u64();
        if reported != config.chain_id {
            return Err(BlockchainError::ChainIdMismatch {
                expected: config.chain_id,
                actual: reported,
            });
        }
        info!(rpc_url = %config.rpc_url, chain_id = reported, "chain client connected");
        Ok(Self { provider: Arc::new(provider), chain_id: reported })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

#[async_trait]
impl ChainSource for ChainClient {
    async fn latest_block_number(&self) -> Result<u64, BlockchainError> {
        let number = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| BlockchainError::Provider(e.to_string()))?;
        Ok(number.as_u64())
    }

    async fn safe_block_number(&self) -> Result<u64, BlockchainError> {
        let header: Option<BlockNumberOnly> = self
            .provider
            .request("eth_getBlockByNumber", ("safe", false))
            .await
            .map_err(|e| BlockchainError::Provider(e.to_string()))?;
        let header = header
            .ok_or_else(|| BlockchainError::InvalidResponse("no block under the safe tag".into()))?;
        Ok(header.number.as_u64())
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<u64, BlockchainError> {
        let block = self
            .provider
            .get_block(block_number)
            .await
            .map_err(|e| BlockchainError::Provider(e.to_string()))?
            .ok_or(BlockchainError::BlockNotFound(block_number))?;
        Ok(block.timestamp.as_u64())
    }

    async fn block_receipts(
        &self,
        block_number: u64,
    ) -> Result<Vec<TransactionReceipt>, BlockchainError> {
        // Step 1: the tx-hash list only. Asking for full transactions would
        // make the provider parse the rollup's nonstandard tx envelopes.
        let provider = self.provider.clone();
        let block: BlockTxHashes = with_retry("eth_getBlockByNumber", move || {
            let provider = provider.clone();
            async move {
                let block: Option<BlockTxHashes> = provider
                    .request("eth_getBlockByNumber", (format!("{:#x}", block_number), false))
                    .await
                    .map_err(|e| BlockchainError::Provider(e.to_string()))?;
                block.ok_or(BlockchainError::BlockNotFound(block_number))
            }
        })
        .await?;

        // Step 2: one receipt per transaction.
        let mut receipts = Vec::with_capacity(block.transactions.len());
        for tx_hash in block.transactions {
            let provider = self.provider.clone();
            let receipt = with_retry("eth_getTransactionReceipt", move || {
                let provider = provider.clone();
                async move {
                    provider
                        .get_transaction_receipt(tx_hash)
                        .await
                        .map_err(|e| BlockchainError::Provider(e.to_string()))?
                        .ok_or_else(|| {
                            BlockchainError::InvalidResponse(format!(
                                "missing receipt for {tx_hash:#x}"
                            ))
                        })
                }
            })
            .await?;
            receipts.push(receipt);
        }
        Ok(receipts)
    }
}

/// Run an RPC call with up to [`RPC_MAX_ATTEMPTS`] attempts and a linear
/// backoff between them. The last error surfaces to the caller.
async fn with_retry<T, F, Fut>(op: &str, mut call: F) -> Result<T, BlockchainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BlockchainError>>,
{
    let mut attempt = 0u64;
    loop {
        attempt += 1;
        match call().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < RPC_MAX_ATTEMPTS => {
                warn!(%error, op, attempt, "RPC call failed, retrying");
                sleep(Duration::from_secs(attempt)).await;
            }
            Err(error) => return Err(error),
        }
    }
}
