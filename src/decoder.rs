//! # Event Decoder
//!
//! Turns one raw log plus its block metadata into either a pool record or a
//! swap record, or ignores it. The two decodings are tried in order and are
//! mutually exclusive: a log whose emitter is a tracked factory can only be a
//! PoolCreated, a log whose emitter is a cached pool can only be a Swap.
//!
//! Shape mismatches (wrong topic 0, short topic list, undecodable payload)
//! are not errors; the log simply isn't of interest. Persistence failures are
//! errors and bubble up so the scanner counts the block as failed.

use std::collections::HashMap;
use std::sync::Arc;

use ethers::abi::{self, Event, Token};
use ethers::types::{Address, Log, H256, I256, U256};
use tracing::{debug, warn};

use crate::abi_registry::AbiRegistry;
use crate::errors::StorageError;
use crate::pool_cache::PoolCache;
use crate::repository::IndexerStore;
use crate::types::{addr_hex, Finality, Pool, PoolKind, SwapEvent};

/// What the decoder did with a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedLog {
    PoolCreated,
    Swap,
    Ignored,
}

pub struct EventDecoder {
    registry: Arc<AbiRegistry>,
    pool_cache: Arc<PoolCache>,
    store: Arc<dyn IndexerStore>,
}

impl EventDecoder {
    pub fn new(
        registry: Arc<AbiRegistry>,
        pool_cache: Arc<PoolCache>,
        store: Arc<dyn IndexerStore>,
    ) -> Self {
        Self { registry, pool_cache, store }
    }

    /// Decode a single log. `finality` tags any swap row this produces.
    pub async fn decode_log(
        &self,
        block_number: u64,
        block_timestamp: i64,
        tx_hash: H256,
        log: &Log,
        finality: Finality,
    ) -> Result<DecodedLog, StorageError> {
        if self.handle_pool_log(block_number, tx_hash, log).await? {
            return Ok(DecodedLog::PoolCreated);
        }
        if self.handle_swap_log(block_number, block_timestamp, tx_hash, log, finality).await? {
            return Ok(DecodedLog::Swap);
        }
        Ok(DecodedLog::Ignored)
    }

    /// PoolCreated path: the emitter must be a tracked factory and the log
    /// must match the factory's configured event. Tokens come from the two
    /// indexed topics, the pool address from the payload.
    async fn handle_pool_log(
        &self,
        block_number: u64,
        tx_hash: H256,
        log: &Log,
    ) -> Result<bool, StorageError> {
        let Some(info) = self.registry.factory(log.address) else {
            return Ok(false);
        };
        let Some(contract_abi) = self.registry.abi(log.address) else {
            return Ok(false);
        };
        let Ok(event) = contract_abi.event(&info.event_name) else {
            return Ok(false);
        };
        if log.topics.first() != Some(&event.signature()) {
            return Ok(false);
        }
        let indexed_count = event.inputs.iter().filter(|input| input.indexed).count();
        if log.topics.len() < indexed_count + 1 {
            return Ok(false);
        }

        let token0 = Address::from_slice(&log.topics[1].as_bytes()[12..]);
        let token1 = Address::from_slice(&log.topics[2].as_bytes()[12..]);

        let fields = match unpack_event_data(event, &log.data) {
            Ok(fields) => fields,
            Err(error) => {
                warn!(%error, factory = %addr_hex(&log.address), "failed to decode PoolCreated payload");
                return Ok(false);
            }
        };
        let Some(pool_address) = fields.get("pool").and_then(|t| t.clone().into_address()) else {
            warn!(factory = %addr_hex(&log.address), "PoolCreated payload has no pool address");
            return Ok(false);
        };

        let fee_rate = info
            .fee_field
            .as_deref()
            .and_then(|field| fields.get(field))
            .and_then(|t| t.clone().into_uint())
            .map(|fee| fee.low_u64() as i32);

        let pool = Pool {
            pool_address,
            factory_address: log.address,
            pool_kind: info.pool_kind,
            version: info.version,
            token0,
            token1,
            fee_rate,
            created_tx: tx_hash,
            created_block: block_number,
        };

        self.store.save_pool(&pool).await?;
        debug!(
            pool = %addr_hex(&pool.pool_address),
            kind = %pool.pool_kind,
            version = %pool.version,
            block = block_number,
            "new pool indexed"
        );
        self.pool_cache.insert(pool).await;
        Ok(true)
    }

    /// Swap path: the emitter must already be a known pool. An uncached pool
    /// means the log is dropped; its PoolCreated block will introduce it and
    /// later sweeps pick its swaps up.
    async fn handle_swap_log(
        &self,
        block_number: u64,
        block_timestamp: i64,
        tx_hash: H256,
        log: &Log,
        finality: Finality,
    ) -> Result<bool, StorageError> {
        let Some(pool) = self.pool_cache.get(log.address).await else {
            return Ok(false);
        };
        let Some(master) = self.registry.pool_master(pool.pool_kind, pool.version) else {
            return Ok(false);
        };
        let Some(contract_abi) = self.registry.abi(master) else {
            return Ok(false);
        };
        let Ok(event) = contract_abi.event("Swap") else {
            return Ok(false);
        };
        if log.topics.first() != Some(&event.signature()) {
            return Ok(false);
        }
        if log.topics.len() < 3 {
            return Ok(false);
        }
        let Some(log_index) = log.log_index else {
            return Ok(false);
        };

        let sender = Address::from_slice(&log.topics[1].as_bytes()[12..]);
        let recipient = Address::from_slice(&log.topics[2].as_bytes()[12..]);

        let fields = match unpack_event_data(event, &log.data) {
            Ok(fields) => fields,
            Err(error) => {
                warn!(%error, pool = %addr_hex(&log.address), "failed to decode Swap payload");
                return Ok(false);
            }
        };

        let Some(direction) = swap_direction(&pool, &fields) else {
            warn!(
                pool = %addr_hex(&pool.pool_address),
                tx = %format!("{tx_hash:#x}"),
                "Swap payload amounts are inconsistent, dropping"
            );
            return Ok(false);
        };

        let swap = SwapEvent {
            block_number,
            block_timestamp,
            tx_hash,
            log_index: log_index.as_u64(),
            pool_address: pool.pool_address,
            sender,
            recipient,
            token_in: direction.token_in,
            token_out: direction.token_out,
            amount_in: direction.amount_in.to_string(),
            amount_out: direction.amount_out.to_string(),
            finality,
        };

        self.store.save_swap_event(&swap).await?;
        Ok(true)
    }
}

struct SwapDirection {
    token_in: Address,
    token_out: Address,
    amount_in: U256,
    amount_out: U256,
}

/// Resolve the traded direction from the decoded payload.
///
/// Range (v3) pools report signed `amount0`/`amount1` where the negative one
/// left the pool; the classic family reports four unsigned in/out amounts
/// where the non-zero "in" side picks the direction.
fn swap_direction(pool: &Pool, fields: &HashMap<String, Token>) -> Option<SwapDirection> {
    match pool.pool_kind {
        PoolKind::Range => {
            let amount0 = int_field(fields, "amount0")?;
            let amount1 = int_field(fields, "amount1")?;
            if amount0.is_negative() {
                Some(SwapDirection {
                    token_in: pool.token1,
                    token_out: pool.token0,
                    amount_in: amount1.unsigned_abs(),
                    amount_out: amount0.unsigned_abs(),
                })
            } else {
                Some(SwapDirection {
                    token_in: pool.token0,
                    token_out: pool.token1,
                    amount_in: amount0.unsigned_abs(),
                    amount_out: amount1.unsigned_abs(),
                })
            }
        }
        _ => {
            let amount0_in = uint_field(fields, "amount0In")?;
            let amount1_in = uint_field(fields, "amount1In")?;
            let amount0_out = uint_field(fields, "amount0Out")?;
            let amount1_out = uint_field(fields, "amount1Out")?;
            if amount0_in > U256::zero() {
                Some(SwapDirection {
                    token_in: pool.token0,
                    token_out: pool.token1,
                    amount_in: amount0_in,
                    amount_out: amount1_out,
                })
            } else {
                Some(SwapDirection {
                    token_in: pool.token1,
                    token_out: pool.token0,
                    amount_in: amount1_in,
                    amount_out: amount0_out,
                })
            }
        }
    }
}

fn uint_field(fields: &HashMap<String, Token>, name: &str) -> Option<U256> {
    fields.get(name).and_then(|t| t.clone().into_uint())
}

fn int_field(fields: &HashMap<String, Token>, name: &str) -> Option<I256> {
    fields.get(name).and_then(|t| t.clone().into_int()).map(I256::from_raw)
}

/// Decode the non-indexed payload of an event into a name → token map, the
/// way the contract ABI declares it.
fn unpack_event_data(
    event: &Event,
    data: &[u8],
) -> Result<HashMap<String, Token>, ethers::abi::Error> {
    let non_indexed: Vec<_> = event.inputs.iter().filter(|input| !input.indexed).collect();
    let kinds: Vec<_> = non_indexed.iter().map(|input| input.kind.clone()).collect();
    let tokens = abi::decode(&kinds, data)?;
    Ok(non_indexed
        .iter()
        .zip(tokens)
        .map(|(input, token)| (input.name.clone(), token))
        .collect())
}
