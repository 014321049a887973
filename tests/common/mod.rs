//! Shared test fixtures: an in-memory store, a scripted chain source, and
//! builders for SyncSwap-shaped ABIs and logs.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ethers::abi::{self, Abi, Token};
use ethers::types::{Address, Log, TransactionReceipt, H256, I256, U256};

use syncswap_indexer::abi_registry::{AbiRegistry, FactoryInfo};
use syncswap_indexer::blockchain::ChainSource;
use syncswap_indexer::decoder::EventDecoder;
use syncswap_indexer::engine::ScanEngine;
use syncswap_indexer::errors::{BlockchainError, StorageError};
use syncswap_indexer::pool_cache::PoolCache;
use syncswap_indexer::repository::IndexerStore;
use syncswap_indexer::scanner::RangeScanner;
use syncswap_indexer::types::{Finality, Pool, PoolKind, PoolVersion, SwapEvent};

pub fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

pub fn hash(n: u64) -> H256 {
    H256::from_low_u64_be(n)
}

pub const TOKEN_A: u64 = 0xA;
pub const TOKEN_B: u64 = 0xB;
pub const FACTORY_CLASSIC: u64 = 0xFAC1;
pub const FACTORY_RANGE: u64 = 0xFAC3;
pub const MASTER_CLASSIC: u64 = 0xAAC1;
pub const MASTER_RANGE: u64 = 0xAAC3;
pub const POOL_CLASSIC: u64 = 0x9001;
pub const POOL_RANGE: u64 = 0x9003;

/// PoolCreated without a fee field, as the classic factories emit it.
const FACTORY_ABI: &str = r#"[{
    "anonymous": false,
    "inputs": [
        {"indexed": true, "internalType": "address", "name": "token0", "type": "address"},
        {"indexed": true, "internalType": "address", "name": "token1", "type": "address"},
        {"indexed": false, "internalType": "address", "name": "pool", "type": "address"}
    ],
    "name": "PoolCreated",
    "type": "event"
}]"#;

/// PoolCreated with a trailing fee field.
const FACTORY_WITH_FEE_ABI: &str = r#"[{
    "anonymous": false,
    "inputs": [
        {"indexed": true, "internalType": "address", "name": "token0", "type": "address"},
        {"indexed": true, "internalType": "address", "name": "token1", "type": "address"},
        {"indexed": false, "internalType": "address", "name": "pool", "type": "address"},
        {"indexed": false, "internalType": "uint24", "name": "fee", "type": "uint24"}
    ],
    "name": "PoolCreated",
    "type": "event"
}]"#;

/// Classic/stable/aqua Swap: four unsigned amounts.
const CLASSIC_MASTER_ABI: &str = r#"[{
    "anonymous": false,
    "inputs": [
        {"indexed": true, "internalType": "address", "name": "sender", "type": "address"},
        {"indexed": false, "internalType": "uint256", "name": "amount0In", "type": "uint256"},
        {"indexed": false, "internalType": "uint256", "name": "amount1In", "type": "uint256"},
        {"indexed": false, "internalType": "uint256", "name": "amount0Out", "type": "uint256"},
        {"indexed": false, "internalType": "uint256", "name": "amount1Out", "type": "uint256"},
        {"indexed": true, "internalType": "address", "name": "to", "type": "address"}
    ],
    "name": "Swap",
    "type": "event"
}]"#;

/// Range (v3) Swap: two signed amounts plus tick state.
const RANGE_MASTER_ABI: &str = r#"[{
    "anonymous": false,
    "inputs": [
        {"indexed": true, "internalType": "address", "name": "sender", "type": "address"},
        {"indexed": true, "internalType": "address", "name": "recipient", "type": "address"},
        {"indexed": false, "internalType": "int256", "name": "amount0", "type": "int256"},
        {"indexed": false, "internalType": "int256", "name": "amount1", "type": "int256"},
        {"indexed": false, "internalType": "uint160", "name": "sqrtPriceX96", "type": "uint160"},
        {"indexed": false, "internalType": "uint128", "name": "liquidity", "type": "uint128"},
        {"indexed": false, "internalType": "int24", "name": "tick", "type": "int24"}
    ],
    "name": "Swap",
    "type": "event"
}]"#;

fn parse_abi(json: &str) -> Abi {
    serde_json::from_str(json).expect("fixture ABI must parse")
}

/// Registry wired for one classic-v2 factory (no fee field) and one range-v3
/// factory (with a fee field), plus their pool masters.
pub fn test_registry() -> AbiRegistry {
    let mut abis = HashMap::new();
    abis.insert(addr(FACTORY_CLASSIC), parse_abi(FACTORY_ABI));
    abis.insert(addr(FACTORY_RANGE), parse_abi(FACTORY_WITH_FEE_ABI));
    abis.insert(addr(MASTER_CLASSIC), parse_abi(CLASSIC_MASTER_ABI));
    abis.insert(addr(MASTER_RANGE), parse_abi(RANGE_MASTER_ABI));

    let mut factories = HashMap::new();
    factories.insert(
        addr(FACTORY_CLASSIC),
        FactoryInfo {
            pool_kind: PoolKind::Classic,
            version: PoolVersion::V2,
            event_name: "PoolCreated".to_string(),
            fee_field: None,
        },
    );
    factories.insert(
        addr(FACTORY_RANGE),
        FactoryInfo {
            pool_kind: PoolKind::Range,
            version: PoolVersion::V3,
            event_name: "PoolCreated".to_string(),
            fee_field: Some("fee".to_string()),
        },
    );

    let mut pool_masters = HashMap::new();
    pool_masters.insert((PoolKind::Classic, PoolVersion::V2), addr(MASTER_CLASSIC));
    pool_masters.insert((PoolKind::Range, PoolVersion::V3), addr(MASTER_RANGE));

    AbiRegistry::new(abis, factories, pool_masters)
}

pub fn classic_pool() -> Pool {
    Pool {
        pool_address: addr(POOL_CLASSIC),
        factory_address: addr(FACTORY_CLASSIC),
        pool_kind: PoolKind::Classic,
        version: PoolVersion::V2,
        token0: addr(TOKEN_A),
        token1: addr(TOKEN_B),
        fee_rate: None,
        created_tx: hash(0x71),
        created_block: 90,
    }
}

pub fn range_pool() -> Pool {
    Pool {
        pool_address: addr(POOL_RANGE),
        factory_address: addr(FACTORY_RANGE),
        pool_kind: PoolKind::Range,
        version: PoolVersion::V3,
        token0: addr(TOKEN_A),
        token1: addr(TOKEN_B),
        fee_rate: Some(500),
        created_tx: hash(0x72),
        created_block: 91,
    }
}

fn event_signature(abi_json: &str, name: &str) -> H256 {
    parse_abi(abi_json).event(name).expect("fixture event").signature()
}

fn base_log(emitter: Address, topics: Vec<H256>, data: Vec<u8>, log_index: u64) -> Log {
    Log {
        address: emitter,
        topics,
        data: data.into(),
        log_index: Some(U256::from(log_index)),
        ..Default::default()
    }
}

/// A PoolCreated log. `fee` selects the fee-carrying payload shape of the
/// range factory; the classic factory takes `fee: None`.
pub fn pool_created_log(
    factory: Address,
    token0: Address,
    token1: Address,
    pool: Address,
    fee: Option<u32>,
    log_index: u64,
) -> Log {
    let (abi_json, data) = match fee {
        Some(fee) => (
            FACTORY_WITH_FEE_ABI,
            abi::encode(&[Token::Address(pool), Token::Uint(U256::from(fee))]),
        ),
        None => (FACTORY_ABI, abi::encode(&[Token::Address(pool)])),
    };
    base_log(
        factory,
        vec![event_signature(abi_json, "PoolCreated"), H256::from(token0), H256::from(token1)],
        data,
        log_index,
    )
}

pub fn classic_swap_log(
    pool: Address,
    sender: Address,
    recipient: Address,
    amount0_in: u64,
    amount1_in: u64,
    amount0_out: u64,
    amount1_out: u64,
    log_index: u64,
) -> Log {
    let data = abi::encode(&[
        Token::Uint(U256::from(amount0_in)),
        Token::Uint(U256::from(amount1_in)),
        Token::Uint(U256::from(amount0_out)),
        Token::Uint(U256::from(amount1_out)),
    ]);
    base_log(
        pool,
        vec![
            event_signature(CLASSIC_MASTER_ABI, "Swap"),
            H256::from(sender),
            H256::from(recipient),
        ],
        data,
        log_index,
    )
}

pub fn range_swap_log(
    pool: Address,
    sender: Address,
    recipient: Address,
    amount0: i64,
    amount1: i64,
    log_index: u64,
) -> Log {
    let data = abi::encode(&[
        Token::Int(I256::from(amount0).into_raw()),
        Token::Int(I256::from(amount1).into_raw()),
        Token::Uint(U256::from(1u64) << 96),
        Token::Uint(U256::from(1_000_000u64)),
        Token::Int(I256::from(-100i64).into_raw()),
    ]);
    base_log(
        pool,
        vec![
            event_signature(RANGE_MASTER_ABI, "Swap"),
            H256::from(sender),
            H256::from(recipient),
        ],
        data,
        log_index,
    )
}

pub fn receipt(tx_hash: H256, logs: Vec<Log>) -> TransactionReceipt {
    TransactionReceipt { transaction_hash: tx_hash, logs, ..Default::default() }
}

//
// In-memory store
//

#[derive(Debug, Clone, Default)]
pub struct ProgressRow {
    pub last_scanned_block: u64,
    pub status: String,
    pub error_message: Option<String>,
}

#[derive(Default)]
struct StoreState {
    progress: HashMap<String, ProgressRow>,
    pools: HashMap<Address, Pool>,
    swaps: HashMap<(H256, u64), SwapEvent>,
}

/// An [`IndexerStore`] with the same conflict semantics as the PostgreSQL
/// implementation: duplicate pools are no-ops, duplicate swaps upsert.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    fail_swap_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `save_swap_event` fail until cleared.
    pub fn set_fail_swap_saves(&self, fail: bool) {
        self.fail_swap_saves.store(fail, Ordering::SeqCst);
    }

    pub fn progress_block(&self, task: &str) -> Option<u64> {
        self.state.lock().unwrap().progress.get(task).map(|row| row.last_scanned_block)
    }

    pub fn progress_row(&self, task: &str) -> Option<ProgressRow> {
        self.state.lock().unwrap().progress.get(task).cloned()
    }

    pub fn pool_count(&self) -> usize {
        self.state.lock().unwrap().pools.len()
    }

    pub fn pool(&self, address: Address) -> Option<Pool> {
        self.state.lock().unwrap().pools.get(&address).cloned()
    }

    /// All swap rows, ordered by (block, log index).
    pub fn swaps(&self) -> Vec<SwapEvent> {
        let mut rows: Vec<_> = self.state.lock().unwrap().swaps.values().cloned().collect();
        rows.sort_by_key(|row| (row.block_number, row.log_index));
        rows
    }

    pub fn swap(&self, tx_hash: H256, log_index: u64) -> Option<SwapEvent> {
        self.state.lock().unwrap().swaps.get(&(tx_hash, log_index)).cloned()
    }

    pub fn swap_count(&self) -> usize {
        self.state.lock().unwrap().swaps.len()
    }

    pub fn finality_of_block(&self, block: u64) -> Vec<Finality> {
        self.swaps()
            .into_iter()
            .filter(|row| row.block_number == block)
            .map(|row| row.finality)
            .collect()
    }
}

#[async_trait]
impl IndexerStore for MemoryStore {
    async fn get_scan_progress(&self, task: &str) -> Result<u64, StorageError> {
        Ok(self.progress_block(task).unwrap_or(0))
    }

    async fn init_scan_progress(&self, task: &str, start_block: u64) -> Result<(), StorageError> {
        self.state.lock().unwrap().progress.insert(
            task.to_string(),
            ProgressRow {
                last_scanned_block: start_block,
                status: "running".to_string(),
                error_message: None,
            },
        );
        Ok(())
    }

    async fn update_scan_progress(&self, task: &str, block: u64) -> Result<(), StorageError> {
        if let Some(row) = self.state.lock().unwrap().progress.get_mut(task) {
            row.last_scanned_block = block;
        }
        Ok(())
    }

    async fn update_scan_status(
        &self,
        task: &str,
        status: &str,
        error_message: Option<&str>,
    ) -> Result<(), StorageError> {
        if let Some(row) = self.state.lock().unwrap().progress.get_mut(task) {
            row.status = status.to_string();
            row.error_message = error_message.map(str::to_string);
        }
        Ok(())
    }

    async fn save_pool(&self, pool: &Pool) -> Result<(), StorageError> {
        self.state
            .lock()
            .unwrap()
            .pools
            .entry(pool.pool_address)
            .or_insert_with(|| pool.clone());
        Ok(())
    }

    async fn get_all_pools(&self) -> Result<Vec<Pool>, StorageError> {
        Ok(self.state.lock().unwrap().pools.values().cloned().collect())
    }

    async fn get_pool_by_address(&self, address: Address) -> Result<Option<Pool>, StorageError> {
        Ok(self.pool(address))
    }

    async fn save_swap_event(&self, swap: &SwapEvent) -> Result<(), StorageError> {
        if self.fail_swap_saves.load(Ordering::SeqCst) {
            return Err(StorageError::Row("injected save failure".to_string()));
        }
        self.state.lock().unwrap().swaps.insert((swap.tx_hash, swap.log_index), swap.clone());
        Ok(())
    }

    async fn delete_pending_after(&self, safe_block: u64) -> Result<u64, StorageError> {
        let mut state = self.state.lock().unwrap();
        let before = state.swaps.len();
        state
            .swaps
            .retain(|_, row| !(row.block_number > safe_block && row.finality == Finality::Pending));
        Ok((before - state.swaps.len()) as u64)
    }
}

//
// Scripted chain source
//

#[derive(Default)]
pub struct MockChain {
    latest: AtomicU64,
    safe: AtomicU64,
    blocks: Mutex<HashMap<u64, Vec<TransactionReceipt>>>,
    failing_blocks: Mutex<HashSet<u64>>,
    receipt_calls: Mutex<HashMap<u64, u64>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_latest(&self, block: u64) {
        self.latest.store(block, Ordering::SeqCst);
    }

    pub fn set_safe(&self, block: u64) {
        self.safe.store(block, Ordering::SeqCst);
    }

    pub fn put_block(&self, block: u64, receipts: Vec<TransactionReceipt>) {
        self.blocks.lock().unwrap().insert(block, receipts);
    }

    /// Make `block_receipts` fail for this block until healed.
    pub fn fail_block(&self, block: u64) {
        self.failing_blocks.lock().unwrap().insert(block);
    }

    pub fn heal_block(&self, block: u64) {
        self.failing_blocks.lock().unwrap().remove(&block);
    }

    pub fn receipt_calls(&self, block: u64) -> u64 {
        self.receipt_calls.lock().unwrap().get(&block).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn latest_block_number(&self) -> Result<u64, BlockchainError> {
        Ok(self.latest.load(Ordering::SeqCst))
    }

    async fn safe_block_number(&self) -> Result<u64, BlockchainError> {
        Ok(self.safe.load(Ordering::SeqCst))
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<u64, BlockchainError> {
        Ok(1_700_000_000 + block_number)
    }

    async fn block_receipts(
        &self,
        block_number: u64,
    ) -> Result<Vec<TransactionReceipt>, BlockchainError> {
        *self.receipt_calls.lock().unwrap().entry(block_number).or_insert(0) += 1;
        if self.failing_blocks.lock().unwrap().contains(&block_number) {
            return Err(BlockchainError::Provider("injected receipt failure".to_string()));
        }
        Ok(self.blocks.lock().unwrap().get(&block_number).cloned().unwrap_or_default())
    }
}

//
// Wiring
//

pub struct Harness {
    pub chain: Arc<MockChain>,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<PoolCache>,
    pub decoder: Arc<EventDecoder>,
    pub scanner: Arc<RangeScanner>,
}

/// A fully wired decoder + scanner over the mock chain and memory store.
pub fn harness(workers: usize, batch_interval_size: u64) -> Harness {
    let chain = Arc::new(MockChain::new());
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(PoolCache::new());
    let registry = Arc::new(test_registry());
    let decoder = Arc::new(EventDecoder::new(
        registry,
        cache.clone(),
        store.clone() as Arc<dyn IndexerStore>,
    ));
    let scanner = Arc::new(RangeScanner::new(
        chain.clone() as Arc<dyn ChainSource>,
        decoder.clone(),
        store.clone() as Arc<dyn IndexerStore>,
        workers,
        batch_interval_size,
    ));
    Harness { chain, store, cache, decoder, scanner }
}

/// A dual-cursor engine over the harness' mocks.
pub fn engine(h: &Harness, start_block: u64, batch_size: u64) -> ScanEngine {
    ScanEngine::new(
        h.chain.clone() as Arc<dyn ChainSource>,
        h.store.clone() as Arc<dyn IndexerStore>,
        h.scanner.clone(),
        start_block,
        batch_size,
    )
}
