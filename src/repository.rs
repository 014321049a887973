//! # Persistence Layer
//!
//! [`IndexerStore`] is the contract the scanning engine writes through;
//! [`PgStore`] is the PostgreSQL implementation. Conflict handling is typed:
//! a duplicate pool is an `ON CONFLICT DO NOTHING` no-op, a duplicate swap is
//! an `ON CONFLICT DO UPDATE` over every mutable column so that a pending row
//! can be rewritten to safe in place.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use deadpool_postgres::Pool;
use ethers::types::{Address, H256};
use tokio_postgres::Row;
use tracing::debug;

use crate::errors::StorageError;
use crate::types::{addr_hex, hash_hex, Pool as AmmPool, PoolKind, PoolVersion, SwapEvent};

#[async_trait]
pub trait IndexerStore: Send + Sync {
    /// Last block through which the task has completed, or zero when the
    /// task has never run (absence is not an error).
    async fn get_scan_progress(&self, task: &str) -> Result<u64, StorageError>;

    /// Insert a fresh progress row for a task.
    async fn init_scan_progress(&self, task: &str, start_block: u64) -> Result<(), StorageError>;

    /// Unconditional cursor overwrite; callers guarantee monotonicity.
    async fn update_scan_progress(&self, task: &str, block: u64) -> Result<(), StorageError>;

    /// Record a task status transition (e.g. a startup failure).
    async fn update_scan_status(
        &self,
        task: &str,
        status: &str,
        error_message: Option<&str>,
    ) -> Result<(), StorageError>;

    /// Insert a pool; a duplicate pool_address is a silent no-op.
    async fn save_pool(&self, pool: &AmmPool) -> Result<(), StorageError>;

    /// Full pool catalogue, for priming the cache at startup.
    async fn get_all_pools(&self) -> Result<Vec<AmmPool>, StorageError>;

    /// Point lookup by pool address.
    async fn get_pool_by_address(&self, address: Address) -> Result<Option<AmmPool>, StorageError>;

    /// Insert a swap; a duplicate (tx_hash, log_index) upserts all mutable
    /// columns, including finality.
    async fn save_swap_event(&self, swap: &SwapEvent) -> Result<(), StorageError>;

    /// Delete every pending swap above the safe height. Returns the number
    /// of rows removed.
    async fn delete_pending_after(&self, safe_block: u64) -> Result<u64, StorageError>;
}

#[derive(Clone)]
pub struct PgStore {
    pool: Arc<Pool>,
}

impl PgStore {
    pub fn new(pool: Arc<Pool>) -> Self {
        Self { pool }
    }

    fn pool_from_row(row: &Row) -> Result<AmmPool, StorageError> {
        let parse_addr = |column: &str| -> Result<Address, StorageError> {
            let value: String = row.get(column);
            Address::from_str(&value)
                .map_err(|e| StorageError::Row(format!("bad address in {column}: {e}")))
        };
        let kind: String = row.get("pool_type");
        let version: String = row.get("version");
        let created_tx: String = row.get("created_tx");
        Ok(AmmPool {
            pool_address: parse_addr("pool_address")?,
            factory_address: parse_addr("factory_address")?,
            pool_kind: PoolKind::from_str(&kind).map_err(StorageError::Row)?,
            version: PoolVersion::from_str(&version).map_err(StorageError::Row)?,
            token0: parse_addr("token0")?,
            token1: parse_addr("token1")?,
            fee_rate: row.get("fee_rate"),
            created_tx: H256::from_str(&created_tx)
                .map_err(|e| StorageError::Row(format!("bad created_tx: {e}")))?,
            created_block: row.get::<_, i64>("created_block") as u64,
        })
    }
}

#[async_trait]
impl IndexerStore for PgStore {
    async fn get_scan_progress(&self, task: &str) -> Result<u64, StorageError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT last_scanned_block FROM scan_progress WHERE task_name = $1", &[&task])
            .await?;
        Ok(row.map(|r| r.get::<_, i64>(0) as u64).unwrap_or(0))
    }

    async fn init_scan_progress(&self, task: &str, start_block: u64) -> Result<(), StorageError> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO scan_progress (task_name, last_scanned_block, status) \
                 VALUES ($1, $2, 'running')",
                &[&task, &(start_block as i64)],
            )
            .await?;
        debug!(task, start_block, "initialized scan progress");
        Ok(())
    }

    async fn update_scan_progress(&self, task: &str, block: u64) -> Result<(), StorageError> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE scan_progress SET last_scanned_block = $2, updated_at = now() \
                 WHERE task_name = $1",
                &[&task, &(block as i64)],
            )
            .await?;
        Ok(())
    }

    async fn update_scan_status(
        &self,
        task: &str,
        status: &str,
        error_message: Option<&str>,
    ) -> Result<(), StorageError> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE scan_progress SET status = $2, error_message = $3, updated_at = now() \
                 WHERE task_name = $1",
                &[&task, &status, &error_message],
            )
            .await?;
        Ok(())
    }

    async fn save_pool(&self, pool: &AmmPool) -> Result<(), StorageError> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO pools (pool_address, factory_address, pool_type, version, \
                 token0, token1, fee_rate, created_tx, created_block) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
                 ON CONFLICT (pool_address) DO NOTHING",
                &[
                    &addr_hex(&pool.pool_address),
                    &addr_hex(&pool.factory_address),
                    &pool.pool_kind.as_str(),
                    &pool.version.as_str(),
                    &addr_hex(&pool.token0),
                    &addr_hex(&pool.token1),
                    &pool.fee_rate,
                    &hash_hex(&pool.created_tx),
                    &(pool.created_block as i64),
                ],
            )
            .await?;
        Ok(())
    }

    async fn get_all_pools(&self) -> Result<Vec<AmmPool>, StorageError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT pool_address, factory_address, pool_type, version, token0, token1, \
                 fee_rate, created_tx, created_block FROM pools WHERE deleted_at IS NULL",
                &[],
            )
            .await?;
        rows.iter().map(Self::pool_from_row).collect()
    }

    async fn get_pool_by_address(&self, address: Address) -> Result<Option<AmmPool>, StorageError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT pool_address, factory_address, pool_type, version, token0, token1, \
                 fee_rate, created_tx, created_block FROM pools WHERE pool_address = $1",
                &[&addr_hex(&address)],
            )
            .await?;
        row.as_ref().map(Self::pool_from_row).transpose()
    }

    async fn save_swap_event(&self, swap: &SwapEvent) -> Result<(), StorageError> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO swap_events (block_number, block_timestamp, tx_hash, log_index, \
                 pool_address, sender, recipient, token_in, token_out, amount_in, amount_out, \
                 finality_status) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
                 ON CONFLICT (tx_hash, log_index) DO UPDATE SET \
                 block_number = EXCLUDED.block_number, \
                 block_timestamp = EXCLUDED.block_timestamp, \
                 pool_address = EXCLUDED.pool_address, \
                 sender = EXCLUDED.sender, \
                 recipient = EXCLUDED.recipient, \
                 token_in = EXCLUDED.token_in, \
                 token_out = EXCLUDED.token_out, \
                 amount_in = EXCLUDED.amount_in, \
                 amount_out = EXCLUDED.amount_out, \
                 finality_status = EXCLUDED.finality_status",
                &[
                    &(swap.block_number as i64),
                    &swap.block_timestamp,
                    &hash_hex(&swap.tx_hash),
                    &(swap.log_index as i32),
                    &addr_hex(&swap.pool_address),
                    &addr_hex(&swap.sender),
                    &addr_hex(&swap.recipient),
                    &addr_hex(&swap.token_in),
                    &addr_hex(&swap.token_out),
                    &swap.amount_in,
                    &swap.amount_out,
                    &swap.finality.as_str(),
                ],
            )
            .await?;
        Ok(())
    }

    async fn delete_pending_after(&self, safe_block: u64) -> Result<u64, StorageError> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute(
                "DELETE FROM swap_events WHERE block_number > $1 AND finality_status = 'pending'",
                &[&(safe_block as i64)],
            )
            .await?;
        Ok(deleted)
    }
}
