//! # Range Scanner
//!
//! Parallel fan-out over a contiguous block range. One producer feeds block
//! numbers into a bounded channel; a fixed pool of workers drains it, fetches
//! each block's receipts and timestamp, and pushes every log through the
//! event decoder. Blocks inside a range complete in no particular order; the
//! dual-cursor engine is what orders ranges against each other.
//!
//! A failed block increments an error counter and the range keeps going.
//! Errors are observability signals here, not control flow: the engine reads
//! the counter off the summary and decides whether to re-cover the range.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::blockchain::ChainSource;
use crate::decoder::{DecodedLog, EventDecoder};
use crate::errors::{BlockchainError, StorageError};
use crate::repository::IndexerStore;
use crate::types::{Finality, STABLE_SCAN_TASK};

/// Cadence of the checkpoint ticker while a safe range is in flight.
const CHECKPOINT_PERIOD: Duration = Duration::from_secs(5);

/// Outcome of one range sweep. Never a failure; failed blocks are counted.
#[derive(Debug, Clone, Copy)]
pub struct RangeSummary {
    /// Highest block that completed successfully.
    pub max_scanned_block: u64,
    /// Number of blocks that failed and were skipped.
    pub error_count: u64,
}

#[derive(Debug, Default)]
struct RangeProgress {
    max_scanned_block: u64,
    error_count: u64,
}

#[derive(Debug, Error)]
enum BlockScanError {
    #[error(transparent)]
    Chain(#[from] BlockchainError),
    #[error(transparent)]
    Persist(#[from] StorageError),
}

pub struct RangeScanner {
    chain: Arc<dyn ChainSource>,
    decoder: Arc<EventDecoder>,
    store: Arc<dyn IndexerStore>,
    workers: usize,
    batch_interval_size: u64,
}

impl RangeScanner {
    pub fn new(
        chain: Arc<dyn ChainSource>,
        decoder: Arc<EventDecoder>,
        store: Arc<dyn IndexerStore>,
        workers: usize,
        batch_interval_size: u64,
    ) -> Self {
        Self { chain, decoder, store, workers, batch_interval_size }
    }

    /// Scan the inclusive range `[start, end]`, tagging every decoded swap
    /// with `finality`. Safe ranges checkpoint the stable-scan cursor from a
    /// side ticker while the sweep is in flight; pending ranges never touch
    /// the cursor.
    pub async fn scan_range(
        &self,
        start: u64,
        end: u64,
        finality: Finality,
        cancel: &CancellationToken,
    ) -> RangeSummary {
        let progress = Arc::new(Mutex::new(RangeProgress {
            max_scanned_block: start.saturating_sub(1),
            error_count: 0,
        }));

        let (task_tx, task_rx) = mpsc::channel::<u64>(self.workers * 2);
        let task_rx = Arc::new(Mutex::new(task_rx));

        // Producer: enqueue the range, closing the channel on completion or
        // cancellation so the workers drain out.
        let producer = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                for block_number in start..=end {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        sent = task_tx.send(block_number) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                }
            })
        };

        let mut workers = Vec::with_capacity(self.workers);
        for _ in 0..self.workers {
            let task_rx = task_rx.clone();
            let progress = progress.clone();
            let cancel = cancel.clone();
            let chain = self.chain.clone();
            let decoder = self.decoder.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    let block_number = { task_rx.lock().await.recv().await };
                    let Some(block_number) = block_number else { break };
                    if cancel.is_cancelled() {
                        break;
                    }
                    match scan_block(&*chain, &decoder, block_number, finality).await {
                        Ok(()) => {
                            let mut progress = progress.lock().await;
                            if block_number > progress.max_scanned_block {
                                progress.max_scanned_block = block_number;
                            }
                        }
                        Err(error) => {
                            warn!(%error, block = block_number, "block scan failed");
                            progress.lock().await.error_count += 1;
                        }
                    }
                }
            }));
        }

        // Checkpoint ticker, safe ranges only.
        let ticker_done = CancellationToken::new();
        let ticker = if finality == Finality::Safe {
            let progress = progress.clone();
            let store = self.store.clone();
            let done = ticker_done.clone();
            let interval_size = self.batch_interval_size;
            Some(tokio::spawn(async move {
                let mut last_checkpointed = start.saturating_sub(1);
                let mut ticker = interval_at(Instant::now() + CHECKPOINT_PERIOD, CHECKPOINT_PERIOD);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = done.cancelled() => break,
                        _ = ticker.tick() => {
                            let current_max = progress.lock().await.max_scanned_block;
                            last_checkpointed =
                                checkpoint(&*store, current_max, last_checkpointed, interval_size)
                                    .await;
                        }
                    }
                }
                last_checkpointed
            }))
        } else {
            None
        };

        for worker in workers {
            let _ = worker.await;
        }
        let _ = producer.await;

        ticker_done.cancel();
        let last_checkpointed = match ticker {
            Some(handle) => handle.await.unwrap_or_else(|_| start.saturating_sub(1)),
            None => start.saturating_sub(1),
        };

        let summary = {
            let progress = progress.lock().await;
            RangeSummary {
                max_scanned_block: progress.max_scanned_block,
                error_count: progress.error_count,
            }
        };

        // The final observed maximum is a candidate for one last checkpoint.
        if finality == Finality::Safe {
            checkpoint(
                &*self.store,
                summary.max_scanned_block,
                last_checkpointed,
                self.batch_interval_size,
            )
            .await;
        }

        info!(
            finality = %finality,
            start,
            end,
            max_scanned = summary.max_scanned_block,
            errors = summary.error_count,
            "range sweep complete"
        );
        summary
    }
}

/// Persist the stable-scan cursor if it has advanced far enough since the
/// last checkpoint. Returns the new checkpoint watermark.
async fn checkpoint(
    store: &dyn IndexerStore,
    current_max: u64,
    last_checkpointed: u64,
    interval_size: u64,
) -> u64 {
    if current_max < last_checkpointed.saturating_add(interval_size) {
        return last_checkpointed;
    }
    match store.update_scan_progress(STABLE_SCAN_TASK, current_max).await {
        Ok(()) => {
            info!(block = current_max, "checkpointed scan progress");
            current_max
        }
        Err(error) => {
            warn!(%error, block = current_max, "failed to checkpoint scan progress");
            last_checkpointed
        }
    }
}

async fn scan_block(
    chain: &dyn ChainSource,
    decoder: &EventDecoder,
    block_number: u64,
    finality: Finality,
) -> Result<(), BlockScanError> {
    let receipts = chain.block_receipts(block_number).await?;
    let timestamp = chain.block_timestamp(block_number).await? as i64;

    let mut pools_found = 0usize;
    let mut swaps_found = 0usize;
    let mut first_persist_error: Option<StorageError> = None;
    for receipt in &receipts {
        for log in &receipt.logs {
            match decoder
                .decode_log(block_number, timestamp, receipt.transaction_hash, log, finality)
                .await
            {
                Ok(DecodedLog::PoolCreated) => pools_found += 1,
                Ok(DecodedLog::Swap) => swaps_found += 1,
                Ok(DecodedLog::Ignored) => {}
                Err(error) => {
                    warn!(%error, block = block_number, "failed to persist decoded event");
                    first_persist_error.get_or_insert(error);
                }
            }
        }
    }

    if pools_found > 0 || swaps_found > 0 {
        info!(block = block_number, pools = pools_found, swaps = swaps_found, "decoded events");
    } else {
        debug!(block = block_number, txs = receipts.len(), "no events of interest");
    }

    if let Some(error) = first_persist_error {
        return Err(error.into());
    }
    Ok(())
}
