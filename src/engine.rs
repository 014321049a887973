//! # Dual-Cursor Engine
//!
//! Two cooperating long-lived workers share the chain head but write disjoint
//! rows:
//!
//! - the **stable worker** advances the persisted `stable_scan` cursor in
//!   batches through finalized blocks, writing every swap it decodes as
//!   `safe`;
//! - the **live worker** rebuilds the tentative span `(safe_head, latest]`
//!   every few seconds, first deleting stale `pending` rows at or below the
//!   new safe head, then rewriting the span as `pending`.
//!
//! When the stable worker overtakes a block the live worker already wrote,
//! the swap upsert rewrites the row's finality to `safe` in place; no
//! explicit hand-off exists between the two.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::blockchain::ChainSource;
use crate::errors::IndexerError;
use crate::repository::IndexerStore;
use crate::scanner::RangeScanner;
use crate::types::{Finality, STABLE_SCAN_TASK};

/// Stable worker sleep when it has caught up with the safe head.
const STABLE_IDLE_SLEEP: Duration = Duration::from_secs(2);
/// Stable worker sleep before retrying a failed head read or batch.
const STABLE_RETRY_SLEEP: Duration = Duration::from_secs(1);
/// Live worker cadence.
const LIVE_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct ScanEngine {
    chain: Arc<dyn ChainSource>,
    store: Arc<dyn IndexerStore>,
    scanner: Arc<RangeScanner>,
    start_block: u64,
    batch_size: u64,
}

impl ScanEngine {
    pub fn new(
        chain: Arc<dyn ChainSource>,
        store: Arc<dyn IndexerStore>,
        scanner: Arc<RangeScanner>,
        start_block: u64,
        batch_size: u64,
    ) -> Self {
        Self { chain, store, scanner, start_block, batch_size }
    }

    /// Run both workers until the cancellation token fires, then wait for
    /// them to finish the block they are on and return.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), IndexerError> {
        let mut cursor = self.store.get_scan_progress(STABLE_SCAN_TASK).await?;
        if cursor == 0 {
            cursor = self.start_block;
            self.store.init_scan_progress(STABLE_SCAN_TASK, cursor).await?;
            info!(start_block = cursor, "first run, starting from configured block");
        } else {
            info!(cursor, "resuming from persisted cursor");
        }

        let stable = {
            let engine = self.clone();
            let token = cancel.child_token();
            tokio::spawn(async move { engine.stable_worker(cursor, token).await })
        };
        let live = {
            let engine = self.clone();
            let token = cancel.child_token();
            tokio::spawn(async move { engine.live_worker(token).await })
        };

        let (stable, live) = tokio::join!(stable, live);
        for result in [stable, live] {
            if let Err(error) = result {
                return Err(IndexerError::Internal(format!("worker task failed: {error}")));
            }
        }
        info!("scan engine stopped");
        Ok(())
    }

    /// Invariant: every swap row at height <= cursor is `safe`, and the
    /// persisted cursor equals the highest block scanning has completed.
    async fn stable_worker(&self, mut cursor: u64, cancel: CancellationToken) {
        info!(cursor, "stable worker started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let safe_head = match self.chain.safe_block_number().await {
                Ok(head) => head,
                Err(error) => {
                    warn!(%error, "failed to read safe head");
                    if pause(&cancel, STABLE_RETRY_SLEEP).await {
                        break;
                    }
                    continue;
                }
            };

            if cursor >= safe_head {
                if pause(&cancel, STABLE_IDLE_SLEEP).await {
                    break;
                }
                continue;
            }

            let from = cursor + 1;
            let to = safe_head.min(cursor + self.batch_size);
            let summary = self.scanner.scan_range(from, to, Finality::Safe, &cancel).await;
            if cancel.is_cancelled() {
                break;
            }
            if summary.error_count > 0 {
                warn!(
                    from,
                    to,
                    errors = summary.error_count,
                    "batch had failed blocks, retrying from the same cursor"
                );
                if pause(&cancel, STABLE_RETRY_SLEEP).await {
                    break;
                }
                continue;
            }

            cursor = to;
            if let Err(error) = self.store.update_scan_progress(STABLE_SCAN_TASK, cursor).await {
                warn!(%error, cursor, "failed to persist scan progress");
            }
        }
        info!(cursor, "stable worker stopped");
    }

    /// Invariant: the set of `pending` rows is exactly the decoded swaps in
    /// `(safe_head, latest_head]` as of the last completed sweep.
    async fn live_worker(&self, cancel: CancellationToken) {
        info!("live worker started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let heads = match (
                self.chain.latest_block_number().await,
                self.chain.safe_block_number().await,
            ) {
                (Ok(latest), Ok(safe)) => Some((latest, safe)),
                (latest, safe) => {
                    if let Err(error) = latest {
                        warn!(%error, "failed to read latest head");
                    }
                    if let Err(error) = safe {
                        warn!(%error, "failed to read safe head");
                    }
                    None
                }
            };

            if let Some((latest_head, safe_head)) = heads {
                if latest_head > safe_head {
                    // Drop the previous sweep's tentatives that are now
                    // either finalized or orphaned, then rebuild the span.
                    match self.store.delete_pending_after(safe_head).await {
                        Ok(deleted) if deleted > 0 => {
                            info!(safe_head, deleted, "cleared stale pending swaps")
                        }
                        Ok(_) => {}
                        Err(error) => warn!(%error, safe_head, "failed to clear pending swaps"),
                    }
                    self.scanner
                        .scan_range(safe_head + 1, latest_head, Finality::Pending, &cancel)
                        .await;
                }
            }

            if pause(&cancel, LIVE_SWEEP_INTERVAL).await {
                break;
            }
        }
        info!("live worker stopped");
    }
}

/// Sleep unless cancelled first. Returns true when the token fired.
async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = sleep(duration) => false,
    }
}
