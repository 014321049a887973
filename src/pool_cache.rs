//! In-memory set of known pools.
//!
//! Seeded from the pool catalogue at startup; afterwards the event decoder is
//! the only writer, inserting each pool it decodes from a PoolCreated log.
//! Reads come from every decoder invocation and never serialize against each
//! other.

use std::collections::HashMap;

use ethers::types::Address;
use tokio::sync::RwLock;
use tracing::info;

use crate::errors::StorageError;
use crate::repository::IndexerStore;
use crate::types::Pool;

#[derive(Debug, Default)]
pub struct PoolCache {
    pools: RwLock<HashMap<Address, Pool>>,
}

impl PoolCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prime the cache from the persisted pool catalogue.
    pub async fn seed(&self, store: &dyn IndexerStore) -> Result<(), StorageError> {
        let pools = store.get_all_pools().await?;
        let mut cache = self.pools.write().await;
        for pool in pools {
            cache.insert(pool.pool_address, pool);
        }
        info!(pools = cache.len(), "pool cache seeded");
        Ok(())
    }

    pub async fn get(&self, address: Address) -> Option<Pool> {
        self.pools.read().await.get(&address).cloned()
    }

    pub async fn contains(&self, address: Address) -> bool {
        self.pools.read().await.contains_key(&address)
    }

    pub async fn insert(&self, pool: Pool) {
        self.pools.write().await.insert(pool.pool_address, pool);
    }

    pub async fn len(&self) -> usize {
        self.pools.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pools.read().await.is_empty()
    }
}
