//! SyncSwap chain indexer.
//!
//! A long-running daemon that follows the head of a zkSync Era style rollup,
//! decodes the events emitted by the SyncSwap factory and pool contracts, and
//! persists the pool catalogue and the swap stream to PostgreSQL.
//!
//! The interesting machinery is the dual-cursor engine ([`engine`]): a stable
//! worker that advances a persisted cursor through finalized blocks, and a
//! live worker that keeps a tentative view of the span between the safe head
//! and the chain tip. Everything they index flows through the ABI-driven
//! event decoder ([`decoder`]).

pub mod abi_registry;
pub mod blockchain;
pub mod config;
pub mod database;
pub mod decoder;
pub mod engine;
pub mod errors;
pub mod pool_cache;
pub mod repository;
pub mod scanner;
pub mod types;

pub use abi_registry::AbiRegistry;
pub use blockchain::{ChainClient, ChainSource};
pub use config::Config;
pub use decoder::EventDecoder;
pub use engine::ScanEngine;
pub use errors::IndexerError;
pub use pool_cache::PoolCache;
pub use repository::{IndexerStore, PgStore};
pub use scanner::RangeScanner;
pub use types::{Finality, Pool, PoolKind, PoolVersion, SwapEvent};
