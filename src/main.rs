//! Daemon entry point.
//!
//! 1. Load configuration → initialise tracing.
//! 2. Bring up the collaborators in dependency order: database, ABI
//!    registry, chain client, pool cache.
//! 3. Hand everything to the dual-cursor scan engine.
//! 4. Graceful shutdown on SIGINT/SIGTERM via a shared cancellation token.

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use syncswap_indexer::{
    abi_registry::AbiRegistry,
    blockchain::ChainClient,
    config::Config,
    database,
    decoder::EventDecoder,
    engine::ScanEngine,
    errors::IndexerError,
    pool_cache::PoolCache,
    repository::{IndexerStore, PgStore},
    scanner::RangeScanner,
    types::STABLE_SCAN_TASK,
};

#[tokio::main]
async fn main() -> Result<(), IndexerError> {
    let config_path =
        std::env::args().nth(1).unwrap_or_else(|| "config/config.json".to_string());
    let config = Config::from_file(&config_path)
        .await
        .map_err(|e| IndexerError::Config(format!("{e:#}")))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level))
        .add_directive("ethers_providers=warn".parse().unwrap())
        .add_directive("tokio_postgres=warn".parse().unwrap())
        .add_directive("hyper=warn".parse().unwrap());
    tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).init();

    info!(
        server = %config.server.name,
        environment = %config.server.environment,
        network = %config.blockchain.network,
        "starting syncswap indexer"
    );

    let db_pool = Arc::new(database::connect(&config.database).await?);
    database::run_migrations(&db_pool).await?;
    let store: Arc<dyn IndexerStore> = Arc::new(PgStore::new(db_pool));

    // Startup failures past this point are recorded on the scan task so they
    // are visible next to the cursor they froze.
    match bootstrap(&config, store.clone()).await {
        Ok(engine) => {
            let cancel = CancellationToken::new();
            let engine_token = cancel.child_token();
            let mut engine_task =
                tokio::spawn(async move { engine.run(engine_token).await });

            let mut sigterm = signal(SignalKind::terminate())
                .map_err(|e| IndexerError::Internal(format!("failed to install SIGTERM handler: {e}")))?;
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("SIGINT received, shutting down");
                }
                _ = sigterm.recv() => {
                    info!("SIGTERM received, shutting down");
                }
                result = &mut engine_task => {
                    return flatten_engine_result(result);
                }
            }

            cancel.cancel();
            flatten_engine_result(engine_task.await)
        }
        Err(error) => {
            error!(%error, "startup failed");
            if let Err(status_error) = store
                .update_scan_status(STABLE_SCAN_TASK, "failed", Some(&error.to_string()))
                .await
            {
                error!(%status_error, "failed to record startup failure");
            }
            Err(error)
        }
    }
}

/// Wire the chain-facing components together. Separated from `main` so a
/// failure here can be recorded in scan_progress before the process exits.
async fn bootstrap(
    config: &Config,
    store: Arc<dyn IndexerStore>,
) -> Result<ScanEngine, IndexerError> {
    let registry = Arc::new(AbiRegistry::load(&config.abi, &config.syncswap).await?);
    let chain = Arc::new(ChainClient::connect(&config.blockchain).await?);

    let pool_cache = Arc::new(PoolCache::new());
    pool_cache.seed(store.as_ref()).await?;

    let decoder = Arc::new(EventDecoder::new(registry, pool_cache, store.clone()));
    let scanner = Arc::new(RangeScanner::new(
        chain.clone(),
        decoder,
        store.clone(),
        config.scanner.workers(),
        config.scanner.batch_interval_size,
    ));

    Ok(ScanEngine::new(
        chain,
        store,
        scanner,
        config.scanner.start_block,
        config.scanner.batch_size,
    ))
}

fn flatten_engine_result(
    result: Result<Result<(), IndexerError>, tokio::task::JoinError>,
) -> Result<(), IndexerError> {
    match result {
        Ok(inner) => inner,
        Err(join_error) => Err(IndexerError::Internal(format!("engine task failed: {join_error}"))),
    }
}
