//! Database connection pool setup and schema migration.
//!
//! Builds a deadpool_postgres pool from the discrete connection fields in the
//! configuration, verifies reachability once at startup, and creates the four
//! tables the indexer owns if they do not exist yet.

use std::time::Duration;

use deadpool_postgres::{Config as PgConfig, Pool, PoolConfig, Runtime, Timeouts};
use tokio_postgres::NoTls;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::errors::StorageError;

/// Upper bound on concurrent connections; sized for the scan worker count
/// plus the two long-lived engine workers.
const POOL_MAX_SIZE: usize = 16;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS pools (
    id              BIGSERIAL PRIMARY KEY,
    pool_address    VARCHAR(42) NOT NULL UNIQUE,
    factory_address VARCHAR(42) NOT NULL,
    pool_type       VARCHAR(20) NOT NULL,
    version         VARCHAR(10) NOT NULL,
    token0          VARCHAR(42) NOT NULL,
    token1          VARCHAR(42) NOT NULL,
    fee_rate        INTEGER,
    created_tx      VARCHAR(66) NOT NULL,
    created_block   BIGINT NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
    deleted_at      TIMESTAMPTZ,
    status          BOOLEAN NOT NULL DEFAULT TRUE
);

CREATE TABLE IF NOT EXISTS tokens (
    id         SERIAL PRIMARY KEY,
    address    VARCHAR(42) NOT NULL UNIQUE,
    symbol     VARCHAR(20) NOT NULL,
    name       VARCHAR(100) NOT NULL,
    decimals   SMALLINT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    deleted_at TIMESTAMPTZ,
    status     BOOLEAN NOT NULL DEFAULT TRUE
);

CREATE TABLE IF NOT EXISTS swap_events (
    id              BIGSERIAL PRIMARY KEY,
    block_number    BIGINT NOT NULL,
    block_timestamp BIGINT NOT NULL,
    tx_hash         VARCHAR(66) NOT NULL,
    log_index       INTEGER NOT NULL,
    pool_address    VARCHAR(42) NOT NULL,
    sender          VARCHAR(42) NOT NULL,
    recipient       VARCHAR(42) NOT NULL,
    token_in        VARCHAR(42) NOT NULL,
    token_out       VARCHAR(42) NOT NULL,
    amount_in       VARCHAR(78) NOT NULL,
    amount_out      VARCHAR(78) NOT NULL,
    finality_status VARCHAR(16) NOT NULL DEFAULT 'safe',
    created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (tx_hash, log_index)
);

CREATE INDEX IF NOT EXISTS swap_events_block_finality_idx
    ON swap_events (block_number, finality_status);

CREATE TABLE IF NOT EXISTS scan_progress (
    id                 SERIAL PRIMARY KEY,
    task_name          VARCHAR(50) NOT NULL UNIQUE,
    last_scanned_block BIGINT NOT NULL,
    status             VARCHAR(20) NOT NULL DEFAULT 'running',
    error_message      TEXT,
    created_at         TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at         TIMESTAMPTZ NOT NULL DEFAULT now()
);
"#;

/// Create the connection pool and verify the database answers.
pub async fn connect(config: &DatabaseConfig) -> Result<Pool, StorageError> {
    let mut pg_config = PgConfig::new();
    pg_config.host = Some(config.host.clone());
    pg_config.port = Some(config.port);
    pg_config.user = Some(config.user.clone());
    pg_config.password = Some(config.password.clone());
    pg_config.dbname = Some(config.dbname.clone());

    let mut pool_config = PoolConfig::new(POOL_MAX_SIZE);
    pool_config.timeouts = Timeouts {
        create: Some(Duration::from_secs(30)),
        wait: Some(Duration::from_secs(30)),
        recycle: Some(Duration::from_secs(300)),
    };
    pg_config.pool = Some(pool_config);

    let pool = pg_config.create_pool(Some(Runtime::Tokio1), NoTls)?;

    let client = pool.get().await?;
    client.simple_query("SELECT 1").await?;
    info!(host = %config.host, dbname = %config.dbname, "database pool created");

    Ok(pool)
}

/// Create the indexer's tables if they do not exist.
pub async fn run_migrations(pool: &Pool) -> Result<(), StorageError> {
    let client = pool.get().await?;
    client.batch_execute(SCHEMA).await?;
    info!("database schema ensured");
    Ok(())
}
