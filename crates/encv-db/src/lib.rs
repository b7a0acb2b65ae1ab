//! Postgres persistence for the stat tables.
//!
//! [`pool`] owns connection setup and migrations; [`stats`] holds the upsert
//! engine and the exporter. Every function takes the pool by reference, so
//! one pool opened at the start of an invocation serves all stages.

pub mod pool;
pub mod stats;

use thiserror::Error;

pub use pool::{connect_pool, connect_pool_from_config, ping, run_migrations, PoolConfig};
pub use stats::{
    count_stats, ensure_table, export_stats_json, fetch_stat, list_stats, plan_upsert,
    upsert_stats, UpsertPlan, UpsertReport,
};

#[derive(Debug, Error)]
pub enum DbError {
    #[error("DATABASE_URL is not set and PGHOST/PGDATABASE do not describe a database")]
    MissingDatabaseUrl,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("table {table} does not match the configured schema: {reason}")]
    InvalidSchema { table: String, reason: String },
}
