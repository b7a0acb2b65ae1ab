use std::time::Duration;

use encv_core::AppConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::DbError;

/// Resolves to `<workspace-root>/migrations/`.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

/// Pool sizing. Stages run one after another, so a small pool is enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            min_connections: 1,
            acquire_timeout_secs: 10,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }

    fn options(self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_secs))
    }
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, DbError> {
    let pool = config.options().connect(database_url).await?;
    tracing::debug!(max_connections = config.max_connections, "connected to postgres");
    Ok(pool)
}

/// Connect with the URL and pool sizing resolved into `config`.
///
/// # Errors
///
/// Returns [`DbError::MissingDatabaseUrl`] if no URL was configured, or
/// [`DbError::Sqlx`] if the connection cannot be established.
pub async fn connect_pool_from_config(config: &AppConfig) -> Result<PgPool, DbError> {
    let database_url = config
        .database_url
        .as_deref()
        .ok_or(DbError::MissingDatabaseUrl)?;
    connect_pool(database_url, PoolConfig::from_app_config(config)).await
}

/// Apply pending migrations and return how many were applied.
///
/// # Errors
///
/// Returns [`DbError::Migration`] if a migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, DbError> {
    let before = applied_migrations(pool).await;
    MIGRATOR.run(pool).await?;
    let applied = applied_migrations(pool).await.saturating_sub(before);
    tracing::info!(applied, "migrations up to date");
    Ok(applied)
}

/// Zero on a fresh database, where the bookkeeping table does not exist yet.
async fn applied_migrations(pool: &PgPool) -> usize {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success")
        .fetch_one(pool)
        .await
        .ok()
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0)
}

/// Round-trip a trivial query.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the database is unreachable.
pub async fn ping(pool: &PgPool) -> Result<(), DbError> {
    let one: i32 = sqlx::query_scalar("SELECT 1").fetch_one(pool).await?;
    tracing::debug!(result = one, "database reachable");
    Ok(())
}
