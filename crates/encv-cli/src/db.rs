use clap::Subcommand;
use encv_core::{AppConfig, InvocationResponse};
use serde_json::json;
use sqlx::PgPool;

use crate::io;

/// Sub-commands available under `db`.
#[derive(Debug, Subcommand)]
pub enum DbCommands {
    /// Apply pending migrations
    Migrate,
    /// Check database connectivity
    Ping,
    /// Count rows in the stat table
    Count,
}

pub(crate) async fn run_db(
    pool: &PgPool,
    config: &AppConfig,
    command: &DbCommands,
) -> anyhow::Result<bool> {
    let data = match command {
        DbCommands::Migrate => {
            let applied = encv_db::run_migrations(pool).await?;
            tracing::info!(applied, "migrations complete");
            json!({ "applied": applied })
        }
        DbCommands::Ping => {
            encv_db::ping(pool).await?;
            json!({ "reachable": true })
        }
        DbCommands::Count => {
            let schema = io::load_schema(config)?;
            let rows = encv_db::count_stats(pool, &schema).await?;
            json!({ "table": schema.table, "rows": rows })
        }
    };
    io::emit(&InvocationResponse::success(data), None)
}
