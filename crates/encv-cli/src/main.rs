mod append;
mod db;
mod fetch;
mod ingest;
mod io;
mod pipeline;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use encv_core::{AppConfig, InvocationResponse};
use tracing_subscriber::EnvFilter;

use crate::db::DbCommands;

#[derive(Debug, Parser)]
#[command(name = "encv-cli")]
#[command(about = "ENCV statistics pipeline: vendor API to Postgres to JSON to Google Sheets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch raw realm statistics from the ENCV admin API
    Fetch {
        /// Write the response envelope here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Flatten fetched statistics and upsert them into the stat table
    Ingest {
        /// Fetch output to read (stdin when omitted)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Report inserts and updates without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Export the stat table as JSON rows in date order
    Export {
        /// Write the response envelope here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Append exported rows newer than the sheet's last date
    Append {
        /// Export output to read (stdin when omitted)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Spreadsheet to write (defaults to ENCV_SPREADSHEET_ID)
        #[arg(long)]
        spreadsheet_id: Option<String>,
        /// Sheet name (defaults to ENCV_SHEET_NAME)
        #[arg(long)]
        sheet: Option<String>,
        /// Report what would be written without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Fetch, ingest, export, and append in one invocation
    Run {
        #[arg(long)]
        spreadsheet_id: Option<String>,
        #[arg(long)]
        sheet: Option<String>,
        /// Stop after the export
        #[arg(long)]
        skip_sheet: bool,
    },
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

impl Commands {
    fn needs_database(&self) -> bool {
        matches!(
            self,
            Commands::Ingest { .. } | Commands::Export { .. } | Commands::Run { .. } | Commands::Db { .. }
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = match encv_core::load_app_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            io::emit(&InvocationResponse::<()>::failure(e.to_string()), None)?;
            return Ok(ExitCode::FAILURE);
        }
    };
    init_tracing(&config)?;
    tracing::debug!(?config, "loaded configuration");

    let succeeded = match execute(cli.command, &config).await {
        Ok(succeeded) => succeeded,
        Err(e) => {
            let reason = format!("{e:#}");
            tracing::error!(error = %reason, "command failed");
            io::emit(&InvocationResponse::<()>::failure(reason), None)?;
            false
        }
    };
    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Logs go to stderr; stdout carries only the response envelope.
fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Run one command. `Ok(false)` means the command reported a failure outcome.
///
/// The pool is opened only for commands that touch the database and is closed
/// before returning, whatever the result.
async fn execute(command: Commands, config: &AppConfig) -> anyhow::Result<bool> {
    let pool = if command.needs_database() {
        Some(encv_db::connect_pool_from_config(config).await?)
    } else {
        None
    };
    let result = dispatch(command, pool.as_ref(), config).await;
    if let Some(pool) = pool {
        pool.close().await;
    }
    result
}

async fn dispatch(
    command: Commands,
    pool: Option<&sqlx::PgPool>,
    config: &AppConfig,
) -> anyhow::Result<bool> {
    let require_pool = || pool.context("command needs a database connection");
    match command {
        Commands::Fetch { output } => fetch::run_fetch(config, output.as_deref()).await,
        Commands::Ingest { input, dry_run } => {
            ingest::run_ingest(require_pool()?, config, input.as_deref(), dry_run).await
        }
        Commands::Export { output } => ingest::run_export(require_pool()?, config, output.as_deref()).await,
        Commands::Append {
            input,
            spreadsheet_id,
            sheet,
            dry_run,
        } => {
            append::run_append(
                config,
                input.as_deref(),
                spreadsheet_id.as_deref(),
                sheet.as_deref(),
                dry_run,
            )
            .await
        }
        Commands::Run {
            spreadsheet_id,
            sheet,
            skip_sheet,
        } => {
            pipeline::run_pipeline(
                require_pool()?,
                config,
                spreadsheet_id.as_deref(),
                sheet.as_deref(),
                skip_sheet,
            )
            .await
        }
        Commands::Db { command } => db::run_db(require_pool()?, config, &command).await,
    }
}
