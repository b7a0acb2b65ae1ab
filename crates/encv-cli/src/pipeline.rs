//! The whole chain in one invocation: fetch, ingest, export, append.

use encv_core::{AppConfig, InvocationOutcome, InvocationResponse};
use encv_sheets::AppendReport;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::PgPool;

use crate::append::{append_outcome, append_rows, build_appender};
use crate::fetch::fetch_statistics;
use crate::ingest::{ingest_entries, IngestSummary};
use crate::io;

#[derive(Debug, Serialize)]
struct RunSummary {
    fetched: usize,
    ingest: IngestSummary,
    exported: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    append: Option<AppendReport>,
}

pub(crate) async fn run_pipeline(
    pool: &PgPool,
    config: &AppConfig,
    spreadsheet_id: Option<&str>,
    sheet: Option<&str>,
    skip_sheet: bool,
) -> anyhow::Result<bool> {
    let schema = io::load_schema(config)?;

    let statistics = fetch_statistics(config).await?;
    let ingest = ingest_entries(pool, &schema, &statistics, false).await?;
    let exported = encv_db::export_stats_json(pool, &schema).await?;
    tracing::info!(
        fetched = statistics.len(),
        inserted = ingest.report.inserted,
        updated = ingest.report.updated,
        exported = exported.len(),
        "database stages complete"
    );

    let mut reasons = ingest.reasons();
    let append = if skip_sheet {
        None
    } else {
        let rows: Vec<Map<String, Value>> = exported
            .iter()
            .filter_map(|row| row.as_object().cloned())
            .collect();
        let mut appender = build_appender(config, spreadsheet_id, sheet).await?;
        let report = append_rows(&mut appender, &rows).await?;
        if let InvocationOutcome::Partial { reasons: late } = append_outcome(&report) {
            reasons.extend(late);
        }
        Some(report)
    };

    let summary = RunSummary {
        fetched: statistics.len(),
        ingest,
        exported: exported.len(),
        append,
    };
    io::emit(
        &InvocationResponse::new(InvocationOutcome::from_reasons(reasons), Some(summary)),
        None,
    )
}
