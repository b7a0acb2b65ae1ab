//! Flatten + upsert, and the JSON export.

use std::path::Path;

use anyhow::Context as _;
use encv_core::{
    format_stat_date, flatten_statistics, AppConfig, InvocationOutcome, InvocationResponse,
    RowRejection, RowUpdate, StatSchema,
};
use encv_db::UpsertReport;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::io;

/// Result of an ingest, written or planned.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct IngestSummary {
    pub dry_run: bool,
    /// Statistics entries that could not be flattened.
    pub malformed: Vec<RowRejection>,
    #[serde(flatten)]
    pub report: UpsertReport,
    /// Dates a dry run would insert.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub planned_inserts: Vec<String>,
    /// Column changes a dry run would apply.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub planned_updates: Vec<RowUpdate>,
}

impl IngestSummary {
    pub(crate) fn reasons(&self) -> Vec<String> {
        self.malformed
            .iter()
            .map(|r| format!("entry {}: {}", r.index, r.reason))
            .chain(self.report.rejection_reasons())
            .collect()
    }
}

/// Flatten raw statistics entries and upsert them into the table described
/// by `schema`, creating the table first if it is missing.
pub(crate) async fn ingest_entries(
    pool: &PgPool,
    schema: &StatSchema,
    entries: &[Value],
    dry_run: bool,
) -> anyhow::Result<IngestSummary> {
    let flattened = flatten_statistics(entries);

    if dry_run {
        let plan = encv_db::plan_upsert(pool, schema, &flattened.rows)
            .await
            .context("failed to plan the upsert")?;
        return Ok(IngestSummary {
            dry_run,
            malformed: flattened.failures,
            report: plan.report(),
            planned_inserts: plan.insert_dates().into_iter().map(format_stat_date).collect(),
            planned_updates: plan.updates().to_vec(),
        });
    }

    encv_db::ensure_table(pool, schema)
        .await
        .with_context(|| format!("failed to create table {}", schema.table))?;
    let report = encv_db::upsert_stats(pool, schema, &flattened.rows)
        .await
        .context("upsert failed; no rows were applied")?;

    Ok(IngestSummary {
        dry_run,
        malformed: flattened.failures,
        report,
        planned_inserts: Vec::new(),
        planned_updates: Vec::new(),
    })
}

pub(crate) async fn run_ingest(
    pool: &PgPool,
    config: &AppConfig,
    input: Option<&Path>,
    dry_run: bool,
) -> anyhow::Result<bool> {
    let schema = io::load_schema(config)?;
    let entries = encv_core::extract_rows(io::read_input(input)?)?;
    let summary = ingest_entries(pool, &schema, &entries, dry_run).await?;

    let outcome = InvocationOutcome::from_reasons(summary.reasons());
    io::emit(&InvocationResponse::new(outcome, Some(summary)), None)
}

pub(crate) async fn run_export(
    pool: &PgPool,
    config: &AppConfig,
    output: Option<&Path>,
) -> anyhow::Result<bool> {
    let schema = io::load_schema(config)?;
    let rows = encv_db::export_stats_json(pool, &schema)
        .await
        .with_context(|| format!("failed to export table {}", schema.table))?;
    tracing::info!(rows = rows.len(), table = %schema.table, "exported stat rows");
    io::emit(&InvocationResponse::success(rows), output)
}
