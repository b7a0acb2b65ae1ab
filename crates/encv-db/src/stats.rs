//! Stat table persistence: the upsert engine and the full-table exporter.
//!
//! Table and column names come from a validated [`StatSchema`], so they are
//! spliced into statements as quoted identifiers. Values are always bound.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use encv_core::{
    plan_batch, ColumnSpec, ColumnType, CounterValue, MergePlan, RowRejection, RowUpdate,
    StatRecord, StatSchema, DATE_COLUMN,
};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row};

use crate::DbError;

/// Postgres caps a statement at 65535 bind parameters.
const MAX_BIND_PARAMS: usize = 60_000;

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// What an upsert did to the table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpsertReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub rejected: Vec<RowRejection>,
    pub ignored_columns: Vec<String>,
}

impl UpsertReport {
    /// One line per rejected row, for a partial outcome.
    #[must_use]
    pub fn rejection_reasons(&self) -> Vec<String> {
        self.rejected
            .iter()
            .map(|r| match &r.date {
                Some(date) => format!("row {} ({date}): {}", r.index, r.reason),
                None => format!("row {}: {}", r.index, r.reason),
            })
            .collect()
    }
}

/// A batch planned against the stored rows but not yet applied.
#[derive(Debug, Clone, Default)]
pub struct UpsertPlan {
    pub plan: MergePlan,
    /// Schema columns present in the batch; the only columns written.
    pub columns: Vec<String>,
    pub rejected: Vec<RowRejection>,
    pub ignored_columns: Vec<String>,
}

impl UpsertPlan {
    #[must_use]
    pub fn report(&self) -> UpsertReport {
        UpsertReport {
            inserted: self.plan.inserts.len(),
            updated: self.plan.updates.len(),
            unchanged: self.plan.unchanged,
            rejected: self.rejected.clone(),
            ignored_columns: self.ignored_columns.clone(),
        }
    }

    /// Dates that would be inserted, in ascending order.
    #[must_use]
    pub fn insert_dates(&self) -> Vec<NaiveDateTime> {
        self.plan.inserts.iter().map(|r| r.date).collect()
    }

    #[must_use]
    pub fn updates(&self) -> &[RowUpdate] {
        &self.plan.updates
    }
}

// ---------------------------------------------------------------------------
// DDL
// ---------------------------------------------------------------------------

/// Create the stat table described by `schema` if it does not exist yet.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn ensure_table(pool: &PgPool, schema: &StatSchema) -> Result<(), DbError> {
    sqlx::query(&create_table_sql(schema)).execute(pool).await?;
    Ok(())
}

fn create_table_sql(schema: &StatSchema) -> String {
    let mut columns = vec![format!("{} TIMESTAMP PRIMARY KEY", quote(DATE_COLUMN))];
    columns.extend(
        schema
            .columns
            .iter()
            .map(|c| format!("{} {}", quote(&c.name), c.column_type.sql_type())),
    );
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote(&schema.table),
        columns.join(", ")
    )
}

// ---------------------------------------------------------------------------
// Upsert engine
// ---------------------------------------------------------------------------

/// Plan `rows` against the current table contents without writing anything.
///
/// # Errors
///
/// Returns [`DbError`] if the stored rows cannot be read.
pub async fn plan_upsert(
    pool: &PgPool,
    schema: &StatSchema,
    rows: &[Map<String, Value>],
) -> Result<UpsertPlan, DbError> {
    let mut conn = pool.acquire().await?;
    build_plan(&mut conn, schema, rows).await
}

/// Insert new dates and update changed columns of existing dates in a single
/// transaction.
///
/// Rows are restricted to the columns both `schema` and the batch know about.
/// Malformed rows are reported in [`UpsertReport::rejected`] and skipped. If
/// any statement fails the transaction is dropped uncommitted and nothing
/// from the batch is applied.
///
/// # Errors
///
/// Returns [`DbError`] if reading, writing, or committing fails.
pub async fn upsert_stats(
    pool: &PgPool,
    schema: &StatSchema,
    rows: &[Map<String, Value>],
) -> Result<UpsertReport, DbError> {
    match upsert_in_transaction(pool, schema, rows).await {
        Ok(report) => {
            tracing::info!(
                table = %schema.table,
                inserted = report.inserted,
                updated = report.updated,
                unchanged = report.unchanged,
                rejected = report.rejected.len(),
                "upsert committed"
            );
            Ok(report)
        }
        Err(e) => {
            tracing::error!(table = %schema.table, error = %e, "upsert rolled back");
            Err(e)
        }
    }
}

async fn upsert_in_transaction(
    pool: &PgPool,
    schema: &StatSchema,
    rows: &[Map<String, Value>],
) -> Result<UpsertReport, DbError> {
    let mut tx = pool.begin().await?;

    let planned = build_plan(&mut tx, schema, rows).await?;

    for update in &planned.plan.updates {
        update_row(&mut tx, schema, update).await?;
    }

    let columns = schema_columns(schema, &planned.columns);
    insert_rows(&mut tx, schema, &columns, &planned.plan.inserts).await?;

    tx.commit().await?;
    Ok(planned.report())
}

async fn build_plan(
    conn: &mut PgConnection,
    schema: &StatSchema,
    rows: &[Map<String, Value>],
) -> Result<UpsertPlan, DbError> {
    let batch = schema.restrict(rows);
    if !batch.ignored_columns.is_empty() {
        tracing::warn!(
            table = %schema.table,
            columns = ?batch.ignored_columns,
            "ignoring columns the schema does not declare"
        );
    }

    let columns = schema_columns(schema, &batch.columns);
    let mut dates: Vec<NaiveDateTime> = batch.records.iter().map(|r| r.date).collect();
    dates.sort_unstable();
    dates.dedup();

    let stored = load_stored(conn, schema, &columns, &dates).await?;
    tracing::debug!(
        table = %schema.table,
        candidates = batch.records.len(),
        stored = stored.len(),
        "planning upsert"
    );

    Ok(UpsertPlan {
        plan: plan_batch(&stored, &batch.records),
        columns: batch.columns,
        rejected: batch.rejected,
        ignored_columns: batch.ignored_columns,
    })
}

async fn load_stored(
    conn: &mut PgConnection,
    schema: &StatSchema,
    columns: &[&ColumnSpec],
    dates: &[NaiveDateTime],
) -> Result<BTreeMap<NaiveDateTime, StatRecord>, DbError> {
    if dates.is_empty() {
        return Ok(BTreeMap::new());
    }

    let sql = format!(
        "{} WHERE {} = ANY($1)",
        select_sql(schema, columns),
        quote(DATE_COLUMN)
    );
    let rows = sqlx::query(&sql)
        .bind(dates.to_vec())
        .fetch_all(&mut *conn)
        .await?;

    rows.iter()
        .map(|row| decode_row(schema, row, columns).map(|r| (r.date, r)))
        .collect()
}

async fn update_row(
    conn: &mut PgConnection,
    schema: &StatSchema,
    update: &RowUpdate,
) -> Result<(), DbError> {
    let mut qb: QueryBuilder<'_, Postgres> =
        QueryBuilder::new(format!("UPDATE {} SET ", quote(&schema.table)));
    for (i, change) in update.changes.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push(quote(&change.column)).push(" = ");
        match change.to {
            CounterValue::Integer(v) => qb.push_bind(v),
            CounterValue::Float(v) => qb.push_bind(v),
        };
    }
    qb.push(" WHERE ")
        .push(quote(DATE_COLUMN))
        .push(" = ")
        .push_bind(update.date);

    tracing::debug!(
        date = %update.date,
        columns = update.changes.len(),
        "updating changed columns"
    );
    qb.build().execute(&mut *conn).await?;
    Ok(())
}

async fn insert_rows(
    conn: &mut PgConnection,
    schema: &StatSchema,
    columns: &[&ColumnSpec],
    records: &[StatRecord],
) -> Result<(), DbError> {
    if records.is_empty() {
        return Ok(());
    }

    let mut names = vec![quote(DATE_COLUMN)];
    names.extend(columns.iter().map(|c| quote(&c.name)));
    let prefix = format!(
        "INSERT INTO {} ({}) ",
        quote(&schema.table),
        names.join(", ")
    );

    let rows_per_statement = (MAX_BIND_PARAMS / names.len()).max(1);
    for chunk in records.chunks(rows_per_statement) {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(&prefix);
        qb.push_values(chunk, |mut b, record| {
            b.push_bind(record.date);
            for column in columns {
                match (record.get(&column.name), column.column_type) {
                    (Some(CounterValue::Integer(v)), _) => b.push_bind(v),
                    (Some(CounterValue::Float(v)), _) => b.push_bind(v),
                    (None, ColumnType::Integer) => b.push_bind(None::<i64>),
                    (None, ColumnType::Float) => b.push_bind(None::<f64>),
                };
            }
        });
        qb.build().execute(&mut *conn).await?;
    }

    tracing::debug!(table = %schema.table, rows = records.len(), "inserted new dates");
    Ok(())
}

// ---------------------------------------------------------------------------
// Reads and export
// ---------------------------------------------------------------------------

/// Every stored row, ascending by date.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a column does not decode as
/// its schema type.
pub async fn list_stats(pool: &PgPool, schema: &StatSchema) -> Result<Vec<StatRecord>, DbError> {
    let columns: Vec<&ColumnSpec> = schema.columns.iter().collect();
    let sql = format!(
        "{} ORDER BY {} ASC",
        select_sql(schema, &columns),
        quote(DATE_COLUMN)
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter()
        .map(|row| decode_row(schema, row, &columns))
        .collect()
}

/// The stored row for `date`, if any.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or the row does not decode.
pub async fn fetch_stat(
    pool: &PgPool,
    schema: &StatSchema,
    date: NaiveDateTime,
) -> Result<Option<StatRecord>, DbError> {
    let columns: Vec<&ColumnSpec> = schema.columns.iter().collect();
    let sql = format!(
        "{} WHERE {} = $1",
        select_sql(schema, &columns),
        quote(DATE_COLUMN)
    );
    let row = sqlx::query(&sql).bind(date).fetch_optional(pool).await?;
    row.map(|r| decode_row(schema, &r, &columns)).transpose()
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_stats(pool: &PgPool, schema: &StatSchema) -> Result<i64, DbError> {
    let sql = format!("SELECT COUNT(*) FROM {}", quote(&schema.table));
    let count = sqlx::query_scalar::<_, i64>(&sql).fetch_one(pool).await?;
    Ok(count)
}

/// The whole table as flat JSON rows, ascending by date, with dates in
/// `%Y-%m-%d %H:%M:%S` form and `null` for missing counters.
///
/// # Errors
///
/// Returns [`DbError`] if the table cannot be read.
pub async fn export_stats_json(pool: &PgPool, schema: &StatSchema) -> Result<Vec<Value>, DbError> {
    let records = list_stats(pool, schema).await?;
    tracing::info!(table = %schema.table, rows = records.len(), "exported stats");
    Ok(records
        .iter()
        .map(|r| Value::Object(r.to_json(schema)))
        .collect())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn quote(ident: &str) -> String {
    format!("\"{ident}\"")
}

fn schema_columns<'a>(schema: &'a StatSchema, names: &[String]) -> Vec<&'a ColumnSpec> {
    names.iter().filter_map(|n| schema.column(n)).collect()
}

fn select_sql(schema: &StatSchema, columns: &[&ColumnSpec]) -> String {
    let mut names = vec![quote(DATE_COLUMN)];
    names.extend(columns.iter().map(|c| quote(&c.name)));
    format!("SELECT {} FROM {}", names.join(", "), quote(&schema.table))
}

fn decode_row(
    schema: &StatSchema,
    row: &PgRow,
    columns: &[&ColumnSpec],
) -> Result<StatRecord, DbError> {
    let mismatch = |e: sqlx::Error| DbError::InvalidSchema {
        table: schema.table.clone(),
        reason: e.to_string(),
    };

    let date: NaiveDateTime = row.try_get(DATE_COLUMN).map_err(mismatch)?;
    let mut record = StatRecord::new(date);
    for column in columns {
        let name = column.name.as_str();
        let value = match column.column_type {
            ColumnType::Integer => row
                .try_get::<Option<i64>, _>(name)
                .map_err(mismatch)?
                .map(CounterValue::Integer),
            ColumnType::Float => row
                .try_get::<Option<f64>, _>(name)
                .map_err(mismatch)?
                .map(CounterValue::Float),
        };
        if let Some(value) = value {
            record.values.insert(column.name.clone(), value);
        }
    }
    Ok(record)
}
