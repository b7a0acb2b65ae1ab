//! Table schema description used by the upsert engine and the exporter.
//!
//! A [`StatSchema`] names the target table and its counter columns. The
//! `date` key column is implicit. Column names are validated as plain SQL
//! identifiers so the database layer can splice them into statements.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::record::{parse_stat_date, CounterValue, StatRecord};
use crate::{ConfigError, FormatError};

/// Name of the key column in every stat table and every flat row.
pub const DATE_COLUMN: &str = "date";

pub const ENCV_TABLE: &str = "aphl_codes";

pub const ENCV_COUNTERS: [&str; 6] = [
    "codes_issued",
    "codes_claimed",
    "codes_invalid",
    "code_claim_mean_age_seconds",
    "tokens_claimed",
    "tokens_invalid",
];

const MAX_IDENTIFIER_LEN: usize = 63;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    Integer,
    Float,
}

impl ColumnType {
    #[must_use]
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Integer => "BIGINT",
            ColumnType::Float => "DOUBLE PRECISION",
        }
    }

    /// Convert a JSON value into a counter of this type.
    ///
    /// Integral floats such as `5.0` are accepted for integer columns; any
    /// JSON number is accepted for float columns.
    fn coerce(self, column: &str, value: &Value) -> Result<CounterValue, FormatError> {
        let unexpected = |expected| FormatError::UnexpectedType {
            field: column.to_string(),
            expected,
        };
        match self {
            ColumnType::Integer => {
                if let Some(v) = value.as_i64() {
                    return Ok(CounterValue::Integer(v));
                }
                match value.as_f64() {
                    #[allow(clippy::cast_possible_truncation)]
                    Some(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => {
                        Ok(CounterValue::Integer(v as i64))
                    }
                    _ => Err(unexpected("integer")),
                }
            }
            ColumnType::Float => value
                .as_f64()
                .map(CounterValue::Float)
                .ok_or_else(|| unexpected("number")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub column_type: ColumnType,
}

impl ColumnSpec {
    #[must_use]
    pub fn integer(name: &str) -> Self {
        Self {
            name: name.to_string(),
            column_type: ColumnType::Integer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatSchema {
    pub table: String,
    pub columns: Vec<ColumnSpec>,
}

/// Why a row was left out of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowRejection {
    /// Position of the row in the input batch.
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub reason: String,
}

/// A batch reduced to the columns both the schema and the input know about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestrictedBatch {
    pub records: Vec<StatRecord>,
    /// Schema columns that appeared in the batch, in schema order.
    pub columns: Vec<String>,
    /// Input columns the schema does not declare, sorted.
    pub ignored_columns: Vec<String>,
    pub rejected: Vec<RowRejection>,
}

impl StatSchema {
    /// Build and validate a schema.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the table or any column name is
    /// not a plain lowercase identifier, a column is named `date`, columns
    /// repeat, or there are no columns.
    pub fn new(table: &str, columns: Vec<ColumnSpec>) -> Result<Self, ConfigError> {
        let schema = Self {
            table: table.to_string(),
            columns,
        };
        schema.validate()?;
        Ok(schema)
    }

    /// The `aphl_codes` table fed by the ENCV realm stats endpoint.
    #[must_use]
    pub fn encv() -> Self {
        Self {
            table: ENCV_TABLE.to_string(),
            columns: ENCV_COUNTERS.iter().map(|c| ColumnSpec::integer(c)).collect(),
        }
    }

    /// Load and validate a schema from a YAML file.
    ///
    /// ```yaml
    /// table: aphl_codes
    /// columns:
    ///   - name: codes_issued
    ///   - name: code_claim_mean_age_seconds
    ///     type: float
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileIo {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_yaml(&content)
    }

    /// # Errors
    ///
    /// Returns `ConfigError` if the YAML cannot be parsed or fails validation.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let schema: StatSchema = serde_yaml::from_str(content)?;
        schema.validate()?;
        Ok(schema)
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Restrict flat JSON rows to `schema columns ∩ batch columns` and convert
    /// them into [`StatRecord`]s.
    ///
    /// Batch columns are the union of keys across all rows. A column in the
    /// intersection that is missing or `null` on a particular row is simply
    /// not set on that record. Rows without a parseable `date`, or with a
    /// value that does not fit its column type, are rejected individually.
    #[must_use]
    pub fn restrict(&self, rows: &[Map<String, Value>]) -> RestrictedBatch {
        let batch_columns: BTreeSet<&str> = rows
            .iter()
            .flat_map(|row| row.keys().map(String::as_str))
            .filter(|key| *key != DATE_COLUMN)
            .collect();

        let columns: Vec<&ColumnSpec> = self
            .columns
            .iter()
            .filter(|c| batch_columns.contains(c.name.as_str()))
            .collect();

        let ignored_columns = batch_columns
            .iter()
            .filter(|key| self.column(key).is_none())
            .map(|key| (*key).to_string())
            .collect();

        let mut records = Vec::with_capacity(rows.len());
        let mut rejected = Vec::new();

        for (index, row) in rows.iter().enumerate() {
            match restrict_row(row, &columns) {
                Ok(record) => records.push(record),
                Err(err) => {
                    let date = row
                        .get(DATE_COLUMN)
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    tracing::warn!(index, date = ?date, error = %err, "rejecting row");
                    rejected.push(RowRejection {
                        index,
                        date,
                        reason: err.to_string(),
                    });
                }
            }
        }

        RestrictedBatch {
            records,
            columns: columns.iter().map(|c| c.name.clone()).collect(),
            ignored_columns,
            rejected,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !is_identifier(&self.table) {
            return Err(ConfigError::Validation(format!(
                "table name '{}' is not a valid identifier",
                self.table
            )));
        }
        if self.columns.is_empty() {
            return Err(ConfigError::Validation(format!(
                "schema for '{}' declares no columns",
                self.table
            )));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if !is_identifier(&column.name) {
                return Err(ConfigError::Validation(format!(
                    "column name '{}' is not a valid identifier",
                    column.name
                )));
            }
            if column.name == DATE_COLUMN {
                return Err(ConfigError::Validation(
                    "`date` is the key column and cannot be declared as a counter".to_string(),
                ));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate column: '{}'",
                    column.name
                )));
            }
        }
        Ok(())
    }
}

fn restrict_row(row: &Map<String, Value>, columns: &[&ColumnSpec]) -> Result<StatRecord, FormatError> {
    let raw_date = match row.get(DATE_COLUMN) {
        None | Some(Value::Null) => return Err(FormatError::MissingField(DATE_COLUMN.to_string())),
        Some(Value::String(s)) => s,
        Some(_) => {
            return Err(FormatError::UnexpectedType {
                field: DATE_COLUMN.to_string(),
                expected: "string",
            })
        }
    };

    let mut record = StatRecord::new(parse_stat_date(raw_date)?);
    for column in columns {
        match row.get(&column.name) {
            None | Some(Value::Null) => {}
            Some(value) => {
                let counter = column.column_type.coerce(&column.name, value)?;
                record.values.insert(column.name.clone(), counter);
            }
        }
    }
    Ok(record)
}

/// `[a-z_][a-z0-9_]*`, at most 63 bytes (the Postgres identifier limit).
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= MAX_IDENTIFIER_LEN
        && (first.is_ascii_lowercase() || first == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
