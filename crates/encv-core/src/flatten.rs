//! Flattening of vendor statistics entries.
//!
//! The realm stats endpoint returns entries shaped like
//! `{"date": ..., "data": {"codes_issued": 10, ..., "code_claim_age_distribution": [...]}}`.
//! Storage wants one flat row per date, without the distribution breakdown.

use serde_json::{Map, Value};

use crate::schema::{RowRejection, DATE_COLUMN};
use crate::FormatError;

/// Non-scalar breakdown the stat tables do not store.
pub const DISTRIBUTION_FIELD: &str = "code_claim_age_distribution";

const DATA_FIELD: &str = "data";

/// Flat rows plus the entries that could not be flattened.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlattenOutcome {
    pub rows: Vec<Map<String, Value>>,
    pub failures: Vec<RowRejection>,
}

/// Collapse `{date, data: {...}}` into `{date, ...data}` and drop
/// [`DISTRIBUTION_FIELD`].
///
/// # Errors
///
/// Returns [`FormatError`] if the entry is not an object, has no `date`, or
/// its `data` is missing or not an object.
pub fn flatten_entry(entry: &Value) -> Result<Map<String, Value>, FormatError> {
    let object = entry.as_object().ok_or(FormatError::NotAnObject)?;

    let date = object
        .get(DATE_COLUMN)
        .filter(|v| !v.is_null())
        .ok_or_else(|| FormatError::MissingField(DATE_COLUMN.to_string()))?;

    let data = object
        .get(DATA_FIELD)
        .ok_or_else(|| FormatError::MissingField(DATA_FIELD.to_string()))?
        .as_object()
        .ok_or_else(|| FormatError::UnexpectedType {
            field: DATA_FIELD.to_string(),
            expected: "object",
        })?;

    let mut flat = Map::with_capacity(data.len() + 1);
    flat.insert(DATE_COLUMN.to_string(), date.clone());
    for (key, value) in data {
        if key != DISTRIBUTION_FIELD && key != DATE_COLUMN {
            flat.insert(key.clone(), value.clone());
        }
    }
    Ok(flat)
}

/// Flatten a batch, collecting failures instead of stopping at the first one.
#[must_use]
pub fn flatten_statistics(entries: &[Value]) -> FlattenOutcome {
    let mut outcome = FlattenOutcome::default();
    for (index, entry) in entries.iter().enumerate() {
        match flatten_entry(entry) {
            Ok(row) => outcome.rows.push(row),
            Err(err) => {
                let date = entry
                    .get(DATE_COLUMN)
                    .and_then(Value::as_str)
                    .map(str::to_string);
                tracing::warn!(index, error = %err, "skipping malformed statistics entry");
                outcome.failures.push(RowRejection {
                    index,
                    date,
                    reason: err.to_string(),
                });
            }
        }
    }
    outcome
}
