//! The canonical stat record and its date handling.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Number, Value};

use crate::schema::{StatSchema, DATE_COLUMN};
use crate::FormatError;

/// Canonical string form of a stat date in the JSON interchange format.
pub const SOURCE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Naive formats accepted on input, tried in order after RFC 3339.
const NAIVE_INPUT_FORMATS: [&str; 3] = [
    SOURCE_DATE_FORMAT,
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// A single numeric counter value.
///
/// Equality is exact: `Float(1.0) != Integer(1)` and floats compare bitwise
/// through `f64::eq`, with no tolerance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CounterValue {
    Integer(i64),
    Float(f64),
}

impl CounterValue {
    /// JSON number for this value. Non-finite floats have no JSON number form
    /// and become `null`.
    #[must_use]
    pub fn to_json(self) -> Value {
        match self {
            CounterValue::Integer(v) => Value::from(v),
            CounterValue::Float(v) => Number::from_f64(v).map_or(Value::Null, Value::Number),
        }
    }
}

impl fmt::Display for CounterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterValue::Integer(v) => write!(f, "{v}"),
            CounterValue::Float(v) => write!(f, "{v}"),
        }
    }
}

/// One period of ENCV statistics, keyed by `date` (UTC).
///
/// `values` only holds counters that are present; a missing key means the
/// counter was absent from the input (or `NULL` in the store).
#[derive(Debug, Clone, PartialEq)]
pub struct StatRecord {
    pub date: NaiveDateTime,
    pub values: BTreeMap<String, CounterValue>,
}

impl StatRecord {
    #[must_use]
    pub fn new(date: NaiveDateTime) -> Self {
        Self {
            date,
            values: BTreeMap::new(),
        }
    }

    /// Builder-style setter, mostly useful for constructing fixtures.
    #[must_use]
    pub fn with(mut self, column: &str, value: CounterValue) -> Self {
        self.values.insert(column.to_string(), value);
        self
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<CounterValue> {
        self.values.get(column).copied()
    }

    /// Overlay every value from `other` onto `self`. The dates are assumed equal.
    pub fn absorb(&mut self, other: &StatRecord) {
        for (column, value) in &other.values {
            self.values.insert(column.clone(), *value);
        }
    }

    /// Flat JSON object with `date` in [`SOURCE_DATE_FORMAT`] followed by every
    /// schema column, `null` where the record has no value.
    #[must_use]
    pub fn to_json(&self, schema: &StatSchema) -> Map<String, Value> {
        let mut object = Map::new();
        object.insert(
            DATE_COLUMN.to_string(),
            Value::String(format_stat_date(self.date)),
        );
        for column in &schema.columns {
            let value = self.get(&column.name).map_or(Value::Null, CounterValue::to_json);
            object.insert(column.name.clone(), value);
        }
        object
    }
}

/// Parse a stat date as produced by the vendor API (RFC 3339) or by the JSON
/// exporter (`%Y-%m-%d %H:%M:%S`). Offsets are normalized to UTC. A bare
/// `%Y-%m-%d` date maps to midnight.
///
/// # Errors
///
/// Returns [`FormatError::InvalidDate`] if no accepted format matches.
pub fn parse_stat_date(raw: &str) -> Result<NaiveDateTime, FormatError> {
    let trimmed = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%:z") {
        return Ok(dt.naive_utc());
    }
    for format in NAIVE_INPUT_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(dt);
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| FormatError::InvalidDate(raw.to_string()))
}

#[must_use]
pub fn format_stat_date(date: NaiveDateTime) -> String {
    date.format(SOURCE_DATE_FORMAT).to_string()
}
