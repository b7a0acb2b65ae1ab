//! Wire types for the Sheets v4 `spreadsheets.values` resource.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Dimension {
    #[default]
    Rows,
    Columns,
}

/// A block of cell values in A1 notation.
///
/// `values` is omitted by the API when the range is empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(default)]
    pub major_dimension: Dimension,
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

impl ValueRange {
    /// One column of string cells starting at the top of `range`.
    #[must_use]
    pub fn column(range: String, cells: Vec<String>) -> Self {
        Self {
            range: Some(range),
            major_dimension: Dimension::Columns,
            values: vec![cells.into_iter().map(Value::String).collect()],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateValuesResponse {
    #[serde(default)]
    pub spreadsheet_id: Option<String>,
    #[serde(default)]
    pub updated_range: Option<String>,
    #[serde(default)]
    pub updated_rows: Option<u64>,
    #[serde(default)]
    pub updated_columns: Option<u64>,
    #[serde(default)]
    pub updated_cells: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdateResponse {
    #[serde(default)]
    pub spreadsheet_id: Option<String>,
    #[serde(default)]
    pub total_updated_rows: Option<u64>,
    #[serde(default)]
    pub total_updated_cells: Option<u64>,
    #[serde(default)]
    pub responses: Vec<UpdateValuesResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BatchUpdateRequest<'a> {
    pub value_input_option: &'static str,
    pub data: &'a [ValueRange],
}

/// Cell text as displayed; `null` is an empty cell.
#[must_use]
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
