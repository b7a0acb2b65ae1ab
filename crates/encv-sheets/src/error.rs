use encv_core::FormatError;
use encv_secrets::AuthError;
use thiserror::Error;

/// Errors from the Google Sheets values API.
#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Sheets API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid Sheets URL {0}")]
    InvalidUrl(String),
}

/// Errors from resume-point discovery and selective append.
#[derive(Debug, Error)]
pub enum AppendError {
    #[error(transparent)]
    Sheets(#[from] SheetsError),

    /// The last populated date cell is not a date.
    #[error("sheet row {row} has an unparseable date: {value:?}")]
    InvalidSheetDate { row: usize, value: String },

    /// A candidate row has no usable `date`.
    #[error("candidate row {index}: {source}")]
    InvalidRow {
        index: usize,
        #[source]
        source: FormatError,
    },

    /// Rows at or before the resume point are missing from the sheet and the
    /// late-row policy is `error`.
    #[error("{count} late row(s) not in the sheet, earliest {earliest}")]
    LateRows { count: usize, earliest: String },

    #[error("batch update returned no responses")]
    EmptyResponse,
}
