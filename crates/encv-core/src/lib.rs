//! Shared types for the ENCV metrics pipeline: the stat record model, the
//! table schema description, flattening of vendor payloads, the pure merge
//! planner behind the upsert engine, and application configuration.

mod app_config;
mod config;
pub mod envelope;
pub mod flatten;
pub mod merge;
pub mod outcome;
pub mod record;
pub mod schema;

use thiserror::Error;

pub use app_config::{AppConfig, Environment, LateRowPolicy};
pub use config::{load_app_config, load_app_config_from_env};
pub use envelope::extract_rows;
pub use flatten::{flatten_entry, flatten_statistics, FlattenOutcome, DISTRIBUTION_FIELD};
pub use merge::{merge_row, plan_batch, ColumnChange, MergePlan, RowChange, RowUpdate};
pub use outcome::{InvocationOutcome, InvocationResponse, ResponseBody};
pub use record::{format_stat_date, parse_stat_date, CounterValue, StatRecord, SOURCE_DATE_FORMAT};
pub use schema::{
    ColumnSpec, ColumnType, RestrictedBatch, RowRejection, StatSchema, DATE_COLUMN, ENCV_COUNTERS,
    ENCV_TABLE,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read config file {path}: {source}")]
    FileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    FileParse(#[from] serde_yaml::Error),

    #[error("config validation failed: {0}")]
    Validation(String),
}

/// A payload did not have the shape a pipeline stage expects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("missing field `{0}`")]
    MissingField(String),

    #[error("field `{field}` has unexpected type: expected {expected}")]
    UnexpectedType {
        field: String,
        expected: &'static str,
    },

    #[error("unparseable date \"{0}\"")]
    InvalidDate(String),

    #[error("expected a JSON object")]
    NotAnObject,

    #[error("expected a JSON array of rows, a `statistics` array, or a `body.data` envelope")]
    NotAList,
}
