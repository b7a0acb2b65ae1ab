//! Google Sheets output stage.
//!
//! - [`client`]: the [`SheetValues`] seam and its Sheets v4 REST implementation.
//! - [`layout`]: which record field lands in which sheet column.
//! - [`appender`]: resume-point discovery and selective append.

pub mod appender;
pub mod client;
pub mod error;
pub mod layout;
pub mod types;

pub use appender::{
    format_display_date, parse_display_date, AppendPlan, AppendReport, PlannedRow, ResumePoint,
    SheetAppender, DEFAULT_SHEET_NAME, DISPLAY_DATE_FORMAT,
};
pub use client::{SheetValues, SheetsClient, SPREADSHEETS_SCOPE};
pub use error::{AppendError, SheetsError};
pub use layout::{SheetColumn, SheetLayout};
pub use types::{BatchUpdateResponse, Dimension, UpdateValuesResponse, ValueRange};
