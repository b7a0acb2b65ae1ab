//! Resume-point discovery and selective append.
//!
//! The sheet's date column is read once per [`SheetAppender`] to find the
//! resume point (last populated row and its date). Each append writes only
//! candidate rows strictly newer than that date, as one column-major batch
//! starting on the row after it, then advances the cached point so a second
//! append on the same appender continues directly below the first.

use std::collections::HashSet;

use chrono::{NaiveDateTime, Timelike};
use encv_core::{parse_stat_date, FormatError, LateRowPolicy, DATE_COLUMN};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::client::SheetValues;
use crate::error::AppendError;
use crate::layout::SheetLayout;
use crate::types::{cell_text, UpdateValuesResponse, ValueRange};

/// Date format written to the sheet.
pub const DISPLAY_DATE_FORMAT: &str = "%Y-%m-%d %H:%M %p";
const DISPLAY_DATE_FORMAT_12H: &str = "%Y-%m-%d %I:%M %p";

pub const DEFAULT_SHEET_NAME: &str = "Source Data";

/// Last populated row of the date column and the date in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePoint {
    /// 1-based row of the last populated date cell; 0 for an empty sheet.
    pub row: usize,
    /// `NaiveDateTime::MIN` when no dated row exists yet.
    pub date: NaiveDateTime,
    known_dates: HashSet<NaiveDateTime>,
}

impl ResumePoint {
    fn empty(row: usize) -> Self {
        Self {
            row,
            date: NaiveDateTime::MIN,
            known_dates: HashSet::new(),
        }
    }

    #[must_use]
    pub fn contains(&self, date: NaiveDateTime) -> bool {
        self.known_dates.contains(&to_minute(date))
    }

    /// Resume point for the date column as returned by `values.get`.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::InvalidSheetDate`] if the last populated cell is
    /// not a date (a lone row 1 is a header and is allowed).
    pub fn from_column(cells: &[Vec<String>]) -> Result<Self, AppendError> {
        let row_count = cells.len();
        let last = cells
            .iter()
            .enumerate()
            .rev()
            .find_map(|(i, row)| {
                row.first()
                    .map(|c| c.trim())
                    .filter(|c| !c.is_empty())
                    .map(|c| (i + 1, c))
            });

        let Some((last_row, last_value)) = last else {
            return Ok(Self::empty(row_count));
        };

        let Some(date) = parse_display_date(last_value) else {
            if last_row == 1 {
                return Ok(Self::empty(row_count));
            }
            return Err(AppendError::InvalidSheetDate {
                row: last_row,
                value: last_value.to_string(),
            });
        };

        let known_dates = cells
            .iter()
            .filter_map(|row| row.first())
            .filter_map(|c| parse_display_date(c.trim()))
            .collect();

        Ok(Self {
            row: row_count,
            date,
            known_dates,
        })
    }

    fn advance(&mut self, written: &[PlannedRow]) {
        self.row += written.len();
        for planned in written {
            self.date = self.date.max(planned.at);
            self.known_dates.insert(planned.at);
        }
    }
}

/// Parse a date cell as written by [`format_display_date`], or a 12-hour
/// rendering of it.
#[must_use]
pub fn parse_display_date(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DISPLAY_DATE_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, DISPLAY_DATE_FORMAT_12H))
        .ok()
}

#[must_use]
pub fn format_display_date(date: NaiveDateTime) -> String {
    date.format(DISPLAY_DATE_FORMAT).to_string()
}

fn to_minute(date: NaiveDateTime) -> NaiveDateTime {
    date.with_second(0)
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(date)
}

/// One row queued for the sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedRow {
    #[serde(skip)]
    at: NaiveDateTime,
    /// Display-formatted date.
    pub date: String,
    /// Cells in layout column order.
    pub cells: Vec<String>,
}

/// What an append would write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppendPlan {
    /// 1-based row the first new row lands on.
    pub start_row: usize,
    pub rows: Vec<PlannedRow>,
    /// Candidates already present in the sheet.
    pub skipped: usize,
    /// Candidates at or before the resume point that are not in the sheet.
    pub late: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppendReport {
    pub start_row: usize,
    pub rows_written: usize,
    pub skipped: usize,
    pub late_dropped: usize,
    pub updated_cells: u64,
}

/// Appends stat rows below the last dated row of one sheet.
pub struct SheetAppender<C> {
    client: C,
    sheet: String,
    layout: SheetLayout,
    late_rows: LateRowPolicy,
    resume: Option<ResumePoint>,
}

impl<C: SheetValues> SheetAppender<C> {
    #[must_use]
    pub fn new(client: C, sheet: &str, layout: SheetLayout) -> Self {
        Self {
            client,
            sheet: sheet.to_string(),
            layout,
            late_rows: LateRowPolicy::default(),
            resume: None,
        }
    }

    #[must_use]
    pub fn with_late_row_policy(mut self, policy: LateRowPolicy) -> Self {
        self.late_rows = policy;
        self
    }

    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }

    /// The cached resume point, discovering it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError`] if the date column cannot be read or its last
    /// cell is not a date.
    pub async fn resume_point(&mut self) -> Result<&ResumePoint, AppendError> {
        let point = match self.resume.take() {
            Some(point) => point,
            None => {
                let range = self.layout.date_range(&self.sheet);
                let cells = self.client.get_values(&range).await?;
                let point = ResumePoint::from_column(&cells)?;
                tracing::info!(
                    sheet = %self.sheet,
                    row = point.row,
                    date = %point.date,
                    "discovered sheet resume point"
                );
                point
            }
        };
        Ok(self.resume.insert(point))
    }

    /// Work out which candidate rows would be written and where.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::InvalidRow`] if a candidate has no parseable
    /// `date`, or a discovery error.
    pub async fn plan(&mut self, rows: &[Map<String, Value>]) -> Result<AppendPlan, AppendError> {
        let mut dated = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let at = candidate_date(row).map_err(|source| AppendError::InvalidRow { index, source })?;
            dated.push((to_minute(at), row));
        }
        dated.sort_by_key(|(at, _)| *at);

        let layout = self.layout.clone();
        let point = self.resume_point().await?;

        let mut plan = AppendPlan {
            start_row: point.row + 1,
            rows: Vec::new(),
            skipped: 0,
            late: Vec::new(),
        };
        for (at, row) in dated {
            if at > point.date {
                let planned = PlannedRow {
                    at,
                    date: format_display_date(at),
                    cells: layout
                        .columns
                        .iter()
                        .map(|c| row.get(&c.field).map(cell_text).unwrap_or_default())
                        .collect(),
                };
                // Same minute twice: the later candidate wins.
                match plan.rows.last_mut() {
                    Some(last) if last.at == at => *last = planned,
                    _ => plan.rows.push(planned),
                }
            } else if point.contains(at) {
                plan.skipped += 1;
            } else {
                plan.late.push(format_display_date(at));
            }
        }
        Ok(plan)
    }

    /// Write every candidate newer than the resume point in one batch update.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::LateRows`] under [`LateRowPolicy::Error`] when a
    /// late row is found (nothing is written), or any planning or API error.
    pub async fn append(&mut self, rows: &[Map<String, Value>]) -> Result<AppendReport, AppendError> {
        let plan = self.plan(rows).await?;

        if let Some(earliest) = plan.late.first() {
            match self.late_rows {
                LateRowPolicy::Error => {
                    return Err(AppendError::LateRows {
                        count: plan.late.len(),
                        earliest: earliest.clone(),
                    })
                }
                LateRowPolicy::Drop => tracing::warn!(
                    count = plan.late.len(),
                    earliest = %earliest,
                    "dropping rows dated at or before the sheet's latest row"
                ),
            }
        }

        let mut report = AppendReport {
            start_row: plan.start_row,
            rows_written: 0,
            skipped: plan.skipped,
            late_dropped: plan.late.len(),
            updated_cells: 0,
        };
        if plan.rows.is_empty() {
            tracing::info!(sheet = %self.sheet, skipped = plan.skipped, "no new rows to append");
            return Ok(report);
        }

        let data = self.column_ranges(&plan);
        let response = self.client.batch_update(&data).await?;
        if response.responses.is_empty() {
            return Err(AppendError::EmptyResponse);
        }

        report.rows_written = plan.rows.len();
        report.updated_cells = response
            .total_updated_cells
            .unwrap_or_else(|| response.responses.iter().filter_map(|r| r.updated_cells).sum());
        if let Some(point) = self.resume.as_mut() {
            point.advance(&plan.rows);
        }

        tracing::info!(
            sheet = %self.sheet,
            start_row = report.start_row,
            rows = report.rows_written,
            cells = report.updated_cells,
            "appended rows to sheet"
        );
        Ok(report)
    }

    /// One column-major range per mapped column, date first.
    fn column_ranges(&self, plan: &AppendPlan) -> Vec<ValueRange> {
        let dates = plan.rows.iter().map(|r| r.date.clone()).collect();
        let mut data = vec![ValueRange::column(
            SheetLayout::column_range(&self.sheet, &self.layout.date_column, plan.start_row),
            dates,
        )];
        for (i, column) in self.layout.columns.iter().enumerate() {
            let cells = plan.rows.iter().map(|r| r.cells[i].clone()).collect();
            data.push(ValueRange::column(
                SheetLayout::column_range(&self.sheet, &column.column, plan.start_row),
                cells,
            ));
        }
        data
    }

    /// Raw cells of `cell_range` on this sheet, e.g. `A1:D4`.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::Sheets`] on API failure.
    pub async fn read(&self, cell_range: &str) -> Result<Vec<Vec<String>>, AppendError> {
        let range = self.sheet_range(cell_range);
        Ok(self.client.get_values(&range).await?)
    }

    /// Overwrite `cell_range` on this sheet with row-major `values`.
    ///
    /// Does not move the resume point.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::Sheets`] on API failure.
    pub async fn write(
        &self,
        cell_range: &str,
        values: Vec<Vec<String>>,
    ) -> Result<UpdateValuesResponse, AppendError> {
        let range = self.sheet_range(cell_range);
        Ok(self.client.update_values(&range, values).await?)
    }

    fn sheet_range(&self, cell_range: &str) -> String {
        format!("{}!{cell_range}", crate::layout::quote_sheet(&self.sheet))
    }
}

fn candidate_date(row: &Map<String, Value>) -> Result<NaiveDateTime, FormatError> {
    match row.get(DATE_COLUMN) {
        Some(Value::String(raw)) => parse_stat_date(raw),
        Some(_) => Err(FormatError::UnexpectedType {
            field: DATE_COLUMN.to_string(),
            expected: "string",
        }),
        None => Err(FormatError::MissingField(DATE_COLUMN.to_string())),
    }
}

#[cfg(test)]
#[path = "appender_test.rs"]
mod tests;
