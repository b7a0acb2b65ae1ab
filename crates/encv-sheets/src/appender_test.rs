use std::sync::Mutex;

use chrono::NaiveDate;
use serde_json::json;

use super::*;
use crate::error::SheetsError;
use crate::types::BatchUpdateResponse;

/// In-memory sheet holding only the date column.
#[derive(Default)]
struct FakeSheet {
    dates: Mutex<Vec<Vec<String>>>,
    batches: Mutex<Vec<Vec<ValueRange>>>,
    reads: Mutex<usize>,
}

impl FakeSheet {
    fn with_dates(dates: &[&str]) -> Self {
        let sheet = Self::default();
        *sheet.dates.lock().unwrap() = dates.iter().map(|d| vec![(*d).to_string()]).collect();
        sheet
    }

    fn batches(&self) -> Vec<Vec<ValueRange>> {
        self.batches.lock().unwrap().clone()
    }
}

impl SheetValues for FakeSheet {
    async fn get_values(&self, _range: &str) -> Result<Vec<Vec<String>>, SheetsError> {
        *self.reads.lock().unwrap() += 1;
        Ok(self.dates.lock().unwrap().clone())
    }

    async fn update_values(
        &self,
        range: &str,
        values: Vec<Vec<String>>,
    ) -> Result<UpdateValuesResponse, SheetsError> {
        Ok(UpdateValuesResponse {
            updated_range: Some(range.to_string()),
            updated_cells: Some(values.iter().map(|r| r.len() as u64).sum()),
            ..UpdateValuesResponse::default()
        })
    }

    async fn batch_update(&self, data: &[ValueRange]) -> Result<BatchUpdateResponse, SheetsError> {
        let mut dates = self.dates.lock().unwrap();
        for cell in &data[0].values[0] {
            dates.push(vec![cell_text(cell)]);
        }
        self.batches.lock().unwrap().push(data.to_vec());
        let cells: u64 = data.iter().map(|r| r.values[0].len() as u64).sum();
        Ok(BatchUpdateResponse {
            total_updated_cells: Some(cells),
            responses: data
                .iter()
                .map(|r| UpdateValuesResponse {
                    updated_range: r.range.clone(),
                    ..UpdateValuesResponse::default()
                })
                .collect(),
            ..BatchUpdateResponse::default()
        })
    }
}

fn row(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

fn appender(sheet: FakeSheet) -> SheetAppender<FakeSheet> {
    SheetAppender::new(sheet, DEFAULT_SHEET_NAME, SheetLayout::default())
}

fn column(range: &ValueRange) -> Vec<String> {
    range.values[0].iter().map(cell_text).collect()
}

#[tokio::test]
async fn appends_only_rows_newer_than_the_last_sheet_date() {
    let mut appender = appender(FakeSheet::with_dates(&["Date", "2020-06-01 6:00 AM"]));
    let rows = vec![
        row(json!({"date": "2020-06-01 06:00:00", "codes_issued": 4, "codes_claimed": 2})),
        row(json!({"date": "2020-06-02 06:00:00", "codes_issued": 5, "codes_claimed": 3})),
    ];

    let report = appender.append(&rows).await.unwrap();

    assert_eq!(report.start_row, 3);
    assert_eq!(report.rows_written, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.late_dropped, 0);
    assert_eq!(report.updated_cells, 3);

    let batches = appender.client().batches();
    assert_eq!(batches.len(), 1);
    let data = &batches[0];
    assert_eq!(data.len(), 3);
    assert_eq!(data[0].range.as_deref(), Some("'Source Data'!B3:B"));
    assert_eq!(data[0].major_dimension, crate::types::Dimension::Columns);
    assert_eq!(column(&data[0]), vec!["2020-06-02 06:00 AM"]);
    assert_eq!(data[1].range.as_deref(), Some("'Source Data'!C3:C"));
    assert_eq!(column(&data[1]), vec!["5"]);
    assert_eq!(data[2].range.as_deref(), Some("'Source Data'!D3:D"));
    assert_eq!(column(&data[2]), vec!["3"]);
}

#[tokio::test]
async fn empty_sheet_starts_at_row_one() {
    let mut appender = appender(FakeSheet::default());
    let rows = vec![
        row(json!({"date": "2020-06-02 06:00:00", "codes_issued": 2})),
        row(json!({"date": "2020-06-01 06:00:00", "codes_issued": 1})),
    ];

    let report = appender.append(&rows).await.unwrap();

    assert_eq!(report.start_row, 1);
    assert_eq!(report.rows_written, 2);
    let data = &appender.client().batches()[0];
    assert_eq!(data[0].range.as_deref(), Some("'Source Data'!B1:B"));
    assert_eq!(
        column(&data[0]),
        vec!["2020-06-01 06:00 AM", "2020-06-02 06:00 AM"]
    );
    assert_eq!(column(&data[1]), vec!["1", "2"]);
    // Absent fields are written as empty cells.
    assert_eq!(column(&data[2]), vec!["", ""]);
}

#[tokio::test]
async fn lone_header_row_is_not_a_date() {
    let mut appender = appender(FakeSheet::with_dates(&["Date"]));
    let rows = vec![row(json!({"date": "2020-06-01 06:00:00", "codes_issued": 1}))];

    let report = appender.append(&rows).await.unwrap();

    assert_eq!(report.start_row, 2);
    assert_eq!(report.rows_written, 1);
}

#[tokio::test]
async fn unparseable_last_date_is_an_error() {
    let mut appender = appender(FakeSheet::with_dates(&["Date", "2020-06-01 6:00 AM", "soon"]));
    let rows = vec![row(json!({"date": "2020-06-02 06:00:00"}))];

    let err = appender.append(&rows).await.unwrap_err();

    assert!(matches!(err, AppendError::InvalidSheetDate { row: 3, ref value } if value == "soon"));
    assert!(appender.client().batches().is_empty());
}

#[tokio::test]
async fn consecutive_appends_write_contiguous_rows() {
    let mut appender = appender(FakeSheet::with_dates(&["Date", "2020-06-01 6:00 AM"]));

    let first = appender
        .append(&[row(json!({"date": "2020-06-02 06:00:00", "codes_issued": 1}))])
        .await
        .unwrap();
    let second = appender
        .append(&[
            row(json!({"date": "2020-06-02 06:00:00", "codes_issued": 1})),
            row(json!({"date": "2020-06-03 06:00:00", "codes_issued": 2})),
            row(json!({"date": "2020-06-04 06:00:00", "codes_issued": 3})),
        ])
        .await
        .unwrap();

    assert_eq!(first.start_row, 3);
    assert_eq!(second.start_row, 4);
    assert_eq!(second.rows_written, 2);
    assert_eq!(second.skipped, 1);
    assert_eq!(*appender.client().reads.lock().unwrap(), 1);

    let point = appender.resume_point().await.unwrap();
    assert_eq!(point.row, 5);
    assert_eq!(
        point.date,
        NaiveDate::from_ymd_opt(2020, 6, 4).unwrap().and_hms_opt(6, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn late_rows_are_dropped_by_default() {
    let mut appender = appender(FakeSheet::with_dates(&[
        "Date",
        "2020-06-01 6:00 AM",
        "2020-06-03 6:00 AM",
    ]));
    let rows = vec![
        row(json!({"date": "2020-06-02 06:00:00", "codes_issued": 9})),
        row(json!({"date": "2020-06-03 06:00:00", "codes_issued": 3})),
    ];

    let report = appender.append(&rows).await.unwrap();

    assert_eq!(report.rows_written, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.late_dropped, 1);
    assert!(appender.client().batches().is_empty());
}

#[tokio::test]
async fn late_rows_fail_the_append_under_the_error_policy() {
    let mut appender = appender(FakeSheet::with_dates(&["Date", "2020-06-03 6:00 AM"]))
        .with_late_row_policy(LateRowPolicy::Error);
    let rows = vec![
        row(json!({"date": "2020-06-02 06:00:00"})),
        row(json!({"date": "2020-06-04 06:00:00"})),
    ];

    let err = appender.append(&rows).await.unwrap_err();

    assert!(matches!(err, AppendError::LateRows { count: 1, .. }));
    assert!(appender.client().batches().is_empty());
}

#[tokio::test]
async fn nothing_new_makes_no_write() {
    let mut appender = appender(FakeSheet::with_dates(&["Date", "2020-06-01 6:00 AM"]));
    let rows = vec![row(json!({"date": "2020-06-01 06:00:00"}))];

    let report = appender.append(&rows).await.unwrap();

    assert_eq!(report.rows_written, 0);
    assert_eq!(report.skipped, 1);
    assert!(appender.client().batches().is_empty());
}

#[tokio::test]
async fn candidate_without_a_date_is_rejected() {
    let mut appender = appender(FakeSheet::default());
    let rows = vec![
        row(json!({"date": "2020-06-01 06:00:00"})),
        row(json!({"codes_issued": 1})),
    ];

    let err = appender.plan(&rows).await.unwrap_err();

    assert!(matches!(err, AppendError::InvalidRow { index: 1, .. }));
}

#[tokio::test]
async fn later_candidate_wins_within_the_same_minute() {
    let mut appender = appender(FakeSheet::default());
    let rows = vec![
        row(json!({"date": "2020-06-01 06:00:00", "codes_issued": 1})),
        row(json!({"date": "2020-06-01T06:00:00Z", "codes_issued": 7})),
    ];

    let plan = appender.plan(&rows).await.unwrap();

    assert_eq!(plan.rows.len(), 1);
    assert_eq!(plan.rows[0].cells[0], "7");
}

#[tokio::test]
async fn read_and_write_address_the_configured_sheet() {
    let appender = appender(FakeSheet::default());

    let response = appender
        .write("A1:B1", vec![vec!["x".to_string(), "y".to_string()]])
        .await
        .unwrap();

    assert_eq!(response.updated_range.as_deref(), Some("'Source Data'!A1:B1"));
    assert_eq!(response.updated_cells, Some(2));
    assert!(appender.read("A1:A").await.unwrap().is_empty());
}

#[test]
fn display_dates_parse_in_both_hour_styles() {
    let morning = NaiveDate::from_ymd_opt(2020, 6, 1).unwrap().and_hms_opt(6, 0, 0).unwrap();
    let evening = NaiveDate::from_ymd_opt(2020, 6, 1).unwrap().and_hms_opt(18, 0, 0).unwrap();

    assert_eq!(parse_display_date("2020-06-01 6:00 AM"), Some(morning));
    assert_eq!(parse_display_date("2020-06-01 06:00 AM"), Some(morning));
    assert_eq!(parse_display_date("2020-06-01 18:00 PM"), Some(evening));
    assert_eq!(parse_display_date("2020-06-01 6:00 PM"), Some(evening));
    assert_eq!(parse_display_date("Date"), None);
    assert_eq!(format_display_date(morning), "2020-06-01 06:00 AM");
}

#[test]
fn resume_point_of_an_empty_column() {
    let point = ResumePoint::from_column(&[]).unwrap();
    assert_eq!(point.row, 0);
    assert_eq!(point.date, NaiveDateTime::MIN);
}
