use std::path::Path;

use anyhow::Context as _;
use encv_core::{AppConfig, InvocationOutcome, InvocationResponse};
use encv_secrets::{CredentialSource, GoogleCredentials};
use encv_sheets::{AppendReport, SheetAppender, SheetValues, SheetsClient};
use serde_json::{Map, Value};

use crate::io;

pub(crate) type Appender = SheetAppender<SheetsClient<GoogleCredentials>>;

/// An appender for the configured spreadsheet, authenticated with the
/// resolved service-account credentials.
pub(crate) async fn build_appender(
    config: &AppConfig,
    spreadsheet_id: Option<&str>,
    sheet: Option<&str>,
) -> anyhow::Result<Appender> {
    let spreadsheet_id = spreadsheet_id
        .or(config.spreadsheet_id.as_deref())
        .context("no spreadsheet configured; set ENCV_SPREADSHEET_ID or pass --spreadsheet-id")?;
    let sheet = sheet.unwrap_or(&config.sheet_name);

    let source = CredentialSource::from_config(config).context(
        "no spreadsheet credentials configured; set GOOGLE_APPLICATION_CREDENTIALS_JSON, \
         GOOGLE_APPLICATION_CREDENTIALS, or GOOGLE_APPLICATION_CREDENTIALS_SECRET",
    )?;
    let store = io::secret_store(config, source.needs_secret_store())?;
    let key = source
        .load(store.as_ref())
        .await
        .context("failed to load spreadsheet credentials")?;

    let client = SheetsClient::from_service_account(key, spreadsheet_id, config.request_timeout_secs)
        .context("failed to build the Sheets client")?;
    let layout = io::load_layout(config)?;

    tracing::debug!(spreadsheet_id, sheet, "built sheet appender");
    Ok(SheetAppender::new(client, sheet, layout).with_late_row_policy(config.late_row_policy))
}

/// Partial when late rows were dropped.
pub(crate) fn append_outcome(report: &AppendReport) -> InvocationOutcome {
    let mut reasons = Vec::new();
    if report.late_dropped > 0 {
        reasons.push(format!(
            "{} late row(s) dated at or before the sheet's last date were dropped",
            report.late_dropped
        ));
    }
    InvocationOutcome::from_reasons(reasons)
}

pub(crate) async fn append_rows<C: SheetValues>(
    appender: &mut SheetAppender<C>,
    rows: &[Map<String, Value>],
) -> anyhow::Result<AppendReport> {
    appender
        .append(rows)
        .await
        .context("failed to append rows to the sheet")
}

pub(crate) async fn run_append(
    config: &AppConfig,
    input: Option<&Path>,
    spreadsheet_id: Option<&str>,
    sheet: Option<&str>,
    dry_run: bool,
) -> anyhow::Result<bool> {
    let rows = io::input_objects(io::read_input(input)?)?;
    let mut appender = build_appender(config, spreadsheet_id, sheet).await?;

    if dry_run {
        let plan = appender
            .plan(&rows)
            .await
            .context("failed to plan the sheet append")?;
        let reasons = plan
            .late
            .iter()
            .map(|date| format!("late row {date} would not be written"))
            .collect();
        return io::emit(
            &InvocationResponse::new(InvocationOutcome::from_reasons(reasons), Some(plan)),
            None,
        );
    }

    let report = append_rows(&mut appender, &rows).await?;
    io::emit(&InvocationResponse::new(append_outcome(&report), Some(report)), None)
}
