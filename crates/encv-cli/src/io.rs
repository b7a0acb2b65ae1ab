//! Shared plumbing for command handlers: envelope output, stage input, and
//! config-driven construction of the schema, layout, and secret store.

use std::io::Read as _;
use std::path::Path;

use anyhow::Context as _;
use encv_core::{AppConfig, InvocationResponse, StatSchema};
use encv_secrets::{GoogleCredentials, SecretManagerClient};
use encv_sheets::SheetLayout;
use serde::Serialize;
use serde_json::{Map, Value};

/// Print `response` as JSON to `output` (stdout when `None`).
///
/// Returns `false` when the response carries a failure outcome.
pub(crate) fn emit<T: Serialize>(
    response: &InvocationResponse<T>,
    output: Option<&Path>,
) -> anyhow::Result<bool> {
    let json = serde_json::to_string_pretty(response)?;
    match output {
        Some(path) => {
            std::fs::write(path, format!("{json}\n"))
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "wrote response");
        }
        None => println!("{json}"),
    }
    Ok(!response.body.outcome.is_failure())
}

/// Read a stage input from `path`, or stdin when `None`.
pub(crate) fn read_input(path: Option<&Path>) -> anyhow::Result<Value> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("failed to read stdin")?;
            raw
        }
    };
    serde_json::from_str(&raw).context("input is not valid JSON")
}

/// Rows of a stage input; every row must be a JSON object.
pub(crate) fn input_objects(payload: Value) -> anyhow::Result<Vec<Map<String, Value>>> {
    encv_core::extract_rows(payload)?
        .into_iter()
        .enumerate()
        .map(|(index, row)| match row {
            Value::Object(map) => Ok(map),
            _ => anyhow::bail!("input row {index} is not a JSON object"),
        })
        .collect()
}

pub(crate) fn load_schema(config: &AppConfig) -> anyhow::Result<StatSchema> {
    match &config.schema_path {
        Some(path) => StatSchema::load(path)
            .with_context(|| format!("failed to load schema from {}", path.display())),
        None => Ok(StatSchema::encv()),
    }
}

pub(crate) fn load_layout(config: &AppConfig) -> anyhow::Result<SheetLayout> {
    match &config.sheet_layout_path {
        Some(path) => SheetLayout::load(path)
            .with_context(|| format!("failed to load sheet layout from {}", path.display())),
        None => Ok(SheetLayout::default()),
    }
}

/// A Secret Manager client, built only when some configured source needs one.
pub(crate) fn secret_store(
    config: &AppConfig,
    needed: bool,
) -> anyhow::Result<Option<SecretManagerClient<GoogleCredentials>>> {
    if !needed {
        return Ok(None);
    }
    let store = SecretManagerClient::from_application_default(
        config.google_cloud_project.clone(),
        config.request_timeout_secs,
    )
    .context("failed to build the Secret Manager client")?;
    Ok(Some(store))
}
