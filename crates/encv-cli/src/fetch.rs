use std::path::Path;

use anyhow::Context as _;
use encv_core::{AppConfig, InvocationResponse};
use encv_secrets::ApiKeySource;
use encv_vendor::EncvClient;
use serde_json::Value;

use crate::io;

/// Resolve the API key and fetch the raw `statistics` entries.
pub(crate) async fn fetch_statistics(config: &AppConfig) -> anyhow::Result<Vec<Value>> {
    let needs_store = ApiKeySource::from_config(config).is_some_and(|s| s.needs_secret_store());
    let store = io::secret_store(config, needs_store)?;
    let api_key = encv_secrets::resolve_api_key(config, store.as_ref())
        .await
        .context("failed to resolve the ENCV API key")?;

    let client = EncvClient::with_base_url(&api_key, config.request_timeout_secs, &config.api_base_url)
        .context("failed to build the ENCV client")?
        .with_retry(config.max_retries, config.retry_backoff_base_ms);

    client
        .fetch_statistics()
        .await
        .context("failed to fetch realm statistics")
}

pub(crate) async fn run_fetch(config: &AppConfig, output: Option<&Path>) -> anyhow::Result<bool> {
    let statistics = fetch_statistics(config).await?;
    io::emit(&InvocationResponse::success(statistics), output)
}
