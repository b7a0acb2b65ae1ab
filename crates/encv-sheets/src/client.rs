//! HTTP client for the Sheets v4 values API.

use std::time::Duration;

use encv_secrets::{GoogleCredentials, TokenProvider};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::SheetsError;
use crate::types::{
    cell_text, BatchUpdateRequest, BatchUpdateResponse, Dimension, UpdateValuesResponse, ValueRange,
};

const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/v4/";
pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const RAW: &str = "RAW";

/// The three values operations the appender needs.
#[allow(async_fn_in_trait)]
pub trait SheetValues {
    /// Cells of `range`, row-major, as display text. Trailing empty rows are
    /// not returned.
    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>, SheetsError>;

    /// Overwrite `range` with row-major `values`, stored as-is.
    async fn update_values(
        &self,
        range: &str,
        values: Vec<Vec<String>>,
    ) -> Result<UpdateValuesResponse, SheetsError>;

    /// Write several ranges in one request, stored as-is.
    async fn batch_update(&self, data: &[ValueRange]) -> Result<BatchUpdateResponse, SheetsError>;
}

/// Client bound to one spreadsheet.
pub struct SheetsClient<T> {
    client: Client,
    base_url: Url,
    spreadsheet_id: String,
    tokens: T,
}

impl SheetsClient<GoogleCredentials> {
    /// Client authenticated as the service account in `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SheetsError::Auth`] if `key` is not a service-account key,
    /// or [`SheetsError::Http`] if the HTTP client cannot be built.
    pub fn from_service_account(
        key: Value,
        spreadsheet_id: &str,
        timeout_secs: u64,
    ) -> Result<Self, SheetsError> {
        let tokens = GoogleCredentials::service_account(key, &[SPREADSHEETS_SCOPE])?;
        Self::with_base_url(tokens, spreadsheet_id, timeout_secs, DEFAULT_BASE_URL)
    }
}

impl<T: TokenProvider> SheetsClient<T> {
    /// # Errors
    ///
    /// Returns [`SheetsError::Http`] if the HTTP client cannot be built, or
    /// [`SheetsError::InvalidUrl`] if `base_url` does not parse.
    pub fn with_base_url(
        tokens: T,
        spreadsheet_id: &str,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, SheetsError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised)
            .map_err(|e| SheetsError::InvalidUrl(format!("'{base_url}': {e}")))?;
        Ok(Self {
            client,
            base_url,
            spreadsheet_id: spreadsheet_id.to_string(),
            tokens,
        })
    }

    #[must_use]
    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    /// `{base}spreadsheets/{id}/{tail...}` with each segment percent-encoded.
    fn url(&self, tail: &[&str]) -> Result<Url, SheetsError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| SheetsError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push("spreadsheets")
            .push(&self.spreadsheet_id)
            .extend(tail);
        Ok(url)
    }

    async fn send<R: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        context: &str,
    ) -> Result<R, SheetsError> {
        let authorization = self.tokens.authorization().await?;
        let response = request.header(AUTHORIZATION, authorization).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SheetsError::Status {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| SheetsError::Deserialize {
            context: context.to_string(),
            source: e,
        })
    }
}

impl<T: TokenProvider> SheetValues for SheetsClient<T> {
    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>, SheetsError> {
        let url = self.url(&["values", range])?;
        let parsed: ValueRange = self
            .send(self.client.get(url), &format!("values.get {range}"))
            .await?;
        tracing::debug!(range, rows = parsed.values.len(), "read sheet range");
        Ok(parsed
            .values
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }

    async fn update_values(
        &self,
        range: &str,
        values: Vec<Vec<String>>,
    ) -> Result<UpdateValuesResponse, SheetsError> {
        let url = self.url(&["values", range])?;
        let body = ValueRange {
            range: Some(range.to_string()),
            major_dimension: Dimension::Rows,
            values: values
                .into_iter()
                .map(|row| row.into_iter().map(Value::String).collect())
                .collect(),
        };
        let request = self
            .client
            .put(url)
            .query(&[("valueInputOption", RAW)])
            .json(&body);
        let response: UpdateValuesResponse =
            self.send(request, &format!("values.update {range}")).await?;
        tracing::debug!(range, cells = ?response.updated_cells, "updated sheet range");
        Ok(response)
    }

    async fn batch_update(&self, data: &[ValueRange]) -> Result<BatchUpdateResponse, SheetsError> {
        let url = self.url(&["values:batchUpdate"])?;
        let request = self.client.post(url).json(&BatchUpdateRequest {
            value_input_option: RAW,
            data,
        });
        self.send(request, "values.batchUpdate").await
    }
}
