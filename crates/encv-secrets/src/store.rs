//! Managed secret retrieval.
//!
//! [`SecretStore`] is the seam the pipeline depends on. [`SecretManagerClient`]
//! implements it against the Google Secret Manager REST API, reading the
//! `latest` version of a secret.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;

use crate::auth::{GoogleCredentials, TokenProvider, CLOUD_PLATFORM_SCOPE};
use crate::SecretError;

const DEFAULT_BASE_URL: &str = "https://secretmanager.googleapis.com/v1/";

/// Reads secret payloads by name.
#[allow(async_fn_in_trait)]
pub trait SecretStore {
    /// The secret's payload as a UTF-8 string.
    async fn access_secret(&self, name: &str) -> Result<String, SecretError>;
}

#[derive(Debug, Deserialize)]
struct AccessResponse {
    payload: Payload,
}

#[derive(Debug, Deserialize)]
struct Payload {
    data: String,
}

pub struct SecretManagerClient<T> {
    client: Client,
    base_url: Url,
    project: Option<String>,
    tokens: T,
}

impl SecretManagerClient<GoogleCredentials> {
    /// Client authenticated with application-default credentials.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::Auth`] if no default credentials are available,
    /// or [`SecretError::Http`] if the HTTP client cannot be built.
    pub fn from_application_default(
        project: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, SecretError> {
        let tokens = GoogleCredentials::application_default(&[CLOUD_PLATFORM_SCOPE])?;
        Self::with_base_url(tokens, project, timeout_secs, DEFAULT_BASE_URL)
    }
}

impl<T: TokenProvider> SecretManagerClient<T> {
    /// # Errors
    ///
    /// Returns [`SecretError::Http`] if the HTTP client cannot be built, or
    /// [`SecretError::InvalidUrl`] if `base_url` does not parse.
    pub fn with_base_url(
        tokens: T,
        project: Option<String>,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, SecretError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised)
            .map_err(|e| SecretError::InvalidUrl(format!("'{base_url}': {e}")))?;
        Ok(Self {
            client,
            base_url,
            project,
            tokens,
        })
    }

    /// `projects/{project}/secrets/{name}/versions/latest`, or `name` itself
    /// when it is already a resource path.
    fn version_path(&self, name: &str) -> Result<String, SecretError> {
        if name.starts_with("projects/") {
            return Ok(if name.contains("/versions/") {
                name.to_string()
            } else {
                format!("{name}/versions/latest")
            });
        }
        let project = self
            .project
            .as_deref()
            .ok_or_else(|| SecretError::MissingProject(name.to_string()))?;
        Ok(format!("projects/{project}/secrets/{name}/versions/latest"))
    }
}

impl<T: TokenProvider> SecretStore for SecretManagerClient<T> {
    async fn access_secret(&self, name: &str) -> Result<String, SecretError> {
        let path = format!("{}:access", self.version_path(name)?);
        let url = self
            .base_url
            .join(&path)
            .map_err(|e| SecretError::InvalidUrl(format!("'{path}': {e}")))?;

        let authorization = self.tokens.authorization().await?;
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, authorization)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        match status {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND => return Err(SecretError::NotFound(name.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(SecretError::Auth(crate::AuthError(format!(
                    "access to secret {name} denied (HTTP {})",
                    status.as_u16()
                ))))
            }
            _ => {
                return Err(SecretError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        }

        let parsed: AccessResponse = serde_json::from_str(&body).map_err(|e| SecretError::Json {
            context: format!("secret {name} response"),
            source: e,
        })?;
        let bytes = STANDARD
            .decode(parsed.payload.data.as_bytes())
            .map_err(|e| SecretError::Decode {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        let payload = String::from_utf8(bytes).map_err(|e| SecretError::Decode {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        tracing::debug!(secret = name, "accessed secret");
        Ok(payload)
    }
}

/// The payload itself, or the string field `key` of a JSON payload.
///
/// # Errors
///
/// Returns [`SecretError::Json`] if `key` is given and the payload is not
/// JSON, or [`SecretError::MissingField`] if the field is absent or not a string.
pub fn secret_field(name: &str, payload: String, key: Option<&str>) -> Result<String, SecretError> {
    let Some(key) = key else {
        return Ok(payload);
    };
    let value: Value = serde_json::from_str(&payload).map_err(|e| SecretError::Json {
        context: format!("secret {name}"),
        source: e,
    })?;
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| SecretError::MissingField {
            secret: name.to_string(),
            key: key.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;

    fn client(project: Option<&str>) -> SecretManagerClient<StaticToken> {
        SecretManagerClient::with_base_url(
            StaticToken("t".to_string()),
            project.map(str::to_string),
            30,
            DEFAULT_BASE_URL,
        )
        .unwrap()
    }

    #[test]
    fn version_path_uses_project() {
        assert_eq!(
            client(Some("encv-prod")).version_path("api-key").unwrap(),
            "projects/encv-prod/secrets/api-key/versions/latest"
        );
    }

    #[test]
    fn version_path_accepts_resource_names() {
        let c = client(None);
        assert_eq!(
            c.version_path("projects/p/secrets/s").unwrap(),
            "projects/p/secrets/s/versions/latest"
        );
        assert_eq!(
            c.version_path("projects/p/secrets/s/versions/3").unwrap(),
            "projects/p/secrets/s/versions/3"
        );
    }

    #[test]
    fn version_path_needs_a_project_for_short_names() {
        assert!(matches!(
            client(None).version_path("api-key"),
            Err(SecretError::MissingProject(_))
        ));
    }

    #[test]
    fn secret_field_without_key_returns_payload() {
        assert_eq!(
            secret_field("s", "raw-value".to_string(), None).unwrap(),
            "raw-value"
        );
    }

    #[test]
    fn secret_field_extracts_json_key() {
        let payload = r#"{"api_key": "abc", "other": 1}"#.to_string();
        assert_eq!(secret_field("s", payload, Some("api_key")).unwrap(), "abc");
    }

    #[test]
    fn secret_field_reports_missing_keys() {
        let payload = r#"{"other": 1}"#.to_string();
        assert!(matches!(
            secret_field("s", payload, Some("api_key")),
            Err(SecretError::MissingField { .. })
        ));
        assert!(matches!(
            secret_field("s", "not json".to_string(), Some("api_key")),
            Err(SecretError::Json { .. })
        ));
    }
}
