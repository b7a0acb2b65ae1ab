//! Where outbound credentials come from.
//!
//! Service-account credentials for the spreadsheet are resolved, first match
//! wins, from inline JSON, a key file, or a named secret. The vendor API key
//! is taken as-is when configured, otherwise read from a secret.

use std::path::PathBuf;

use encv_core::AppConfig;
use serde_json::Value;

use crate::store::{secret_field, SecretStore};
use crate::SecretError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// `GOOGLE_APPLICATION_CREDENTIALS_JSON`
    InlineJson(String),
    /// `GOOGLE_APPLICATION_CREDENTIALS`
    File(PathBuf),
    /// `GOOGLE_APPLICATION_CREDENTIALS_SECRET`
    Secret(String),
}

impl CredentialSource {
    /// The first configured source, or `None` if none is set.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        if let Some(json) = &config.google_credentials_json {
            return Some(Self::InlineJson(json.clone()));
        }
        if let Some(path) = &config.google_credentials_path {
            return Some(Self::File(path.clone()));
        }
        config
            .google_credentials_secret
            .as_ref()
            .map(|name| Self::Secret(name.clone()))
    }

    #[must_use]
    pub fn needs_secret_store(&self) -> bool {
        matches!(self, Self::Secret(_))
    }

    /// Load the credentials JSON from this source.
    ///
    /// `store` is only consulted for [`CredentialSource::Secret`].
    ///
    /// # Errors
    ///
    /// Returns [`SecretError`] if the source cannot be read or is not JSON, or
    /// if a secret source is given without a store.
    pub async fn load<S: SecretStore>(&self, store: Option<&S>) -> Result<Value, SecretError> {
        let (context, raw) = match self {
            Self::InlineJson(json) => ("GOOGLE_APPLICATION_CREDENTIALS_JSON".to_string(), json.clone()),
            Self::File(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| SecretError::Io {
                    path: path.display().to_string(),
                    source: e,
                })?;
                (path.display().to_string(), raw)
            }
            Self::Secret(name) => {
                let store = store.ok_or_else(|| {
                    SecretError::NotConfigured("a secret store for credential secrets".to_string())
                })?;
                (format!("secret {name}"), store.access_secret(name).await?)
            }
        };
        tracing::debug!(source = %context, "loaded service-account credentials");
        serde_json::from_str(&raw).map_err(|e| SecretError::Json { context, source: e })
    }
}

/// Resolve the spreadsheet service-account credentials configured in `config`.
///
/// # Errors
///
/// Returns [`SecretError::NotConfigured`] if no source is set, or any error
/// from [`CredentialSource::load`].
pub async fn get_credentials<S: SecretStore>(
    config: &AppConfig,
    store: Option<&S>,
) -> Result<Value, SecretError> {
    let source = CredentialSource::from_config(config).ok_or_else(|| {
        SecretError::NotConfigured(
            "GOOGLE_APPLICATION_CREDENTIALS_JSON, GOOGLE_APPLICATION_CREDENTIALS, or \
             GOOGLE_APPLICATION_CREDENTIALS_SECRET"
                .to_string(),
        )
    })?;
    source.load(store).await
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiKeySource {
    Plain(String),
    Secret { name: String, key: Option<String> },
}

impl ApiKeySource {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        if let Some(key) = &config.api_key {
            return Some(Self::Plain(key.clone()));
        }
        config.api_secret_name.as_ref().map(|name| Self::Secret {
            name: name.clone(),
            key: config.api_secret_key.clone(),
        })
    }

    #[must_use]
    pub fn needs_secret_store(&self) -> bool {
        matches!(self, Self::Secret { .. })
    }
}

/// Resolve the ENCV API key configured in `config`.
///
/// # Errors
///
/// Returns [`SecretError::NotConfigured`] if neither `ENCV_API_KEY` nor
/// `ENCV_API_SECRET_NAME` is set, or an error reading the secret.
pub async fn resolve_api_key<S: SecretStore>(
    config: &AppConfig,
    store: Option<&S>,
) -> Result<String, SecretError> {
    match ApiKeySource::from_config(config) {
        Some(ApiKeySource::Plain(key)) => Ok(key),
        Some(ApiKeySource::Secret { name, key }) => {
            let store = store.ok_or_else(|| {
                SecretError::NotConfigured("a secret store for ENCV_API_SECRET_NAME".to_string())
            })?;
            let payload = store.access_secret(&name).await?;
            secret_field(&name, payload, key.as_deref())
        }
        None => Err(SecretError::NotConfigured(
            "ENCV_API_KEY or ENCV_API_SECRET_NAME".to_string(),
        )),
    }
}
