//! Credential and secret resolution for the pipeline's outbound calls.
//!
//! - [`auth`]: bearer tokens for Google APIs.
//! - [`store`]: the [`SecretStore`] seam and its Secret Manager implementation.
//! - [`credentials`]: where the spreadsheet credentials and the vendor API key
//!   come from.

pub mod auth;
pub mod credentials;
pub mod store;

use thiserror::Error;

pub use auth::{AuthError, GoogleCredentials, StaticToken, TokenProvider, CLOUD_PLATFORM_SCOPE};
pub use credentials::{get_credentials, resolve_api_key, ApiKeySource, CredentialSource};
pub use store::{secret_field, SecretManagerClient, SecretStore};

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("secret manager returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("secret not found: {0}")]
    NotFound(String),

    #[error("secret payload for {name} could not be decoded: {reason}")]
    Decode { name: String, reason: String },

    #[error("failed to read credentials file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("secret {secret} has no string field `{key}`")]
    MissingField { secret: String, key: String },

    #[error("GOOGLE_CLOUD_PROJECT is required to resolve secret {0}")]
    MissingProject(String),

    #[error("invalid secret manager URL {0}")]
    InvalidUrl(String),

    #[error("no credential source configured: set {0}")]
    NotConfigured(String),
}
