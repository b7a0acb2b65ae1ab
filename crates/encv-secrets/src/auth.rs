//! Bearer tokens for Google APIs.

use google_cloud_auth::credentials::service_account::{AccessSpecifier, Builder as ServiceAccountBuilder};
use google_cloud_auth::credentials::{Builder as AdcBuilder, CacheableResource, Credentials};
use http::header::AUTHORIZATION;
use http::{Extensions, HeaderValue};
use serde_json::Value;
use thiserror::Error;

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

#[derive(Debug, Error)]
#[error("authentication failed: {0}")]
pub struct AuthError(pub String);

/// Supplies the `Authorization` header for outbound Google API calls.
#[allow(async_fn_in_trait)]
pub trait TokenProvider {
    async fn authorization(&self) -> Result<HeaderValue, AuthError>;
}

/// OAuth2 access tokens minted and cached by `google-cloud-auth`.
#[derive(Clone)]
pub struct GoogleCredentials {
    inner: Credentials,
}

impl GoogleCredentials {
    /// Credentials from a service-account key file's JSON contents.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if the JSON is not a usable service-account key.
    pub fn service_account(key: Value, scopes: &[&str]) -> Result<Self, AuthError> {
        let inner = ServiceAccountBuilder::new(key)
            .with_access_specifier(AccessSpecifier::from_scopes(scopes.iter().copied()))
            .build()
            .map_err(|e| AuthError(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Application-default credentials from the runtime environment.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if no default credentials can be found.
    pub fn application_default(scopes: &[&str]) -> Result<Self, AuthError> {
        let inner = AdcBuilder::default()
            .with_scopes(scopes.iter().copied())
            .build()
            .map_err(|e| AuthError(e.to_string()))?;
        Ok(Self { inner })
    }
}

impl TokenProvider for GoogleCredentials {
    async fn authorization(&self) -> Result<HeaderValue, AuthError> {
        let headers = self
            .inner
            .headers(Extensions::new())
            .await
            .map_err(|e| AuthError(e.to_string()))?;
        match headers {
            CacheableResource::New { data, .. } => data
                .get(AUTHORIZATION)
                .cloned()
                .ok_or_else(|| AuthError("credentials produced no authorization header".to_string())),
            CacheableResource::NotModified => Err(AuthError(
                "credentials returned no headers for an uncached request".to_string(),
            )),
        }
    }
}

/// A fixed bearer token, for tests and for tokens minted out of band.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    async fn authorization(&self) -> Result<HeaderValue, AuthError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.0))
            .map_err(|e| AuthError(e.to_string()))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_token_is_a_bearer_header() {
        let header = StaticToken("abc".to_string()).authorization().await.unwrap();
        assert_eq!(header.to_str().unwrap(), "Bearer abc");
        assert!(header.is_sensitive());
    }

    #[tokio::test]
    async fn static_token_rejects_control_characters() {
        assert!(StaticToken("a\nb".to_string()).authorization().await.is_err());
    }

    #[test]
    fn service_account_rejects_non_key_json() {
        let result = GoogleCredentials::service_account(
            serde_json::json!({"type": "authorized_user"}),
            &[CLOUD_PLATFORM_SCOPE],
        );
        assert!(result.is_err());
    }
}
