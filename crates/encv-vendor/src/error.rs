use thiserror::Error;

/// Errors returned by the ENCV admin API client.
#[derive(Debug, Error)]
pub enum VendorError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response without an `error` message in the body.
    #[error("ENCV API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The API answered with `{"error": "..."}`.
    #[error("ENCV API error: {0}")]
    Api(String),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("response has no `statistics` array")]
    MissingStatistics,
}
