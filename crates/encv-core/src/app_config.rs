use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// What the sheet appender does with rows dated at or before the resume
/// point that are not already in the sheet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LateRowPolicy {
    /// Skip them and log a warning.
    #[default]
    Drop,
    /// Refuse the whole append.
    Error,
}

impl std::fmt::Display for LateRowPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LateRowPolicy::Drop => write!(f, "drop"),
            LateRowPolicy::Error => write!(f, "error"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    /// `None` until a database command needs it; see `encv_db::PoolConfig`.
    pub database_url: Option<String>,
    pub env: Environment,
    pub log_level: String,
    pub api_base_url: String,
    pub api_key: Option<String>,
    pub api_secret_name: Option<String>,
    pub api_secret_key: Option<String>,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_base_ms: u64,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub schema_path: Option<PathBuf>,
    pub sheet_layout_path: Option<PathBuf>,
    pub spreadsheet_id: Option<String>,
    pub sheet_name: String,
    pub late_row_policy: LateRowPolicy,
    pub google_credentials_json: Option<String>,
    pub google_credentials_path: Option<PathBuf>,
    pub google_credentials_secret: Option<String>,
    pub google_cloud_project: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[redacted]"),
            )
            .field("api_base_url", &self.api_base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("api_secret_name", &self.api_secret_name)
            .field("api_secret_key", &self.api_secret_key)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_base_ms", &self.retry_backoff_base_ms)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("schema_path", &self.schema_path)
            .field("sheet_layout_path", &self.sheet_layout_path)
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("sheet_name", &self.sheet_name)
            .field("late_row_policy", &self.late_row_policy)
            .field(
                "google_credentials_json",
                &self.google_credentials_json.as_ref().map(|_| "[redacted]"),
            )
            .field("google_credentials_path", &self.google_credentials_path)
            .field("google_credentials_secret", &self.google_credentials_secret)
            .field("google_cloud_project", &self.google_cloud_project)
            .finish()
    }
}
