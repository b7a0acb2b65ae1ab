use std::path::PathBuf;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::app_config::{AppConfig, Environment, LateRowPolicy};
use crate::ConfigError;

/// Characters left as-is in the user/password part of a Postgres URL.
const USERINFO: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    // Blank values count as unset so `FOO=` in a .env file does not count.
    let optional = |var: &str| -> Option<String> {
        lookup(var).ok().filter(|v| !v.trim().is_empty())
    };

    let or_default =
        |var: &str, default: &str| -> String { optional(var).unwrap_or_else(|| default.to_string()) };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.trim()
            .parse::<u32>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let database_url = optional("DATABASE_URL").or_else(|| {
        database_url_from_parts(
            optional("PGHOST").as_deref(),
            optional("PGDATABASE").as_deref(),
            optional("PGUSER").as_deref(),
            optional("PGPASSWORD").as_deref(),
        )
    });

    let env = parse_environment(&or_default("ENCV_ENV", "development"))?;
    let log_level = or_default("ENCV_LOG_LEVEL", "info");

    let api_base_url = or_default("ENCV_API_BASE_URL", "https://adminapi.encv.org");
    let api_key = optional("ENCV_API_KEY");
    let api_secret_name = optional("ENCV_API_SECRET_NAME");
    let api_secret_key = optional("ENCV_API_SECRET_KEY");
    let request_timeout_secs = parse_u64("ENCV_REQUEST_TIMEOUT_SECS", "30")?;
    let max_retries = parse_u32("ENCV_MAX_RETRIES", "2")?;
    let retry_backoff_base_ms = parse_u64("ENCV_RETRY_BACKOFF_BASE_MS", "1000")?;

    let db_max_connections = parse_u32("ENCV_DB_MAX_CONNECTIONS", "5")?;
    let db_min_connections = parse_u32("ENCV_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("ENCV_DB_ACQUIRE_TIMEOUT_SECS", "10")?;
    if db_min_connections > db_max_connections {
        return Err(ConfigError::InvalidEnvVar {
            var: "ENCV_DB_MIN_CONNECTIONS".to_string(),
            reason: format!(
                "{db_min_connections} exceeds ENCV_DB_MAX_CONNECTIONS ({db_max_connections})"
            ),
        });
    }

    let schema_path = optional("ENCV_SCHEMA_PATH").map(PathBuf::from);
    let sheet_layout_path = optional("ENCV_SHEET_LAYOUT_PATH").map(PathBuf::from);
    let spreadsheet_id = optional("ENCV_SPREADSHEET_ID");
    let sheet_name = or_default("ENCV_SHEET_NAME", "Source Data");
    let late_row_policy = parse_late_row_policy(&or_default("ENCV_LATE_ROW_POLICY", "drop"))?;

    let google_credentials_json = optional("GOOGLE_APPLICATION_CREDENTIALS_JSON");
    let google_credentials_path = optional("GOOGLE_APPLICATION_CREDENTIALS").map(PathBuf::from);
    let google_credentials_secret = optional("GOOGLE_APPLICATION_CREDENTIALS_SECRET");
    let google_cloud_project = optional("GOOGLE_CLOUD_PROJECT");

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        api_base_url,
        api_key,
        api_secret_name,
        api_secret_key,
        request_timeout_secs,
        max_retries,
        retry_backoff_base_ms,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        schema_path,
        sheet_layout_path,
        spreadsheet_id,
        sheet_name,
        late_row_policy,
        google_credentials_json,
        google_credentials_path,
        google_credentials_secret,
        google_cloud_project,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` for anything other than
/// `development`, `test`, or `production`.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "ENCV_ENV".to_string(),
            reason: format!("expected development, test, or production; got '{other}'"),
        }),
    }
}

fn parse_late_row_policy(s: &str) -> Result<LateRowPolicy, ConfigError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "drop" => Ok(LateRowPolicy::Drop),
        "error" => Ok(LateRowPolicy::Error),
        other => Err(ConfigError::InvalidEnvVar {
            var: "ENCV_LATE_ROW_POLICY".to_string(),
            reason: format!("expected drop or error; got '{other}'"),
        }),
    }
}

/// `postgresql://[user[:password]@]host/database`, or `None` unless host and
/// database are both known.
fn database_url_from_parts(
    host: Option<&str>,
    database: Option<&str>,
    user: Option<&str>,
    password: Option<&str>,
) -> Option<String> {
    let host = host?;
    let database = database?;

    let userinfo = match (user, password) {
        (Some(user), Some(password)) => format!(
            "{}:{}@",
            utf8_percent_encode(user, USERINFO),
            utf8_percent_encode(password, USERINFO)
        ),
        (Some(user), None) => format!("{}@", utf8_percent_encode(user, USERINFO)),
        (None, _) => String::new(),
    };

    Some(format!("postgresql://{userinfo}{host}/{database}"))
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
