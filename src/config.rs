//! Configuration loader for the `yieldflow` jobs and HTTP wrapper.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). Store credentials come from exactly one source:
//! an inline service-account payload or a local key file.
//!
use std::{env, fs, path::PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse an optional boolean environment variable with a default value.
macro_rules! parse_env_bool {
    ($var_name:expr, $default:expr) => {
        match env::var($var_name).ok().as_deref() {
            None => $default,
            Some("1") | Some("true") | Some("yes") => true,
            Some("0") | Some("false") | Some("no") => false,
            Some(other) => return Err(anyhow!("Invalid {}: {}", $var_name, other)),
        }
    };
}

/// Read an optional string environment variable with a default value.
macro_rules! env_or {
    ($var_name:expr, $default:expr) => {
        env::var($var_name).unwrap_or_else(|_| $default.to_string())
    };
}

pub const DEFAULT_TZ: &str = "Asia/Manila";
pub const DEFAULT_KEY_FILE: &str = "yield_store_key.json";
pub const DEFAULT_CORS_ORIGIN: &str = "https://kalamansi-yield-system-eudp0z.flutterflow.app";

/// Service-account payload granting access to the document store.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreCredentials {
    // ---
    /// PostgreSQL connection string backing the document collections.
    pub database_url: String,

    /// Informational project identifier, logged at startup.
    #[serde(default)]
    pub project_id: Option<String>,
}

/// Where the credentials were read from.
#[derive(Debug, Clone, PartialEq)]
pub enum CredentialSource {
    InlineEnv,
    KeyFile(PathBuf),
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    pub credentials: StoreCredentials,
    pub credential_source: CredentialSource,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Civil timezone of the farm; every date-key is derived in it.
    pub farm_tz: Tz,

    /// Fitted linear model artifact.
    pub model_path: PathBuf,

    /// Remote inference endpoint; takes precedence over `model_path`.
    pub model_url: Option<String>,

    /// Number of trailing daily totals averaged by the forecaster.
    pub forecast_window_days: u32,

    /// Mark source sensor readings as consumed after prediction.
    pub flag_source_readings: bool,

    pub http_port: u16,
    pub cors_origin: String,
}

/// Load configuration from environment variables with defaults.
///
/// Credentials (one of, checked in order):
/// - `YIELD_STORE_KEY` – inline JSON service-account payload
/// - `YIELD_STORE_KEY_FILE` – path to the key file (default: `yield_store_key.json`)
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `FARM_TZ` – IANA timezone name (default: `Asia/Manila`)
/// - `MODEL_PATH` – linear model artifact (default: `yield_model.json`)
/// - `MODEL_URL` – remote inference endpoint (default: unset)
/// - `FORECAST_WINDOW_DAYS` – trailing window size (default: 30)
/// - `FLAG_SOURCE_READINGS` – flag consumed readings (default: true)
/// - `HTTP_PORT` – listen port for `serve` (default: 8080)
/// - `CORS_ORIGIN` – allowed front-end origin
///
/// Returns an error if no credential source exists or any value is invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let (credentials, credential_source) = load_credentials(
        env::var("YIELD_STORE_KEY").ok(),
        PathBuf::from(env_or!("YIELD_STORE_KEY_FILE", DEFAULT_KEY_FILE)),
    )?;

    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let forecast_window_days = parse_env_u32!("FORECAST_WINDOW_DAYS", 30);
    let http_port = parse_env_u32!("HTTP_PORT", 8080);
    let http_port =
        u16::try_from(http_port).map_err(|_| anyhow!("Invalid HTTP_PORT: {}", http_port))?;
    let flag_source_readings = parse_env_bool!("FLAG_SOURCE_READINGS", true);

    let tz_name = env_or!("FARM_TZ", DEFAULT_TZ);
    let farm_tz: Tz = tz_name
        .parse()
        .map_err(|e| anyhow!("Invalid FARM_TZ {}: {}", tz_name, e))?;

    if forecast_window_days == 0 {
        return Err(anyhow!("FORECAST_WINDOW_DAYS must be at least 1"));
    }

    Ok(Config {
        credentials,
        credential_source,
        db_pool_max,
        farm_tz,
        model_path: PathBuf::from(env_or!("MODEL_PATH", "yield_model.json")),
        model_url: env::var("MODEL_URL").ok().filter(|u| !u.is_empty()),
        forecast_window_days,
        flag_source_readings,
        http_port,
        cors_origin: env_or!("CORS_ORIGIN", DEFAULT_CORS_ORIGIN),
    })
}

/// Resolve store credentials: the inline payload wins when present,
/// otherwise the key file must exist.
fn load_credentials(
    inline: Option<String>,
    key_file: PathBuf,
) -> Result<(StoreCredentials, CredentialSource)> {
    // ---
    if let Some(payload) = inline {
        let creds = serde_json::from_str(&payload).context("YIELD_STORE_KEY is not valid JSON")?;
        return Ok((creds, CredentialSource::InlineEnv));
    }

    if !key_file.exists() {
        return Err(anyhow!(
            "No store credentials: set YIELD_STORE_KEY or provide key file {}",
            key_file.display()
        ));
    }

    let raw = fs::read_to_string(&key_file)
        .with_context(|| format!("Failed to read key file {}", key_file.display()))?;
    let creds = serde_json::from_str(&raw)
        .with_context(|| format!("Key file {} is not valid JSON", key_file.display()))?;
    Ok((creds, CredentialSource::KeyFile(key_file)))
}

/// Mask the password portion of a connection URL.
fn mask_url(url: &str) -> String {
    // ---
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            return format!("{}:****{}", &url[..colon_pos], &url[at_pos..]);
        }
    }
    url.to_string()
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks the database password while showing all other values.
    pub fn log_config(&self) {
        // ---
        let source = match &self.credential_source {
            CredentialSource::InlineEnv => "YIELD_STORE_KEY".to_string(),
            CredentialSource::KeyFile(path) => path.display().to_string(),
        };

        tracing::info!("Configuration loaded:");
        tracing::info!("  CREDENTIALS          : {}", source);
        tracing::info!("  PROJECT_ID           : {:?}", self.credentials.project_id);
        tracing::info!("  DATABASE_URL         : {}", mask_url(&self.credentials.database_url));
        tracing::info!("  DB_POOL_MAX          : {}", self.db_pool_max);
        tracing::info!("  FARM_TZ              : {}", self.farm_tz);
        tracing::info!("  MODEL_PATH           : {}", self.model_path.display());
        tracing::info!("  MODEL_URL            : {:?}", self.model_url);
        tracing::info!("  FORECAST_WINDOW_DAYS : {}", self.forecast_window_days);
        tracing::info!("  FLAG_SOURCE_READINGS : {}", self.flag_source_readings);
        tracing::info!("  HTTP_PORT            : {}", self.http_port);
        tracing::info!("  CORS_ORIGIN          : {}", self.cors_origin);
    }
}
