// Process configuration read from the environment.
//
// Responsibilities
// - Collect every knob the composition root needs into one AppConfig.
// - Reject malformed values up front instead of failing later at runtime.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DATABASE_PATH: &str = "TIME_REPORTS_DATABASE_PATH";
pub const SOURCE: &str = "TIME_REPORTS_SOURCE";
pub const API_URL: &str = "TIME_REPORTS_API_URL";
pub const API_TOKEN: &str = "TIME_REPORTS_API_TOKEN";
pub const BIND_ADDR: &str = "TIME_REPORTS_BIND_ADDR";
pub const SETTINGS_PATH: &str = "TIME_REPORTS_SETTINGS_PATH";
pub const FIRST_LOAD_DAYS: &str = "TIME_REPORTS_FIRST_LOAD_DAYS";
pub const REFRESH_DAYS: &str = "TIME_REPORTS_REFRESH_DAYS";
pub const PROBE_INTERVAL_SECS: &str = "TIME_REPORTS_PROBE_INTERVAL_SECS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("could not read settings file {path}: {reason}")]
    SettingsFile { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// The time-tracking service's own REST API.
    Api,
    /// The backend proxy in front of it.
    Backend,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub source: SourceKind,
    pub api_url: String,
    pub api_token: Option<String>,
    pub bind_addr: SocketAddr,
    pub settings_path: Option<PathBuf>,
    pub first_load_days: i64,
    pub refresh_days: i64,
    pub probe_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let source = match get(SOURCE).as_deref() {
            None | Some("api") => SourceKind::Api,
            Some("backend") => SourceKind::Backend,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: SOURCE,
                    value: other.to_string(),
                });
            }
        };
        let api_url = get(API_URL).ok_or(ConfigError::Missing(API_URL))?;
        let api_token = get(API_TOKEN);
        if source == SourceKind::Api && api_token.is_none() {
            return Err(ConfigError::Missing(API_TOKEN));
        }

        Ok(Self {
            database_path: get(DATABASE_PATH)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/time_reports.db")),
            source,
            api_url,
            api_token,
            bind_addr: parse_or(BIND_ADDR, get(BIND_ADDR), "0.0.0.0:8080".parse().ok())?,
            settings_path: get(SETTINGS_PATH).map(PathBuf::from),
            first_load_days: positive(FIRST_LOAD_DAYS, get(FIRST_LOAD_DAYS), 365)?,
            refresh_days: positive(REFRESH_DAYS, get(REFRESH_DAYS), 30)?,
            probe_interval: Duration::from_secs(
                positive(PROBE_INTERVAL_SECS, get(PROBE_INTERVAL_SECS), 30)? as u64,
            ),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: Option<T>,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => default.ok_or(ConfigError::Missing(key)),
    }
}

fn positive(key: &'static str, raw: Option<String>, default: i64) -> Result<i64, ConfigError> {
    let value: i64 = parse_or(key, raw.clone(), Some(default))?;
    if value <= 0 {
        return Err(ConfigError::Invalid {
            key,
            value: raw.unwrap_or_default(),
        });
    }
    Ok(value)
}
