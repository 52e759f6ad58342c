//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into the pipeline components. The core never reads process-wide environment variables;
//! the binary resolves them and hands the raw values to the `*_from_env_value` helpers below.

use crate::constants::{
    AE_TITLE_MAX_LEN, DEFAULT_DB_PATH, DEFAULT_NETWORK_TIMEOUT_SECS, DEFAULT_RETENTION_DAYS,
    MAX_RETENTION_DAYS,
};
use crate::error::{ConfigError, ConfigResult};
use orm_types::{DicomDate, NonEmptyText};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Network coordinates of one DICOM application entity, as seen from this forwarder.
///
/// `calling_ae` is the title this forwarder presents and `called_ae` the title of the peer.
/// Both are negotiated in the association request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
    calling_ae: String,
    called_ae: String,
}

impl Endpoint {
    /// Create an endpoint.
    ///
    /// IPv6 literals may be given with or without brackets (`::1` or `[::1]`); the brackets are
    /// not stored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidInput`] if the host is blank or contains whitespace, `/`
    /// or stray brackets, the port is zero, or either AE title is not 1-16 characters without
    /// backslashes or control characters.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        calling_ae: impl Into<String>,
        called_ae: impl Into<String>,
    ) -> ConfigResult<Self> {
        let raw = host.into();
        let trimmed = raw.trim();
        let host = trimmed
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(trimmed);
        if host.is_empty()
            || host.contains(|c: char| c.is_whitespace() || matches!(c, '/' | '[' | ']'))
        {
            return Err(ConfigError::InvalidInput(format!(
                "host must be a bare host name or address, got: '{raw}'"
            )));
        }
        if port == 0 {
            return Err(ConfigError::InvalidInput("port cannot be 0".into()));
        }

        Ok(Self {
            host: host.to_owned(),
            port,
            calling_ae: validate_ae_title("calling AE title", calling_ae.into())?,
            called_ae: validate_ae_title("called AE title", called_ae.into())?,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn calling_ae(&self) -> &str {
        &self.calling_ae
    }

    pub fn called_ae(&self) -> &str {
        &self.called_ae
    }
}

/// `CALLED@host:port`, with IPv6 literals in brackets.
impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "{}@[{}]:{}", self.called_ae, self.host, self.port)
        } else {
            write!(f, "{}@{}:{}", self.called_ae, self.host, self.port)
        }
    }
}

fn validate_ae_title(field: &str, value: String) -> ConfigResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.chars().count() > AE_TITLE_MAX_LEN {
        return Err(ConfigError::InvalidInput(format!(
            "{field} must be 1-{AE_TITLE_MAX_LEN} characters, got: '{value}'"
        )));
    }
    if trimmed.contains(|c: char| c == '\\' || c.is_control()) {
        return Err(ConfigError::InvalidInput(format!(
            "{field} must not contain backslashes or control characters"
        )));
    }
    Ok(trimmed.to_owned())
}

/// The query filter for one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorklistFilter {
    pub start_date: DicomDate,
    pub modality: NonEmptyText,
    pub station_name: NonEmptyText,
}

impl WorklistFilter {
    /// Validate the three positional run parameters.
    pub fn new(start_date: &str, modality: &str, station_name: &str) -> ConfigResult<Self> {
        Ok(Self {
            start_date: DicomDate::parse(start_date).map_err(|source| {
                ConfigError::InvalidText {
                    field: "start date",
                    source,
                }
            })?,
            modality: NonEmptyText::new(modality).map_err(|source| ConfigError::InvalidText {
                field: "modality",
                source,
            })?,
            station_name: NonEmptyText::new(station_name).map_err(|source| {
                ConfigError::InvalidText {
                    field: "station name",
                    source,
                }
            })?,
        })
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    db_path: PathBuf,
    retention_window: chrono::Duration,
    worklist: Endpoint,
    destination: Endpoint,
    network_timeout: Duration,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidInput`] if `retention_days` is outside
    /// `1..=`[`MAX_RETENTION_DAYS`], or if `network_timeout` is zero.
    pub fn new(
        db_path: PathBuf,
        retention_days: i64,
        worklist: Endpoint,
        destination: Endpoint,
        network_timeout: Duration,
    ) -> ConfigResult<Self> {
        if retention_days < 1 {
            return Err(ConfigError::InvalidInput(format!(
                "retention window must be at least 1 day, got: {retention_days}"
            )));
        }
        if retention_days > MAX_RETENTION_DAYS {
            return Err(ConfigError::InvalidInput(format!(
                "retention window must be at most {MAX_RETENTION_DAYS} days, got: {retention_days}"
            )));
        }
        let retention_window = chrono::Duration::days(retention_days);
        if network_timeout.is_zero() {
            return Err(ConfigError::InvalidInput(
                "network timeout cannot be 0".into(),
            ));
        }

        Ok(Self {
            db_path,
            retention_window,
            worklist,
            destination,
            network_timeout,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn retention_window(&self) -> chrono::Duration {
        self.retention_window
    }

    pub fn worklist(&self) -> &Endpoint {
        &self.worklist
    }

    pub fn destination(&self) -> &Endpoint {
        &self.destination
    }

    pub fn network_timeout(&self) -> Duration {
        self.network_timeout
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Require a setting to be present and non-blank.
pub fn required_from_env_value(name: &str, value: Option<String>) -> ConfigResult<String> {
    non_blank(value).ok_or_else(|| ConfigError::Missing(name.to_owned()))
}

/// Parse a required TCP port.
pub fn port_from_env_value(name: &str, value: Option<String>) -> ConfigResult<u16> {
    let raw = required_from_env_value(name, value)?;
    raw.parse::<u16>()
        .map_err(|_| ConfigError::InvalidInput(format!("{name} must be a port number, got: '{raw}'")))
}

/// Parse the retention window in days. Absent or blank yields the default of 7 days.
pub fn retention_days_from_env_value(value: Option<String>) -> ConfigResult<i64> {
    match non_blank(value) {
        None => Ok(DEFAULT_RETENTION_DAYS),
        Some(raw) => raw.parse::<i64>().map_err(|_| {
            ConfigError::InvalidInput(format!("retention days must be an integer, got: '{raw}'"))
        }),
    }
}

/// Parse the association timeout in seconds. Absent or blank yields the default.
pub fn timeout_from_env_value(value: Option<String>) -> ConfigResult<Duration> {
    match non_blank(value) {
        None => Ok(Duration::from_secs(DEFAULT_NETWORK_TIMEOUT_SECS)),
        Some(raw) => raw.parse::<u64>().map(Duration::from_secs).map_err(|_| {
            ConfigError::InvalidInput(format!("timeout must be whole seconds, got: '{raw}'"))
        }),
    }
}

/// Resolve the ledger location. Absent or blank yields `sent_orders.db` in the working directory.
pub fn db_path_from_env_value(value: Option<String>) -> PathBuf {
    PathBuf::from(non_blank(value).unwrap_or_else(|| DEFAULT_DB_PATH.to_owned()))
}
