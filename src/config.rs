//! Start-up configuration for the `order-orm` binary.
//!
//! Endpoint coordinates and ledger settings come from `ORM_*` environment variables (a `.env`
//! file is honoured). Command-line flags take precedence over the environment.

use orm_core::config::{
    db_path_from_env_value, port_from_env_value, required_from_env_value,
    retention_days_from_env_value, timeout_from_env_value,
};
use orm_core::error::ConfigResult;
use orm_core::{CoreConfig, Endpoint};
use std::path::PathBuf;

/// Values supplied on the command line that override the environment.
#[derive(Debug, Default)]
pub struct Overrides {
    pub db_path: Option<PathBuf>,
    pub retention_days: Option<i64>,
}

/// Resolve [`CoreConfig`] through `lookup`, normally [`std::env::var`].
pub fn resolve<L>(lookup: L, overrides: Overrides) -> ConfigResult<CoreConfig>
where
    L: Fn(&str) -> Option<String>,
{
    let worklist = endpoint(&lookup, "ORM_WORKLIST")?;
    let destination = endpoint(&lookup, "ORM_DESTINATION")?;

    let db_path = match overrides.db_path {
        Some(path) => path,
        None => db_path_from_env_value(lookup("ORM_DB_PATH")),
    };
    let retention_days = match overrides.retention_days {
        Some(days) => days,
        None => retention_days_from_env_value(lookup("ORM_RETENTION_DAYS"))?,
    };
    let timeout = timeout_from_env_value(lookup("ORM_NETWORK_TIMEOUT_SECS"))?;

    CoreConfig::new(db_path, retention_days, worklist, destination, timeout)
}

fn endpoint<L>(lookup: &L, prefix: &str) -> ConfigResult<Endpoint>
where
    L: Fn(&str) -> Option<String>,
{
    let var = |suffix: &str| format!("{prefix}_{suffix}");
    let get = |suffix: &str| lookup(&var(suffix));

    let host = required_from_env_value(&var("HOST"), get("HOST"))?;
    let port = port_from_env_value(&var("PORT"), get("PORT"))?;
    let calling_ae = required_from_env_value(&var("CALLING_AE"), get("CALLING_AE"))?;
    let called_ae = required_from_env_value(&var("CALLED_AE"), get("CALLED_AE"))?;

    Endpoint::new(host, port, calling_ae, called_ae)
}
