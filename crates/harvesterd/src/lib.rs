//! Service layer of the harvester: storage-scoped harvest cycles, the periodic
//! scheduler and the HTTP API.
//!
//! Every harvest cycle started from here owns its store connection for exactly the
//! duration of the cycle: the [`Database`] is opened before the cycle and closed after
//! it on every exit path, see [`harvest_into`].

#![warn(missing_docs, clippy::missing_docs_in_private_items)]
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use harvester::{
  config::{self, Settings},
  database::Database,
  errors::HarvestError,
  harvest::{HarvestSummary, Harvester},
};
use tracing::{debug, error, info, warn};

pub mod api;
pub mod errors;
pub mod scheduler;

use errors::HarvesterdError;

/// Settings key of the SQLite store location.
pub const STORE_PATH_KEY: &str = "STORE_PATH";
/// Settings key of the HTTP listen host.
pub const APP_HOST_KEY: &str = "APP_HOST";
/// Settings key of the HTTP listen port.
pub const APP_PORT_KEY: &str = "APP_PORT";
/// Listen host when [`APP_HOST_KEY`] is not set.
pub const DEFAULT_APP_HOST: &str = "0.0.0.0";
/// Listen port when [`APP_PORT_KEY`] is not set.
pub const DEFAULT_APP_PORT: u16 = 5000;

/// Every settings key the harvester reads; nothing else is ever logged.
pub const KNOWN_KEYS: [&str; 7] = [
  config::HOST_KEY,
  config::SET_KEY,
  config::CHECK_INTERVAL_KEY,
  config::TIMEOUT_KEY,
  STORE_PATH_KEY,
  APP_HOST_KEY,
  APP_PORT_KEY,
];

/// Renders the [`KNOWN_KEYS`] entries of `settings` for logging.
pub fn describe_settings(settings: &Settings) -> String {
  KNOWN_KEYS
    .iter()
    .map(|key| format!("{key}={}", settings.get(key).unwrap_or("<unset>")))
    .collect::<Vec<_>>()
    .join(" ")
}

/// The store location from `STORE_PATH`, or [`Database::default_path`].
pub fn store_path(settings: &Settings) -> PathBuf {
  settings
    .get(STORE_PATH_KEY)
    .filter(|path| !path.trim().is_empty())
    .map(PathBuf::from)
    .unwrap_or_else(Database::default_path)
}

/// The `host:port` the HTTP API listens on, from `APP_HOST` and `APP_PORT`.
pub fn bind_address(settings: &Settings) -> Result<String, HarvesterdError> {
  let host = settings.get(APP_HOST_KEY).unwrap_or(DEFAULT_APP_HOST);
  let port = match settings.get(APP_PORT_KEY) {
    Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
      HarvestError::ConfigValidation(format!("{APP_PORT_KEY} must be a port number, got {raw:?}"))
    })?,
    None => DEFAULT_APP_PORT,
  };
  Ok(format!("{host}:{port}"))
}

/// Today's date on the local clock, the cutoff for scheduled and triggered harvests.
pub fn today() -> NaiveDate { chrono::Local::now().date_naive() }

/// Runs one harvest cycle against the store at `store_path`.
///
/// The store is opened for this cycle only and closed afterwards, whether the cycle
/// succeeded or not. A cycle failure takes precedence over a failure to close.
pub async fn harvest_into(
  harvester: &Harvester,
  store_path: &Path,
  until: Option<NaiveDate>,
  set: Option<&str>,
) -> Result<HarvestSummary, HarvestError> {
  debug!("Opening store {} for one harvest cycle", store_path.display());
  let db = Database::open(store_path).await?;

  let result = harvester.run_cycle(&db, until, set).await;
  let closed = db.close().await;

  match (result, closed) {
    (Ok(summary), Ok(())) => Ok(summary),
    (Ok(_), Err(e)) => Err(e),
    (Err(e), closed) => {
      if let Err(close_error) = closed {
        warn!("Failed to close store after a failed cycle: {close_error}");
      }
      Err(e)
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_bind_address_defaults_and_overrides() {
    let settings = Settings::default();
    assert_eq!(bind_address(&settings).unwrap(), "0.0.0.0:5000");

    let settings: Settings = [(APP_HOST_KEY, "127.0.0.1"), (APP_PORT_KEY, "8080")].into_iter().collect();
    assert_eq!(bind_address(&settings).unwrap(), "127.0.0.1:8080");

    let settings: Settings = [(APP_PORT_KEY, "http")].into_iter().collect();
    assert!(matches!(
      bind_address(&settings),
      Err(HarvesterdError::Harvest(HarvestError::ConfigValidation(_)))
    ));
  }

  #[test]
  fn test_describe_settings_only_shows_known_keys() {
    let settings: Settings =
      [("ARXSET", "cs"), ("APP_PORT", "8080"), ("AWS_SECRET_ACCESS_KEY", "hunter2")]
        .into_iter()
        .collect();

    let described = describe_settings(&settings);

    assert!(described.contains("ARXSET=cs"));
    assert!(described.contains("APP_PORT=8080"));
    assert!(described.contains("ARXHOST=<unset>"));
    assert!(!described.contains("hunter2"));
    assert!(!described.contains("AWS_SECRET_ACCESS_KEY"));
  }

  #[test]
  fn test_store_path_from_settings() {
    let settings: Settings = [(STORE_PATH_KEY, "/tmp/records.db")].into_iter().collect();
    assert_eq!(store_path(&settings), PathBuf::from("/tmp/records.db"));
    assert_eq!(store_path(&Settings::default()), Database::default_path());
  }
}
