//! Configuration loading and validation.
//!
//! Configuration comes in two layers:
//! - [`Settings`], a flat string-keyed mapping merged from dotenv files and the process
//!   environment. Later sources override earlier ones and a missing file is skipped.
//! - [`HarvestConfig`], the validated, immutable view of the `ARX*` keys that a
//!   [`Harvester`](crate::harvest::Harvester) is constructed from.
//!
//! # Examples
//!
//! ```no_run
//! use harvester::config::{HarvestConfig, Settings};
//!
//! # fn example() -> Result<(), harvester::errors::HarvestError> {
//! let settings = Settings::load();
//! let config = HarvestConfig::from_settings(&settings)?;
//! println!("Harvesting set {} from {}", config.set(), config.host());
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use super::*;

/// Settings key holding the harvest endpoint URL.
pub const HOST_KEY: &str = "ARXHOST";
/// Settings key holding the set to harvest.
pub const SET_KEY: &str = "ARXSET";
/// Settings key holding the minimum number of minutes between harvest windows.
pub const CHECK_INTERVAL_KEY: &str = "ARXCHECKTIMEMINUTES";
/// Settings key holding the request timeout in seconds.
pub const TIMEOUT_KEY: &str = "ARXTIMEOUT";

/// Longest accepted `host` or `set` value at configuration level.
pub const MAX_CONFIG_FIELD_LEN: usize = 65;

/// Dotenv files read by [`Settings::load`], lowest precedence first.
pub const DEFAULT_SOURCES: [&str; 2] = [".env.default", ".env"];

/// A flat mapping of configuration keys to raw string values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
  /// Merged values, the last source to define a key wins
  values: BTreeMap<String, String>,
}

impl Settings {
  /// Loads [`DEFAULT_SOURCES`] from the working directory, then the process environment.
  pub fn load() -> Self {
    Self::layered(&DEFAULT_SOURCES, std::env::vars())
  }

  /// Merges the given dotenv files in order, then the `overrides` on top.
  ///
  /// Files that do not exist or cannot be read are skipped.
  pub fn layered<P, I>(files: &[P], overrides: I) -> Self
  where
    P: AsRef<Path>,
    I: IntoIterator<Item = (String, String)>, {
    let mut settings = Self::default();
    for file in files {
      let file = file.as_ref();
      match std::fs::read_to_string(file) {
        Ok(text) => {
          debug!("Loading settings from {}", file.display());
          settings.values.extend(parse_dotenv(&text));
        },
        Err(e) => trace!("Skipping settings source {}: {e}", file.display()),
      }
    }
    settings.values.extend(overrides);
    settings
  }

  /// Returns the raw value of `key`, if any source defined it.
  pub fn get(&self, key: &str) -> Option<&str> { self.values.get(key).map(String::as_str) }

  /// Sets `key`, overriding whatever the sources provided.
  pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
    self.values.insert(key.into(), value.into());
  }

  /// Reads `key` as a string, failing with [`HarvestError::ConfigValidation`] if absent.
  pub fn require(&self, key: &str) -> Result<&str, HarvestError> {
    self.get(key).ok_or_else(|| HarvestError::ConfigValidation(format!("{key} is not set")))
  }

  /// Reads `key` as an integer, failing with [`HarvestError::ConfigValidation`] if it is
  /// absent or not a number.
  pub fn require_int(&self, key: &str) -> Result<i64, HarvestError> {
    let raw = self.require(key)?;
    raw.trim().parse().map_err(|_| {
      HarvestError::ConfigValidation(format!("{key} must be an integer, got {raw:?}"))
    })
  }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Settings {
  fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
    Self { values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
  }
}

/// Parses dotenv syntax: `KEY=VALUE` lines, `#` comments, an optional `export `
/// prefix and optional matching quotes around the value.
fn parse_dotenv(text: &str) -> Vec<(String, String)> {
  text
    .lines()
    .filter_map(|raw| {
      let mut line = raw.trim();
      if line.is_empty() || line.starts_with('#') {
        return None;
      }
      if let Some(rest) = line.strip_prefix("export ") {
        line = rest.trim_start();
      }
      let (key, value) = line.split_once('=')?;
      let key = key.trim();
      if key.is_empty() {
        return None;
      }
      let value = value.trim();
      let value = match value.as_bytes() {
        [first, .., last] if first == last && (*first == b'"' || *first == b'\'') =>
          &value[1..value.len() - 1],
        _ => value,
      };
      Some((key.to_string(), value.to_string()))
    })
    .collect()
}

/// Validated connection parameters for one harvest endpoint.
///
/// Immutable once constructed. Per-call variations, such as harvesting a different set,
/// are passed to [`Harvester::run_cycle`](crate::harvest::Harvester::run_cycle) instead of mutating this value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestConfig {
  /// Base URL of the OAI-PMH endpoint
  host:           String,
  /// Default set to harvest
  set:            String,
  /// Minimum spacing between harvest windows, consumed by external schedulers
  check_interval: Duration,
  /// Request timeout for the harvest call
  timeout:        Duration,
}

impl HarvestConfig {
  /// Validates and builds a configuration.
  ///
  /// # Errors
  ///
  /// Returns [`HarvestError::ConfigValidation`] if:
  /// - `host` or `set` is empty or longer than [`MAX_CONFIG_FIELD_LEN`] characters
  /// - `check_interval_minutes` or `timeout_seconds` is not strictly positive
  pub fn new(
    host: impl Into<String>,
    set: impl Into<String>,
    check_interval_minutes: i64,
    timeout_seconds: i64,
  ) -> Result<Self, HarvestError> {
    let host = host.into();
    let set = set.into();
    check_length(HOST_KEY, &host)?;
    check_length(SET_KEY, &set)?;
    let check_interval_minutes = check_positive(CHECK_INTERVAL_KEY, check_interval_minutes)?;
    let timeout_seconds = check_positive(TIMEOUT_KEY, timeout_seconds)?;

    Ok(Self {
      host,
      set,
      check_interval: Duration::from_secs(check_interval_minutes.saturating_mul(60)),
      timeout: Duration::from_secs(timeout_seconds),
    })
  }

  /// Builds a configuration from the `ARX*` keys of `settings`.
  pub fn from_settings(settings: &Settings) -> Result<Self, HarvestError> {
    Self::new(
      settings.require(HOST_KEY)?,
      settings.require(SET_KEY)?,
      settings.require_int(CHECK_INTERVAL_KEY)?,
      settings.require_int(TIMEOUT_KEY)?,
    )
  }

  /// The harvest endpoint URL.
  pub fn host(&self) -> &str { &self.host }

  /// The configured set.
  pub fn set(&self) -> &str { &self.set }

  /// Minimum time between two harvest windows.
  pub fn check_interval(&self) -> Duration { self.check_interval }

  /// Timeout applied to the harvest request.
  pub fn timeout(&self) -> Duration { self.timeout }
}

/// Enforces `1..=MAX_CONFIG_FIELD_LEN` characters.
fn check_length(key: &str, value: &str) -> Result<(), HarvestError> {
  let len = value.chars().count();
  if len == 0 || len > MAX_CONFIG_FIELD_LEN {
    return Err(HarvestError::ConfigValidation(format!(
      "{key} must be between 1 and {MAX_CONFIG_FIELD_LEN} characters, got {len}"
    )));
  }
  Ok(())
}

/// Enforces a strictly positive integer.
fn check_positive(key: &str, value: i64) -> Result<u64, HarvestError> {
  u64::try_from(value)
    .ok()
    .filter(|v| *v > 0)
    .ok_or_else(|| HarvestError::ConfigValidation(format!("{key} must be > 0, got {value}")))
}
