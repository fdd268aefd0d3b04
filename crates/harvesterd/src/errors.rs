//! Error types for the harvesterd CLI and service.
//!
//! Library failures and the service's own failures (file system, sockets, log file
//! setup) are wrapped transparently, so the message shown to the user is the one of the
//! underlying error.

use thiserror::Error;

/// Errors that can occur while running harvesterd.
///
/// # Examples
///
/// ```
/// use harvesterd::errors::HarvesterdError;
///
/// # fn example() -> Result<(), HarvesterdError> {
/// // File operations may result in IO errors
/// std::fs::create_dir_all(std::env::temp_dir().join("harvesterd-logs"))?;
/// # Ok(())
/// # }
/// ```
#[derive(Error, Debug)]
pub enum HarvesterdError {
  /// Errors from the underlying harvester library
  #[error(transparent)]
  Harvest(#[from] harvester::errors::HarvestError),

  /// File system, socket and IO operation errors
  #[error(transparent)]
  IO(#[from] std::io::Error),

  /// The rotating log file could not be created
  #[error(transparent)]
  LogFile(#[from] tracing_appender::rolling::InitError),
}
