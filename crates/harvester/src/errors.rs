//! Error types for the harvester library.
//!
//! Every stage of a harvest cycle fails with a [`HarvestError`], and the variants map
//! one-to-one onto the stages:
//! - Configuration and query validation
//! - Transport and HTTP status failures from the harvest endpoint
//! - Malformed XML and protocol-level `<error>` responses
//! - Storage failures from the local document store
//!
//! Per-record normalization problems are *not* errors. They are reported as a
//! [`NormalizationWarning`](crate::normalize::NormalizationWarning), logged, and the
//! record is dropped.
//!
//! # Examples
//!
//! ```no_run
//! use harvester::{config::HarvestConfig, errors::HarvestError, harvest::Harvester};
//!
//! # async fn example(store: &harvester::database::Database) -> Result<(), HarvestError> {
//! let harvester = Harvester::new(HarvestConfig::new("http://export.arxiv.org/oai2", "cs", 120, 120)?);
//! match harvester.run_cycle(store, None, None).await {
//!   Err(HarvestError::Protocol { code, message }) => println!("Endpoint refused: {code} {message}"),
//!   Err(HarvestError::Transport(e)) => println!("Network error: {}", e),
//!   Err(e) => println!("Other error: {}", e),
//!   Ok(summary) => println!("Stored {}", summary.inserted),
//! }
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

/// Errors that can occur while harvesting, parsing or storing records.
#[derive(Error, Debug)]
pub enum HarvestError {
  /// The harvest configuration violates one of its bounds.
  ///
  /// This is fatal at startup: no [`HarvestConfig`](crate::config::HarvestConfig) is
  /// constructed. The string describes the offending key.
  #[error("Invalid harvest configuration: {0}")]
  ConfigValidation(String),

  /// The per-call query parameters could not be built.
  ///
  /// Raised when the set is empty or longer than the query-level bound. Shared
  /// configuration is left untouched.
  #[error("Invalid query parameters: {0}")]
  QueryValidation(String),

  /// The configured host could not be turned into a request URL.
  #[error(transparent)]
  InvalidUrl(#[from] url::ParseError),

  /// A network-level failure while talking to the harvest endpoint.
  ///
  /// This can occur when:
  /// - The connection is refused
  /// - DNS resolution fails
  /// - The request exceeds the configured timeout
  #[error(transparent)]
  Transport(#[from] reqwest::Error),

  /// The endpoint answered with a non-success status code.
  #[error("Harvest endpoint returned HTTP {status}: {body}")]
  HttpStatus {
    /// Response status code
    status: u16,
    /// Raw response body, kept for diagnostics
    body:   String,
  },

  /// The response body is not well-formed XML, or not an OAI-PMH envelope.
  #[error("Malformed OAI-PMH envelope: {0}")]
  MalformedEnvelope(String),

  /// The envelope is well-formed but reports a protocol-level `<error>`.
  ///
  /// Distinct from [`HarvestError::MalformedEnvelope`] and from an empty harvest.
  #[error("OAI-PMH protocol error [{code}]: {message}")]
  Protocol {
    /// The `code` attribute of the error node, `unknown` when absent
    code:    String,
    /// Text content of the error node(s)
    message: String,
  },

  /// A SQLite operation failed.
  #[error(transparent)]
  Sqlite(#[from] rusqlite::Error),

  /// An async SQLite operation failed.
  ///
  /// This wraps errors from the `tokio-rusqlite` crate, including failed
  /// transactions, which are rolled back before this is returned.
  #[error(transparent)]
  AsyncSqlite(#[from] tokio_rusqlite::Error),

  /// A document could not be converted to or from JSON.
  #[error(transparent)]
  Serialization(#[from] serde_json::Error),

  /// A file system operation failed.
  #[error(transparent)]
  Io(#[from] std::io::Error),
}

impl HarvestError {
  /// Whether the failure came from the harvest endpoint rather than local validation
  /// or storage.
  ///
  /// Callers deciding on a retry policy only ever want to retry these.
  pub fn is_upstream(&self) -> bool {
    matches!(
      self,
      HarvestError::Transport(_)
        | HarvestError::HttpStatus { .. }
        | HarvestError::MalformedEnvelope(_)
        | HarvestError::Protocol { .. }
    )
  }
}
