//! Clients for the remote repositories records are harvested from.
//!
//! Each submodule implements the transport for one protocol:
//! - Serializing request parameters with the protocol's field names
//! - Issuing exactly one request per call, without retries or caching
//! - Mapping network and status failures onto [`HarvestError`]
//!
//! # Supported Protocols
//!
//! - [`oai`] - Client for OAI-PMH endpoints such as `http://export.arxiv.org/oai2`
//!
//! # Examples
//!
//! ```no_run
//! use harvester::{clients::HarvestClient, config::HarvestConfig, query::QueryParameters};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HarvestConfig::new("http://export.arxiv.org/oai2", "cs", 120, 120)?;
//! let query = QueryParameters::new(&config, None)?;
//! let xml = HarvestClient::new().fetch(&config, &query).await?;
//! # Ok(())
//! # }
//! ```

use reqwest::StatusCode;
use url::Url;

pub mod oai;

pub use oai::HarvestClient;

use super::*;
