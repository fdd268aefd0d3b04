//! A library for harvesting metadata records from OAI-PMH repositories such as arXiv,
//! normalizing them into typed [`Record`]s and persisting them to a local document store.
//!
//! One harvest cycle runs the stages strictly in order:
//! query building → fetch → envelope parsing → normalization → bulk insert.
//!
//! # Example
//! ```rust,no_run
//! use harvester::{config::HarvestConfig, database::Database, harvest::Harvester};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!   let config = HarvestConfig::new("http://export.arxiv.org/oai2", "cs", 120, 120)?;
//!   let harvester = Harvester::new(config);
//!
//!   let db = Database::open(Database::default_path()).await?;
//!   let summary = harvester.run_cycle(&db, None, None).await?;
//!   println!("Stored {} records", summary.inserted);
//!   db.close().await?;
//!
//!   Ok(())
//! }
//! ```

#![warn(missing_docs, clippy::missing_docs_in_private_items)]
use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};
#[cfg(test)] use tracing_test::traced_test;

pub mod clients;
pub mod config;
pub mod database;
pub mod envelope;
pub mod errors;
pub mod harvest;
pub mod normalize;
pub mod query;
pub mod record;
#[cfg(test)] mod tests;

use clients::HarvestClient;
use config::HarvestConfig;
use envelope::{Element, Envelope, GenericRecord};
use errors::HarvestError;
use harvest::RecordStore;
use query::QueryParameters;
use record::{Field, Fields, Header, Metadata, Record};
