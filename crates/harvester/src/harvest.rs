//! Orchestration of one harvest cycle.
//!
//! A cycle runs its stages strictly in order, each one starting only after the previous
//! one succeeded:
//!
//! 1. Build the [`QueryParameters`] (configured set, or a per-call override)
//! 2. Fetch the raw body with the [`HarvestClient`]
//! 3. Parse the [`Envelope`], failing fast on a protocol `<error>`
//! 4. Extract and [`normalize`](crate::normalize::normalize) the records
//! 5. Hand the whole batch to a [`RecordStore`] in a single bulk insert
//!
//! Any stage failure is returned unchanged. Nothing is retried here; retry policy belongs
//! to whoever schedules cycles. The store's connection is owned by the caller as well.
//!
//! # Examples
//!
//! ```no_run
//! use harvester::{config::HarvestConfig, database::Database, harvest::Harvester};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let harvester = Harvester::new(HarvestConfig::new("http://export.arxiv.org/oai2", "cs", 120, 120)?);
//! let db = Database::open("records.db").await?;
//!
//! // Harvest a different set once, without touching the shared configuration
//! let summary = harvester.run_cycle(&db, None, Some("math")).await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use super::*;

/// Bulk storage for normalized records.
///
/// Implementations must treat [`insert_many`](RecordStore::insert_many) as
/// all-or-nothing: either every record is stored, or an error is returned and none are.
#[async_trait]
pub trait RecordStore: Send + Sync {
  /// Stores `records`, returning how many were inserted.
  async fn insert_many(&self, records: Vec<Record>) -> Result<usize, HarvestError>;
}

/// Outcome of a successful harvest cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HarvestSummary {
  /// Set that was harvested
  pub set:       String,
  /// Cutoff date sent to the endpoint
  pub until:     NaiveDate,
  /// Record nodes found in the envelope
  pub harvested: usize,
  /// Records dropped during normalization
  pub discarded: usize,
  /// Records accepted by the store
  pub inserted:  usize,
}

impl std::fmt::Display for HarvestSummary {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "set {} until {}: {} harvested, {} discarded, {} stored",
      self.set, self.until, self.harvested, self.discarded, self.inserted
    )
  }
}

/// Runs harvest cycles against one configured endpoint.
#[derive(Debug, Clone)]
pub struct Harvester {
  /// Shared, immutable configuration
  config: HarvestConfig,
  /// HTTP client reused across cycles
  client: HarvestClient,
}

impl Harvester {
  /// Creates a harvester for `config`.
  pub fn new(config: HarvestConfig) -> Self { Self { config, client: HarvestClient::new() } }

  /// The configuration cycles run with.
  pub fn config(&self) -> &HarvestConfig { &self.config }

  /// Runs one harvest cycle and stores the result in `store`.
  ///
  /// # Arguments
  ///
  /// * `store` - Destination of the normalized batch
  /// * `until` - Cutoff date, defaulting to [`query::default_until`]
  /// * `set` - Set to harvest for this call only; the configured set otherwise
  ///
  /// # Errors
  ///
  /// Returns the first stage failure unchanged. Records dropped during normalization are
  /// counted in [`HarvestSummary::discarded`] and never fail the cycle. An empty batch
  /// skips the store entirely.
  pub async fn run_cycle<S>(
    &self,
    store: &S,
    until: Option<NaiveDate>,
    set: Option<&str>,
  ) -> Result<HarvestSummary, HarvestError>
  where
    S: RecordStore + ?Sized,
  {
    let query = match set {
      Some(set) => QueryParameters::for_set(set, until)?,
      None => QueryParameters::new(&self.config, until)?,
    };

    info!("Retrieving {} records until {} from {}", query.set(), query.until(), self.config.host());
    let body = self.client.fetch(&self.config, &query).await?;

    debug!("Parsing {} byte envelope", body.len());
    let envelope = Envelope::parse(&body)?;
    if let Some(token) = envelope.resumption_token() {
      info!("Endpoint returned a partial list, resumption token {token} is not followed");
    }

    let generic = envelope.into_records();
    let harvested = generic.len();
    let records = normalize::normalize(generic);
    let discarded = harvested - records.len();

    let inserted = if records.is_empty() {
      info!("No records to store");
      0
    } else {
      info!("Storing {} records", records.len());
      store.insert_many(records).await?
    };

    let summary =
      HarvestSummary { set: query.set().to_string(), until: query.until(), harvested, discarded, inserted };
    info!("Harvest cycle finished: {summary}");
    Ok(summary)
  }
}
