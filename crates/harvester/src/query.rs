//! Construction of OAI-PMH `ListRecords` request parameters.
//!
//! A [`QueryParameters`] value is built fresh for every harvest call and serializes to
//! the protocol's own field names (`metadataPrefix`, `verb`, `set`, `until`), so it can
//! be handed straight to [`reqwest::RequestBuilder::query`].

use super::*;

/// Metadata format requested from the endpoint (Dublin Core).
pub const METADATA_PREFIX: &str = "oai_dc";

/// The OAI-PMH verb for listing records.
pub const LIST_RECORDS_VERB: &str = "ListRecords";

/// Longest accepted set name at query level.
///
/// Stricter than [`config::MAX_CONFIG_FIELD_LEN`]: a set may be valid configuration and
/// still be rejected here.
pub const MAX_QUERY_SET_LEN: usize = 32;

/// The cutoff used when the caller does not supply one: 2000-01-01.
pub fn default_until() -> NaiveDate { NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN) }

/// Parameters of a single `ListRecords` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParameters {
  /// Metadata format, always [`METADATA_PREFIX`]
  metadata_prefix: &'static str,
  /// Protocol verb, always [`LIST_RECORDS_VERB`]
  verb:            &'static str,
  /// Set to harvest
  set:             String,
  /// Harvest records modified up to and including this date
  until:           NaiveDate,
}

impl QueryParameters {
  /// Builds the query for the configured set.
  ///
  /// `until` falls back to [`default_until`] when `None`.
  ///
  /// # Errors
  ///
  /// Returns [`HarvestError::QueryValidation`] if the configured set is longer than
  /// [`MAX_QUERY_SET_LEN`].
  pub fn new(config: &HarvestConfig, until: Option<NaiveDate>) -> Result<Self, HarvestError> {
    Self::for_set(config.set(), until)
  }

  /// Builds the query for an explicit set, leaving any configuration untouched.
  pub fn for_set(set: &str, until: Option<NaiveDate>) -> Result<Self, HarvestError> {
    let len = set.chars().count();
    if len == 0 || len > MAX_QUERY_SET_LEN {
      return Err(HarvestError::QueryValidation(format!(
        "set must be between 1 and {MAX_QUERY_SET_LEN} characters, got {len}"
      )));
    }

    Ok(Self {
      metadata_prefix: METADATA_PREFIX,
      verb:            LIST_RECORDS_VERB,
      set:             set.to_string(),
      until:           until.unwrap_or_else(default_until),
    })
  }

  /// The metadata format requested.
  pub fn metadata_prefix(&self) -> &str { self.metadata_prefix }

  /// The protocol verb.
  pub fn verb(&self) -> &str { self.verb }

  /// The set to harvest.
  pub fn set(&self) -> &str { &self.set }

  /// The cutoff date.
  pub fn until(&self) -> NaiveDate { self.until }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn config_with_set(set: &str) -> HarvestConfig {
    HarvestConfig::new("http://export.arxiv.org/oai2", set, 120, 120).unwrap()
  }

  #[test]
  fn test_build_parameters_query() {
    let until = NaiveDate::from_ymd_opt(2024, 1, 29).unwrap();
    let query = QueryParameters::new(&config_with_set("cs"), Some(until)).unwrap();

    assert_eq!(query.set(), "cs");
    assert_eq!(query.until(), until);
    assert_eq!(query.verb(), "ListRecords");
    assert_eq!(query.metadata_prefix(), "oai_dc");
  }

  #[test]
  fn test_until_defaults_to_epoch_sentinel() {
    let query = QueryParameters::new(&config_with_set("cs"), None).unwrap();
    assert_eq!(query.until(), NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
  }

  #[test]
  fn test_query_bound_is_stricter_than_config_bound() {
    let at_limit = "s".repeat(MAX_QUERY_SET_LEN);
    assert!(QueryParameters::new(&config_with_set(&at_limit), None).is_ok());

    for len in [MAX_QUERY_SET_LEN + 1, 48, config::MAX_CONFIG_FIELD_LEN] {
      let config = config_with_set(&"s".repeat(len));
      assert!(matches!(
        QueryParameters::new(&config, None),
        Err(HarvestError::QueryValidation(_))
      ));
    }
  }

  #[test]
  fn test_empty_override_is_rejected() {
    assert!(matches!(QueryParameters::for_set("", None), Err(HarvestError::QueryValidation(_))));
  }

  #[test]
  fn test_serializes_protocol_field_names() {
    let until = NaiveDate::from_ymd_opt(2024, 1, 18).unwrap();
    let query = QueryParameters::for_set("math", Some(until)).unwrap();
    let json = serde_json::to_value(&query).unwrap();

    assert_eq!(
      json,
      serde_json::json!({
        "metadataPrefix": "oai_dc",
        "verb": "ListRecords",
        "set": "math",
        "until": "2024-01-18"
      })
    );
  }
}
