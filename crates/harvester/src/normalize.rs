//! Conversion of generic record nodes into typed [`Record`]s.
//!
//! Normalization is tolerant per record: a record whose `header/datestamp` is missing or
//! not a `YYYY-MM-DD` date is dropped with a logged [`NormalizationWarning`], and the
//! rest of the batch goes through. Every other field is kept as found, folding repeated
//! sibling elements into a [`Field::Many`] only when there is more than one.

use thiserror::Error;

use super::*;

/// Format of `header/datestamp`.
pub const DATESTAMP_FORMAT: &str = "%Y-%m-%d";

/// Placeholder used in warnings when a record has no identifier.
const UNKNOWN_IDENTIFIER: &str = "<unknown>";

/// Why a single record was dropped. Never fatal to the batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizationWarning {
  /// The record has no `header/datestamp`, or it is empty.
  #[error("record {identifier} has no header datestamp")]
  MissingDatestamp {
    /// Identifier of the dropped record
    identifier: String,
  },

  /// The datestamp is not a `YYYY-MM-DD` date.
  #[error("record {identifier} has an unparsable datestamp {value:?}")]
  InvalidDatestamp {
    /// Identifier of the dropped record
    identifier: String,
    /// The raw datestamp text
    value:      String,
  },
}

/// Normalizes a batch, dropping and logging records that fail datestamp coercion.
///
/// Output order matches input order, minus the dropped records.
pub fn normalize(records: Vec<GenericRecord>) -> Vec<Record> {
  let total = records.len();
  let normalized: Vec<Record> = records
    .into_iter()
    .filter_map(|record| match normalize_record(record) {
      Ok(record) => Some(record),
      Err(warning) => {
        warn!("Discarding record: {warning}");
        None
      },
    })
    .collect();

  debug!("Normalized {} of {total} records", normalized.len());
  normalized
}

/// Normalizes one `<record>` node.
pub fn normalize_record(record: GenericRecord) -> Result<Record, NormalizationWarning> {
  let empty = Element::default();
  let header = record.child("header").unwrap_or(&empty);

  let identifier =
    header.child("identifier").map(|identifier| identifier.text.clone()).unwrap_or_default();
  let shown = || {
    if identifier.is_empty() { UNKNOWN_IDENTIFIER.to_string() } else { identifier.clone() }
  };

  let raw = header
    .child("datestamp")
    .map(|datestamp| datestamp.text.as_str())
    .filter(|text| !text.is_empty())
    .ok_or_else(|| NormalizationWarning::MissingDatestamp { identifier: shown() })?;
  let datestamp = parse_datestamp(raw).ok_or_else(|| NormalizationWarning::InvalidDatestamp {
    identifier: shown(),
    value:      raw.to_string(),
  })?;

  let set_spec =
    Field::from_values(header.children_named("setSpec").map(|set| set.text.clone()).collect());
  let status = header.attribute("status").map(str::to_string);

  let metadata = record.child("metadata").map(fold_metadata).unwrap_or_default();

  Ok(Record { header: Header { identifier, datestamp, set_spec, status }, metadata })
}

/// Parses a datestamp of exactly the form `YYYY-MM-DD`.
///
/// chrono alone accepts unpadded fields such as `2024-1-8`.
fn parse_datestamp(raw: &str) -> Option<NaiveDate> {
  let well_formed = raw.len() == 10
    && raw.bytes().enumerate().all(|(i, b)| match i {
      4 | 7 => b == b'-',
      _ => b.is_ascii_digit(),
    });
  if !well_formed {
    return None;
  }
  NaiveDate::parse_from_str(raw, DATESTAMP_FORMAT).ok()
}

/// Folds each format container under `<metadata>` into a field map.
fn fold_metadata(metadata: &Element) -> Metadata {
  let formats = metadata
    .children
    .iter()
    .map(|container| {
      let mut occurrences: BTreeMap<String, Vec<String>> = BTreeMap::new();
      for child in &container.children {
        if !child.attributes.is_empty() || !child.children.is_empty() {
          debug!(
            "Keeping only the text of {} in {}, dropping {} attributes and {} child elements",
            child.name,
            container.name,
            child.attributes.len(),
            child.children.len()
          );
        }
        occurrences.entry(child.name.clone()).or_default().push(child.text.clone());
      }

      let mut fields: Fields = occurrences
        .into_iter()
        .filter_map(|(name, values)| Field::from_values(values).map(|field| (name, field)))
        .collect();
      for (key, value) in &container.attributes {
        fields.insert(format!("@{key}"), Field::One(value.clone()));
      }

      trace!("Folded {} fields for {}", fields.len(), container.name);
      (container.name.clone(), fields)
    })
    .collect();

  Metadata(formats)
}
