//! Normalized record types.
//!
//! A [`Record`] is one harvested metadata entry: a [`Header`] with a typed datestamp and a
//! [`Metadata`] block of descriptive fields. The JSON shape mirrors the source document,
//! so a record stored by the harvester and one posted through the HTTP API can be
//! queried the same way:
//!
//! ```json
//! {
//!   "header": { "identifier": "oai:arXiv.org:0802.3300", "datestamp": "2024-01-18", "setSpec": "cs" },
//!   "metadata": {
//!     "oai_dc:dc": {
//!       "dc:title": "Projective Expected Utility",
//!       "dc:subject": ["Quantum Physics", "Economics - Theoretical Economics"]
//!     }
//!   }
//! }
//! ```

use super::*;

/// Metadata container used by the `oai_dc` format.
pub const DUBLIN_CORE: &str = "oai_dc:dc";

/// A descriptive value that appeared once or several times in the source.
///
/// Repeated sibling elements fold into [`Field::Many`] only when there is more than one
/// of them; a single element stays a bare [`Field::One`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Field {
  /// Exactly one occurrence
  One(String),
  /// Two or more occurrences, in source order
  Many(Vec<String>),
}

impl Field {
  /// Folds occurrences into a field: none gives `None`, one gives [`Field::One`].
  pub fn from_values(mut values: Vec<String>) -> Option<Self> {
    match values.len() {
      0 => None,
      1 => values.pop().map(Field::One),
      _ => Some(Field::Many(values)),
    }
  }

  /// All occurrences in source order.
  pub fn values(&self) -> Vec<&str> {
    match self {
      Field::One(value) => vec![value.as_str()],
      Field::Many(values) => values.iter().map(String::as_str).collect(),
    }
  }

  /// The first occurrence.
  pub fn first(&self) -> Option<&str> {
    match self {
      Field::One(value) => Some(value.as_str()),
      Field::Many(values) => values.first().map(String::as_str),
    }
  }
}

/// The OAI-PMH record header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
  /// Unique OAI identifier, e.g. `oai:arXiv.org:0802.3300`
  pub identifier: String,
  /// Date of the last change to the record
  pub datestamp:  NaiveDate,
  /// Sets the record belongs to
  #[serde(rename = "setSpec", default, skip_serializing_if = "Option::is_none")]
  pub set_spec:   Option<Field>,
  /// `deleted` when the repository has withdrawn the record
  #[serde(rename = "@status", default, skip_serializing_if = "Option::is_none")]
  pub status:     Option<String>,
}

/// Fields of one metadata format, keyed by qualified element name (`dc:title`).
///
/// Attributes of the format container are kept under `@`-prefixed keys.
pub type Fields = BTreeMap<String, Field>;

/// Descriptive metadata, keyed by format container (`oai_dc:dc`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(pub BTreeMap<String, Fields>);

impl Metadata {
  /// The Dublin Core fields, if the record carries them.
  pub fn dublin_core(&self) -> Option<&Fields> { self.0.get(DUBLIN_CORE) }

  /// A Dublin Core field by its unprefixed name, e.g. `title`.
  pub fn dc(&self, name: &str) -> Option<&Field> { self.dublin_core()?.get(&format!("dc:{name}")) }

  /// `dc:title`
  pub fn title(&self) -> Option<&Field> { self.dc("title") }

  /// `dc:creator`
  pub fn creators(&self) -> Option<&Field> { self.dc("creator") }

  /// `dc:subject`
  pub fn subjects(&self) -> Option<&Field> { self.dc("subject") }

  /// `dc:description`
  pub fn descriptions(&self) -> Option<&Field> { self.dc("description") }

  /// `dc:identifier`
  pub fn identifiers(&self) -> Option<&Field> { self.dc("identifier") }
}

/// A normalized harvested record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
  /// Identification and datestamp
  pub header:   Header,
  /// Descriptive fields, empty for deleted records
  #[serde(default)]
  pub metadata: Metadata,
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn test_field_folding() {
    assert_eq!(Field::from_values(vec![]), None);
    assert_eq!(Field::from_values(vec!["a".into()]), Some(Field::One("a".into())));
    assert_eq!(
      Field::from_values(vec!["a".into(), "b".into()]),
      Some(Field::Many(vec!["a".into(), "b".into()]))
    );
  }

  #[test]
  fn test_json_shape_matches_source_document() {
    let mut dc = Fields::new();
    dc.insert("dc:title".into(), Field::One("Projective Expected Utility".into()));
    dc.insert("dc:creator".into(), Field::Many(vec!["Hahsler, Michael".into(), "Hornik, Kurt".into()]));
    let record = Record {
      header:   Header {
        identifier: "oai:arXiv.org:0802.3300".into(),
        datestamp:  NaiveDate::from_ymd_opt(2024, 1, 18).unwrap(),
        set_spec:   Some(Field::One("cs".into())),
        status:     None,
      },
      metadata: Metadata(BTreeMap::from([(DUBLIN_CORE.to_string(), dc)])),
    };

    let value = serde_json::to_value(&record).unwrap();
    assert_eq!(
      value,
      json!({
        "header": {
          "identifier": "oai:arXiv.org:0802.3300",
          "datestamp": "2024-01-18",
          "setSpec": "cs"
        },
        "metadata": {
          "oai_dc:dc": {
            "dc:title": "Projective Expected Utility",
            "dc:creator": ["Hahsler, Michael", "Hornik, Kurt"]
          }
        }
      })
    );

    let back: Record = serde_json::from_value(value).unwrap();
    assert_eq!(back, record);
    assert_eq!(back.metadata.title().and_then(Field::first), Some("Projective Expected Utility"));
    assert_eq!(back.metadata.creators().map(Field::values).unwrap().len(), 2);
  }
}
