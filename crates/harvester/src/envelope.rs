//! Parsing of OAI-PMH response envelopes.
//!
//! The raw body is read with `quick-xml` into a generic [`Element`] tree. Element and
//! attribute names are kept fully qualified (`dc:title`, `xsi:schemaLocation`); text is
//! unescaped and trimmed.
//!
//! Parsing distinguishes three outcomes:
//! - The body is not well-formed XML, or its root is not `OAI-PMH`:
//!   [`HarvestError::MalformedEnvelope`]
//! - The root carries an `<error>` child: [`HarvestError::Protocol`]. This is checked
//!   before anyone can ask for records.
//! - Otherwise an [`Envelope`], whose records may legitimately be empty.
//!
//! # Examples
//!
//! ```
//! use harvester::envelope::Envelope;
//!
//! let xml = r#"<OAI-PMH><ListRecords><record><header/></record></ListRecords></OAI-PMH>"#;
//! let records = Envelope::parse(xml).unwrap().into_records();
//! assert_eq!(records.len(), 1);
//! ```

use quick_xml::{events::Event, Reader};

use super::*;

/// Name of the envelope's root element.
pub const ROOT: &str = "OAI-PMH";
/// Name of the protocol error node.
pub const ERROR: &str = "error";
/// Name of the container holding harvested records.
pub const LIST_RECORDS: &str = "ListRecords";
/// Name of a single record node.
pub const RECORD: &str = "record";
/// Name of the node carrying the continuation token of a partial list.
pub const RESUMPTION_TOKEN: &str = "resumptionToken";

/// One record node as found in the envelope, before normalization.
pub type GenericRecord = Element;

/// A generic XML element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
  /// Qualified element name, e.g. `dc:title`
  pub name:       String,
  /// Attributes in document order, with qualified names
  pub attributes: Vec<(String, String)>,
  /// Child elements in document order
  pub children:   Vec<Element>,
  /// Trimmed, unescaped text content directly inside this element
  pub text:       String,
}

impl Element {
  /// Creates an empty element called `name`.
  pub fn new(name: impl Into<String>) -> Self { Self { name: name.into(), ..Self::default() } }

  /// The first child called `name`.
  pub fn child(&self, name: &str) -> Option<&Element> {
    self.children.iter().find(|child| child.name == name)
  }

  /// All children called `name`, in document order.
  pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
    self.children.iter().filter(move |child| child.name == name)
  }

  /// The value of the attribute called `name`.
  pub fn attribute(&self, name: &str) -> Option<&str> {
    self.attributes.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
  }
}

/// A parsed, error-free OAI-PMH response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
  /// The `OAI-PMH` root element
  root: Element,
}

impl Envelope {
  /// Parses a raw response body.
  ///
  /// # Errors
  ///
  /// - [`HarvestError::MalformedEnvelope`] if `raw` is not well-formed XML with an
  ///   `OAI-PMH` root
  /// - [`HarvestError::Protocol`] if the root contains an `error` node
  pub fn parse(raw: &str) -> Result<Self, HarvestError> {
    let root = parse_tree(raw)?;

    if root.name != ROOT {
      return Err(HarvestError::MalformedEnvelope(format!(
        "expected root element {ROOT}, found {}",
        root.name
      )));
    }

    let errors: Vec<&Element> = root.children_named(ERROR).collect();
    if let Some(first) = errors.first() {
      let code = first.attribute("code").unwrap_or("unknown").to_string();
      let message =
        errors.iter().map(|e| e.text.as_str()).filter(|t| !t.is_empty()).collect::<Vec<_>>();
      let message = message.join("; ");
      warn!("OAI-PMH endpoint reported an error [{code}]: {message}");
      return Err(HarvestError::Protocol { code, message });
    }

    Ok(Self { root })
  }

  /// The root element.
  pub fn root(&self) -> &Element { &self.root }

  /// The resumption token, when the endpoint returned only part of the list.
  pub fn resumption_token(&self) -> Option<&str> {
    self
      .root
      .child(LIST_RECORDS)?
      .child(RESUMPTION_TOKEN)
      .map(|token| token.text.as_str())
      .filter(|token| !token.is_empty())
  }

  /// Takes the records at `OAI-PMH/ListRecords/record`.
  ///
  /// A missing `ListRecords` container yields no records rather than an error, since an
  /// empty harvest window is a valid outcome.
  pub fn into_records(self) -> Vec<GenericRecord> {
    let Some(list) = self.root.children.into_iter().find(|child| child.name == LIST_RECORDS)
    else {
      debug!("Envelope has no {LIST_RECORDS} container");
      return Vec::new();
    };
    list.children.into_iter().filter(|child| child.name == RECORD).collect()
  }
}

/// Reads `raw` into an element tree with exactly one root.
fn parse_tree(raw: &str) -> Result<Element, HarvestError> {
  let malformed = |e: &dyn std::fmt::Display| HarvestError::MalformedEnvelope(e.to_string());

  let mut reader = Reader::from_str(raw);
  let mut stack: Vec<Element> = Vec::new();
  let mut root: Option<Element> = None;

  loop {
    let position = reader.buffer_position();
    match reader.read_event().map_err(|e| malformed(&format!("at byte {position}: {e}")))? {
      Event::Start(start) => {
        let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()));
        for attr in start.attributes() {
          let attr = attr.map_err(|e| malformed(&e))?;
          let value = attr.unescape_value().map_err(|e| malformed(&e))?;
          element
            .attributes
            .push((String::from_utf8_lossy(attr.key.as_ref()).into_owned(), value.into_owned()));
        }
        stack.push(element);
      },
      Event::Empty(start) => {
        let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()));
        for attr in start.attributes() {
          let attr = attr.map_err(|e| malformed(&e))?;
          let value = attr.unescape_value().map_err(|e| malformed(&e))?;
          element
            .attributes
            .push((String::from_utf8_lossy(attr.key.as_ref()).into_owned(), value.into_owned()));
        }
        attach(element, &mut stack, &mut root)?;
      },
      Event::Text(text) => {
        let text = text.unescape().map_err(|e| malformed(&e))?;
        match stack.last_mut() {
          Some(parent) => parent.text.push_str(&text),
          None if text.trim().is_empty() => {},
          None => return Err(malformed(&"text outside of the root element")),
        }
      },
      Event::CData(data) => match stack.last_mut() {
        Some(parent) => parent.text.push_str(&String::from_utf8_lossy(&data)),
        None => return Err(malformed(&"CDATA outside of the root element")),
      },
      Event::End(_) => {
        let mut element =
          stack.pop().ok_or_else(|| malformed(&"closing tag without an opening tag"))?;
        element.text = element.text.trim().to_string();
        attach(element, &mut stack, &mut root)?;
      },
      Event::Eof => break,
      _ => {},
    }
  }

  if let Some(open) = stack.last() {
    return Err(malformed(&format!("unclosed element {}", open.name)));
  }
  root.ok_or_else(|| malformed(&"document has no root element"))
}

/// Hands a finished element to its parent, or makes it the document root.
fn attach(
  element: Element,
  stack: &mut [Element],
  root: &mut Option<Element>,
) -> Result<(), HarvestError> {
  match stack.last_mut() {
    Some(parent) => parent.children.push(element),
    None if root.is_some() =>
      return Err(HarvestError::MalformedEnvelope(format!(
        "second root element {} after the first",
        element.name
      ))),
    None => *root = Some(element),
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_builds_generic_tree() {
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
      <OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
        <responseDate>2024-01-29T16:07:33Z</responseDate>
        <request verb="ListRecords" set="cs">http://export.arxiv.org/oai2</request>
        <ListRecords>
          <record><header><identifier> oai:arXiv.org:1 </identifier></header></record>
          <record><header status="deleted"/></record>
        </ListRecords>
      </OAI-PMH>"#;

    let envelope = Envelope::parse(xml).unwrap();
    let root = envelope.root();
    assert_eq!(root.attribute("xmlns"), Some("http://www.openarchives.org/OAI/2.0/"));
    assert_eq!(root.child("request").unwrap().attribute("verb"), Some("ListRecords"));
    assert_eq!(root.child("request").unwrap().text, "http://export.arxiv.org/oai2");

    let records = envelope.into_records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].child("header").unwrap().child("identifier").unwrap().text, "oai:arXiv.org:1");
    assert_eq!(records[1].child("header").unwrap().attribute("status"), Some("deleted"));
  }

  #[test]
  fn test_unescapes_text_and_cdata() {
    let xml = "<OAI-PMH><ListRecords><record><t>Fish &amp; Chips</t><c><![CDATA[a < b]]></c></record></ListRecords></OAI-PMH>";
    let records = Envelope::parse(xml).unwrap().into_records();
    assert_eq!(records[0].child("t").unwrap().text, "Fish & Chips");
    assert_eq!(records[0].child("c").unwrap().text, "a < b");
  }

  #[test]
  fn test_error_node_is_protocol_error() {
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <OAI-PMH>
                <error>Error message</error>
            </OAI-PMH>
        "#;
    match Envelope::parse(xml) {
      Err(HarvestError::Protocol { code, message }) => {
        assert_eq!(code, "unknown");
        assert_eq!(message, "Error message");
      },
      other => panic!("expected protocol error, got {other:?}"),
    }
  }

  #[test]
  fn test_error_node_wins_over_records() {
    let xml = r#"<OAI-PMH>
        <error code="badArgument">Illegal set</error>
        <error code="noRecordsMatch">Nothing here</error>
        <ListRecords><record/></ListRecords>
      </OAI-PMH>"#;
    match Envelope::parse(xml) {
      Err(HarvestError::Protocol { code, message }) => {
        assert_eq!(code, "badArgument");
        assert_eq!(message, "Illegal set; Nothing here");
      },
      other => panic!("expected protocol error, got {other:?}"),
    }
  }

  #[test]
  fn test_missing_list_is_empty_harvest() {
    let envelope = Envelope::parse("<OAI-PMH><responseDate>2024-01-29</responseDate></OAI-PMH>").unwrap();
    assert_eq!(envelope.resumption_token(), None);
    assert!(envelope.into_records().is_empty());
  }

  #[test]
  fn test_resumption_token() {
    let xml = r#"<OAI-PMH><ListRecords><record/><resumptionToken cursor="0">6960524|1001</resumptionToken></ListRecords></OAI-PMH>"#;
    let envelope = Envelope::parse(xml).unwrap();
    assert_eq!(envelope.resumption_token(), Some("6960524|1001"));
    assert_eq!(envelope.into_records().len(), 1);
  }

  #[test]
  fn test_malformed_bodies() {
    let cases = [
      "",
      "Service Unavailable",
      "<OAI-PMH><ListRecords></OAI-PMH>",
      "<OAI-PMH><ListRecords>",
      "<OAI-PMH></OAI-PMH><OAI-PMH></OAI-PMH>",
      "<html><body>Bad gateway</body></html>",
    ];
    for xml in cases {
      assert!(
        matches!(Envelope::parse(xml), Err(HarvestError::MalformedEnvelope(_))),
        "{xml:?} should be malformed"
      );
    }
  }
}
