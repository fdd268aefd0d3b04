//! SQLite-backed document store for harvested records.
//!
//! Every record is kept as one JSON document in the `articles` table, so harvested
//! [`Record`]s and documents posted through the HTTP API share one collection and one
//! query surface. Stored identifiers are the table's integer row ids; they are rendered
//! as strings under `_id` when a document is read back.
//!
//! # Examples
//!
//! ```no_run
//! use harvester::database::{ArticleFilter, Database};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::open(Database::default_path()).await?;
//!
//! let filter = ArticleFilter { title: Some("quantum".into()), ..ArticleFilter::default() };
//! for article in db.find_documents(&filter, 1).await? {
//!   println!("{}", article["_id"]);
//! }
//!
//! db.close().await?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use async_trait::async_trait;
use rusqlite::{
  functions::FunctionFlags, params, types::Value as SqlValue, OptionalExtension, Transaction,
};
use serde_json::{json, Value};
use tokio_rusqlite::Connection;

use super::*;

/// Number of documents per page of [`Database::find_documents`].
pub const PAGE_SIZE: u32 = 50;

/// JSON path of the Dublin Core title inside a stored document.
const TITLE_PATH: &str = r#"$.metadata."oai_dc:dc"."dc:title""#;
/// JSON path of the Dublin Core description inside a stored document.
const DESCRIPTION_PATH: &str = r#"$.metadata."oai_dc:dc"."dc:description""#;
/// JSON path of the header datestamp inside a stored document.
const DATESTAMP_PATH: &str = "$.header.datestamp";
/// SQL function lowercasing text with full Unicode case mapping.
const LOWER_FUNCTION: &str = "unicode_lower";

/// Criteria for [`Database::find_documents`]. Unset criteria match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleFilter {
  /// Case-insensitive substring of `dc:title`
  pub title:       Option<String>,
  /// Case-insensitive substring of `dc:description`
  pub description: Option<String>,
  /// Earliest `header.datestamp`, inclusive
  pub start_date:  Option<NaiveDate>,
  /// Latest `header.datestamp`, inclusive
  pub end_date:    Option<NaiveDate>,
}

/// Database handle for the record store
pub struct Database {
  /// Background SQLite connection
  conn: Connection,
  /// File the connection was opened on
  path: PathBuf,
}

impl Database {
  /// Open or create a database at the specified path
  pub async fn open(path: impl AsRef<Path>) -> Result<Self, HarvestError> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(&path).await?;

    // Initialize schema
    conn
      .call(|conn| {
        // SQLite's own lower() and LIKE only fold ASCII
        conn.create_scalar_function(
          LOWER_FUNCTION,
          1,
          FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
          |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|text| text.to_lowercase())),
        )?;
        conn.execute_batch(include_str!(concat!(
          env!("CARGO_MANIFEST_DIR"),
          "/migrations/init.sql"
        )))?;
        Ok(())
      })
      .await?;

    debug!("Opened record store at {}", path.display());
    Ok(Self { conn, path })
  }

  /// Get default database path in user's data directory
  pub fn default_path() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("harvester").join("records.db")
  }

  /// The file this store lives in.
  pub fn path(&self) -> &Path { &self.path }

  /// Closes the connection, waiting for queued operations to finish.
  pub async fn close(self) -> Result<(), HarvestError> {
    debug!("Closing record store at {}", self.path.display());
    self.conn.close().await?;
    Ok(())
  }

  /// Runs `op` inside one transaction.
  ///
  /// The transaction commits when `op` returns `Ok` and rolls back on any error, so
  /// callers never observe a partial write.
  pub async fn run_in_transaction<F, T>(&self, op: F) -> Result<T, HarvestError>
  where
    F: FnOnce(&Transaction<'_>) -> rusqlite::Result<T> + Send + 'static,
    T: Send + 'static,
  {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let value = op(&tx)?;
        tx.commit()?;
        Ok(value)
      })
      .await
      .map_err(HarvestError::from)
  }

  /// Inserts one caller-supplied document and returns its id.
  ///
  /// A top-level `_id` in `document` is ignored; the store assigns identifiers.
  pub async fn insert_document(&self, document: &Value) -> Result<i64, HarvestError> {
    let mut document = document.clone();
    if let Value::Object(fields) = &mut document {
      fields.remove("_id");
    }
    let document = serde_json::to_string(&document)?;

    let id = self
      .run_in_transaction(move |tx| {
        tx.execute("INSERT INTO articles (document) VALUES (?1)", params![document])?;
        Ok(tx.last_insert_rowid())
      })
      .await?;

    debug!("Inserted document {id}");
    Ok(id)
  }

  /// Fetches a document by id, with its identifier under `_id`.
  pub async fn get_document(&self, id: i64) -> Result<Option<Value>, HarvestError> {
    let Some(raw) = self.raw_document(id).await? else {
      return Ok(None);
    };

    let mut document: Value = serde_json::from_str(&raw)?;
    if let Value::Object(fields) = &mut document {
      fields.insert("_id".to_string(), Value::String(id.to_string()));
    }
    Ok(Some(document))
  }

  /// Fetches only the description of a document.
  ///
  /// The projection keeps the document's nesting, and omits `metadata` entirely when the
  /// document has no `dc:description`:
  ///
  /// ```json
  /// { "_id": "1", "metadata": { "oai_dc:dc": { "dc:description": "..." } } }
  /// ```
  pub async fn get_description(&self, id: i64) -> Result<Option<Value>, HarvestError> {
    let Some(raw) = self.raw_document(id).await? else {
      return Ok(None);
    };

    let document: Value = serde_json::from_str(&raw)?;
    let mut projection = json!({ "_id": id.to_string() });
    if let Some(description) = document.pointer("/metadata/oai_dc:dc/dc:description") {
      projection["metadata"] = json!({ "oai_dc:dc": { "dc:description": description } });
    }
    Ok(Some(projection))
  }

  /// Lists one page of documents matching `filter`, ordered by id.
  ///
  /// Pages hold [`PAGE_SIZE`] documents and start at 1.
  pub async fn find_documents(
    &self,
    filter: &ArticleFilter,
    page: u32,
  ) -> Result<Vec<Value>, HarvestError> {
    if page == 0 {
      return Err(HarvestError::QueryValidation("page numbers start at 1".to_string()));
    }

    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();
    if let Some(title) = &filter.title {
      clauses.push(format!(
        "{LOWER_FUNCTION}(json_extract(document, '{TITLE_PATH}')) LIKE ? ESCAPE '\\'"
      ));
      values.push(SqlValue::Text(like_pattern(&title.to_lowercase())));
    }
    if let Some(description) = &filter.description {
      clauses.push(format!(
        "{LOWER_FUNCTION}(json_extract(document, '{DESCRIPTION_PATH}')) LIKE ? ESCAPE '\\'"
      ));
      values.push(SqlValue::Text(like_pattern(&description.to_lowercase())));
    }
    if let Some(start) = filter.start_date {
      clauses.push(format!("json_extract(document, '{DATESTAMP_PATH}') >= ?"));
      values.push(SqlValue::Text(start.format(normalize::DATESTAMP_FORMAT).to_string()));
    }
    if let Some(end) = filter.end_date {
      clauses.push(format!("json_extract(document, '{DATESTAMP_PATH}') <= ?"));
      values.push(SqlValue::Text(end.format(normalize::DATESTAMP_FORMAT).to_string()));
    }

    let mut sql = String::from("SELECT id, document FROM articles");
    if !clauses.is_empty() {
      sql.push_str(" WHERE ");
      sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY id LIMIT ? OFFSET ?");
    values.push(SqlValue::Integer(i64::from(PAGE_SIZE)));
    values.push(SqlValue::Integer(i64::from(page - 1) * i64::from(PAGE_SIZE)));

    trace!("Listing articles: {sql}");
    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(values.iter()), |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
          })?
          .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(id, raw)| {
        let mut document: Value = serde_json::from_str(&raw)?;
        if let Value::Object(fields) = &mut document {
          fields.insert("_id".to_string(), Value::String(id.to_string()));
        }
        Ok(document)
      })
      .collect()
  }

  /// Number of stored documents.
  pub async fn count_documents(&self) -> Result<u64, HarvestError> {
    let count = self
      .conn
      .call(|conn| {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
        Ok(count)
      })
      .await?;
    Ok(u64::try_from(count).unwrap_or_default())
  }

  /// The stored JSON text of document `id`.
  async fn raw_document(&self, id: i64) -> Result<Option<String>, HarvestError> {
    self
      .conn
      .call(move |conn| {
        let raw = conn
          .query_row("SELECT document FROM articles WHERE id = ?1", params![id], |row| row.get(0))
          .optional()?;
        Ok(raw)
      })
      .await
      .map_err(HarvestError::from)
  }
}

#[async_trait]
impl RecordStore for Database {
  async fn insert_many(&self, records: Vec<Record>) -> Result<usize, HarvestError> {
    let documents =
      records.iter().map(serde_json::to_string).collect::<Result<Vec<String>, _>>()?;

    let inserted = self
      .run_in_transaction(move |tx| {
        let mut stmt = tx.prepare_cached("INSERT INTO articles (document) VALUES (?1)")?;
        for document in &documents {
          stmt.execute(params![document])?;
        }
        Ok(documents.len())
      })
      .await?;

    info!("Inserted {inserted} records into {}", self.path.display());
    Ok(inserted)
  }
}

/// Wraps `needle` for a `LIKE ... ESCAPE '\'` substring match.
fn like_pattern(needle: &str) -> String {
  let mut pattern = String::with_capacity(needle.len() + 2);
  pattern.push('%');
  for c in needle.chars() {
    if matches!(c, '%' | '_' | '\\') {
      pattern.push('\\');
    }
    pattern.push(c);
  }
  pattern.push('%');
  pattern
}
