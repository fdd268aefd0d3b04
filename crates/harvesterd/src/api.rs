//! HTTP API over the record store.
//!
//! | Route                               | Purpose                                         |
//! |-------------------------------------|-------------------------------------------------|
//! | `GET /articles/`                    | Paginated, filtered listing (50 per page)       |
//! | `GET /article/{id}`                 | One stored document                             |
//! | `GET /text/{id}.txt`                | Only the description of one document            |
//! | `POST /articles`                    | Store a caller-supplied document                |
//! | `GET /inject_data_to_mongodb`       | Run one harvest cycle now (`ARXSET` overrides)  |
//! | `GET /`, `/time`, `/health`, `/version` | Service information                         |
//!
//! Every handler that touches the store opens it for the request and closes it before
//! responding. Errors are reported as `{"error": "<message>"}`.

use std::sync::Arc;

use axum::{
  body::Bytes,
  extract::{Path as UrlPath, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  routing::{get, post},
  Json, Router,
};
use harvester::database::ArticleFilter;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::*;

/// Suffix of the description route's path segment.
const TEXT_SUFFIX: &str = ".txt";

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
  /// Runs the cycles started through the trigger endpoint
  harvester:  Arc<Harvester>,
  /// Location of the store, opened per request
  store_path: Arc<PathBuf>,
}

impl AppState {
  /// Creates the state for a harvester and a store location.
  pub fn new(harvester: Harvester, store_path: impl Into<PathBuf>) -> Self {
    Self { harvester: Arc::new(harvester), store_path: Arc::new(store_path.into()) }
  }

  /// Opens the store for one request.
  async fn open_store(&self) -> Result<Database, ApiError> {
    Ok(Database::open(self.store_path.as_path()).await?)
  }
}

/// A failed request, rendered as `{"error": "<message>"}`.
#[derive(Debug)]
pub enum ApiError {
  /// 400: the request itself is invalid
  BadRequest(String),
  /// 404: the addressed document does not exist
  NotFound(String),
  /// 500: the store or a harvest cycle failed
  Internal(String),
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match self {
      ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
      ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
      ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}

impl From<HarvestError> for ApiError {
  fn from(e: HarvestError) -> Self {
    error!("Request failed: {e}");
    ApiError::Internal(e.to_string())
  }
}

/// Builds the router with all routes and request tracing.
pub fn build_router(state: AppState) -> Router {
  Router::new()
    .route("/", get(welcome))
    .route("/time", get(current_time))
    .route("/health", get(health))
    .route("/version", get(version))
    .route("/articles/", get(list_articles))
    .route("/articles", post(insert_article))
    .route("/article/:id", get(get_article))
    .route("/text/:file", get(get_article_text))
    .route("/inject_data_to_mongodb", get(inject_data))
    .with_state(state)
    .layer(TraceLayer::new_for_http())
}

/// Serves the API on `addr` until Ctrl-C.
pub async fn serve(state: AppState, addr: &str) -> Result<(), HarvesterdError> {
  let listener = TcpListener::bind(addr).await?;
  info!("Serving HTTP API on {}", listener.local_addr()?);

  axum::serve(listener, build_router(state)).with_graceful_shutdown(shutdown_signal()).await?;

  info!("HTTP API stopped");
  Ok(())
}

/// Resolves on Ctrl-C. If the signal handler cannot be installed, never resolves.
pub async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    error!("Cannot listen for Ctrl-C: {e}");
    std::future::pending::<()>().await;
  }
}

/// Closes `db`, then hands back the request's result.
async fn close_after<T>(db: Database, result: Result<T, HarvestError>) -> Result<T, ApiError> {
  let closed = db.close().await;
  let value = result?;
  closed?;
  Ok(value)
}

/// Parses a stored document identifier.
fn parse_id(raw: &str) -> Result<i64, ApiError> {
  raw
    .parse::<i64>()
    .ok()
    .filter(|id| *id > 0)
    .ok_or_else(|| ApiError::BadRequest("Invalid identifier format".to_string()))
}

/// Parses an optional `YYYY-MM-DD` query parameter; empty counts as absent.
fn parse_date(name: &str, raw: Option<&str>) -> Result<Option<NaiveDate>, ApiError> {
  match raw.map(str::trim).filter(|raw| !raw.is_empty()) {
    None => Ok(None),
    Some(raw) => NaiveDate::parse_from_str(raw, harvester::normalize::DATESTAMP_FORMAT)
      .map(Some)
      .map_err(|_| ApiError::BadRequest(format!("{name} must be a YYYY-MM-DD date, got {raw:?}"))),
  }
}

async fn welcome() -> &'static str { "Welcome to the OAI Harvester API!" }

async fn current_time() -> String { format!("Current Server Time: {}", chrono::Local::now()) }

async fn health() -> &'static str { "OK" }

async fn version() -> String {
  format!("OAI Harvester API Version: {}", env!("CARGO_PKG_VERSION"))
}

/// Query parameters of `GET /articles/`.
#[derive(Debug, Default, Deserialize)]
pub struct ArticlesQuery {
  /// Page number, starting at 1
  page:        Option<String>,
  /// Substring of the description
  description: Option<String>,
  /// Substring of the title
  title:       Option<String>,
  /// Earliest datestamp, inclusive
  start_date:  Option<String>,
  /// Latest datestamp, inclusive
  end_date:    Option<String>,
}

async fn list_articles(
  State(state): State<AppState>,
  Query(query): Query<ArticlesQuery>,
) -> Result<Json<Vec<Value>>, ApiError> {
  let page = match query.page.as_deref().map(str::trim).filter(|page| !page.is_empty()) {
    None => 1,
    Some(raw) => raw
      .parse::<u32>()
      .ok()
      .filter(|page| *page >= 1)
      .ok_or_else(|| ApiError::BadRequest(format!("page must be a positive integer, got {raw:?}")))?,
  };
  let non_empty = |value: Option<String>| value.filter(|value| !value.is_empty());
  let filter = ArticleFilter {
    start_date:  parse_date("start_date", query.start_date.as_deref())?,
    end_date:    parse_date("end_date", query.end_date.as_deref())?,
    title:       non_empty(query.title),
    description: non_empty(query.description),
  };

  let db = state.open_store().await?;
  let result = db.find_documents(&filter, page).await;
  let articles = close_after(db, result).await?;

  info!("Retrieved {} filtered articles for page {page}", articles.len());
  Ok(Json(articles))
}

async fn get_article(
  State(state): State<AppState>,
  UrlPath(id): UrlPath<String>,
) -> Result<Json<Value>, ApiError> {
  let id = parse_id(&id)?;

  let db = state.open_store().await?;
  let result = db.get_document(id).await;
  close_after(db, result)
    .await?
    .map(Json)
    .ok_or_else(|| ApiError::NotFound("Article not found".to_string()))
}

async fn get_article_text(
  State(state): State<AppState>,
  UrlPath(file): UrlPath<String>,
) -> Result<Json<Value>, ApiError> {
  let Some(id) = file.strip_suffix(TEXT_SUFFIX) else {
    return Err(ApiError::NotFound(format!("No such resource {file:?}")));
  };
  let id = parse_id(id)?;

  let db = state.open_store().await?;
  let result = db.get_description(id).await;
  close_after(db, result)
    .await?
    .map(Json)
    .ok_or_else(|| ApiError::NotFound("Article not found".to_string()))
}

async fn insert_article(
  State(state): State<AppState>,
  body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
  let document = serde_json::from_slice::<Value>(&body)
    .ok()
    .filter(|document| document.get("header").is_some() && document.get("metadata").is_some())
    .ok_or_else(|| {
      warn!("Rejected an invalid or incomplete document");
      ApiError::BadRequest("Invalid or incomplete document".to_string())
    })?;

  let db = state.open_store().await?;
  let result = db.insert_document(&document).await;
  let id = close_after(db, result).await?;

  info!("Article inserted successfully with id {id}");
  Ok((
    StatusCode::CREATED,
    Json(json!({ "message": "Article inserted successfully", "id": id.to_string() })),
  ))
}

/// Query parameters of `GET /inject_data_to_mongodb`.
#[derive(Debug, Default, Deserialize)]
pub struct InjectQuery {
  /// Set to harvest for this request only
  #[serde(rename = "ARXSET")]
  set: Option<String>,
}

async fn inject_data(
  State(state): State<AppState>,
  Query(query): Query<InjectQuery>,
) -> Result<Json<Value>, ApiError> {
  match harvest_into(&state.harvester, &state.store_path, Some(today()), query.set.as_deref()).await {
    Ok(summary) => {
      info!("Data injection completed: {summary}");
      Ok(Json(json!({
        "message": "Data injection completed successfully.",
        "inserted": summary.inserted
      })))
    },
    Err(e) => {
      let message = format!("Error during data injection: {e}");
      error!("{message}");
      Err(ApiError::Internal(message))
    },
  }
}
