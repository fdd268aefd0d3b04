//! Client implementation for OAI-PMH harvesting endpoints.
//!
//! This module issues `ListRecords` requests against an OAI-PMH endpoint (for arXiv,
//! `http://export.arxiv.org/oai2`) and returns the raw XML body. Parsing the body is
//! left to [`envelope`](crate::envelope).
//!
//! # Examples
//!
//! ```no_run
//! use harvester::{clients::HarvestClient, config::HarvestConfig, query::QueryParameters};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HarvestConfig::new("http://export.arxiv.org/oai2", "cs", 120, 120)?;
//! let query = QueryParameters::new(&config, None)?;
//!
//! let body = HarvestClient::new().fetch(&config, &query).await?;
//! println!("Received {} bytes", body.len());
//! # Ok(())
//! # }
//! ```

use super::*;

/// Client for issuing harvest requests.
///
/// The underlying HTTP client is reused across calls; the timeout is taken from the
/// [`HarvestConfig`] passed to each [`fetch`](HarvestClient::fetch).
#[derive(Debug, Clone)]
pub struct HarvestClient {
  /// Internal web client used to connect to the endpoint.
  client: reqwest::Client,
}

impl HarvestClient {
  /// Creates a new harvest client instance.
  pub fn new() -> Self { Self { client: reqwest::Client::new() } }

  /// Performs one `GET` against `config.host()` with `query` as request parameters.
  ///
  /// # Returns
  ///
  /// The raw response body on HTTP 200.
  ///
  /// # Errors
  ///
  /// This function will return an error if:
  /// - The host is not a valid URL ([`HarvestError::InvalidUrl`])
  /// - The connection fails or exceeds `config.timeout()` ([`HarvestError::Transport`])
  /// - The status is anything but 200 ([`HarvestError::HttpStatus`], carrying the body)
  pub async fn fetch(
    &self,
    config: &HarvestConfig,
    query: &QueryParameters,
  ) -> Result<String, HarvestError> {
    let url = Url::parse(config.host())?;

    debug!(
      "Fetching {} from {url} (set={}, until={})",
      query.verb(),
      query.set(),
      query.until()
    );

    let response =
      self.client.get(url).query(query).timeout(config.timeout()).send().await?;
    let status = response.status();
    let body = response.text().await?;

    trace!("OAI-PMH response ({status}): {body}");

    if status != StatusCode::OK {
      warn!("Harvest endpoint answered with status {status}");
      return Err(HarvestError::HttpStatus { status: status.as_u16(), body });
    }

    Ok(body)
  }
}

impl Default for HarvestClient {
  fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
  use mockito::Matcher;

  use super::*;

  fn config_for(host: String) -> HarvestConfig { HarvestConfig::new(host, "cs", 120, 5).unwrap() }

  #[tokio::test]
  async fn test_fetch_sends_protocol_parameters() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("GET", "/oai2")
      .match_query(Matcher::AllOf(vec![
        Matcher::UrlEncoded("verb".into(), "ListRecords".into()),
        Matcher::UrlEncoded("metadataPrefix".into(), "oai_dc".into()),
        Matcher::UrlEncoded("set".into(), "cs".into()),
        Matcher::UrlEncoded("until".into(), "2000-01-01".into()),
      ]))
      .with_status(200)
      .with_body("<OAI-PMH></OAI-PMH>")
      .create_async()
      .await;

    let config = config_for(format!("{}/oai2", server.url()));
    let query = QueryParameters::new(&config, None).unwrap();
    let body = HarvestClient::new().fetch(&config, &query).await.unwrap();

    assert_eq!(body, "<OAI-PMH></OAI-PMH>");
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_non_success_status_carries_body() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("GET", "/oai2")
      .match_query(Matcher::Any)
      .with_status(503)
      .with_body("Retry after 30 seconds")
      .create_async()
      .await;

    let config = config_for(format!("{}/oai2", server.url()));
    let query = QueryParameters::new(&config, None).unwrap();
    let result = HarvestClient::new().fetch(&config, &query).await;

    match result {
      Err(HarvestError::HttpStatus { status, body }) => {
        assert_eq!(status, 503);
        assert_eq!(body, "Retry after 30 seconds");
      },
      other => panic!("expected HttpStatus, got {other:?}"),
    }
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_connection_refused_is_transport_error() {
    let config = config_for("http://127.0.0.1:1/oai2".to_string());
    let query = QueryParameters::new(&config, None).unwrap();
    let result = HarvestClient::new().fetch(&config, &query).await;

    assert!(matches!(result, Err(HarvestError::Transport(_))), "{result:?}");
  }

  #[tokio::test]
  async fn test_unparsable_host() {
    let config = config_for("export.arxiv.org/oai2".to_string());
    let query = QueryParameters::new(&config, None).unwrap();
    let result = HarvestClient::new().fetch(&config, &query).await;

    assert!(matches!(result, Err(HarvestError::InvalidUrl(_))), "{result:?}");
  }
}
