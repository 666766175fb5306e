//! Web search capability backed by the Firecrawl search API.

use crate::error::{AppError, Result};
use crate::models::SearchResult;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SERVICE: &str = "search";

/// Per-query options sent with every search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SearchOptions {
    pub limit: u32,
    pub lang: String,
    pub country: String,
    pub formats: Vec<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 15,
            lang: "ms".to_string(),
            country: "MY".to_string(),
            formats: vec!["markdown".to_string()],
        }
    }
}

/// Anything that can turn a query string into raw search hits.
#[async_trait]
pub(crate) trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    query: &'a str,
    limit: u32,
    lang: &'a str,
    country: &'a str,
    scrape_options: ScrapeOptions<'a>,
}

#[derive(Serialize)]
struct ScrapeOptions<'a> {
    formats: &'a [String],
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<SearchData>,
    #[serde(default)]
    error: Option<String>,
}

/// The API has returned hits both directly and wrapped in another `data`.
#[derive(Deserialize)]
#[serde(untagged)]
enum SearchData {
    Flat(Vec<SearchResult>),
    Nested { data: Vec<SearchResult> },
}

impl SearchData {
    fn into_results(self) -> Vec<SearchResult> {
        match self {
            SearchData::Flat(results) => results,
            SearchData::Nested { data } => data,
        }
    }
}

pub(crate) struct FirecrawlClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl FirecrawlClient {
    pub(crate) fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl WebSearch for FirecrawlClient {
    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        tracing::debug!(target: "search_task", "Searching: {}", query);
        let body = SearchRequest {
            query,
            limit: options.limit,
            lang: &options.lang,
            country: &options.country,
            scrape_options: ScrapeOptions {
                formats: &options.formats,
            },
        };

        let response = self
            .http
            .post(format!("{}/v1/search", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(SERVICE)
                } else {
                    AppError::Request(e)
                }
            })?;

        let status = response.status();
        match status {
            StatusCode::TOO_MANY_REQUESTS => return Err(AppError::RateLimited(SERVICE)),
            StatusCode::PAYMENT_REQUIRED => return Err(AppError::PaymentRequired(SERVICE)),
            s if !s.is_success() => {
                let message = response.text().await.unwrap_or_default();
                return Err(AppError::Upstream {
                    service: SERVICE,
                    status: s.as_u16(),
                    message,
                });
            }
            _ => {}
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| AppError::MalformedResponse(SERVICE, e.to_string()))?;

        if !parsed.success {
            return Err(AppError::Upstream {
                service: SERVICE,
                status: status.as_u16(),
                message: parsed
                    .error
                    .unwrap_or_else(|| "search reported failure".to_string()),
            });
        }

        let results = parsed.data.map(SearchData::into_results).unwrap_or_default();
        tracing::debug!(target: "search_task", "{} results for '{}'", results.len(), query);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> FirecrawlClient {
        FirecrawlClient::new(&server.uri(), "fc-test", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_search_sends_options_and_parses_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/search"))
            .and(header("authorization", "Bearer fc-test"))
            .and(body_partial_json(json!({
                "query": "kilang sawit Kemaman",
                "limit": 15,
                "lang": "ms",
                "country": "MY",
                "scrapeOptions": {"formats": ["markdown"]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": [
                    {"title": "ABC Sdn Bhd", "url": "https://abc.my", "markdown": "# ABC"},
                    {"description": "no title here"}
                ]
            })))
            .mount(&server)
            .await;

        let results = client(&server)
            .search("kilang sawit Kemaman", &SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title(), "ABC Sdn Bhd");
        assert_eq!(results[0].markdown(), "# ABC");
        assert_eq!(results[1].title(), "");
    }

    #[tokio::test]
    async fn test_nested_data_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {"data": [{"title": "XYZ Berhad"}]}
            })))
            .mount(&server)
            .await;

        let results = client(&server)
            .search("q", &SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title(), "XYZ Berhad");
    }

    #[tokio::test]
    async fn test_status_codes_map_to_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        let err = client(&server)
            .search("q", &SearchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RateLimited("search")));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_reported_failure_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "error": "quota exhausted"
            })))
            .mount(&server)
            .await;
        let err = client(&server)
            .search("q", &SearchOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("quota exhausted"));
    }
}
