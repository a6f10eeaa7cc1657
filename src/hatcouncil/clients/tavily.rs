//! [`SearchService`] backed by the Tavily search API.

use crate::clients::http_pool::get_http_client;
use crate::config::{ProviderConfig, TAVILY_BASE_URL};
use crate::search::{SearchError, SearchHit, SearchResponse, SearchService};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

const MAX_RESULTS: usize = 5;
const SEARCH_DEPTH: &str = "basic";

pub struct TavilyClient {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct TavilyResponse {
    answer: Option<String>,
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

impl TavilyClient {
    pub fn new(api_key: &str) -> Self {
        Self::new_with_base_url(Some(api_key.to_string()), TAVILY_BASE_URL)
    }

    pub fn new_with_base_url(api_key: Option<String>, base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            api_key: api_key.filter(|k| !k.is_empty()),
            client: get_http_client(&base_url),
            base_url,
        }
    }

    /// A client without a key is valid; every query then fails with a [`SearchError`].
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new_with_base_url(config.tavily_api_key.clone(), &config.tavily_base_url)
    }

    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

pub fn parse_search_response(body: &str) -> Result<SearchResponse, SearchError> {
    let response: TavilyResponse = serde_json::from_str(body)
        .map_err(|e| SearchError(format!("malformed search response: {}", e)))?;
    Ok(SearchResponse {
        answer: response.answer.filter(|a| !a.is_empty()),
        results: response
            .results
            .into_iter()
            .map(|r| SearchHit {
                title: r.title,
                url: r.url,
                content: r.content,
            })
            .collect(),
    })
}

#[async_trait]
impl SearchService for TavilyClient {
    async fn query(&self, text: &str) -> Result<SearchResponse, SearchError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SearchError("TAVILY_API_KEY is not set".into()))?;

        let payload = json!({
            "api_key": api_key,
            "query": text,
            "max_results": MAX_RESULTS,
            "search_depth": SEARCH_DEPTH,
            "include_answer": true,
        });
        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SearchError(format!("request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SearchError(format!("reading response failed: {}", e)))?;
        if !status.is_success() {
            log::error!("TavilyClient::query: HTTP {}", status.as_u16());
            return Err(SearchError(format!("HTTP {}: {}", status.as_u16(), body.trim())));
        }
        parse_search_response(&body)
    }
}
