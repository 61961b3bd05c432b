//! Tavily-backed web searcher.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::SearchError;
use crate::retry::{with_retry, RetryPolicy};
use crate::security::SecretString;
use crate::traits::searcher::{SearchDocument, WebSearcher};

/// Tavily search client.
#[derive(Clone)]
pub struct TavilySearcher {
    api_key: SecretString,
    client: Client,
    /// "basic" or "advanced" (default: advanced, which returns fuller content).
    pub search_depth: String,
    retry: RetryPolicy,
}

impl TavilySearcher {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key),
            client: Client::new(),
            search_depth: "advanced".to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_search_depth(mut self, depth: impl Into<String>) -> Self {
        self.search_depth = depth.into();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    async fn send(&self, request: &Request<'_>) -> Result<Response, SearchError> {
        let response = self
            .client
            .post("https://api.tavily.com/search")
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key.expose()))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Timeout
                } else {
                    SearchError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SearchError::RateLimited);
        }
        if !status.is_success() {
            return Err(SearchError::Api {
                status: status.as_u16(),
                message: format!("Tavily API error: {}", response.text().await.unwrap_or_default()),
            });
        }

        response
            .json()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl WebSearcher for TavilySearcher {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchDocument>, SearchError> {
        if self.api_key.is_empty() {
            return Err(SearchError::Config("Tavily API key is empty".into()));
        }

        let request = Request {
            query,
            search_depth: &self.search_depth,
            max_results,
        };

        let response = with_retry(&self.retry, "tavily_search", || self.send(&request)).await?;

        let results: Vec<SearchDocument> = response
            .results
            .into_iter()
            .filter_map(|r| {
                let url = Url::parse(&r.url).ok()?;
                let mut result = SearchDocument::new(url).with_snippet(r.content.unwrap_or_default());
                if let Some(title) = r.title {
                    result = result.with_title(title);
                }
                if let Some(score) = r.score {
                    result = result.with_score(score);
                }
                Some(result)
            })
            .take(max_results)
            .collect();

        debug!(query, results = results.len(), "Tavily search finished");
        Ok(results)
    }
}

#[derive(Serialize)]
struct Request<'a> {
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    url: String,
    title: Option<String>,
    content: Option<String>,
    score: Option<f32>,
}
