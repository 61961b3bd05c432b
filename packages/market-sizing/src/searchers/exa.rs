//! Exa-backed web searcher.
//!
//! Uses Exa's `/search` endpoint with text contents, so each result carries
//! the page text the resolver extracts numbers from.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::SearchError;
use crate::retry::{with_retry, RetryPolicy};
use crate::security::SecretString;
use crate::traits::searcher::{SearchDocument, WebSearcher};

const DEFAULT_BASE_URL: &str = "https://api.exa.ai";
const DEFAULT_MAX_CHARACTERS: usize = 4000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Exa search client.
#[derive(Clone)]
pub struct ExaSearcher {
    client: Client,
    api_key: SecretString,
    base_url: String,
    max_characters: usize,
    retry: RetryPolicy,
}

impl ExaSearcher {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key: SecretString::new(api_key),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_characters: DEFAULT_MAX_CHARACTERS,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set how much page text Exa returns per result (default: 4000).
    pub fn with_max_characters(mut self, max: usize) -> Self {
        self.max_characters = max;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    async fn send(&self, request: &ExaRequest<'_>) -> Result<ExaResponse, SearchError> {
        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("x-api-key", self.api_key.expose())
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SearchError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SearchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl WebSearcher for ExaSearcher {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchDocument>, SearchError> {
        if self.api_key.is_empty() {
            return Err(SearchError::Config("Exa API key is empty".into()));
        }

        let request = ExaRequest {
            query,
            num_results: max_results,
            search_type: "auto",
            contents: Contents {
                text: TextOptions {
                    max_characters: self.max_characters,
                },
            },
        };

        let response = with_retry(&self.retry, "exa_search", || self.send(&request)).await?;
        let documents = into_documents(response, max_results);

        debug!(query, results = documents.len(), "Exa search finished");
        Ok(documents)
    }
}

fn into_documents(response: ExaResponse, max_results: usize) -> Vec<SearchDocument> {
    response
        .results
        .into_iter()
        .filter_map(|r| {
            let url = Url::parse(&r.url).ok()?;
            let mut doc = SearchDocument::new(url).with_snippet(r.text.unwrap_or_default());
            if let Some(title) = r.title.filter(|t| !t.trim().is_empty()) {
                doc = doc.with_title(title);
            }
            if let Some(score) = r.score {
                doc = doc.with_score(score);
            }
            Some(doc)
        })
        .take(max_results)
        .collect()
}

fn transport_error(e: reqwest::Error) -> SearchError {
    if e.is_timeout() {
        SearchError::Timeout
    } else {
        SearchError::Transport(e.to_string())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExaRequest<'a> {
    query: &'a str,
    num_results: usize,
    #[serde(rename = "type")]
    search_type: &'static str,
    contents: Contents,
}

#[derive(Serialize)]
struct Contents {
    text: TextOptions,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TextOptions {
    max_characters: usize,
}

#[derive(Deserialize)]
struct ExaResponse {
    #[serde(default)]
    results: Vec<ExaResult>,
}

#[derive(Deserialize)]
struct ExaResult {
    url: String,
    title: Option<String>,
    text: Option<String>,
    score: Option<f32>,
}
