//! Web searcher trait.
//!
//! The resolver asks a searcher for documents about one component and reads
//! numbers out of the returned text, so implementations should return page
//! text (or a generous excerpt) in `snippet`, not just a link.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::SearchError;

/// A ranked search result with extracted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub url: Url,

    /// Title of the page, if the provider returned one.
    pub title: Option<String>,

    /// Extracted page text.
    pub snippet: String,

    /// Relevance score, if provided by the search API.
    pub score: Option<f32>,
}

impl SearchDocument {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            title: None,
            snippet: String::new(),
            score: None,
        }
    }

    /// Create from a URL string.
    pub fn from_url(url: &str) -> Option<Self> {
        Url::parse(url).ok().map(Self::new)
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }
}

/// Web search adapter.
///
/// # Implementations
///
/// - `ExaSearcher` - Exa neural search with page text
/// - `TavilySearcher` - Tavily API
/// - `MockWebSearcher` - For testing
#[async_trait]
pub trait WebSearcher: Send + Sync {
    /// Search for documents relevant to `query`, best first.
    ///
    /// Returns at most `max_results` documents. An empty list is a valid
    /// answer, not an error.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchDocument>, SearchError>;
}

#[async_trait]
impl<T: WebSearcher + ?Sized> WebSearcher for Arc<T> {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchDocument>, SearchError> {
        (**self).search(query, max_results).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_builders() {
        let doc = SearchDocument::from_url("https://nces.ed.gov/fastfacts")
            .unwrap()
            .with_title("Fast Facts")
            .with_snippet("There are about 130,000 schools.")
            .with_score(0.9);

        assert_eq!(doc.url.host_str(), Some("nces.ed.gov"));
        assert_eq!(doc.title.as_deref(), Some("Fast Facts"));
        assert_eq!(doc.score, Some(0.9));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        assert!(SearchDocument::from_url("not a url").is_none());
    }
}
