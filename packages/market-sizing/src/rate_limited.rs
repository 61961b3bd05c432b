//! Rate-limited adapter wrapper.
//!
//! Wraps a language model or web searcher with request pacing using the
//! governor crate. Pacing is shared by every clone of the limiter, so one
//! wrapper bounds the request rate across all concurrent component tasks.

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use serde_json::Value;

use crate::error::{LmError, SearchError};
use crate::traits::llm::{CompletionRequest, LanguageModel};
use crate::traits::searcher::{SearchDocument, WebSearcher};

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// An adapter wrapper that enforces a request rate.
pub struct RateLimited<T> {
    inner: T,
    limiter: Arc<DefaultRateLimiter>,
}

impl<T> RateLimited<T> {
    /// Wrap `inner`, allowing `requests_per_second` calls per second.
    ///
    /// A rate of zero is treated as one request per second.
    pub fn new(inner: T, requests_per_second: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(nonzero!(1u32));
        Self::with_quota(inner, Quota::per_second(rate))
    }

    /// Wrap with burst support.
    pub fn with_burst(inner: T, requests_per_second: u32, burst: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(nonzero!(1u32));
        let burst = NonZeroU32::new(burst).unwrap_or(nonzero!(1u32));
        Self::with_quota(inner, Quota::per_second(rate).allow_burst(burst))
    }

    /// Wrap with a custom quota.
    pub fn with_quota(inner: T, quota: Quota) -> Self {
        Self {
            inner,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    async fn wait_for_permit(&self) {
        self.limiter.until_ready().await;
    }
}

#[async_trait]
impl<T: LanguageModel> LanguageModel for RateLimited<T> {
    async fn complete(&self, request: &CompletionRequest) -> Result<Value, LmError> {
        self.wait_for_permit().await;
        self.inner.complete(request).await
    }
}

#[async_trait]
impl<T: WebSearcher> WebSearcher for RateLimited<T> {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchDocument>, SearchError> {
        self.wait_for_permit().await;
        self.inner.search(query, max_results).await
    }
}
