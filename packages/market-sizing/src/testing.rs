//! Mock adapters for testing.
//!
//! Both mocks record their calls and track how many calls were in flight at
//! once, so tests can check concurrency bounds with paused tokio time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use url::Url;

use crate::error::{LmError, SearchError};
use crate::prompts::PromptTemplate;
use crate::traits::llm::{parse_json_payload, CompletionRequest, LanguageModel};
use crate::traits::searcher::{SearchDocument, WebSearcher};

/// Counts concurrent calls; decrements on drop so cancelled calls are counted
/// out too.
#[derive(Default)]
struct InFlight {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl InFlight {
    fn enter(&self) -> InFlightGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(self)
    }

    fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

struct InFlightGuard<'a>(&'a InFlight);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
enum Reply {
    Json(Value),
    Raw(String),
    Fail(LmError),
}

struct Rule {
    template: PromptTemplate,
    needle: String,
    reply: Reply,
}

/// Mock language model with canned replies per template.
///
/// Rules (template + substring of the prompt) are checked in insertion
/// order before the per-template default.
#[derive(Default)]
pub struct MockLanguageModel {
    defaults: RwLock<HashMap<PromptTemplate, Reply>>,
    rules: RwLock<Vec<Rule>>,
    latency: Option<Duration>,
    calls: RwLock<Vec<CompletionRequest>>,
    in_flight: InFlight,
}

impl MockLanguageModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to every `template` call with `value`.
    pub fn with_response(self, template: PromptTemplate, value: Value) -> Self {
        self.defaults.write().unwrap().insert(template, Reply::Json(value));
        self
    }

    /// Reply with raw model text, decoded the way a real adapter decodes it.
    pub fn with_raw_response(self, template: PromptTemplate, text: &str) -> Self {
        self.defaults
            .write()
            .unwrap()
            .insert(template, Reply::Raw(text.to_string()));
        self
    }

    /// Fail every `template` call with `error`.
    pub fn with_failure(self, template: PromptTemplate, error: LmError) -> Self {
        self.defaults.write().unwrap().insert(template, Reply::Fail(error));
        self
    }

    /// Reply with `value` when the prompt contains `needle`.
    pub fn with_rule(self, template: PromptTemplate, needle: &str, value: Value) -> Self {
        self.rules.write().unwrap().push(Rule {
            template,
            needle: needle.to_string(),
            reply: Reply::Json(value),
        });
        self
    }

    /// Fail when the prompt contains `needle`.
    pub fn with_rule_failure(self, template: PromptTemplate, needle: &str, error: LmError) -> Self {
        self.rules.write().unwrap().push(Rule {
            template,
            needle: needle.to_string(),
            reply: Reply::Fail(error),
        });
        self
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    /// Calls made with `template`.
    pub fn calls_for(&self, template: PromptTemplate) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.template == template)
            .count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.in_flight.max()
    }

    fn reply_for(&self, request: &CompletionRequest) -> Option<Reply> {
        let rules = self.rules.read().unwrap();
        let matched = rules
            .iter()
            .find(|r| r.template == request.template && request.prompt.contains(&r.needle))
            .map(|r| r.reply.clone());
        matched.or_else(|| self.defaults.read().unwrap().get(&request.template).cloned())
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<Value, LmError> {
        self.calls.write().unwrap().push(request.clone());
        let _guard = self.in_flight.enter();

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match self.reply_for(request) {
            Some(Reply::Json(value)) => Ok(value),
            Some(Reply::Raw(text)) => parse_json_payload(&text),
            Some(Reply::Fail(error)) => Err(error),
            None => Err(LmError::Config(format!(
                "no mock response for template {}",
                request.template
            ))),
        }
    }
}

/// Mock web searcher with canned documents per query.
///
/// Queries with no configured documents return the default list (empty
/// unless set).
#[derive(Default)]
pub struct MockWebSearcher {
    documents: RwLock<HashMap<String, Vec<SearchDocument>>>,
    errors: RwLock<HashMap<String, SearchError>>,
    default_documents: Vec<SearchDocument>,
    latency: Option<Duration>,
    calls: RwLock<Vec<String>>,
    in_flight: InFlight,
}

impl MockWebSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(self, query: &str, documents: Vec<SearchDocument>) -> Self {
        self.documents
            .write()
            .unwrap()
            .insert(query.to_string(), documents);
        self
    }

    pub fn with_default_documents(mut self, documents: Vec<SearchDocument>) -> Self {
        self.default_documents = documents;
        self
    }

    pub fn with_error(self, query: &str, error: SearchError) -> Self {
        self.errors.write().unwrap().insert(query.to_string(), error);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.in_flight.max()
    }
}

#[async_trait]
impl WebSearcher for MockWebSearcher {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchDocument>, SearchError> {
        self.calls.write().unwrap().push(query.to_string());
        let _guard = self.in_flight.enter();

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(error) = self.errors.read().unwrap().get(query) {
            return Err(error.clone());
        }

        let documents = self
            .documents
            .read()
            .unwrap()
            .get(query)
            .cloned()
            .unwrap_or_else(|| self.default_documents.clone());

        Ok(documents.into_iter().take(max_results).collect())
    }
}

/// A search document for tests.
pub fn document(url: &str, title: &str, snippet: &str) -> SearchDocument {
    let url = Url::parse(url).expect("test document URL must be valid");
    SearchDocument::new(url).with_title(title).with_snippet(snippet)
}

/// An extraction reply as the model would send it.
pub fn extraction_json(value: &str, unit: &str, confidence: &str) -> Value {
    json!({
        "found": true,
        "value": value,
        "unit": unit,
        "snippet": format!("The figure is {} {}.", value, unit),
        "confidence": confidence,
    })
}
