//! Data source resolution.
//!
//! For each component: one search, then one extraction call per retrieved
//! document. Components resolve concurrently up to
//! `max_concurrent_components`; a failing component yields an empty
//! resolution and never affects the others.

use std::collections::{HashMap, HashSet};

use futures::stream::{self, StreamExt};
use schemars::JsonSchema;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{call_structured, CallError};
use crate::error::ExtractionParseError;
use crate::prompts::{format_extract_data_point_prompt, PromptTemplate};
use crate::traits::llm::LanguageModel;
use crate::traits::searcher::{SearchDocument, WebSearcher};
use crate::types::{
    component::Component,
    config::PipelineConfig,
    data_point::{normalize_reading, parse_quantity, Confidence, DataPoint, Quantity},
    resolution::{ComponentResolution, ResolutionSet},
};

/// Characters of document text kept as the fallback source snippet.
const FALLBACK_SNIPPET_CHARS: usize = 300;

#[derive(Debug, Deserialize, JsonSchema)]
struct ExtractionResponse {
    #[serde(default)]
    found: Option<bool>,
    #[serde(default)]
    value: Option<RawValue>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    confidence: Option<String>,
}

/// Models report numbers both as JSON numbers and as text.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(untagged)]
enum RawValue {
    Number(f64),
    Text(String),
}

/// Resolve every component, keyed by name in input order.
///
/// Duplicate names are resolved once. When `cancel` fires, in-flight work is
/// dropped; completed resolutions are kept and the rest are listed in
/// [`ResolutionSet::cancelled`].
pub async fn resolve_components<L, S>(
    lm: &L,
    searcher: &S,
    components: &[Component],
    config: &PipelineConfig,
    cancel: &CancellationToken,
) -> ResolutionSet
where
    L: LanguageModel + ?Sized,
    S: WebSearcher + ?Sized,
{
    let mut seen = HashSet::new();
    let unique: Vec<&Component> = components
        .iter()
        .filter(|c| seen.insert(c.name.as_str()))
        .collect();

    info!(
        components = unique.len(),
        limit = config.max_concurrent_components,
        "Resolving components"
    );

    let mut pending = stream::iter(
        unique
            .iter()
            .copied()
            .map(|component| resolve_component(lm, searcher, component, config)),
    )
    .buffer_unordered(config.max_concurrent_components.max(1));

    let mut finished: HashMap<String, ComponentResolution> = HashMap::new();
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(
                    completed = finished.len(),
                    remaining = unique.len() - finished.len(),
                    "Resolution cancelled"
                );
                break;
            }
            next = pending.next() => match next {
                Some(resolution) => {
                    finished.insert(resolution.component.name.clone(), resolution);
                }
                None => break,
            },
        }
    }
    drop(pending);

    let mut set = ResolutionSet::new();
    for component in unique {
        match finished.remove(&component.name) {
            Some(resolution) => set.insert(resolution),
            None => set.mark_cancelled(component.name.clone()),
        }
    }
    set
}

async fn resolve_component<L, S>(
    lm: &L,
    searcher: &S,
    component: &Component,
    config: &PipelineConfig,
) -> ComponentResolution
where
    L: LanguageModel + ?Sized,
    S: WebSearcher + ?Sized,
{
    let query = component.search_query();
    let documents = match searcher.search(&query, config.max_results).await {
        Ok(documents) => documents,
        Err(e) => {
            warn!(component = %component.name, query = %query, error = %e, "Search failed");
            return ComponentResolution::search_failed(component.clone(), e.to_string());
        }
    };

    if documents.is_empty() {
        warn!(component = %component.name, query = %query, "Search returned no documents");
        return ComponentResolution::empty(component.clone());
    }

    let retrieved = documents.len();
    let outcomes: Vec<Result<DataPoint, ExtractionParseError>> = stream::iter(
        documents
            .iter()
            .enumerate()
            .map(|(rank, document)| extract_data_point(lm, component, document, rank, config)),
    )
    .buffered(config.max_concurrent_extractions.max(1))
    .collect()
    .await;

    let mut data_points = Vec::with_capacity(retrieved);
    let mut discarded = 0;
    for (document, outcome) in documents.iter().zip(outcomes) {
        match outcome {
            Ok(point) => data_points.push(point),
            Err(e) => {
                discarded += 1;
                debug!(
                    component = %component.name,
                    url = %document.url,
                    error = %e,
                    "Discarded document"
                );
            }
        }
    }

    if data_points.len() < config.min_yield {
        warn!(
            component = %component.name,
            data_points = data_points.len(),
            retrieved,
            min_yield = config.min_yield,
            "Low yield for component"
        );
    } else {
        debug!(
            component = %component.name,
            data_points = data_points.len(),
            retrieved,
            "Resolved component"
        );
    }

    ComponentResolution::new(component.clone(), data_points).with_document_counts(retrieved, discarded)
}

async fn extract_data_point<L: LanguageModel + ?Sized>(
    lm: &L,
    component: &Component,
    document: &SearchDocument,
    rank: usize,
    config: &PipelineConfig,
) -> Result<DataPoint, ExtractionParseError> {
    let prompt = format_extract_data_point_prompt(
        &component.search_query(),
        component.unit.as_deref(),
        document.title.as_deref().unwrap_or("(untitled)"),
        document.url.as_str(),
        truncate_chars(&document.snippet, config.snippet_chars),
    )?;

    let response: ExtractionResponse =
        call_structured(lm, PromptTemplate::ExtractDataPoint, prompt)
            .await
            .map_err(|e| match e {
                CallError::Model(e) => ExtractionParseError::Model(e),
                CallError::Shape(message) => ExtractionParseError::Malformed(message),
            })?;

    if response.found == Some(false) {
        return Err(ExtractionParseError::NotFound);
    }

    let quantity = match response.value {
        None => return Err(ExtractionParseError::NotFound),
        Some(RawValue::Number(value)) if value.is_finite() => Quantity::plain(value),
        Some(RawValue::Number(value)) => {
            return Err(ExtractionParseError::NonNumeric(value.to_string()))
        }
        Some(RawValue::Text(text)) => {
            parse_quantity(&text).ok_or(ExtractionParseError::NonNumeric(text))?
        }
    };

    let unit_text = response.unit.unwrap_or_default();
    let (value, unit) = normalize_reading(quantity, &unit_text)
        .ok_or(ExtractionParseError::UnrecognizedUnit(unit_text))?;

    let snippet = response
        .snippet
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| truncate_chars(&document.snippet, FALLBACK_SNIPPET_CHARS).to_string());

    let mut point = DataPoint::new(value, unit, document.url.as_str())
        .with_rank(rank)
        .with_snippet(snippet)
        .with_confidence(Confidence::parse_lenient(
            response.confidence.as_deref().unwrap_or_default(),
        ));
    if let Some(title) = &document.title {
        point = point.with_title(title.clone());
    }

    Ok(point)
}

/// Cut `text` to at most `max` characters on a char boundary.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LmError, SearchError};
    use crate::testing::{document, extraction_json, MockLanguageModel, MockWebSearcher};
    use serde_json::json;

    fn schools() -> Component {
        Component::new("schools", "number of K-12 schools in the US").with_unit("schools")
    }

    #[tokio::test]
    async fn test_resolves_and_orders_data_points() {
        let searcher = MockWebSearcher::new().with_documents(
            "number of K-12 schools in the US",
            vec![
                document("https://a.example/1", "A", "about 98,000 public schools"),
                document("https://b.example/2", "B", "roughly 130,000 schools"),
                document("https://c.example/3", "C", "nothing useful"),
            ],
        );
        let lm = MockLanguageModel::new()
            .with_rule(
                PromptTemplate::ExtractDataPoint,
                "https://a.example/1",
                extraction_json("98,000", "schools", "medium"),
            )
            .with_rule(
                PromptTemplate::ExtractDataPoint,
                "https://b.example/2",
                extraction_json("130,000", "schools", "high"),
            )
            .with_response(PromptTemplate::ExtractDataPoint, json!({"found": false}));

        let set = resolve_components(
            &lm,
            &searcher,
            &[schools()],
            &PipelineConfig::default(),
            &CancellationToken::new(),
        )
        .await;

        let resolution = set.get("schools").unwrap();
        assert_eq!(resolution.documents_retrieved, 3);
        assert_eq!(resolution.documents_discarded, 1);
        let values: Vec<f64> = resolution.data_points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![130_000.0, 98_000.0]);
        assert_eq!(resolution.data_points[0].rank, 1);
        assert_eq!(resolution.data_points[0].source_title.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_numeric_normalization() {
        let searcher = MockWebSearcher::new().with_default_documents(vec![document(
            "https://a.example",
            "A",
            "spend",
        )]);
        let lm = MockLanguageModel::new().with_response(
            PromptTemplate::ExtractDataPoint,
            json!({"found": true, "value": 1.2, "unit": "billion USD", "snippet": "", "confidence": "high"}),
        );

        let set = resolve_components(
            &lm,
            &searcher,
            &[Component::from_variable("total_spend")],
            &PipelineConfig::default(),
            &CancellationToken::new(),
        )
        .await;

        let point = set.get("total_spend").unwrap().best().unwrap().clone();
        assert_eq!(point.value, 1.2e9);
        assert_eq!(point.unit, "USD");
        assert_eq!(point.source_snippet, "spend");
    }

    #[tokio::test]
    async fn test_scale_word_in_value_and_unit_applies_once() {
        let searcher = MockWebSearcher::new().with_default_documents(vec![document(
            "https://a.example",
            "A",
            "a $1.2 billion market",
        )]);
        let lm = MockLanguageModel::new().with_response(
            PromptTemplate::ExtractDataPoint,
            json!({"found": true, "value": "1.2 billion", "unit": "billion USD", "snippet": "", "confidence": "high"}),
        );

        let set = resolve_components(
            &lm,
            &searcher,
            &[Component::from_variable("total_spend")],
            &PipelineConfig::default(),
            &CancellationToken::new(),
        )
        .await;

        let point = set.get("total_spend").unwrap().best().unwrap().clone();
        assert_eq!(point.value, 1.2e9);
        assert_eq!(point.unit, "USD");
    }

    #[tokio::test]
    async fn test_year_in_value_text_is_skipped() {
        let searcher = MockWebSearcher::new().with_default_documents(vec![document(
            "https://a.example",
            "A",
            "FY2023 revenue",
        )]);
        let lm = MockLanguageModel::new().with_response(
            PromptTemplate::ExtractDataPoint,
            extraction_json("FY2023: $1.2 billion", "USD", "high"),
        );

        let set = resolve_components(
            &lm,
            &searcher,
            &[Component::from_variable("revenue")],
            &PipelineConfig::default(),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(set.get("revenue").unwrap().best().unwrap().value, 1.2e9);
    }

    #[tokio::test]
    async fn test_unusable_extractions_are_discarded() {
        let searcher = MockWebSearcher::new().with_default_documents(vec![
            document("https://a.example", "A", "one"),
            document("https://b.example", "B", "two"),
            document("https://c.example", "C", "three"),
        ]);
        let lm = MockLanguageModel::new()
            .with_rule(
                PromptTemplate::ExtractDataPoint,
                "https://a.example",
                extraction_json("a lot", "schools", "high"),
            )
            .with_rule(
                PromptTemplate::ExtractDataPoint,
                "https://b.example",
                extraction_json("500", "unknown", "high"),
            )
            .with_failure(PromptTemplate::ExtractDataPoint, LmError::Timeout);

        let set = resolve_components(
            &lm,
            &searcher,
            &[schools()],
            &PipelineConfig::default(),
            &CancellationToken::new(),
        )
        .await;

        let resolution = set.get("schools").unwrap();
        assert!(resolution.is_empty());
        assert_eq!(resolution.documents_discarded, 3);
    }

    #[tokio::test]
    async fn test_search_failure_is_isolated() {
        let searcher = MockWebSearcher::new()
            .with_error("number of K-12 schools in the US", SearchError::Timeout)
            .with_default_documents(vec![document("https://a.example", "A", "500 dollars")]);
        let lm = MockLanguageModel::new().with_response(
            PromptTemplate::ExtractDataPoint,
            extraction_json("500", "USD", "high"),
        );

        let set = resolve_components(
            &lm,
            &searcher,
            &[schools(), Component::from_variable("spend_per_school")],
            &PipelineConfig::default(),
            &CancellationToken::new(),
        )
        .await;

        let failed = set.get("schools").unwrap();
        assert!(failed.is_empty());
        assert!(failed.search_error.is_some());
        assert_eq!(set.get("spend_per_school").unwrap().data_points.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_components_resolve_once() {
        let searcher = MockWebSearcher::new();
        let lm = MockLanguageModel::new();

        let set = resolve_components(
            &lm,
            &searcher,
            &[schools(), schools()],
            &PipelineConfig::default(),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(set.len(), 1);
        assert_eq!(searcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_token_resolves_nothing() {
        let searcher = MockWebSearcher::new();
        let lm = MockLanguageModel::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let set = resolve_components(
            &lm,
            &searcher,
            &[schools()],
            &PipelineConfig::default(),
            &cancel,
        )
        .await;

        assert!(set.is_empty());
        assert_eq!(set.cancelled(), ["schools"]);
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
