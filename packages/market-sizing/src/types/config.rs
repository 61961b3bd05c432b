//! Configuration types for the pipeline.

use serde::{Deserialize, Serialize};

/// Configuration for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum documents requested from the search adapter per component.
    ///
    /// Default: 5.
    pub max_results: usize,

    /// Components resolved concurrently.
    ///
    /// Keeps the number of in-flight search/extraction chains under the
    /// providers' rate limits. Default: 4.
    pub max_concurrent_components: usize,

    /// Extraction calls in flight per component. Default: 3.
    pub max_concurrent_extractions: usize,

    /// Data points below which a component is reported as low-yield.
    ///
    /// A low-yield component still resolves; this only drives logging.
    /// Default: 1.
    pub min_yield: usize,

    /// Formulas carried through a full run. Default: 3.
    pub max_formulas: usize,

    /// Characters of document text sent to the extraction prompt.
    ///
    /// Default: 4000.
    pub snippet_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_results: 5,
            max_concurrent_components: 4,
            max_concurrent_extractions: 3,
            min_yield: 1,
            max_formulas: 3,
            snippet_chars: 4000,
        }
    }
}

impl PipelineConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-component search result limit.
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    /// Set the component concurrency limit (at least 1).
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrent_components = limit.max(1);
        self
    }

    /// Set the per-component extraction concurrency (at least 1).
    pub fn with_extraction_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrent_extractions = limit.max(1);
        self
    }

    /// Set the minimum-yield threshold.
    pub fn with_min_yield(mut self, min_yield: usize) -> Self {
        self.min_yield = min_yield;
        self
    }

    /// Set how many formulas a full run carries through.
    pub fn with_max_formulas(mut self, max: usize) -> Self {
        self.max_formulas = max;
        self
    }

    /// Set the document text budget for extraction prompts.
    pub fn with_snippet_chars(mut self, chars: usize) -> Self {
        self.snippet_chars = chars;
        self
    }
}
