//! Market Sizing Research Pipeline
//!
//! Turns a short market description into quantitative market-size estimates
//! backed by sourced data points.
//!
//! # Phases
//!
//! 1. **Formula generation** - a language model proposes sizing formulas
//!    (`number_of_schools * annual_spend_per_school`)
//! 2. **Decomposition** - each formula variable becomes a described component
//! 3. **Resolution** - each component is searched for on the web and numeric
//!    data points are extracted from the results, concurrently per component
//! 4. **Synthesis** - the formula is evaluated with the best data points,
//!    plus a min/max sensitivity sweep over every observed value
//!
//! # Usage
//!
//! ```rust,ignore
//! use market_sizing::ai::OpenAiModel;
//! use market_sizing::searchers::ExaSearcher;
//! use market_sizing::{MarketDescription, Pipeline};
//! use tokio_util::sync::CancellationToken;
//!
//! let pipeline = Pipeline::new(OpenAiModel::new(openai_key), ExaSearcher::new(exa_key));
//! let description = MarketDescription::new("classroom software for US K-12 schools")?;
//!
//! let report = pipeline.run(&description, &[], &CancellationToken::new()).await?;
//! for estimate in report.complete_estimates() {
//!     println!("{} = {}", estimate.formula, estimate.point_value);
//! }
//! ```
//!
//! # Modules
//!
//! - [`pipeline`] - The four phases and the [`Pipeline`] facade
//! - [`traits`] - Adapter abstractions (LanguageModel, WebSearcher)
//! - [`types`] - Formulas, components, data points, estimates
//! - [`expression`] - Formula expression parser and evaluator
//! - [`prompts`] - Prompt template registry
//! - [`ai`] / [`searchers`] - Provider adapters
//! - [`testing`] - Mock adapters for testing

pub mod ai;
pub mod error;
pub mod expression;
pub mod pipeline;
pub mod prompts;
pub mod rate_limited;
pub mod retry;
pub mod schema;
pub mod searchers;
pub mod security;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{
    DecompositionError, EvaluationError, ExtractionParseError, GenerationError, LmError,
    PipelineError, PromptError, SearchError, SynthesisError,
};
pub use expression::Expression;
pub use pipeline::{Brainstorm, FormulaReport, Pipeline, RunReport, SuggestedSource};
pub use prompts::PromptTemplate;
pub use rate_limited::RateLimited;
pub use retry::RetryPolicy;
pub use security::SecretString;
pub use traits::{
    llm::{CompletionRequest, LanguageModel},
    searcher::{SearchDocument, WebSearcher},
};
pub use types::{
    component::Component,
    config::PipelineConfig,
    data_point::{Confidence, DataPoint},
    estimate::{Estimate, EstimateFlag, EstimateOutcome, PartialEstimate, ValueRange},
    formula::{ClarificationAnswer, Formula, MarketDescription},
    resolution::{ComponentResolution, ResolutionSet},
};
