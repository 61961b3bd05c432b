//! The market sizing pipeline.
//!
//! Phases, each usable on its own:
//! - Formula generation (description → candidate formulas)
//! - Decomposition (formula → components)
//! - Resolution (components → data points, concurrent per component)
//! - Synthesis (formula + data points → estimate with a sensitivity range)
//!
//! Every phase is stateless; callers may edit formulas or components between
//! phases and feed the edited values back in.

pub mod decompose;
pub mod formulas;
pub mod resolve;
pub mod run;
pub mod synthesize;

pub use decompose::SuggestedSource;
pub use formulas::Brainstorm;
pub use run::{FormulaReport, RunReport};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{DecompositionError, GenerationError, LmError, SynthesisError};
use crate::prompts::PromptTemplate;
use crate::schema::{parse_structured, StructuredOutput};
use crate::traits::llm::{CompletionRequest, LanguageModel};
use crate::traits::searcher::WebSearcher;
use crate::types::{
    component::Component,
    config::PipelineConfig,
    estimate::{Estimate, EstimateOutcome},
    formula::{ClarificationAnswer, Formula, MarketDescription},
    resolution::ResolutionSet,
};

/// Owns the two adapters and the run configuration.
///
/// # Example
///
/// ```rust,ignore
/// use market_sizing::{MarketDescription, Pipeline};
///
/// let pipeline = Pipeline::new(lm, searcher);
/// let description = MarketDescription::new("K-12 tutoring software in the US")?;
///
/// let formulas = pipeline.generate_formulas(&description, &[]).await?;
/// let components = pipeline.decompose(&formulas[0]).await?;
/// let resolutions = pipeline.resolve_components(&components, &cancel).await;
/// let estimate = pipeline.synthesize(&formulas[0], &resolutions)?;
/// ```
pub struct Pipeline<L, S> {
    lm: L,
    searcher: S,
    config: PipelineConfig,
}

impl<L: LanguageModel, S: WebSearcher> Pipeline<L, S> {
    pub fn new(lm: L, searcher: S) -> Self {
        Self {
            lm,
            searcher,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn language_model(&self) -> &L {
        &self.lm
    }

    pub fn searcher(&self) -> &S {
        &self.searcher
    }

    /// Questions whose answers would sharpen the formula inputs.
    pub async fn clarifying_questions(
        &self,
        description: &MarketDescription,
    ) -> Result<Vec<String>, GenerationError> {
        formulas::clarifying_questions(&self.lm, description).await
    }

    /// Full brainstorm response: formulas, approach steps and open questions.
    pub async fn brainstorm(
        &self,
        description: &MarketDescription,
        answers: &[ClarificationAnswer],
    ) -> Result<Brainstorm, GenerationError> {
        formulas::brainstorm(&self.lm, description, answers).await
    }

    /// Candidate sizing formulas for a market description.
    pub async fn generate_formulas(
        &self,
        description: &MarketDescription,
        answers: &[ClarificationAnswer],
    ) -> Result<Vec<Formula>, GenerationError> {
        formulas::generate_formulas(&self.lm, description, answers).await
    }

    /// One component per formula variable, in variable order.
    pub async fn decompose(&self, formula: &Formula) -> Result<Vec<Component>, DecompositionError> {
        decompose::decompose(&self.lm, formula).await
    }

    /// Advisory data sources per component.
    pub async fn suggest_sources(
        &self,
        formula: &Formula,
    ) -> Result<Vec<SuggestedSource>, DecompositionError> {
        decompose::suggest_sources(&self.lm, formula).await
    }

    /// Resolve every component concurrently; never fails as a whole.
    pub async fn resolve_components(
        &self,
        components: &[Component],
        cancel: &CancellationToken,
    ) -> ResolutionSet {
        resolve::resolve_components(&self.lm, &self.searcher, components, &self.config, cancel).await
    }

    pub fn synthesize(
        &self,
        formula: &Formula,
        resolutions: &ResolutionSet,
    ) -> Result<Estimate, SynthesisError> {
        synthesize::synthesize(formula, resolutions)
    }

    pub fn synthesize_or_partial(
        &self,
        formula: &Formula,
        resolutions: &ResolutionSet,
    ) -> Result<EstimateOutcome, SynthesisError> {
        synthesize::synthesize_or_partial(formula, resolutions)
    }
}

/// Why a structured call produced nothing usable.
#[derive(Debug)]
pub(crate) enum CallError {
    /// Transport or provider failure
    Model(LmError),
    /// The model answered with the wrong shape
    Shape(String),
}

/// One LM call, validated into `T`.
pub(crate) async fn call_structured<T, L>(
    lm: &L,
    template: PromptTemplate,
    prompt: String,
) -> Result<T, CallError>
where
    T: StructuredOutput,
    L: LanguageModel + ?Sized,
{
    let request = CompletionRequest::structured::<T>(template, prompt);
    debug!(template = template.name(), "Calling language model");

    let payload = match lm.complete(&request).await {
        Ok(payload) => payload,
        Err(LmError::MalformedOutput(message)) => return Err(CallError::Shape(message)),
        Err(e) => return Err(CallError::Model(e)),
    };

    parse_structured::<T>(payload).map_err(CallError::Shape)
}
