//! Full pipeline run: description → estimates for each formula.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::Pipeline;
use crate::error::PipelineError;
use crate::traits::llm::LanguageModel;
use crate::traits::searcher::WebSearcher;
use crate::types::{
    component::Component,
    estimate::EstimateOutcome,
    formula::{ClarificationAnswer, Formula, MarketDescription},
    resolution::ResolutionSet,
};

/// Everything one run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub description: MarketDescription,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<String>,
    #[serde(default)]
    pub clarifications: Vec<String>,
    pub formulas: Vec<FormulaReport>,
    /// The run stopped early because the caller cancelled it.
    pub cancelled: bool,
}

impl RunReport {
    /// Estimates that completed, in formula order.
    pub fn complete_estimates(&self) -> impl Iterator<Item = &crate::types::estimate::Estimate> {
        self.formulas
            .iter()
            .filter_map(|f| f.outcome.as_ref()?.estimate())
    }
}

/// Per-formula results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormulaReport {
    pub formula: Formula,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub resolutions: ResolutionSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<EstimateOutcome>,
    /// Set when this formula failed; other formulas are unaffected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FormulaReport {
    fn new(formula: Formula) -> Self {
        Self {
            formula,
            components: Vec::new(),
            resolutions: ResolutionSet::new(),
            outcome: None,
            error: None,
        }
    }

    fn failed(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

impl<L: LanguageModel, S: WebSearcher> Pipeline<L, S> {
    /// Run every phase for up to `max_formulas` formulas.
    ///
    /// Only formula generation failing (or being cancelled) fails the run.
    /// A formula that fails later is recorded in its report and the run
    /// moves on to the next one.
    pub async fn run(
        &self,
        description: &MarketDescription,
        answers: &[ClarificationAnswer],
        cancel: &CancellationToken,
    ) -> Result<RunReport, PipelineError> {
        let run_id = Uuid::now_v7();
        let started_at = Utc::now();
        info!(%run_id, description = description.as_str(), "Starting market sizing run");

        let brainstorm = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            result = self.brainstorm(description, answers) => result?,
        };

        let mut report = RunReport {
            run_id,
            started_at,
            description: description.clone(),
            steps: brainstorm.steps,
            clarifications: brainstorm.clarifications,
            formulas: Vec::new(),
            cancelled: false,
        };

        for formula in brainstorm.formulas.into_iter().take(self.config().max_formulas) {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let mut formula_report = FormulaReport::new(formula.clone());

            let decomposed = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.decompose(&formula) => Some(result),
            };
            let components = match decomposed {
                None => {
                    report.cancelled = true;
                    report.formulas.push(formula_report.failed(PipelineError::Cancelled));
                    break;
                }
                Some(Err(e)) => {
                    warn!(formula = formula.expression(), error = %e, "Decomposition failed");
                    report.formulas.push(formula_report.failed(e));
                    continue;
                }
                Some(Ok(components)) => components,
            };

            let resolutions = self.resolve_components(&components, cancel).await;
            let interrupted = !resolutions.is_complete();

            match self.synthesize_or_partial(&formula, &resolutions) {
                Ok(outcome) => formula_report.outcome = Some(outcome),
                Err(e) => {
                    warn!(formula = formula.expression(), error = %e, "Synthesis failed");
                    formula_report.error = Some(e.to_string());
                }
            }
            formula_report.components = components;
            formula_report.resolutions = resolutions;
            report.formulas.push(formula_report);

            if interrupted {
                report.cancelled = true;
                break;
            }
        }

        info!(
            %run_id,
            formulas = report.formulas.len(),
            estimates = report.complete_estimates().count(),
            cancelled = report.cancelled,
            "Market sizing run finished"
        );

        Ok(report)
    }
}
