//! Formula generation.
//!
//! One LM call per invocation. The model proposes expressions; the
//! expression engine decides whether they are formulas.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{call_structured, CallError};
use crate::error::GenerationError;
use crate::prompts::{
    format_clarifying_questions_prompt, format_formula_brainstorm_prompt, PromptTemplate,
};
use crate::traits::llm::LanguageModel;
use crate::types::formula::{ClarificationAnswer, Formula, MarketDescription};

/// Result of a brainstorm call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Brainstorm {
    /// Validated formulas, in the order the model proposed them.
    pub formulas: Vec<Formula>,

    /// The model's numbered overview of the sizing approach.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<String>,

    /// Questions the model thinks are worth answering before sizing.
    #[serde(default)]
    pub clarifications: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ClarifyingResponse {
    questions: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct BrainstormResponse {
    #[serde(default)]
    steps: Option<String>,
    formulas: Vec<FormulaDraft>,
    #[serde(default)]
    clarifications: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct FormulaDraft {
    expression: String,
    #[serde(default)]
    rationale: Option<String>,
}

fn generation_error(e: CallError) -> GenerationError {
    match e {
        CallError::Model(e) => GenerationError::Model(e),
        CallError::Shape(message) => GenerationError::MalformedOutput(message),
    }
}

pub async fn clarifying_questions<L: LanguageModel + ?Sized>(
    lm: &L,
    description: &MarketDescription,
) -> Result<Vec<String>, GenerationError> {
    let response: ClarifyingResponse = call_structured(
        lm,
        PromptTemplate::ClarifyingQuestions,
        format_clarifying_questions_prompt(description.as_str())?,
    )
    .await
    .map_err(generation_error)?;

    Ok(response
        .questions
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect())
}

pub async fn brainstorm<L: LanguageModel + ?Sized>(
    lm: &L,
    description: &MarketDescription,
    answers: &[ClarificationAnswer],
) -> Result<Brainstorm, GenerationError> {
    let answers: Vec<(String, String)> = answers
        .iter()
        .map(|a| (a.question.clone(), a.answer.clone()))
        .collect();

    let response: BrainstormResponse = call_structured(
        lm,
        PromptTemplate::FormulaBrainstorm,
        format_formula_brainstorm_prompt(description.as_str(), &answers)?,
    )
    .await
    .map_err(generation_error)?;

    if response.formulas.is_empty() {
        return Err(GenerationError::NoFormulas);
    }

    let mut formulas: Vec<Formula> = Vec::with_capacity(response.formulas.len());
    for draft in response.formulas {
        let formula = Formula::new(draft.expression.as_str()).map_err(|source| {
            GenerationError::InvalidFormula {
                expression: draft.expression.clone(),
                source,
            }
        })?;
        let formula = match draft.rationale.filter(|r| !r.trim().is_empty()) {
            Some(rationale) => formula.with_rationale(rationale),
            None => formula,
        };

        if formulas.iter().any(|f| f.expression() == formula.expression()) {
            debug!(expression = formula.expression(), "Dropping duplicate formula");
            continue;
        }
        formulas.push(formula);
    }

    info!(
        description = description.as_str(),
        formulas = formulas.len(),
        "Generated formulas"
    );

    Ok(Brainstorm {
        formulas,
        steps: response.steps.filter(|s| !s.trim().is_empty()),
        clarifications: response.clarifications,
    })
}

pub async fn generate_formulas<L: LanguageModel + ?Sized>(
    lm: &L,
    description: &MarketDescription,
    answers: &[ClarificationAnswer],
) -> Result<Vec<Formula>, GenerationError> {
    brainstorm(lm, description, answers).await.map(|b| b.formulas)
}
