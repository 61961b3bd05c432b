//! Formula decomposition.
//!
//! Component names always come from the formula's own variable list. The
//! model only describes them, so decomposing the same formula twice yields
//! the same names in the same order.

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{call_structured, CallError};
use crate::error::DecompositionError;
use crate::prompts::{
    format_decompose_formula_prompt, format_suggest_data_sources_prompt, PromptTemplate,
};
use crate::traits::llm::LanguageModel;
use crate::types::component::Component;
use crate::types::data_point::is_recognizable_unit;
use crate::types::formula::Formula;

#[derive(Debug, Deserialize, JsonSchema)]
struct DecomposeResponse {
    components: Vec<ComponentDraft>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ComponentDraft {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    unit: Option<String>,
}

/// A candidate place to look up one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedSource {
    pub component: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default)]
    pub overview: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SourcesResponse {
    components: Vec<ComponentSources>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ComponentSources {
    component: String,
    data_sources: Vec<SourceDraft>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SourceDraft {
    name: String,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    overview: Option<String>,
}

fn decomposition_error(e: CallError) -> DecompositionError {
    match e {
        CallError::Model(e) => DecompositionError::Model(e),
        CallError::Shape(message) => DecompositionError::MalformedOutput(message),
    }
}

/// Normalized form used to match model-reported names to variables.
fn name_key(name: &str) -> String {
    name.trim()
        .trim_matches('`')
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

pub async fn decompose<L: LanguageModel + ?Sized>(
    lm: &L,
    formula: &Formula,
) -> Result<Vec<Component>, DecompositionError> {
    let variables = formula.variables();
    if variables.is_empty() {
        debug!(formula = formula.expression(), "Formula has no variables");
        return Ok(Vec::new());
    }

    let response: DecomposeResponse = call_structured(
        lm,
        PromptTemplate::DecomposeFormula,
        format_decompose_formula_prompt(formula.expression(), variables)?,
    )
    .await
    .map_err(decomposition_error)?;

    let known: HashMap<String, &str> = variables
        .iter()
        .map(|v| (name_key(v), v.as_str()))
        .collect();

    let mut drafts: HashMap<&str, ComponentDraft> = HashMap::new();
    for draft in response.components {
        match known.get(&name_key(&draft.name)) {
            Some(variable) => {
                drafts.entry(*variable).or_insert(draft);
            }
            None => {
                warn!(
                    formula = formula.expression(),
                    name = %draft.name,
                    "Dropping component not in formula"
                );
            }
        }
    }

    let components: Vec<Component> = variables
        .iter()
        .map(|variable| {
            let Some(draft) = drafts.remove(variable.as_str()) else {
                debug!(variable = %variable, "No description from model, using variable name");
                return Component::from_variable(variable.as_str());
            };

            let mut component = match non_blank(draft.description) {
                Some(description) => Component::new(variable.as_str(), description),
                None => Component::from_variable(variable.as_str()),
            };
            if let Some(unit) = non_blank(draft.unit).filter(|u| is_recognizable_unit(u)) {
                component = component.with_unit(unit);
            }
            component
        })
        .collect();

    info!(
        formula = formula.expression(),
        components = components.len(),
        "Decomposed formula"
    );

    Ok(components)
}

pub async fn suggest_sources<L: LanguageModel + ?Sized>(
    lm: &L,
    formula: &Formula,
) -> Result<Vec<SuggestedSource>, DecompositionError> {
    let variables = formula.variables();
    if variables.is_empty() {
        return Ok(Vec::new());
    }

    let response: SourcesResponse = call_structured(
        lm,
        PromptTemplate::SuggestDataSources,
        format_suggest_data_sources_prompt(formula.expression(), variables)?,
    )
    .await
    .map_err(decomposition_error)?;

    let known: HashMap<String, &String> = variables.iter().map(|v| (name_key(v), v)).collect();

    let mut sources = Vec::new();
    for entry in response.components {
        let Some(variable) = known.get(&name_key(&entry.component)) else {
            warn!(component = %entry.component, "Dropping sources for unknown component");
            continue;
        };
        for source in entry.data_sources {
            if source.name.trim().is_empty() {
                continue;
            }
            sources.push(SuggestedSource {
                component: (*variable).clone(),
                name: source.name.trim().to_string(),
                link: non_blank(source.link),
                overview: non_blank(source.overview).unwrap_or_default(),
            });
        }
    }

    // Keep the formula's variable order.
    sources.sort_by_key(|s| variables.iter().position(|v| v == &s.component));
    Ok(sources)
}
