//! LLM prompts for the market sizing pipeline.
//!
//! Templates use `{name}` placeholders. Substitution is single-pass, so a
//! substituted value (e.g. document text containing braces) is never
//! re-expanded. Literal braces in the JSON examples are left alone because
//! only known placeholder names are replaced.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

use crate::error::PromptError;

/// System message shared by every call.
pub const SYSTEM_PROMPT: &str = "You are a market sizing analyst. You build \
top-down and bottom-up market size models, break them into measurable inputs, \
and read numbers out of published sources. Always answer with the JSON \
document requested, with no surrounding prose.";

/// Prompt for questions that would sharpen the formula inputs.
pub const CLARIFYING_QUESTIONS_PROMPT: &str = r#"I want to size the market for: {description}

Before generating a formula, list the clarifying questions whose answers would give the context needed for a good formula.
These questions should directly inform the formula inputs (geography, customer segment, time period, pricing basis).

Output JSON:
{
    "questions": ["question 1", "question 2"]
}"#;

/// Prompt for brainstorming candidate sizing formulas.
pub const FORMULA_BRAINSTORM_PROMPT: &str = r#"I want to size the market for: {description}

{clarifications}

Propose market sizing formulas. Rules:
1. Each formula must be structurally distinct (a different decomposition, not a renamed copy)
2. Write each formula as an arithmetic expression using + - * / ^ and parentheses
3. Use snake_case identifiers for every input (e.g. number_of_schools * annual_spend_per_school)
4. Exclude explicit adoption or penetration rates
5. Every identifier must be a quantity that can be looked up in published data

Output JSON:
{
    "steps": "A numbered overview of the sizing approach",
    "formulas": [
        {
            "expression": "number_of_schools * annual_spend_per_school",
            "rationale": "Why this decomposition works"
        }
    ],
    "clarifications": ["Clarifying questions to consider for the formulas"]
}"#;

/// Prompt for describing each variable of a formula.
pub const DECOMPOSE_FORMULA_PROMPT: &str = r#"I have a market size formula: {formula}

Its inputs are: {variables}

For each input, describe the single numeric quantity it stands for, precisely enough to be used as a web search query, and give the unit the value should be reported in.

Output JSON:
{
    "components": [
        {
            "name": "input name exactly as listed",
            "description": "What the number measures, including geography and period",
            "unit": "Expected unit (e.g. schools, USD per school per year, ratio)"
        }
    ]
}"#;

/// Prompt for reading one numeric data point out of a document.
pub const EXTRACT_DATA_POINT_PROMPT: &str = r#"The following text is from a data source.

Title: {title}
URL: {url}
Text:
{content}

Extract a numeric data point for: {component}
{unit_hint}

Rules:
1. Only report a value the text states or directly implies
2. Quote the sentence that supports the value
3. Report the unit exactly as the text uses it
4. If the text has no value for this quantity, set "found" to false

Output JSON:
{
    "found": true,
    "value": "the number as written, e.g. 130,000 or 1.2 billion",
    "unit": "unit of the value",
    "snippet": "the supporting sentence from the text",
    "confidence": "high" | "medium" | "low"
}"#;

/// Prompt for suggesting data sources per component.
pub const SUGGEST_DATA_SOURCES_PROMPT: &str = r#"This is the formula which I want to apply for market modeling:

{formula}

Its components are: {variables}

For each component, suggest different sources that can be used to find the data point.

Output JSON:
{
    "components": [
        {
            "component": "component name",
            "data_sources": [
                {
                    "name": "name of data source",
                    "link": "link to data source",
                    "overview": "short description of what the source contains"
                }
            ]
        }
    ]
}"#;

/// A named prompt template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptTemplate {
    ClarifyingQuestions,
    FormulaBrainstorm,
    DecomposeFormula,
    ExtractDataPoint,
    SuggestDataSources,
}

impl PromptTemplate {
    pub const ALL: [PromptTemplate; 5] = [
        Self::ClarifyingQuestions,
        Self::FormulaBrainstorm,
        Self::DecomposeFormula,
        Self::ExtractDataPoint,
        Self::SuggestDataSources,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::ClarifyingQuestions => "clarifying_questions",
            Self::FormulaBrainstorm => "formula_brainstorm",
            Self::DecomposeFormula => "decompose_formula",
            Self::ExtractDataPoint => "extract_data_point",
            Self::SuggestDataSources => "suggest_data_sources",
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            Self::ClarifyingQuestions => CLARIFYING_QUESTIONS_PROMPT,
            Self::FormulaBrainstorm => FORMULA_BRAINSTORM_PROMPT,
            Self::DecomposeFormula => DECOMPOSE_FORMULA_PROMPT,
            Self::ExtractDataPoint => EXTRACT_DATA_POINT_PROMPT,
            Self::SuggestDataSources => SUGGEST_DATA_SOURCES_PROMPT,
        }
    }

    /// Placeholders the template requires.
    pub fn placeholders(self) -> &'static [&'static str] {
        match self {
            Self::ClarifyingQuestions => &["description"],
            Self::FormulaBrainstorm => &["description", "clarifications"],
            Self::DecomposeFormula | Self::SuggestDataSources => &["formula", "variables"],
            Self::ExtractDataPoint => &["component", "unit_hint", "title", "url", "content"],
        }
    }

    /// SHA-256 of the template text, logged with each call.
    pub fn fingerprint(self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Render the template, requiring every placeholder to be supplied.
    pub fn render(self, args: &[(&str, &str)]) -> Result<String, PromptError> {
        for placeholder in self.placeholders() {
            if !args.iter().any(|(name, _)| name == placeholder) {
                return Err(PromptError::MissingArgument(*placeholder));
            }
        }
        Ok(fill(self.text(), self.placeholders(), args))
    }
}

impl fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PromptTemplate {
    type Err = PromptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| PromptError::UnknownTemplate(s.to_string()))
    }
}

/// Single-pass `{name}` substitution of the given placeholders.
fn fill(text: &str, placeholders: &[&str], args: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after.find('}').and_then(|close| {
            let name = &after[..close];
            if !placeholders.contains(&name) {
                return None;
            }
            let value = args.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)?;
            Some((value, close))
        });

        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}


/// Format the clarifying questions prompt.
pub fn format_clarifying_questions_prompt(description: &str) -> Result<String, PromptError> {
    PromptTemplate::ClarifyingQuestions.render(&[("description", description)])
}

/// Format the brainstorm prompt with any answered clarifications.
pub fn format_formula_brainstorm_prompt(
    description: &str,
    answers: &[(String, String)],
) -> Result<String, PromptError> {
    let clarifications = if answers.is_empty() {
        String::new()
    } else {
        let lines = answers
            .iter()
            .map(|(q, a)| format!("- Q: {}\n  A: {}", q, a))
            .collect::<Vec<_>>()
            .join("\n");
        format!("Context from clarifying questions:\n{}", lines)
    };

    PromptTemplate::FormulaBrainstorm.render(&[
        ("description", description),
        ("clarifications", &clarifications),
    ])
}

/// Format the decomposition prompt.
pub fn format_decompose_formula_prompt(
    formula: &str,
    variables: &[String],
) -> Result<String, PromptError> {
    PromptTemplate::DecomposeFormula
        .render(&[("formula", formula), ("variables", &variables.join(", "))])
}

/// Format the extraction prompt for one document.
pub fn format_extract_data_point_prompt(
    component: &str,
    unit: Option<&str>,
    title: &str,
    url: &str,
    content: &str,
) -> Result<String, PromptError> {
    let unit_hint = match unit {
        Some(u) if !u.trim().is_empty() => format!("The value is expected in: {}", u),
        _ => String::new(),
    };

    PromptTemplate::ExtractDataPoint.render(&[
        ("component", component),
        ("unit_hint", &unit_hint),
        ("title", title),
        ("url", url),
        ("content", content),
    ])
}

/// Format the data source suggestion prompt.
pub fn format_suggest_data_sources_prompt(
    formula: &str,
    variables: &[String],
) -> Result<String, PromptError> {
    PromptTemplate::SuggestDataSources
        .render(&[("formula", formula), ("variables", &variables.join(", "))])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable() {
        let a = PromptTemplate::DecomposeFormula.fingerprint();
        let b = PromptTemplate::DecomposeFormula.fingerprint();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, PromptTemplate::ExtractDataPoint.fingerprint());
    }

    #[test]
    fn test_every_placeholder_appears_in_its_template() {
        for template in PromptTemplate::ALL {
            for placeholder in template.placeholders() {
                assert!(
                    template.text().contains(&format!("{{{}}}", placeholder)),
                    "{} is missing {{{}}}",
                    template,
                    placeholder
                );
            }
        }
    }

    #[test]
    fn test_render_missing_argument() {
        let err = PromptTemplate::ClarifyingQuestions.render(&[]).unwrap_err();
        assert_eq!(err, PromptError::MissingArgument("description"));
    }

    #[test]
    fn test_render_keeps_json_braces() {
        let rendered = PromptTemplate::ClarifyingQuestions
            .render(&[("description", "K-12 tutoring software")])
            .unwrap();
        assert!(rendered.contains("K-12 tutoring software"));
        assert!(rendered.contains("\"questions\""));
        assert!(rendered.contains('{'));
    }

    #[test]
    fn test_substituted_values_are_not_re_expanded() {
        let prompt = format_extract_data_point_prompt(
            "number of schools",
            None,
            "Stats",
            "https://example.com",
            "literal {component} in the page",
        )
        .unwrap();
        assert!(prompt.contains("literal {component} in the page"));
        assert!(prompt.contains("for: number of schools"));
    }

    #[test]
    fn test_unit_hint_only_when_present() {
        let with = format_extract_data_point_prompt("x", Some("USD"), "t", "u", "c").unwrap();
        assert!(with.contains("expected in: USD"));
        let without = format_extract_data_point_prompt("x", None, "t", "u", "c").unwrap();
        assert!(!without.contains("expected in"));
    }

    #[test]
    fn test_brainstorm_includes_answers() {
        let answers = vec![("Which country?".to_string(), "United States".to_string())];
        let prompt = format_formula_brainstorm_prompt("school software", &answers).unwrap();
        assert!(prompt.contains("Q: Which country?"));
        assert!(prompt.contains("A: United States"));
    }

    #[test]
    fn test_every_helper_supplies_its_placeholders() {
        let variables = vec!["schools".to_string()];
        assert!(format_clarifying_questions_prompt("d").is_ok());
        assert!(format_formula_brainstorm_prompt("d", &[]).is_ok());
        assert!(format_decompose_formula_prompt("schools * 2", &variables).is_ok());
        assert!(format_extract_data_point_prompt("c", None, "t", "u", "x").is_ok());
        assert!(format_suggest_data_sources_prompt("schools * 2", &variables).is_ok());
    }

    #[test]
    fn test_parse_template_name() {
        assert_eq!(
            "decompose_formula".parse::<PromptTemplate>().unwrap(),
            PromptTemplate::DecomposeFormula
        );
        assert!(matches!(
            "nope".parse::<PromptTemplate>(),
            Err(PromptError::UnknownTemplate(_))
        ));
    }
}
