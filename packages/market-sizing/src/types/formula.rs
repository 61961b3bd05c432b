//! Market descriptions and sizing formulas.

use serde::{Deserialize, Serialize};

use crate::error::{EvaluationError, GenerationError};
use crate::expression::Expression;

/// Free-text description of the market to size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MarketDescription(String);

impl MarketDescription {
    /// Create a description; blank text is rejected.
    pub fn new(text: impl Into<String>) -> Result<Self, GenerationError> {
        let text = text.into();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(GenerationError::EmptyDescription);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for MarketDescription {
    type Error = GenerationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MarketDescription> for String {
    fn from(value: MarketDescription) -> Self {
        value.0
    }
}

impl std::fmt::Display for MarketDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A caller's answer to one clarifying question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarificationAnswer {
    pub question: String,
    pub answer: String,
}

impl ClarificationAnswer {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// A candidate sizing formula.
///
/// The variable list is always derived from the expression text, so a
/// formula edited outside the pipeline (and deserialized back in) never
/// carries a stale variable list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FormulaInput")]
pub struct Formula {
    expression: String,
    variables: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rationale: Option<String>,
}

/// Wire shape accepted when deserializing a formula.
#[derive(Deserialize)]
struct FormulaInput {
    expression: String,
    #[serde(default)]
    rationale: Option<String>,
}

impl TryFrom<FormulaInput> for Formula {
    type Error = EvaluationError;

    fn try_from(input: FormulaInput) -> Result<Self, Self::Error> {
        let mut formula = Formula::new(input.expression)?;
        formula.rationale = input.rationale.filter(|r| !r.trim().is_empty());
        Ok(formula)
    }
}

impl Formula {
    /// Parse a formula from expression text.
    pub fn new(expression: impl Into<String>) -> Result<Self, EvaluationError> {
        let expression = expression.into();
        let parsed = Expression::parse(&expression)?;
        Ok(Self {
            expression: expression.trim().to_string(),
            variables: parsed.variables().to_vec(),
            rationale: None,
        })
    }

    /// Attach the model's (or editor's) explanation.
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    /// The expression as written, including any `name =` label.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Referenced variables in order of first appearance.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn rationale(&self) -> Option<&str> {
        self.rationale.as_deref()
    }

    /// Parse the expression for evaluation.
    pub fn parse_expression(&self) -> Result<Expression, EvaluationError> {
        Expression::parse(&self.expression)
    }
}

impl std::fmt::Display for Formula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.expression)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_description_rejected() {
        assert!(matches!(
            MarketDescription::new("   "),
            Err(GenerationError::EmptyDescription)
        ));
        let description = MarketDescription::new("  K-12 edtech in the US ").unwrap();
        assert_eq!(description.as_str(), "K-12 edtech in the US");
    }

    #[test]
    fn test_formula_derives_variables() {
        let formula = Formula::new("tam = schools * spend_per_school * schools").unwrap();
        assert_eq!(formula.variables(), &["schools", "spend_per_school"]);
        assert_eq!(formula.expression(), "tam = schools * spend_per_school * schools");
    }

    #[test]
    fn test_edited_formula_rederives_variables() {
        // A stale variable list from an editor is ignored.
        let json = r#"{
            "expression": "households * adoption_rate * annual_price",
            "variables": ["schools"],
            "rationale": "consumer view"
        }"#;
        let formula: Formula = serde_json::from_str(json).unwrap();
        assert_eq!(
            formula.variables(),
            &["households", "adoption_rate", "annual_price"]
        );
        assert_eq!(formula.rationale(), Some("consumer view"));
    }

    #[test]
    fn test_malformed_formula_rejected_on_deserialize() {
        let json = r#"{"expression": "schools * * spend"}"#;
        assert!(serde_json::from_str::<Formula>(json).is_err());
    }

    #[test]
    fn test_serialized_shape() {
        let formula = Formula::new("a * b").unwrap();
        let value = serde_json::to_value(&formula).unwrap();
        assert_eq!(value["expression"], "a * b");
        assert_eq!(value["variables"], serde_json::json!(["a", "b"]));
        assert!(value.get("rationale").is_none());
    }
}
