//! Typed errors for the market sizing pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can tell a
//! recoverable condition (unresolved components) from a fatal one (a formula
//! that cannot be evaluated).

use thiserror::Error;

/// Errors returned by a language model adapter.
#[derive(Debug, Clone, Error)]
pub enum LmError {
    /// Network failure before a response arrived
    #[error("transport error: {0}")]
    Transport(String),

    /// Provider answered with a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Provider rejected the call for rate limiting (HTTP 429)
    #[error("rate limited by provider")]
    RateLimited,

    /// Request exceeded its deadline
    #[error("request timed out")]
    Timeout,

    /// Model output was not the JSON document the request asked for
    #[error("malformed model output: {0}")]
    MalformedOutput(String),

    /// Adapter misconfiguration (missing key, bad endpoint)
    #[error("config error: {0}")]
    Config(String),
}

impl LmError {
    /// Whether retrying the same call may succeed.
    ///
    /// Shape problems are never transient: asking again rarely fixes them.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::RateLimited | Self::Timeout => true,
            Self::Api { status, .. } => *status >= 500,
            Self::MalformedOutput(_) | Self::Config(_) => false,
        }
    }
}

/// Errors returned by a web search adapter.
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    /// Network failure before a response arrived
    #[error("transport error: {0}")]
    Transport(String),

    /// Provider answered with a non-success status
    #[error("search API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Provider rejected the call for rate limiting (HTTP 429)
    #[error("rate limited by search provider")]
    RateLimited,

    /// Request exceeded its deadline
    #[error("search timed out")]
    Timeout,

    /// Response body did not match the provider's documented shape
    #[error("failed to decode search response: {0}")]
    Decode(String),

    /// Adapter misconfiguration
    #[error("config error: {0}")]
    Config(String),
}

impl SearchError {
    /// Whether retrying the same query may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::RateLimited | Self::Timeout => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Decode(_) | Self::Config(_) => false,
        }
    }
}

/// Formula generation failed.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The market description was blank
    #[error("market description is empty")]
    EmptyDescription,

    /// The model call itself failed (after adapter retries)
    #[error("model call failed: {0}")]
    Model(#[source] LmError),

    /// The model answered, but not with a formula list
    #[error("malformed formula list: {0}")]
    MalformedOutput(String),

    /// The model returned an empty list
    #[error("model proposed no formulas")]
    NoFormulas,

    #[error(transparent)]
    Prompt(#[from] PromptError),

    /// A proposed formula does not parse as an expression
    #[error("formula `{expression}` is invalid: {source}")]
    InvalidFormula {
        expression: String,
        source: EvaluationError,
    },
}

/// Formula decomposition failed.
#[derive(Debug, Error)]
pub enum DecompositionError {
    /// The model call itself failed (after adapter retries)
    #[error("model call failed: {0}")]
    Model(#[source] LmError),

    /// The model answered, but not with a component list
    #[error("malformed component list: {0}")]
    MalformedOutput(String),

    #[error(transparent)]
    Prompt(#[from] PromptError),
}

/// Why a single retrieved document produced no data point.
///
/// Never propagated past the resolver: the document is discarded and counted.
#[derive(Debug, Error)]
pub enum ExtractionParseError {
    #[error("extraction call failed: {0}")]
    Model(#[source] LmError),

    #[error("malformed extraction: {0}")]
    Malformed(String),

    #[error("document has no value for the component")]
    NotFound,

    #[error("value is not numeric: {0:?}")]
    NonNumeric(String),

    #[error("unit is not recognizable: {0:?}")]
    UnrecognizedUnit(String),

    #[error(transparent)]
    Prompt(#[from] PromptError),
}

/// A formula expression could not be parsed or evaluated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("syntax error at {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("no value bound for variable `{0}`")]
    UnknownVariable(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("result is not a finite number")]
    NonFinite,
}

/// Synthesis could not produce an estimate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SynthesisError {
    /// Recoverable: re-run resolution (e.g. with refined queries) and retry
    #[error("unresolved components: {}", components.join(", "))]
    UnresolvedComponent { components: Vec<String> },

    /// Fatal for this formula: surface it to whoever produced the formula
    #[error("evaluation failed: {0}")]
    Evaluation(#[from] EvaluationError),
}

/// Rendering a prompt template failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    #[error("unknown prompt template: {0}")]
    UnknownTemplate(String),

    #[error("missing prompt argument: {0}")]
    MissingArgument(&'static str),
}

/// Top-level pipeline error.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Decomposition(#[from] DecompositionError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    /// The caller cancelled the run
    #[error("operation cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(LmError::Timeout.is_transient());
        assert!(LmError::RateLimited.is_transient());
        assert!(LmError::Api {
            status: 503,
            message: "overloaded".into()
        }
        .is_transient());
        assert!(!LmError::Api {
            status: 400,
            message: "bad request".into()
        }
        .is_transient());
        assert!(!LmError::MalformedOutput("prose".into()).is_transient());

        assert!(SearchError::Transport("reset".into()).is_transient());
        assert!(!SearchError::Decode("missing results".into()).is_transient());
    }

    #[test]
    fn test_unresolved_message_lists_components() {
        let err = SynthesisError::UnresolvedComponent {
            components: vec!["schools".into(), "spend_per_school".into()],
        };
        assert_eq!(
            err.to_string(),
            "unresolved components: schools, spend_per_school"
        );
    }
}
