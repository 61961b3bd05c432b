//! Language model trait.
//!
//! The pipeline never sees raw model text. An adapter sends a rendered prompt
//! plus a response schema and hands back a decoded JSON document; the
//! pipeline then validates that document into its own typed structs.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::LmError;
use crate::prompts::{PromptTemplate, SYSTEM_PROMPT};
use crate::schema::StructuredOutput;

/// One structured completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Template the prompt was rendered from (for logs and mocks).
    pub template: PromptTemplate,

    pub system: String,

    /// Rendered user prompt.
    pub prompt: String,

    pub schema_name: String,

    /// JSON schema the response must satisfy.
    pub response_schema: Value,
}

impl CompletionRequest {
    /// Build a request whose response shape is `T`.
    pub fn structured<T: StructuredOutput>(template: PromptTemplate, prompt: impl Into<String>) -> Self {
        Self {
            template,
            system: SYSTEM_PROMPT.to_string(),
            prompt: prompt.into(),
            schema_name: T::type_name(),
            response_schema: T::response_schema(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }
}

/// Language model adapter.
///
/// Implementations own transport, retries and decoding of the model's text
/// into JSON. Output that is not a JSON document is
/// [`LmError::MalformedOutput`] and is never retried.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Value, LmError>;
}

#[async_trait]
impl<T: LanguageModel + ?Sized> LanguageModel for Arc<T> {
    async fn complete(&self, request: &CompletionRequest) -> Result<Value, LmError> {
        (**self).complete(request).await
    }
}

/// Decode model text into a JSON document.
///
/// Accepts a bare document or one wrapped in a markdown code fence.
pub fn parse_json_payload(text: &str) -> Result<Value, LmError> {
    let stripped = strip_code_blocks(text);
    match serde_json::from_str::<Value>(stripped) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Ok(value),
        Ok(_) => Err(LmError::MalformedOutput(format!(
            "expected a JSON object, got: {}",
            preview(stripped)
        ))),
        Err(e) => Err(LmError::MalformedOutput(format!(
            "{} in: {}",
            e,
            preview(stripped)
        ))),
    }
}

fn strip_code_blocks(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag on the opening fence.
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn preview(text: &str) -> String {
    const MAX: usize = 120;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
