//! OpenAI implementation of the `LanguageModel` trait.
//!
//! Uses chat completions with the `json_schema` response format in strict
//! mode.
//!
//! # Example
//!
//! ```rust,ignore
//! use market_sizing::ai::OpenAiModel;
//!
//! let lm = OpenAiModel::new("sk-...").with_model("gpt-4o-mini");
//! let pipeline = Pipeline::new(lm, searcher);
//! ```

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::LmError;
use crate::retry::{with_retry, RetryPolicy};
use crate::security::SecretString;
use crate::traits::llm::{parse_json_payload, CompletionRequest, LanguageModel};

const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// OpenAI-backed language model.
#[derive(Clone)]
pub struct OpenAiModel {
    client: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
    retry: RetryPolicy,
}

impl OpenAiModel {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key: SecretString::new(api_key),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    /// Set the chat model (default: gpt-4o).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, body: &ChatRequest<'_>) -> Result<String, LmError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key.expose()))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(LmError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let chat_response: ChatResponse = response.json().await.map_err(transport_error)?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LmError::MalformedOutput("no message content in response".into()))
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<Value, LmError> {
        if self.api_key.is_empty() {
            return Err(LmError::Config("OpenAI API key is empty".into()));
        }

        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                format_type: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: &request.schema_name,
                    strict: true,
                    schema: &request.response_schema,
                },
            },
        };

        let started = Instant::now();
        let text = with_retry(&self.retry, request.template.name(), || self.send(&body)).await?;

        debug!(
            template = request.template.name(),
            fingerprint = %request.template.fingerprint(),
            model = %self.model,
            duration_ms = started.elapsed().as_millis() as u64,
            "OpenAI completion finished"
        );

        parse_json_payload(&text)
    }
}

fn transport_error(e: reqwest::Error) -> LmError {
    if e.is_timeout() {
        LmError::Timeout
    } else {
        LmError::Transport(e.to_string())
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    response_format: ResponseFormat<'a>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    format_type: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    strict: bool,
    schema: &'a Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
