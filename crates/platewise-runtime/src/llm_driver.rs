//! [`LlmDriver`] – OpenAI-compatible chat-completions client.
//!
//! Talks to any server exposing `POST /v1/chat/completions`: the hosted
//! OpenAI API, or a local model server such as Ollama
//! (`http://localhost:11434`).
//!
//! # Example
//!
//! ```rust,no_run
//! use platewise_runtime::llm_driver::{ChatMessage, LlmDriver, Role};
//!
//! let driver = LlmDriver::new("https://api.openai.com", "gpt-4o-mini")
//!     .with_api_key("sk-...");
//!
//! let messages = vec![
//!     ChatMessage::system("You recommend food."),
//!     ChatMessage::user("Something spicy under 300?"),
//! ];
//!
//! // Requires a reachable model server – skipped in unit tests.
//! // let reply = driver.complete(&messages, None).await?;
//! ```

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroizing;

// ─────────────────────────────────────────────────────────────────────────────
// Response guidelines
// ─────────────────────────────────────────────────────────────────────────────

/// Output rules appended to every system-role message so that each reply can
/// be parsed mechanically.
pub const RESPONSE_GUIDELINES: &str = "\
## Response Guidelines
- Reply with exactly one JSON object and nothing else.
- Only mention dish ids that appear in the data you were given.
- Never invent prices, ratings or dietary facts.
- Keep every rationale to one short sentence.";

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from LLM driver operations.
#[derive(Error, Debug)]
pub enum LlmError {
    /// The HTTP request to the model server failed (including timeouts and
    /// non-2xx statuses such as a rejected API key).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The response from the model server could not be parsed.
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
}

impl From<LlmError> for platewise_types::PlateError {
    fn from(e: LlmError) -> Self {
        platewise_types::PlateError::ExternalService(e.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Message types (OpenAI-compatible)
// ─────────────────────────────────────────────────────────────────────────────

/// The role of a participant in a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A named JSON Schema the reply must conform to.
#[derive(Debug, Clone)]
pub struct ResponseSchema {
    pub name: &'static str,
    pub schema: serde_json::Value,
}

impl ResponseSchema {
    /// Schema generated from `T`'s [`JsonSchema`] derive.
    pub fn of<T: JsonSchema>(name: &'static str) -> Self {
        let schema = serde_json::to_value(schemars::schema_for!(T))
            .unwrap_or(serde_json::Value::Null);
        Self { name, schema }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal request / response shapes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct NamedSchema<'a> {
    name: &'a str,
    schema: &'a serde_json::Value,
}

/// `response_format` field that enforces structured JSON Schema output.
#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: NamedSchema<'a>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat<'a>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Append [`RESPONSE_GUIDELINES`] to every system message, prepending a
/// guidelines-only system message when the caller supplied none.
fn with_guidelines(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut augmented: Vec<ChatMessage> = messages
        .iter()
        .map(|m| match m.role {
            Role::System => ChatMessage::system(format!("{}\n\n{}", m.content, RESPONSE_GUIDELINES)),
            _ => m.clone(),
        })
        .collect();
    if !augmented.iter().any(|m| m.role == Role::System) {
        augmented.insert(0, ChatMessage::system(RESPONSE_GUIDELINES));
    }
    augmented
}

// ─────────────────────────────────────────────────────────────────────────────
// LlmDriver
// ─────────────────────────────────────────────────────────────────────────────

/// An async client for an OpenAI-compatible chat-completions endpoint.
///
/// Construct once and reuse for every query.
pub struct LlmDriver {
    base_url: String,
    model: String,
    api_key: Option<Zeroizing<String>>,
    timeout: Option<Duration>,
    client: reqwest::Client,
}

impl std::fmt::Debug for LlmDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmDriver")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field(
                "api_key",
                if self.api_key.is_some() { &"<redacted>" } else { &"<not set>" },
            )
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl LlmDriver {
    /// Create a driver pointing at `base_url` (e.g. `"https://api.openai.com"`)
    /// and using `model` (e.g. `"gpt-4o-mini"`).
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
            timeout: None,
            client: reqwest::Client::new(),
        }
    }

    /// Send `Authorization: Bearer <key>` with every request.  An empty key
    /// is ignored.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        let key = Zeroizing::new(key.into());
        self.api_key = (!key.trim().is_empty()).then_some(key);
        self
    }

    /// Per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Send `messages` to the model and return the assistant's reply text.
    ///
    /// [`RESPONSE_GUIDELINES`] are appended to every [`Role::System`]
    /// message.  When `schema` is given it is sent as a `json_schema`
    /// `response_format` so that servers supporting structured output
    /// constrain the reply to it.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Http`] if the request fails or times out, or
    /// [`LlmError::BadResponse`] if the response shape is unexpected.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        schema: Option<&ResponseSchema>,
    ) -> Result<String, LlmError> {
        let augmented = with_guidelines(messages);
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: &augmented,
            stream: false,
            response_format: schema.map(|s| ResponseFormat {
                kind: "json_schema",
                json_schema: NamedSchema {
                    name: s.name,
                    schema: &s.schema,
                },
            }),
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.as_str());
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        debug!(model = %self.model, messages = augmented.len(), "sending chat completion");

        let response: ChatResponse = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::BadResponse("empty choices array".into()))
    }
}
