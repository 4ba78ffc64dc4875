//! Provider-agnostic chat calls over a `generateContent`-style wire format.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::error::{LlmError, LlmResult};
use crate::message::{ChatMessage, Role};

/// Hard deadline for a single gateway request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Sampling options for one chat call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 2000,
        }
    }
}

/// Abstraction over the LLM call for testability.
///
/// Production code uses [`HttpChatClient`]; tests inject a scripted fake
/// that returns predetermined responses.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send an ordered message list and return the assistant text.
    ///
    /// A syntactically valid but content-free provider response yields an
    /// empty string rather than an error; callers treat empty output as a
    /// generation failure at their own layer.
    async fn chat(&self, messages: &[ChatMessage], options: ChatOptions) -> LlmResult<String>;
}

/// Immutable gateway configuration, read once at startup.
///
/// Two instances exist in a deployment: one for conversational agents and
/// one (with a higher-quota key) for code generation and stage validation.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Provider base URL, e.g. `https://generativelanguage.googleapis.com`.
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

/// The production chat client.
#[derive(Debug, Clone)]
pub struct HttpChatClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl HttpChatClient {
    /// Create a client with the 60-second request deadline baked in.
    pub fn new(config: LlmConfig) -> LlmResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| LlmError::Transport {
                message: err.to_string(),
            })?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.api_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

/// Normalize an ordered message list to the provider wire format.
///
/// User and assistant turns become `contents` entries (assistant maps to
/// the provider's `model` role); the system message is folded into a
/// separate `system_instruction` field. When several system messages are
/// present the last one wins.
#[must_use]
pub fn build_payload(messages: &[ChatMessage], options: ChatOptions) -> Value {
    let mut contents = Vec::new();
    let mut system_instruction: Option<&str> = None;

    for message in messages {
        match message.role {
            Role::System => system_instruction = Some(&message.content),
            Role::User => contents.push(json!({
                "role": "user",
                "parts": [{"text": message.content}],
            })),
            Role::Assistant => contents.push(json!({
                "role": "model",
                "parts": [{"text": message.content}],
            })),
        }
    }

    let mut payload = json!({
        "contents": contents,
        "generationConfig": {
            "temperature": options.temperature,
            "maxOutputTokens": options.max_tokens,
        },
    });
    if let Some(instruction) = system_instruction {
        payload["system_instruction"] = json!({"parts": [{"text": instruction}]});
    }
    payload
}

/// Extract assistant text from the first candidate of a provider response.
///
/// Every missing piece degrades to an empty string instead of an error.
#[must_use]
pub fn extract_text(response: &Value) -> String {
    response
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.get(0))
        .and_then(|p| p.get("text"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn chat(&self, messages: &[ChatMessage], options: ChatOptions) -> LlmResult<String> {
        let payload = build_payload(messages, options);

        debug!(
            model = %self.config.model,
            messages = messages.len(),
            max_tokens = options.max_tokens,
            "chat request"
        );

        let response = self
            .http
            .post(self.endpoint())
            .query(&[("key", self.config.api_key.as_str())])
            .json(&payload)
            .send()
            .await
            .map_err(|err| LlmError::Transport {
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, "chat request failed");
            return Err(match status.as_u16() {
                401 | 403 => LlmError::Unauthorized {
                    message: format!("{status}: {body}"),
                },
                429 => LlmError::RateLimited {
                    message: format!("{status}: {body}"),
                },
                _ => LlmError::BadResponse {
                    message: format!("{status}: {body}"),
                },
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| LlmError::BadResponse {
                message: err.to_string(),
            })?;

        Ok(extract_text(&body))
    }
}
