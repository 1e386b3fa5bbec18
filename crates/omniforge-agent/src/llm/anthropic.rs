//! [`ReasoningEngine`] backed by the Anthropic Messages API (non-streaming).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};

use super::ReasoningEngine;
use super::types::{
    Message, ReasoningOptions, ReasoningResponse, Role, StopReason, ToolCall, ToolDefinition,
    Usage,
};
use crate::error::{AgentError, Result};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default Anthropic API base URL.
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Connection settings for [`AnthropicEngine`].
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: String,
    /// HTTP request timeout.
    pub request_timeout: Duration,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: ANTHROPIC_BASE_URL.to_owned(),
            request_timeout: Duration::from_secs(120),
        }
    }

    /// Read the key from `ANTHROPIC_API_KEY`.
    pub fn from_env() -> Result<Self> {
        match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.trim().is_empty() => Ok(Self::new(key)),
            _ => Err(AgentError::MissingApiKey {
                provider: "anthropic".into(),
            }),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Calls `POST {base_url}/v1/messages` once per reasoning step.
#[derive(Debug, Clone)]
pub struct AnthropicEngine {
    config: AnthropicConfig,
    http: reqwest::Client,
}

impl AnthropicEngine {
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(AgentError::MissingApiKey {
                provider: "anthropic".into(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AgentError::ReasoningFailed {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { config, http })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.config.api_key).map_err(|e| {
                AgentError::ReasoningFailed {
                    reason: format!("invalid API key header: {e}"),
                }
            })?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait]
impl ReasoningEngine for AnthropicEngine {
    async fn call_llm(
        &self,
        transcript: &[Message],
        tools: &[ToolDefinition],
        options: &ReasoningOptions,
    ) -> Result<ReasoningResponse> {
        let body = build_request_body(transcript, tools, options);
        let url = format!("{}/v1/messages", self.config.base_url);

        tracing::debug!(
            url = %url,
            model = %options.model,
            messages = transcript.len(),
            tools = tools.len(),
            "sending reasoning request"
        );

        let resp = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| AgentError::ReasoningFailed {
                reason: format!("failed to read response body: {e}"),
            })?;

        if !status.is_success() {
            return Err(AgentError::ReasoningFailed {
                reason: format!("API returned {status}: {text}"),
            });
        }

        let v: Value =
            serde_json::from_str(&text).map_err(|e| AgentError::ReasoningParseFailed {
                reason: format!("invalid JSON response: {e}"),
            })?;

        parse_response(&v)
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

fn build_request_body(
    transcript: &[Message],
    tools: &[ToolDefinition],
    options: &ReasoningOptions,
) -> Value {
    let (system, messages) = messages_to_anthropic(transcript);

    let mut body = json!({
        "model": options.model,
        "max_tokens": options.max_tokens,
        "messages": messages,
    });
    if let Some(system) = system {
        body["system"] = json!(system);
    }
    if let Some(temp) = options.temperature {
        body["temperature"] = json!(temp);
    }
    if !tools.is_empty() {
        body["tools"] = tools_to_anthropic(tools);
    }
    body
}

/// Move system messages to the top-level `system` field and convert the
/// rest.  Consecutive tool observations are merged into one user turn, as
/// the API requires every `tool_result` for an assistant turn together.
fn messages_to_anthropic(messages: &[Message]) -> (Option<String>, Vec<Value>) {
    let mut system: Option<String> = None;
    let mut wire: Vec<Value> = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg.role {
            Role::System => match &mut system {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(&msg.content);
                }
                None => system = Some(msg.content.clone()),
            },
            Role::User => wire.push(json!({"role": "user", "content": msg.content})),
            Role::Assistant if msg.tool_calls.is_empty() => {
                wire.push(json!({"role": "assistant", "content": msg.content}));
            }
            Role::Assistant => {
                let mut content: Vec<Value> = Vec::new();
                if !msg.content.is_empty() {
                    content.push(json!({"type": "text", "text": msg.content}));
                }
                for tc in &msg.tool_calls {
                    content.push(json!({
                        "type": "tool_use",
                        "id": tc.id,
                        "name": tc.name,
                        "input": tc.arguments,
                    }));
                }
                wire.push(json!({"role": "assistant", "content": content}));
            }
            Role::Tool => {
                let block = json!({
                    "type": "tool_result",
                    "tool_use_id": msg.tool_call_id,
                    "content": msg.content,
                });
                let merged = wire.last().is_some_and(|last| {
                    last["role"] == "user"
                        && last["content"]
                            .as_array()
                            .and_then(|blocks| blocks.first())
                            .is_some_and(|b| b["type"] == "tool_result")
                });
                match wire.last_mut().and_then(|last| last["content"].as_array_mut()) {
                    Some(blocks) if merged => blocks.push(block),
                    _ => wire.push(json!({"role": "user", "content": [block]})),
                }
            }
        }
    }

    (system, wire)
}

fn tools_to_anthropic(tools: &[ToolDefinition]) -> Value {
    let tool_values: Vec<Value> = tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "input_schema": t.input_schema,
            })
        })
        .collect();
    json!(tool_values)
}

fn parse_response(v: &Value) -> Result<ReasoningResponse> {
    let content = v["content"]
        .as_array()
        .ok_or_else(|| AgentError::ReasoningParseFailed {
            reason: "missing `content` array in response".into(),
        })?;

    let mut text_parts: Vec<&str> = Vec::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();

    for block in content {
        match block["type"].as_str() {
            Some("text") => {
                if let Some(t) = block["text"].as_str() {
                    text_parts.push(t);
                }
            }
            Some("tool_use") => tool_calls.push(ToolCall {
                id: block["id"].as_str().unwrap_or_default().to_owned(),
                name: block["name"].as_str().unwrap_or_default().to_owned(),
                arguments: block["input"].clone(),
            }),
            _ => {}
        }
    }

    let usage = Usage {
        input_tokens: v["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32,
        output_tokens: v["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32,
    };
    let stop_reason = match v["stop_reason"].as_str() {
        Some(reason) => StopReason::parse(reason),
        None if tool_calls.is_empty() => StopReason::EndTurn,
        None => StopReason::ToolUse,
    };

    Ok(ReasoningResponse {
        content: text_parts.join(""),
        tool_calls,
        stop_reason,
        usage,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
