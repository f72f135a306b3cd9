//! Anthropic-native adapter.
//!
//! Implements the Anthropic Messages API shape: system text goes in a
//! separate top-level `system` field, and the response carries an array
//! of content blocks.  There is no JSON response format switch, so
//! `json_mode` is enforced through an appended system instruction.

use serde_json::Value;

use ca_domain::config::LlmConfig;
use ca_domain::error::{Error, Result};
use ca_domain::tool::Role;

use crate::traits::{ChatRequest, ChatResponse, LlmProvider};
use crate::util::{from_reqwest, resolve_api_key};

const ANTHROPIC_VERSION: &str = "2023-06-01";

const DEFAULT_MAX_TOKENS: u32 = 4096;

/// An LM provider adapter for the Anthropic Messages API.
pub struct AnthropicProvider {
    base_url: String,
    api_key: String,
    default_model: String,
    default_temperature: f32,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a provider from the deserialized LM config.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = resolve_api_key(&config.auth)?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model: config.model.clone(),
            default_temperature: config.temperature,
            client,
        })
    }

    fn build_body(&self, req: &ChatRequest) -> Value {
        let model = req.model.clone().unwrap_or_else(|| self.default_model.clone());

        // Separate out system messages into the top-level field.
        let mut system_parts: Vec<String> = Vec::new();
        let mut api_messages: Vec<Value> = Vec::new();
        for msg in &req.messages {
            match msg.role {
                Role::System => system_parts.push(msg.content.clone()),
                Role::User => api_messages.push(serde_json::json!({
                    "role": "user",
                    "content": msg.content,
                })),
                Role::Assistant => api_messages.push(serde_json::json!({
                    "role": "assistant",
                    "content": [{"type": "text", "text": msg.content}],
                })),
            }
        }

        if req.json_mode {
            system_parts.push(
                "Respond with ONLY a single valid JSON object. No prose, no code fences.".into(),
            );
        }

        let mut body = serde_json::json!({
            "model": model,
            "messages": api_messages,
            "max_tokens": req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": req.temperature.unwrap_or(self.default_temperature),
        });
        if !system_parts.is_empty() {
            body["system"] = Value::String(system_parts.join("\n\n"));
        }
        body
    }
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_body(&req);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = response.status();
        let payload: Value = response.json().await.map_err(from_reqwest)?;

        if !status.is_success() {
            let detail = payload["error"]["message"]
                .as_str()
                .unwrap_or("no error detail")
                .to_string();
            return Err(Error::Http(format!("LM returned HTTP {status}: {detail}")));
        }

        // Concatenate the text content blocks.
        let content: String = payload["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b["type"] == "text")
                    .filter_map(|b| b["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        if content.is_empty() {
            return Err(Error::Parse("LM response carried no content".into()));
        }

        Ok(ChatResponse {
            content,
            model: payload["model"]
                .as_str()
                .unwrap_or(&self.default_model)
                .to_string(),
            finish_reason: payload["stop_reason"].as_str().map(str::to_string),
        })
    }

    fn provider_id(&self) -> &str {
        "anthropic"
    }
}
