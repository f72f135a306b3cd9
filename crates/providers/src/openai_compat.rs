//! OpenAI-compatible adapter.
//!
//! Covers any backend speaking the `/chat/completions` wire format
//! (hosted OpenAI, vLLM, LM Studio, Ollama's compat endpoint, gateways).

use serde_json::Value;

use ca_domain::config::LlmConfig;
use ca_domain::error::{Error, Result};
use ca_domain::tool::Role;

use crate::traits::{ChatRequest, ChatResponse, LlmProvider};
use crate::util::{from_reqwest, resolve_api_key};

/// An LM provider adapter for OpenAI-compatible chat completion APIs.
pub struct OpenAiCompatProvider {
    base_url: String,
    api_key: String,
    default_model: String,
    default_temperature: f32,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
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

        let messages: Vec<Value> = req
            .messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": match m.role {
                        Role::System => "system",
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    "content": m.content,
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "temperature": req.temperature.unwrap_or(self.default_temperature),
        });
        if let Some(max_tokens) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if req.json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        body
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(&req);

        tracing::debug!(
            url = %url,
            messages = req.messages.len(),
            json_mode = req.json_mode,
            "LM chat request"
        );

        let mut http_req = self.client.post(&url).json(&body);
        if !self.api_key.is_empty() {
            http_req = http_req.bearer_auth(&self.api_key);
        }

        let response = http_req.send().await.map_err(from_reqwest)?;
        let status = response.status();
        let payload: Value = response.json().await.map_err(from_reqwest)?;

        if !status.is_success() {
            let detail = payload["error"]["message"]
                .as_str()
                .unwrap_or("no error detail")
                .to_string();
            return Err(Error::Http(format!("LM returned HTTP {status}: {detail}")));
        }

        let choice = &payload["choices"][0];
        let content = choice["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        if content.is_empty() {
            return Err(Error::Parse("LM response carried no content".into()));
        }

        Ok(ChatResponse {
            content,
            model: payload["model"]
                .as_str()
                .unwrap_or(&self.default_model)
                .to_string(),
            finish_reason: choice["finish_reason"].as_str().map(str::to_string),
        })
    }

    fn provider_id(&self) -> &str {
        "openai-compat"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ca_domain::config::{AuthConfig, AuthMode};
    use ca_domain::tool::Message;

    fn provider() -> OpenAiCompatProvider {
        let config = LlmConfig {
            auth: AuthConfig {
                mode: AuthMode::None,
                ..Default::default()
            },
            ..Default::default()
        };
        OpenAiCompatProvider::from_config(&config).unwrap()
    }

    #[test]
    fn body_includes_roles_and_temperature() {
        let p = provider();
        let req = ChatRequest {
            messages: vec![Message::system("be brief"), Message::user("hi")],
            temperature: Some(0.7),
            ..Default::default()
        };
        let body = p.build_body(&req);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["temperature"], 0.7);
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn json_mode_sets_response_format() {
        let p = provider();
        let req = ChatRequest {
            messages: vec![Message::user("emit json")],
            json_mode: true,
            ..Default::default()
        };
        let body = p.build_body(&req);
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn model_override_wins() {
        let p = provider();
        let req = ChatRequest {
            messages: vec![Message::user("x")],
            model: Some("local-8b".into()),
            ..Default::default()
        };
        assert_eq!(p.build_body(&req)["model"], "local-8b");
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let config = LlmConfig {
            base_url: "http://localhost:8000/v1/".into(),
            auth: AuthConfig {
                mode: AuthMode::None,
                ..Default::default()
            },
            ..Default::default()
        };
        let p = OpenAiCompatProvider::from_config(&config).unwrap();
        assert_eq!(p.base_url, "http://localhost:8000/v1");
    }
}
