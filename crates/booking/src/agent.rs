//! The local booking agent: the LM-backed intermediary that formulates
//! each outbound utterance, plus the parsing of its emissions.
//!
//! An emission is preferably a JSON object with a typed control channel
//! (`{"message": ..., "handover": true, "reason": ...}`); free text is
//! accepted as-is, with a regex sweep that still catches the literal
//! handover clause in older agent outputs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;

use ca_domain::error::Result;
use ca_domain::tool::strip_code_fences;
use ca_providers::{ChatRequest, LlmProvider};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LocalAgent trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Seam between the negotiation loops and the local agent.  Production
/// uses [`BookingAgent`]; tests script the responses.
#[async_trait::async_trait]
pub trait LocalAgent: Send + Sync {
    /// One-time initialization (model warm-up, tool discovery).  Idempotent.
    async fn init(&self) -> Result<()>;

    /// Produce the agent's next raw utterance for a prompt.
    async fn utterance(&self, prompt: &str) -> Result<String>;

    fn name(&self) -> &str;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BookingAgent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// LM-backed booking agent.
pub struct BookingAgent {
    name: String,
    provider: Arc<dyn LlmProvider>,
    instructions: String,
    initialized: AtomicBool,
}

impl BookingAgent {
    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn LlmProvider>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            instructions: instructions.into(),
            initialized: AtomicBool::new(false),
        }
    }
}

#[async_trait::async_trait]
impl LocalAgent for BookingAgent {
    async fn init(&self) -> Result<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!(agent = %self.name, provider = self.provider.provider_id(), "booking agent initialized");
        Ok(())
    }

    async fn utterance(&self, prompt: &str) -> Result<String> {
        let response = self
            .provider
            .chat(ChatRequest::system_user(self.instructions.clone(), prompt))
            .await?;
        Ok(response.content)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Emission parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A parsed agent emission: the literal message to send plus the
/// optional handover control signal.
#[derive(Debug, Clone)]
pub struct AgentUtterance {
    pub message: String,
    pub handover: Option<HandoverRequest>,
}

#[derive(Debug, Clone)]
pub struct HandoverRequest {
    pub reason: String,
}

impl AgentUtterance {
    /// Parse a raw emission.
    ///
    /// Object-shaped emissions carry the message in `question`, then
    /// `message`, then `text` (falling back to the serialized object),
    /// and handover as a structured boolean field.  Free-text emissions
    /// are taken verbatim, with a regex scan for the literal
    /// `{"handover": true` clause — intent over strict form.
    pub fn parse(raw: &str) -> Self {
        let stripped = strip_code_fences(raw);

        if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(stripped) {
            let handover = if obj.get("handover").and_then(Value::as_bool) == Some(true) {
                Some(HandoverRequest {
                    reason: obj
                        .get("reason")
                        .and_then(Value::as_str)
                        .unwrap_or("agent requested handover")
                        .to_string(),
                })
            } else {
                None
            };

            let message = ["question", "message", "text"]
                .iter()
                .find_map(|key| obj.get(*key).and_then(Value::as_str))
                .map(str::to_string)
                .unwrap_or_else(|| {
                    Value::Object(obj.clone()).to_string()
                });

            return Self { message, handover };
        }

        // Free text: sweep for an embedded handover clause.
        let handover = detect_handover_in_text(raw);
        Self {
            message: raw.trim().to_string(),
            handover,
        }
    }
}

/// Regex fallback over free text: matches `{"handover": true` with either
/// quote style, case-insensitively, then tries to recover the reason from
/// the embedded object.
fn detect_handover_in_text(text: &str) -> Option<HandoverRequest> {
    static CLAUSE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    static OBJECT: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();

    let clause = CLAUSE.get_or_init(|| {
        regex::Regex::new(r#"(?i)\{\s*["']handover["']\s*:\s*true"#).expect("static regex")
    });
    if !clause.is_match(text) {
        return None;
    }

    let object = OBJECT.get_or_init(|| {
        regex::Regex::new(r#"\{[^{}]*"handover"[^{}]*\}"#).expect("static regex")
    });
    let reason = object
        .find(text)
        .and_then(|m| serde_json::from_str::<Value>(m.as_str()).ok())
        .and_then(|v| v.get("reason").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| "agent requested handover".to_string());

    Some(HandoverRequest { reason })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        let u = AgentUtterance::parse("Hi agent-beta, please schedule 30 minutes on Thursday.");
        assert_eq!(u.message, "Hi agent-beta, please schedule 30 minutes on Thursday.");
        assert!(u.handover.is_none());
    }

    #[test]
    fn object_prefers_question_then_message_then_text() {
        let u = AgentUtterance::parse(r#"{"question": "What time suits you?", "message": "no"}"#);
        assert_eq!(u.message, "What time suits you?");

        let u = AgentUtterance::parse(r#"{"message": "Let us meet Thursday."}"#);
        assert_eq!(u.message, "Let us meet Thursday.");

        let u = AgentUtterance::parse(r#"{"text": "fallback text"}"#);
        assert_eq!(u.message, "fallback text");
    }

    #[test]
    fn object_without_known_keys_serializes() {
        let u = AgentUtterance::parse(r#"{"proposal": {"day": "Thursday"}}"#);
        assert!(u.message.contains("proposal"));
        assert!(u.handover.is_none());
    }

    #[test]
    fn structured_handover_detected() {
        let u = AgentUtterance::parse(
            r#"{"handover": true, "reason": "peer asked clarifying questions", "message": "Please propose an alternative."}"#,
        );
        let handover = u.handover.expect("handover requested");
        assert_eq!(handover.reason, "peer asked clarifying questions");
        assert_eq!(u.message, "Please propose an alternative.");
    }

    #[test]
    fn handover_false_is_no_handover() {
        let u = AgentUtterance::parse(r#"{"handover": false, "message": "continuing"}"#);
        assert!(u.handover.is_none());
    }

    #[test]
    fn regex_fallback_finds_handover_in_free_text() {
        let raw = r#"{"handover": true, "reason": "peer asked clarifying questions"} Please propose an alternative 30m slot on Thursday."#;
        let u = AgentUtterance::parse(raw);
        let handover = u.handover.expect("handover detected in free text");
        assert_eq!(handover.reason, "peer asked clarifying questions");
        assert!(u.message.contains("Please propose an alternative"));
    }

    #[test]
    fn regex_fallback_tolerates_case_and_single_quotes() {
        let u = AgentUtterance::parse("prefix {'HANDOVER': true} suffix");
        assert!(u.handover.is_some());
        // Reason unrecoverable from single-quoted pseudo-JSON.
        assert_eq!(u.handover.unwrap().reason, "agent requested handover");
    }

    #[test]
    fn code_fences_stripped_before_parsing() {
        let raw = "```json\n{\"message\": \"fenced\"}\n```";
        let u = AgentUtterance::parse(raw);
        assert_eq!(u.message, "fenced");

        let raw = "```\n{\"message\": \"bare fence\"}\n```";
        assert_eq!(AgentUtterance::parse(raw).message, "bare fence");
    }

    #[test]
    fn fence_helper_leaves_plain_text_alone() {
        assert_eq!(strip_code_fences("  plain  "), "plain");
    }

    #[tokio::test]
    async fn booking_agent_init_is_idempotent() {
        let provider = Arc::new(ca_providers::ScriptedProvider::texts(&["hello"]));
        let agent = BookingAgent::new("booker", provider, "be helpful");
        agent.init().await.unwrap();
        agent.init().await.unwrap();
        assert_eq!(agent.name(), "booker");
    }

    #[tokio::test]
    async fn booking_agent_utterance_uses_instructions() {
        let provider = Arc::new(ca_providers::ScriptedProvider::texts(&["the message"]));
        let last = provider.last_request.clone();
        let agent = BookingAgent::new("booker", provider, "system rules");
        let out = agent.utterance("formulate greeting").await.unwrap();
        assert_eq!(out, "the message");
        let req = last.lock();
        let req = req.as_ref().unwrap();
        assert_eq!(req.messages[0].content, "system rules");
        assert_eq!(req.messages[1].content, "formulate greeting");
    }
}
