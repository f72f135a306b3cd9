//! Deterministic mock providers for tests.
//!
//! The scripted provider pops one canned reply per `chat` call, so tests
//! can specify exact multi-turn agent behavior — including stalls, to
//! exercise deadline handling — without network access.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use ca_domain::error::{Error, Result};

use crate::traits::{ChatRequest, ChatResponse, LlmProvider};

/// One scripted reply.
#[derive(Debug, Clone)]
pub struct ScriptedReply {
    pub content: String,
    /// Artificial latency before the reply lands (deadline tests).
    pub delay: Duration,
}

impl ScriptedReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(content: impl Into<String>, delay: Duration) -> Self {
        Self {
            content: content.into(),
            delay,
        }
    }
}

/// A pre-scripted provider.  Each `chat` call pops the next reply from
/// the front of the queue; an exhausted script is an error, which makes
/// over-calling visible in tests.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<ScriptedReply>>,
    /// The last request seen, for prompt assertions.
    pub last_request: Arc<Mutex<Option<ChatRequest>>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Convenience: a provider that answers every call with `reply`-like
    /// entries, one per expected call.
    pub fn texts(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| ScriptedReply::text(*r)).collect())
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().len()
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        *self.last_request.lock() = Some(req);

        let reply = self
            .replies
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Other("scripted provider exhausted".into()))?;

        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }

        Ok(ChatResponse {
            content: reply.content,
            model: "scripted".into(),
            finish_reason: Some("stop".into()),
        })
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ca_domain::tool::Message;

    #[tokio::test]
    async fn pops_replies_in_order() {
        let provider = ScriptedProvider::texts(&["one", "two"]);
        let req = ChatRequest {
            messages: vec![Message::user("x")],
            ..Default::default()
        };
        assert_eq!(provider.chat(req.clone()).await.unwrap().content, "one");
        assert_eq!(provider.chat(req.clone()).await.unwrap().content, "two");
        assert!(provider.chat(req).await.is_err());
    }

    #[tokio::test]
    async fn records_last_request() {
        let provider = ScriptedProvider::texts(&["ok"]);
        let req = ChatRequest {
            messages: vec![Message::user("please schedule")],
            ..Default::default()
        };
        provider.chat(req).await.unwrap();
        let seen = provider.last_request.lock();
        assert!(seen.as_ref().unwrap().messages[0].content.contains("schedule"));
    }
}
