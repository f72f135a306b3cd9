//! The outbound transport client: card discovery, message send, response
//! assembly.
//!
//! `send` is one call from the orchestrator's point of view: discover the
//! card, post the message (streaming when the peer advertises it), fold
//! every response frame into `(response_text, new_context_id)`.  The
//! caller's deadline bounds the whole exchange; expiry cancels the
//! in-flight I/O by dropping it.

use std::time::Duration;

use serde_json::{json, Value};
use uuid::Uuid;

use ca_domain::error::{Error, Result};

use crate::card::{card_url, AgentCard};
use crate::frame::{Frame, FrameKind};
use crate::sse::{drain_data_payloads, flush_remainder};
use crate::EMPTY_RESPONSE_PLACEHOLDER;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PeerTransport trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What the orchestrator got back from one exchange.
#[derive(Debug, Clone)]
pub struct PeerReply {
    pub text: String,
    /// Continuity id to pass back on the next send; carries the caller's
    /// id through unchanged when the peer did not return one.
    pub context_id: Option<String>,
}

/// Seam between the negotiation loops and the wire.  The production
/// implementation is [`PeerClient`]; tests substitute a scripted one.
#[async_trait::async_trait]
pub trait PeerTransport: Send + Sync {
    async fn send(
        &self,
        endpoint: &str,
        text: &str,
        context_id: Option<&str>,
        deadline: Duration,
    ) -> Result<PeerReply>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PeerClient
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// HTTP transport client for peer agents.
pub struct PeerClient {
    http: reqwest::Client,
    /// Allow disabling streaming even when the card advertises it.
    use_streaming: bool,
    card_timeout: Duration,
}

impl PeerClient {
    pub fn new(use_streaming: bool, card_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            http,
            use_streaming,
            card_timeout,
        })
    }

    /// Fetch and parse the peer's agent card.
    pub async fn discover(&self, endpoint: &str) -> Result<AgentCard> {
        let url = card_url(endpoint);
        tracing::debug!(%url, "fetching agent card");

        let response = self
            .http
            .get(&url)
            .timeout(self.card_timeout)
            .send()
            .await
            .map_err(|e| transport_err(endpoint, format!("card fetch failed: {e}")))?;

        if !response.status().is_success() {
            return Err(transport_err(
                endpoint,
                format!("card fetch returned HTTP {}", response.status()),
            ));
        }

        response
            .json::<AgentCard>()
            .await
            .map_err(|e| transport_err(endpoint, format!("card is not valid JSON: {e}")))
    }

    async fn send_inner(
        &self,
        endpoint: &str,
        text: &str,
        context_id: Option<&str>,
    ) -> Result<PeerReply> {
        let card = self.discover(endpoint).await?;
        let message_endpoint = card.message_endpoint(endpoint).to_string();
        let streaming = card.capabilities.streaming && self.use_streaming;

        tracing::info!(
            peer = %card.name,
            endpoint = %message_endpoint,
            streaming,
            chars = text.len(),
            "sending message to peer"
        );

        let envelope = build_envelope(text, context_id);
        let mut assembly = ResponseAssembly::new(context_id);

        if streaming {
            let response = self
                .http
                .post(&message_endpoint)
                .header("Accept", "text/event-stream")
                .json(&envelope)
                .send()
                .await
                .map_err(|e| transport_err(endpoint, e.to_string()))?;

            let mut response = error_for_status(endpoint, response)?;
            let mut buffer = String::new();
            loop {
                match response.chunk().await {
                    Ok(Some(bytes)) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        for payload in drain_data_payloads(&mut buffer) {
                            assembly.absorb_payload(&payload);
                        }
                    }
                    Ok(None) => {
                        for payload in flush_remainder(&mut buffer) {
                            assembly.absorb_payload(&payload);
                        }
                        break;
                    }
                    Err(e) => {
                        return Err(transport_err(endpoint, format!("stream read failed: {e}")))
                    }
                }
            }
        } else {
            let response = self
                .http
                .post(&message_endpoint)
                .json(&envelope)
                .send()
                .await
                .map_err(|e| transport_err(endpoint, e.to_string()))?;
            let response = error_for_status(endpoint, response)?;

            let body: Value = response
                .json()
                .await
                .map_err(|e| transport_err(endpoint, format!("response is not valid JSON: {e}")))?;
            assembly.absorb_envelope(&body);
        }

        Ok(assembly.finish())
    }
}

#[async_trait::async_trait]
impl PeerTransport for PeerClient {
    /// Send with a hard deadline.  On expiry the in-flight request is
    /// dropped (cancelling the socket) and the caller gets a timeout
    /// failure naming the peer.
    async fn send(
        &self,
        endpoint: &str,
        text: &str,
        context_id: Option<&str>,
        deadline: Duration,
    ) -> Result<PeerReply> {
        match tokio::time::timeout(deadline, self.send_inner(endpoint, text, context_id)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "peer {endpoint} timed out after {}s",
                deadline.as_secs()
            ))),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response assembly
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Folds frames into the final `(text, context_id)` pair.
///
/// Artifact frames are the primary carrier of user-visible content.
/// Message frames are extracted too (a non-streaming peer answers with a
/// single message result); status-update text is ignored by default, and
/// task/unknown frames contribute nothing.  Malformed payloads are
/// logged and skipped — a diagnostic must never abort the parse.
struct ResponseAssembly {
    text: String,
    context_id: Option<String>,
}

impl ResponseAssembly {
    fn new(initial_context_id: Option<&str>) -> Self {
        Self {
            text: String::new(),
            context_id: initial_context_id.map(str::to_string),
        }
    }

    fn absorb_payload(&mut self, payload: &str) {
        match serde_json::from_str::<Value>(payload) {
            Ok(envelope) => self.absorb_envelope(&envelope),
            Err(e) => {
                tracing::debug!(error = %e, "skipping undecodable stream payload");
            }
        }
    }

    fn absorb_envelope(&mut self, envelope: &Value) {
        let frame = Frame::parse(envelope);
        if let Some(id) = &frame.context_id {
            self.context_id = Some(id.clone());
        }
        match frame.kind {
            FrameKind::ArtifactUpdate | FrameKind::Message => {
                self.text.push_str(&frame.text());
            }
            FrameKind::StatusUpdate | FrameKind::Task | FrameKind::Unknown => {}
        }
    }

    fn finish(self) -> PeerReply {
        let text = if self.text.is_empty() {
            tracing::warn!("no text content extracted from peer response");
            EMPTY_RESPONSE_PLACEHOLDER.to_string()
        } else {
            self.text
        };
        PeerReply {
            text,
            context_id: self.context_id,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The request envelope: fresh request/message ids, a user role, one text
/// part, and the continuity id when the conversation already has one.
fn build_envelope(text: &str, context_id: Option<&str>) -> Value {
    let mut message = json!({
        "role": "user",
        "messageId": Uuid::new_v4().to_string(),
        "parts": [{ "kind": "text", "text": text }],
    });
    if let Some(ctx) = context_id {
        message["contextId"] = json!(ctx);
    }
    json!({
        "id": Uuid::new_v4().to_string(),
        "params": {
            "id": Uuid::new_v4().to_string(),
            "message": message,
        }
    })
}

fn transport_err(endpoint: &str, message: String) -> Error {
    Error::Transport {
        endpoint: endpoint.to_string(),
        message,
    }
}

fn error_for_status(endpoint: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(transport_err(endpoint, format!("peer returned HTTP {status}")))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
