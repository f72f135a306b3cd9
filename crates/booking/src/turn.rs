//! Conversation turns and the per-negotiation volatile state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ConversationTurn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One exchange with the peer: the outbound message, the (possibly
/// empty) response, and when it happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub turn_number: u32,
    pub message_sent: String,
    pub response_received: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: TurnMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnMetadata {
    /// Set on turns driven by the autonomous continuation loop.
    #[serde(default)]
    pub autonomous: bool,
    /// Set on the supervised turn whose utterance requested handover
    /// (that message is recorded here; the send happens autonomously).
    #[serde(default)]
    pub handover_request: bool,
    /// Preview of the agent's raw emission for this turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_analysis: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ConversationState
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Volatile per-negotiation state.  Owned by the orchestrator (or the
/// autonomous loop it yields to) and discarded when the top-level call
/// returns; never shared across negotiations.
#[derive(Debug, Clone)]
pub struct ConversationState {
    pub current_turn: u32,
    pub max_turns: u32,
    pub booking_complete: bool,
    /// Opaque continuity id from the peer; passed back on every send.
    pub target_context_id: Option<String>,
    pub history: Vec<ConversationTurn>,
    pub handover_occurred: bool,
}

impl ConversationState {
    pub fn new(max_turns: u32) -> Self {
        Self {
            current_turn: 0,
            max_turns,
            booking_complete: false,
            target_context_id: None,
            history: Vec::new(),
            handover_occurred: false,
        }
    }

    /// Append a turn with the next monotonic number.
    pub fn record(
        &mut self,
        message_sent: String,
        response_received: String,
        metadata: TurnMetadata,
    ) -> &ConversationTurn {
        let turn_number = self.history.last().map(|t| t.turn_number).unwrap_or(0) + 1;
        self.history.push(ConversationTurn {
            turn_number,
            message_sent,
            response_received,
            timestamp: Utc::now(),
            metadata,
        });
        self.history.last().expect("just pushed")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Summary rendering
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Human-readable summary of a conversation, for the CLI and logs.
pub fn conversation_summary(history: &[ConversationTurn]) -> String {
    if history.is_empty() {
        return "No conversation yet.".into();
    }

    let mut lines = vec![format!("Conversation summary ({} turns):", history.len())];
    for turn in history {
        let tag = if turn.metadata.autonomous {
            " [autonomous]"
        } else {
            ""
        };
        lines.push(format!(
            "turn {}{} ({})",
            turn.turn_number,
            tag,
            turn.timestamp.format("%H:%M:%S")
        ));
        lines.push(format!("  sent: {}", preview(&turn.message_sent, 100)));
        lines.push(format!("  received: {}", preview(&turn.response_received, 100)));
    }
    lines.join("\n")
}

pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
