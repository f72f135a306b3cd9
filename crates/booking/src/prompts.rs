//! Prompt construction for the booking agent.
//!
//! The wording matters less than the contract: every supervised turn
//! carries the OPTIONAL HANDOVER clause, and the autonomous prompt
//! serializes the whole prior conversation so the agent can pick up
//! without the orchestrator.

use ca_calendar::BookingPreferences;

use crate::intent::MeetingIntent;
use crate::turn::ConversationTurn;

pub(crate) const HANDOVER_INSTRUCTION: &str = r#"
OPTIONAL HANDOVER: If you feel confident you can handle the rest of this conversation autonomously, you can request to take over. To do this, include in your response:
- A JSON object with {"handover": true, "reason": "brief explanation"}
- Then provide the message you want to send

If you don't request handover, just provide the message to send normally."#;

/// The standing context handed to the agent on every supervised turn.
pub(crate) fn booking_context(
    intent: &MeetingIntent,
    prefs: &BookingPreferences,
    target_agent_id: &str,
) -> String {
    let mut lines = vec![
        "You are helping to automatically book a meeting with another agent.".to_string(),
        format!("Target agent: {target_agent_id}"),
        String::new(),
        "Meeting preferences:".to_string(),
        intent.to_natural_language(),
        prefs.to_natural_language(),
        String::new(),
        "Your goal is to:".to_string(),
        "1. Communicate clearly and professionally with the target agent".to_string(),
        "2. Negotiate the best meeting time based on preferences".to_string(),
        "3. Handle any questions or requests for additional information".to_string(),
        "4. Confirm the booking once agreed upon".to_string(),
        String::new(),
        "Remember: you are representing a user who wants to schedule a meeting.".to_string(),
    ];
    if !prefs.instructions.is_empty() {
        lines.push(format!("Owner instructions: {}", prefs.instructions));
    }
    lines.join("\n")
}

/// Per-turn prompt for the supervised loop.
pub(crate) fn turn_prompt(turn: u32, conversation_context: &str) -> String {
    if turn == 1 {
        format!(
            "{conversation_context}\n\n\
             This is your first contact with the target agent. Craft a clear, professional booking request that includes:\n\
             1. A greeting\n\
             2. Your intent to schedule a meeting\n\
             3. The key preferences (date/time/duration if specified)\n\
             4. A polite request for their availability\n\n\
             Generate ONLY the message you want to send to the target agent. Do not include explanations or meta-commentary.{HANDOVER_INSTRUCTION}"
        )
    } else {
        format!(
            "{conversation_context}\n\n\
             Based on the target agent's latest response, formulate an appropriate reply that:\n\
             1. Addresses any questions they asked\n\
             2. Provides any requested information\n\
             3. Negotiates if needed\n\
             4. Moves toward confirming the booking\n\n\
             Generate ONLY the message you want to send to the target agent. Do not include explanations or meta-commentary.{HANDOVER_INSTRUCTION}"
        )
    }
}

/// Prompt for one autonomous turn: full prior conversation + preferences
/// + the directive to continue toward confirmation.
pub(crate) fn autonomous_prompt(
    target_agent_id: &str,
    endpoint: &str,
    intent: &MeetingIntent,
    prefs: &BookingPreferences,
    history: &[ConversationTurn],
    turn: u32,
    max_turns: u32,
) -> String {
    let mut lines = vec![
        "You are now in autonomous mode, managing the booking conversation directly.".to_string(),
        format!("Target agent: {target_agent_id}"),
        format!("Target endpoint: {endpoint}"),
        String::new(),
        "Previous conversation:".to_string(),
    ];
    for t in history {
        lines.push(format!("Turn {}:", t.turn_number));
        lines.push(format!("  You sent: {}", t.message_sent));
        lines.push(format!("  Target responded: {}", t.response_received));
        lines.push(String::new());
    }
    lines.extend([
        "Meeting preferences:".to_string(),
        intent.to_natural_language(),
        prefs.to_natural_language(),
        String::new(),
        format!("Current turn: {turn}/{max_turns}"),
        String::new(),
        "Based on the conversation so far, formulate your next message to the target agent.".to_string(),
        "Your message should:".to_string(),
        "1. Address any questions or requests from the target agent".to_string(),
        "2. Provide any needed information".to_string(),
        "3. Move toward confirming the booking".to_string(),
        "4. Be professional and clear".to_string(),
        String::new(),
        "Generate ONLY the message you want to send. Do not include explanations.".to_string(),
    ]);
    lines.join("\n")
}
