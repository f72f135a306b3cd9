//! Natural-language dispatch.
//!
//! A remote caller's free-form text goes to the LM together with the
//! tool catalog; the model emits a `{tool, arguments}` decision, which
//! is normalized and routed onto [`ToolDispatcher`].  Every failure path
//! — LM deadline, unparseable emission, tool deadline — comes back as a
//! plain-language string, never an error.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;

use ca_domain::tool::strip_code_fences;
use ca_providers::{ChatRequest, LlmProvider};

use crate::catalog::catalog;
use crate::dispatch::ToolDispatcher;

/// Deadline for the LM interpretation call.
const LM_DEADLINE: Duration = Duration::from_secs(30);

/// Deadline for executing the routed tool.
const TOOL_DEADLINE: Duration = Duration::from_secs(30);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// NlDispatcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct NlDispatcher {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolDispatcher>,
}

impl NlDispatcher {
    pub fn new(provider: Arc<dyn LlmProvider>, tools: Arc<ToolDispatcher>) -> Self {
        Self { provider, tools }
    }

    /// Interpret a free-form message and execute the chosen tool.
    /// Returns user-facing text, whatever happens.
    pub async fn dispatch_text(&self, message: &str, partner_agent_id: Option<&str>) -> String {
        let system_prompt = self.system_prompt(partner_agent_id);

        // First try with JSON mode; some backends reject response_format,
        // so fall back to prompt-enforced JSON.
        let emission = match self.interpret(&system_prompt, message, true).await {
            Ok(emission) => emission,
            Err(first_error) => {
                tracing::warn!(error = %first_error, "json-mode interpretation failed, retrying without");
                let retry_message = format!(
                    "{message}\n\nIMPORTANT: respond with ONLY a valid JSON object, no other \
                     text. Format: {{\"tool\": \"tool_name\", \"arguments\": {{...}}}}"
                );
                match self.interpret(&system_prompt, &retry_message, false).await {
                    Ok(emission) => emission,
                    Err(e) => {
                        tracing::error!(error = %e, "LM interpretation failed");
                        return "The request took too long to process or the language model \
                                was unavailable. Please try again with a simpler request."
                            .into();
                    }
                }
            }
        };

        // Normalize and parse the {tool, arguments} decision.
        let cleaned = strip_code_fences(&emission);
        let decision: Value = match serde_json::from_str(cleaned) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable LM emission");
                return format!(
                    "I understood your message, but had trouble processing it. Please try \
                     rephrasing. ({e})"
                );
            }
        };
        let Some(tool) = decision.get("tool").and_then(Value::as_str) else {
            return "I couldn't determine which action to take. Please be more specific about \
                    what you'd like to do."
                .into();
        };
        let arguments = decision.get("arguments").cloned().unwrap_or(Value::Null);

        tracing::info!(tool, "routing natural-language request");

        // The engine operations are quick, but the deadline is part of
        // the dispatcher's contract with the caller.
        let tools = self.tools.clone();
        let tool_name = tool.to_string();
        let result = tokio::time::timeout(TOOL_DEADLINE, async move {
            tools.dispatch(&tool_name, &arguments)
        })
        .await;

        match result {
            Ok(value) => {
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
            }
            Err(_) => format!(
                "The tool '{tool}' took too long to execute. Please try again."
            ),
        }
    }

    async fn interpret(
        &self,
        system_prompt: &str,
        message: &str,
        json_mode: bool,
    ) -> ca_domain::error::Result<String> {
        let request = ChatRequest {
            json_mode,
            temperature: Some(0.0),
            ..ChatRequest::system_user(system_prompt, format!("User message: {message}"))
        };
        match tokio::time::timeout(LM_DEADLINE, self.provider.chat(request)).await {
            Ok(Ok(response)) => Ok(response.content),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ca_domain::error::Error::Timeout(format!(
                "LM call timed out after {}s",
                LM_DEADLINE.as_secs()
            ))),
        }
    }

    fn system_prompt(&self, partner_agent_id: Option<&str>) -> String {
        let tools_json = serde_json::to_string_pretty(&catalog()).unwrap_or_default();
        let today = Utc::now().format("%Y-%m-%d");
        let tomorrow = (Utc::now() + chrono::Duration::days(1)).format("%Y-%m-%d");
        let partner = partner_agent_id.unwrap_or("unknown-partner");

        format!(
            r#"You are a helpful assistant that interprets user messages and calls the appropriate calendar tools.

Available tools:
{tools_json}

Current date: {today}
Tomorrow: {tomorrow}

When the user wants to book a meeting, use the partner_agent_id: {partner}

Your task:
1. Analyze the user's message
2. Determine which tool to call
3. Extract the required parameters from the message
4. Return a JSON object with:
   - "tool": tool name
   - "arguments": object with tool parameters

For date/time parsing:
- "tomorrow" means {tomorrow}
- Parse times like "2pm" to 24-hour format (14:00)
- Convert durations like "30 min" to "30m", "1 hour" to "1h"
- Use ISO format for instants: YYYY-MM-DDTHH:MM:SS

Example response:
{{
  "tool": "requestBooking",
  "arguments": {{
    "start_time": "{tomorrow}T14:00:00",
    "duration": "30m",
    "partner_agent_id": "{partner}"
  }}
}}"#
        )
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use ca_calendar::{BookingPreferences, CalendarEngine};
    use ca_providers::ScriptedProvider;

    fn nl(provider: ScriptedProvider) -> NlDispatcher {
        let tools = Arc::new(ToolDispatcher::new(
            Arc::new(CalendarEngine::new("owner")),
            BookingPreferences::default(),
        ));
        NlDispatcher::new(Arc::new(provider), tools)
    }

    #[tokio::test]
    async fn booking_request_routes_to_engine() {
        let provider = ScriptedProvider::texts(&[
            r#"{"tool": "requestBooking", "arguments": {"start_time": "2025-06-03T14:00:00", "duration": "30m", "partner_agent_id": "partner-Z"}}"#,
        ]);
        let dispatcher = nl(provider);
        let reply = dispatcher
            .dispatch_text("book a 30 minute meeting with partner-Z tomorrow at 2pm", Some("partner-Z"))
            .await;

        assert!(reply.contains("\"success\": true"), "{reply}");
        assert!(reply.contains("evt-"), "response should include the event id: {reply}");
        assert_eq!(dispatcher.tools.engine().len(), 1);
        assert_eq!(
            dispatcher.tools.engine().pending().len(),
            1,
            "event lands as proposed"
        );
    }

    #[tokio::test]
    async fn fenced_emission_is_normalized() {
        let provider = ScriptedProvider::texts(&[
            "```json\n{\"tool\": \"getPendingRequests\", \"arguments\": {}}\n```",
        ]);
        let reply = nl(provider).dispatch_text("anything pending?", None).await;
        assert!(reply.contains("\"count\""), "{reply}");
    }

    #[tokio::test]
    async fn garbage_emission_becomes_polite_error() {
        // Both the json-mode call and the fallback return non-JSON.
        let provider = ScriptedProvider::texts(&["sure, happy to help!"]);
        let reply = nl(provider).dispatch_text("do something", None).await;
        assert!(reply.contains("trouble processing"), "{reply}");
    }

    #[tokio::test]
    async fn missing_tool_field_asks_for_specifics() {
        let provider = ScriptedProvider::texts(&[r#"{"arguments": {}}"#]);
        let reply = nl(provider).dispatch_text("hmm", None).await;
        assert!(reply.contains("couldn't determine"), "{reply}");
    }

    #[tokio::test]
    async fn provider_failure_falls_back_then_reports() {
        // Exhausted script: both interpretation attempts error out.
        let provider = ScriptedProvider::texts(&[]);
        let reply = nl(provider).dispatch_text("book something", None).await;
        assert!(reply.contains("try again"), "{reply}");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_lm_hits_the_deadline_and_reports() {
        use ca_providers::mock::ScriptedReply;
        let provider = ScriptedProvider::new(vec![
            ScriptedReply::delayed("late", Duration::from_secs(3600)),
            ScriptedReply::delayed("late again", Duration::from_secs(3600)),
        ]);
        let reply = nl(provider).dispatch_text("book something", None).await;
        assert!(reply.contains("took too long"), "{reply}");
    }

    #[tokio::test]
    async fn unknown_tool_from_lm_surfaces_dispatcher_error() {
        let provider =
            ScriptedProvider::texts(&[r#"{"tool": "launchRocket", "arguments": {}}"#]);
        let reply = nl(provider).dispatch_text("to the moon", None).await;
        assert!(reply.contains("unknown tool"), "{reply}");
    }
}
