//! Normalization of streamed response frames.
//!
//! The wire allows several frame shapes; everything is folded into one
//! tagged union driven by the `kind` discriminator.  Unknown kinds and
//! unknown part shapes normalize to `Unknown` and yield no text — the
//! parser must never fail because of an unrecognized frame.

use serde_json::Value;

/// Maximum object depth searched for a continuity id.
const CONTEXT_ID_MAX_DEPTH: usize = 6;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Frame
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Task,
    StatusUpdate,
    ArtifactUpdate,
    Message,
    Unknown,
}

/// One normalized response frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub kind: FrameKind,
    /// Continuity id found anywhere in the frame (camelCase or snake_case).
    pub context_id: Option<String>,
    /// Content parts carried by the frame: artifact parts for
    /// artifact-update, message parts for message, status message parts
    /// for status-update.  Empty for task and unknown frames.
    pub parts: Vec<Part>,
}

impl Frame {
    /// Normalize one response envelope.
    ///
    /// The envelope is usually `{ "result": { "kind": ... } }`; a bare
    /// result object (no wrapper) is accepted too.
    pub fn parse(envelope: &Value) -> Frame {
        let result = envelope.get("result").unwrap_or(envelope);
        let context_id = find_context_id(envelope, 0);

        let kind = match result.get("kind").and_then(Value::as_str) {
            Some("task") => FrameKind::Task,
            Some("status-update") => FrameKind::StatusUpdate,
            Some("artifact-update") => FrameKind::ArtifactUpdate,
            Some("message") => FrameKind::Message,
            other => {
                if let Some(k) = other {
                    tracing::debug!(kind = k, "skipping frame with unknown kind");
                }
                FrameKind::Unknown
            }
        };

        let parts = match kind {
            FrameKind::ArtifactUpdate => parse_parts(result.get("artifact").and_then(|a| a.get("parts"))),
            FrameKind::Message => parse_parts(result.get("parts")),
            FrameKind::StatusUpdate => parse_parts(
                result
                    .get("status")
                    .and_then(|s| s.get("message"))
                    .and_then(|m| m.get("parts")),
            ),
            FrameKind::Task | FrameKind::Unknown => Vec::new(),
        };

        Frame {
            kind,
            context_id,
            parts,
        }
    }

    /// Concatenated visible text of this frame's parts.
    pub fn text(&self) -> String {
        self.parts.iter().filter_map(Part::text).collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Part
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One content part inside a frame.
#[derive(Debug, Clone)]
pub enum Part {
    Text(String),
    Data(Value),
    Unknown,
}

impl Part {
    fn parse(value: &Value) -> Part {
        match value.get("kind").and_then(Value::as_str) {
            Some("text") => match value.get("text").and_then(Value::as_str) {
                Some(text) => Part::Text(text.to_string()),
                None => Part::Unknown,
            },
            Some("data") => match value.get("data") {
                Some(data) => Part::Data(data.clone()),
                None => Part::Unknown,
            },
            _ => Part::Unknown,
        }
    }

    /// User-visible text of this part.
    ///
    /// Data parts probe `question`, then `message`, then `text`; when none
    /// of those is present the whole data object is serialized, so the
    /// caller still sees *something* rather than silence.
    pub fn text(&self) -> Option<String> {
        match self {
            Part::Text(text) => Some(text.clone()),
            Part::Data(data) => Some(data_text(data)),
            Part::Unknown => None,
        }
    }
}

fn parse_parts(parts: Option<&Value>) -> Vec<Part> {
    match parts.and_then(Value::as_array) {
        Some(items) => items.iter().map(Part::parse).collect(),
        None => Vec::new(),
    }
}

fn data_text(data: &Value) -> String {
    for key in ["question", "message", "text"] {
        if let Some(value) = data.get(key) {
            return match value.as_str() {
                Some(s) => s.to_string(),
                None => value.to_string(),
            };
        }
    }
    serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string())
}

/// Depth-first search for a continuity id under either spelling.
fn find_context_id(value: &Value, depth: usize) -> Option<String> {
    if depth > CONTEXT_ID_MAX_DEPTH {
        return None;
    }
    let obj = value.as_object()?;
    for key in ["contextId", "context_id"] {
        if let Some(id) = obj.get(key).and_then(Value::as_str) {
            if !id.is_empty() {
                return Some(id.to_string());
            }
        }
    }
    for nested in obj.values() {
        if nested.is_object() {
            if let Some(id) = find_context_id(nested, depth + 1) {
                return Some(id);
            }
        }
    }
    None
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn artifact_text_parts_concatenate() {
        let frame = Frame::parse(&json!({
            "result": {
                "kind": "artifact-update",
                "contextId": "ctx-1",
                "artifact": {
                    "parts": [
                        {"kind": "text", "text": "Hello "},
                        {"kind": "text", "text": "world"}
                    ]
                }
            }
        }));
        assert_eq!(frame.kind, FrameKind::ArtifactUpdate);
        assert_eq!(frame.text(), "Hello world");
        assert_eq!(frame.context_id.as_deref(), Some("ctx-1"));
    }

    #[test]
    fn data_part_prefers_question_then_message_then_text() {
        let q = Frame::parse(&json!({
            "result": {"kind": "artifact-update", "artifact": {"parts": [
                {"kind": "data", "data": {"question": "When?", "message": "no", "text": "no"}}
            ]}}
        }));
        assert_eq!(q.text(), "When?");

        let m = Frame::parse(&json!({
            "result": {"kind": "artifact-update", "artifact": {"parts": [
                {"kind": "data", "data": {"message": "Booked.", "text": "no"}}
            ]}}
        }));
        assert_eq!(m.text(), "Booked.");

        let t = Frame::parse(&json!({
            "result": {"kind": "artifact-update", "artifact": {"parts": [
                {"kind": "data", "data": {"text": "plain"}}
            ]}}
        }));
        assert_eq!(t.text(), "plain");
    }

    #[test]
    fn data_part_without_known_keys_serializes_whole_object() {
        let frame = Frame::parse(&json!({
            "result": {"kind": "artifact-update", "artifact": {"parts": [
                {"kind": "data", "data": {"slots": ["09:00", "09:45"]}}
            ]}}
        }));
        let text = frame.text();
        assert!(text.contains("slots"));
        assert!(text.contains("09:45"));
    }

    #[test]
    fn snake_case_context_id_accepted() {
        let frame = Frame::parse(&json!({
            "result": {"kind": "task", "context_id": "ctx-snake"}
        }));
        assert_eq!(frame.context_id.as_deref(), Some("ctx-snake"));
    }

    #[test]
    fn context_id_found_at_deep_nesting() {
        let frame = Frame::parse(&json!({
            "result": {
                "kind": "status-update",
                "status": {"message": {"contextId": "ctx-deep", "parts": []}}
            }
        }));
        assert_eq!(frame.context_id.as_deref(), Some("ctx-deep"));
    }

    #[test]
    fn missing_context_id_is_none() {
        let frame = Frame::parse(&json!({"result": {"kind": "task", "id": "t1"}}));
        assert!(frame.context_id.is_none());
    }

    #[test]
    fn unknown_kind_yields_no_text_and_no_error() {
        let frame = Frame::parse(&json!({
            "result": {"kind": "telemetry-blob", "payload": {"text": "hidden"}}
        }));
        assert_eq!(frame.kind, FrameKind::Unknown);
        assert!(frame.text().is_empty());
    }

    #[test]
    fn missing_kind_is_unknown() {
        let frame = Frame::parse(&json!({"result": {"artifact": {}}}));
        assert_eq!(frame.kind, FrameKind::Unknown);
    }

    #[test]
    fn bare_result_without_envelope_accepted() {
        let frame = Frame::parse(&json!({
            "kind": "artifact-update",
            "artifact": {"parts": [{"kind": "text", "text": "bare"}]}
        }));
        assert_eq!(frame.text(), "bare");
    }

    #[test]
    fn message_frame_parts_normalized() {
        let frame = Frame::parse(&json!({
            "result": {
                "kind": "message",
                "messageId": "m1",
                "parts": [{"kind": "text", "text": "direct reply"}]
            }
        }));
        assert_eq!(frame.kind, FrameKind::Message);
        assert_eq!(frame.text(), "direct reply");
    }

    #[test]
    fn status_update_parts_available_but_separate() {
        let frame = Frame::parse(&json!({
            "result": {
                "kind": "status-update",
                "status": {"state": "working", "message": {"parts": [
                    {"kind": "text", "text": "thinking..."}
                ]}}
            }
        }));
        assert_eq!(frame.kind, FrameKind::StatusUpdate);
        assert_eq!(frame.text(), "thinking...");
    }

    #[test]
    fn malformed_parts_are_skipped() {
        let frame = Frame::parse(&json!({
            "result": {"kind": "artifact-update", "artifact": {"parts": [
                {"kind": "text"},
                {"kind": "data"},
                {"kind": "audio", "bytes": "...."},
                {"kind": "text", "text": "kept"}
            ]}}
        }));
        assert_eq!(frame.text(), "kept");
    }

    #[test]
    fn non_object_envelope_is_unknown() {
        assert_eq!(Frame::parse(&json!("just a string")).kind, FrameKind::Unknown);
        assert_eq!(Frame::parse(&json!(42)).kind, FrameKind::Unknown);
        assert_eq!(Frame::parse(&json!(null)).kind, FrameKind::Unknown);
    }
}
