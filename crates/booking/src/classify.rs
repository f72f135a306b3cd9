//! Response classification: decide what a peer's reply means for the
//! negotiation by scanning for substring markers.
//!
//! Two passes exist and they disagree on purpose.  The supervised
//! orchestrator uses the strict pass, which checks completion markers
//! first (it is trying to reach success quickly) and does not treat a
//! bare "confirmed" as completion.  The autonomous loop uses the lenient
//! pass, which accepts looser completion markers but checks error
//! markers first so a clear rejection bails out instead of retrying
//! unsupervised.

use chrono::Utc;
use serde_json::{json, Value};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Markers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const STRICT_COMPLETION_MARKERS: &[&str] = &[
    "booking confirmed",
    "meeting scheduled",
    "event created",
    "successfully booked",
    "confirmed for",
    "meeting is set",
];

/// The autonomous pass additionally accepts these loose markers.
const LENIENT_COMPLETION_MARKERS: &[&str] = &["scheduled for", "confirmed"];

const ERROR_MARKERS: &[&str] = &[
    "cannot book",
    "unable to",
    "failed to",
    "error",
    "not available",
    "conflict",
    "no available slots",
    "declined",
    "rejected",
];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Analysis result
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The booking is done; stop with success.
    Complete,
    /// The peer signalled failure; stop with failure.
    Failed,
    /// The peer asked for more information; continue the loop.
    NeedsInfo,
    /// Nothing conclusive; continue the loop.
    Processing,
}

#[derive(Debug, Clone)]
pub struct ResponseAnalysis {
    pub disposition: Disposition,
    pub message: String,
    /// Topics the peer asked about (info-needed only).
    pub missing_info: Vec<String>,
    /// Confirmation payload (completion only).
    pub booking_details: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyPass {
    /// Orchestrator pass: completion wins ties, strict completion set.
    Strict,
    /// Autonomous pass: error wins ties, loose completion set.
    Lenient,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// classify
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn classify(response: &str, pass: ClassifyPass) -> ResponseAnalysis {
    let lower = response.to_lowercase();

    match pass {
        ClassifyPass::Strict => {
            if let Some(analysis) = completion(&lower, response, pass) {
                return analysis;
            }
            if let Some(analysis) = failure(&lower, response) {
                return analysis;
            }
        }
        ClassifyPass::Lenient => {
            if let Some(analysis) = failure(&lower, response) {
                return analysis;
            }
            if let Some(analysis) = completion(&lower, response, pass) {
                return analysis;
            }
        }
    }

    if let Some(analysis) = info_needed(&lower, response) {
        return analysis;
    }

    ResponseAnalysis {
        disposition: Disposition::Processing,
        message: "peer is processing the request".into(),
        missing_info: Vec::new(),
        booking_details: None,
    }
}

fn completion(lower: &str, response: &str, pass: ClassifyPass) -> Option<ResponseAnalysis> {
    let matched = STRICT_COMPLETION_MARKERS.iter().any(|m| lower.contains(m))
        || (pass == ClassifyPass::Lenient
            && LENIENT_COMPLETION_MARKERS.iter().any(|m| lower.contains(m)));
    if !matched {
        return None;
    }
    Some(ResponseAnalysis {
        disposition: Disposition::Complete,
        message: "meeting booked successfully".into(),
        missing_info: Vec::new(),
        booking_details: Some(json!({
            "confirmation_message": response,
            "timestamp": Utc::now().to_rfc3339(),
        })),
    })
}

fn failure(lower: &str, response: &str) -> Option<ResponseAnalysis> {
    if !ERROR_MARKERS.iter().any(|m| lower.contains(m)) {
        return None;
    }
    Some(ResponseAnalysis {
        disposition: Disposition::Failed,
        message: crate::turn::preview(response, 200),
        missing_info: Vec::new(),
        booking_details: None,
    })
}

fn info_needed(lower: &str, response: &str) -> Option<ResponseAnalysis> {
    let has_question = response.contains('?');
    let mut missing = Vec::new();

    for topic in ["time", "date", "duration"] {
        if has_question && lower.contains(topic) {
            missing.push(topic.to_string());
        }
    }
    if lower.contains("partner") || lower.contains("agent id") {
        missing.push("partner_agent_id".to_string());
    }

    if missing.is_empty() {
        return None;
    }
    Some(ResponseAnalysis {
        disposition: Disposition::NeedsInfo,
        message: format!("peer needs: {}", missing.join(", ")),
        missing_info: missing,
        booking_details: None,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_completion_markers() {
        for text in [
            "Booking confirmed for Thursday.",
            "Great news, meeting scheduled!",
            "Event created with id evt-1.",
            "This slot was successfully booked.",
            "Confirmed for 14:00.",
            "Your meeting is set.",
        ] {
            let a = classify(text, ClassifyPass::Strict);
            assert_eq!(a.disposition, Disposition::Complete, "{text}");
            assert!(a.booking_details.is_some());
        }
    }

    #[test]
    fn bare_confirmed_not_completion_in_strict_pass() {
        let a = classify("Confirmed.", ClassifyPass::Strict);
        assert_ne!(a.disposition, Disposition::Complete);

        let a = classify("Confirmed.", ClassifyPass::Lenient);
        assert_eq!(a.disposition, Disposition::Complete);
    }

    #[test]
    fn scheduled_for_only_matches_lenient() {
        let a = classify("It is scheduled for Monday.", ClassifyPass::Strict);
        assert_eq!(a.disposition, Disposition::Processing);

        let a = classify("It is scheduled for Monday.", ClassifyPass::Lenient);
        assert_eq!(a.disposition, Disposition::Complete);
    }

    #[test]
    fn error_markers_detected() {
        for text in [
            "I cannot book that slot.",
            "Unable to schedule.",
            "There was an error processing the request.",
            "That time is not available.",
            "This conflicts with another meeting — conflict.",
            "no available slots this week",
            "The invitation was declined.",
            "Your proposal was rejected.",
        ] {
            let a = classify(text, ClassifyPass::Strict);
            assert_eq!(a.disposition, Disposition::Failed, "{text}");
        }
    }

    #[test]
    fn tie_resolution_differs_by_pass() {
        // Both a completion and an error marker present.
        let text = "Booking confirmed, although an earlier attempt hit an error.";
        assert_eq!(
            classify(text, ClassifyPass::Strict).disposition,
            Disposition::Complete,
            "orchestrator pass: completion wins"
        );
        assert_eq!(
            classify(text, ClassifyPass::Lenient).disposition,
            Disposition::Failed,
            "autonomous pass: error wins"
        );
    }

    #[test]
    fn info_needed_topics_accumulate() {
        let a = classify(
            "What time works for you, and what duration did you have in mind?",
            ClassifyPass::Strict,
        );
        assert_eq!(a.disposition, Disposition::NeedsInfo);
        assert_eq!(a.missing_info, vec!["time", "duration"]);
        assert!(a.message.contains("time"));
    }

    #[test]
    fn partner_topic_needs_no_question_mark() {
        let a = classify("Please provide your partner agent id", ClassifyPass::Strict);
        assert_eq!(a.disposition, Disposition::NeedsInfo);
        assert_eq!(a.missing_info, vec!["partner_agent_id"]);
    }

    #[test]
    fn topic_without_question_mark_is_processing() {
        let a = classify("I will look into a good time slot.", ClassifyPass::Strict);
        assert_eq!(a.disposition, Disposition::Processing);
    }

    #[test]
    fn neutral_text_is_processing() {
        let a = classify("Let me check the calendar.", ClassifyPass::Lenient);
        assert_eq!(a.disposition, Disposition::Processing);
    }

    #[test]
    fn error_message_is_truncated_preview() {
        let long = format!("cannot book because {}", "x".repeat(400));
        let a = classify(&long, ClassifyPass::Strict);
        assert_eq!(a.disposition, Disposition::Failed);
        assert!(a.message.chars().count() <= 203);
    }
}
