//! The meeting the user wants booked, as handed to the orchestrator.

use serde::{Deserialize, Serialize};

/// Outbound meeting intent.  All fields are optional — the booking agent
/// negotiates whatever is unspecified.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeetingIntent {
    /// e.g. `"tomorrow"`, `"2025-11-07"`, `"Thursday"`.
    pub date: Option<String>,
    /// e.g. `"2pm"`, `"14:00"`.
    pub time: Option<String>,
    /// Duration string, e.g. `"30m"`.
    pub duration: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub partner_agent_id: Option<String>,
}

impl MeetingIntent {
    /// Render the intent as prose for the booking agent's prompt.
    pub fn to_natural_language(&self) -> String {
        let mut parts = Vec::new();
        if let Some(title) = &self.title {
            parts.push(format!("Meeting title: {title}"));
        }
        if let Some(description) = &self.description {
            parts.push(format!("Description: {description}"));
        }
        if let Some(date) = &self.date {
            parts.push(format!("Date: {date}"));
        }
        if let Some(time) = &self.time {
            parts.push(format!("Time: {time}"));
        }
        if let Some(duration) = &self.duration {
            parts.push(format!("Duration: {duration}"));
        }
        if let Some(partner) = &self.partner_agent_id {
            parts.push(format!("Partner agent: {partner}"));
        }
        if parts.is_empty() {
            return "Schedule a meeting".into();
        }
        parts.join(". ") + "."
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_intent_has_generic_text() {
        assert_eq!(MeetingIntent::default().to_natural_language(), "Schedule a meeting");
    }

    #[test]
    fn populated_intent_lists_fields() {
        let intent = MeetingIntent {
            date: Some("Thursday".into()),
            time: Some("10:00".into()),
            duration: Some("30m".into()),
            ..Default::default()
        };
        let text = intent.to_natural_language();
        assert!(text.contains("Date: Thursday"));
        assert!(text.contains("Time: 10:00"));
        assert!(text.contains("Duration: 30m"));
        assert!(text.ends_with('.'));
    }
}
