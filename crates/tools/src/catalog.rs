//! The tool catalog advertised to remote callers and to the LM behind
//! the natural-language dispatcher.

use serde_json::json;

use ca_domain::tool::ToolDefinition;

/// Every operation the calendar agent exposes.
pub fn catalog() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "requestAvailableSlots".into(),
            description: "Find available time slots within a date range, honoring the owner's \
                          preferred hours and buffer requirements."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "start_date": {"type": "string", "description": "ISO instant, start of the search window"},
                    "end_date": {"type": "string", "description": "ISO instant, end of the search window"},
                    "duration": {"type": "string", "description": "Meeting duration, e.g. '30m', '1h'", "default": "30m"},
                    "partner_agent_id": {"type": "string", "description": "Requesting agent, optional"},
                    "timezone": {"type": "string", "description": "IANA timezone for the preferred-hours check"},
                    "slot_granularity_minutes": {"type": "integer", "description": "Candidate slot spacing", "default": 30}
                },
                "required": ["start_date", "end_date"]
            }),
        },
        ToolDefinition {
            name: "requestBooking".into(),
            description: "Book a meeting at a specific time. Creates a proposed event unless an \
                          initial_status of accepted or confirmed is requested."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "start_time": {"type": "string", "description": "ISO instant"},
                    "duration": {"type": "string", "description": "e.g. '30m'"},
                    "partner_agent_id": {"type": "string"},
                    "initial_status": {"type": "string", "enum": ["proposed", "accepted", "confirmed"], "default": "proposed"}
                },
                "required": ["start_time", "duration", "partner_agent_id"]
            }),
        },
        ToolDefinition {
            name: "proposeMeeting".into(),
            description: "Alias of requestBooking: propose a meeting at a specific time.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "start_time": {"type": "string"},
                    "duration": {"type": "string"},
                    "partner_agent_id": {"type": "string"},
                    "initial_status": {"type": "string", "enum": ["proposed", "accepted", "confirmed"], "default": "proposed"}
                },
                "required": ["start_time", "duration", "partner_agent_id"]
            }),
        },
        ToolDefinition {
            name: "acceptMeeting".into(),
            description: "Accept a proposed meeting.".into(),
            parameters: event_id_params(),
        },
        ToolDefinition {
            name: "rejectMeeting".into(),
            description: "Reject a proposed meeting.".into(),
            parameters: event_id_params(),
        },
        ToolDefinition {
            name: "confirmMeeting".into(),
            description: "Confirm a proposed or accepted meeting.".into(),
            parameters: event_id_params(),
        },
        ToolDefinition {
            name: "cancelEvent".into(),
            description: "Remove an event from the calendar.".into(),
            parameters: event_id_params(),
        },
        ToolDefinition {
            name: "getCalendarEvents".into(),
            description: "List calendar events, optionally filtered by status.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "status": {"type": "string", "enum": ["proposed", "accepted", "rejected", "confirmed", "booked", "failed", "no_show"]}
                }
            }),
        },
        ToolDefinition {
            name: "getPendingRequests".into(),
            description: "List proposed and accepted (not yet confirmed) meetings.".into(),
            parameters: json!({"type": "object", "properties": {}}),
        },
        ToolDefinition {
            name: "getUpcomingEvents".into(),
            description: "List upcoming confirmed/accepted/booked meetings, soonest first.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "limit": {"type": "integer", "description": "Maximum number of events"}
                }
            }),
        },
    ]
}

fn event_id_params() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "event_id": {"type": "string"}
        },
        "required": ["event_id"]
    })
}
