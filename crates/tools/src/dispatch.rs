//! Structured tool dispatch onto the calendar engine.
//!
//! Every operation returns a JSON value — `{success: false, error}` on
//! any problem — and never raises: the dispatcher sits on the inbound
//! boundary where a remote caller's malformed input must not become a
//! local fault.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde_json::{json, Value};

use ca_calendar::{BookingPreferences, CalendarEngine, Event, EventStatus};
use ca_domain::duration::parse_duration_minutes;
use ca_domain::time::parse_instant;

/// Default candidate-slot spacing for availability search.
const DEFAULT_SLOT_GRANULARITY_MINUTES: i64 = 30;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ToolDispatcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Routes named tool invocations onto the engine and the admission
/// policy.
pub struct ToolDispatcher {
    engine: Arc<CalendarEngine>,
    prefs: BookingPreferences,
}

impl ToolDispatcher {
    pub fn new(engine: Arc<CalendarEngine>, prefs: BookingPreferences) -> Self {
        Self { engine, prefs }
    }

    pub fn engine(&self) -> &CalendarEngine {
        &self.engine
    }

    pub fn preferences(&self) -> &BookingPreferences {
        &self.prefs
    }

    /// Route one tool invocation.  Unknown tools and bad arguments come
    /// back as `{success: false, error}`.
    pub fn dispatch(&self, tool: &str, args: &Value) -> Value {
        tracing::debug!(tool, "dispatching tool call");
        match tool {
            "requestAvailableSlots" => self.request_available_slots(args),
            "requestBooking" | "proposeMeeting" => self.request_booking(args),
            "acceptMeeting" => self.transition(args, |engine, id| engine.accept(id)),
            "rejectMeeting" => self.transition(args, |engine, id| engine.reject(id)),
            "confirmMeeting" => self.transition(args, |engine, id| engine.confirm(id)),
            "cancelEvent" => self.cancel_event(args),
            "getCalendarEvents" => self.get_calendar_events(args),
            "getPendingRequests" => events_response(self.engine.pending()),
            "getUpcomingEvents" => {
                let limit = args.get("limit").and_then(Value::as_u64).map(|l| l as usize);
                events_response(self.engine.upcoming(limit))
            }
            other => error_response(format!("unknown tool '{other}'")),
        }
    }

    // ── requestAvailableSlots ──────────────────────────────────────

    /// Walk the window at the requested granularity, emitting slots that
    /// sit inside the owner's preferred hours (interpreted in the given
    /// timezone) and keep the configured buffer from every blocking
    /// event.
    fn request_available_slots(&self, args: &Value) -> Value {
        let (start, end) = match (required_instant(args, "start_date"), required_instant(args, "end_date")) {
            (Ok(start), Ok(end)) => (start, end),
            (Err(e), _) | (_, Err(e)) => return error_response(e),
        };
        let duration = args
            .get("duration")
            .and_then(Value::as_str)
            .unwrap_or("30m");
        let duration_minutes = match parse_duration_minutes(duration) {
            Ok(m) => i64::from(m),
            Err(e) => return error_response(e.to_string()),
        };
        let granularity = args
            .get("slot_granularity_minutes")
            .and_then(Value::as_i64)
            .filter(|g| *g > 0)
            .unwrap_or(DEFAULT_SLOT_GRANULARITY_MINUTES);

        let tz_name = args
            .get("timezone")
            .and_then(Value::as_str)
            .unwrap_or(&self.prefs.timezone);
        let tz = match chrono_tz::Tz::from_str(tz_name) {
            Ok(tz) => tz,
            Err(_) => return error_response(format!("unknown timezone '{tz_name}'")),
        };

        let blocking: Vec<Event> = self
            .engine
            .all()
            .into_iter()
            .filter(|e| e.status.blocks_calendar())
            .collect();
        let buffer = if self.prefs.allow_back_to_back {
            Duration::zero()
        } else {
            Duration::minutes(i64::from(self.prefs.buffer_between_meetings))
        };

        let mut slots = Vec::new();
        let mut cursor = start;
        while cursor + Duration::minutes(duration_minutes) <= end {
            let slot_end = cursor + Duration::minutes(duration_minutes);
            if self.in_preferred_hours(cursor, duration_minutes, tz)
                && slot_is_free(&blocking, cursor, slot_end, buffer)
            {
                slots.push(json!({
                    "start": cursor.to_rfc3339(),
                    "end": slot_end.to_rfc3339(),
                    "duration_minutes": duration_minutes,
                }));
            }
            cursor += Duration::minutes(granularity);
        }

        json!({
            "available_slots": slots,
            "total_slots": slots.len(),
            "preferences_matched": true,
        })
    }

    /// Preferred-hours check against the local clock in `tz`: the slot
    /// must start inside the window (and on a preferred day) and must
    /// end no later than the window's exclusive edge.
    fn in_preferred_hours(&self, start: DateTime<Utc>, duration_minutes: i64, tz: chrono_tz::Tz) -> bool {
        let local = start.with_timezone(&tz);
        // Re-read the local wall clock as a UTC instant so the policy's
        // hour/weekday check applies to the timezone-local reading.
        if !self.prefs.is_preferred_time(local.naive_local().and_utc()) {
            return false;
        }
        let start_minutes = i64::from(local.hour() * 60 + local.minute());
        start_minutes + duration_minutes <= i64::from(self.prefs.preferred_end_hour * 60)
    }

    // ── requestBooking / proposeMeeting ────────────────────────────

    fn request_booking(&self, args: &Value) -> Value {
        let start = match required_instant(args, "start_time") {
            Ok(start) => start,
            Err(e) => return error_response(e),
        };
        let Some(duration) = args.get("duration").and_then(Value::as_str) else {
            return error_response("missing required argument 'duration'");
        };
        let Some(partner) = args.get("partner_agent_id").and_then(Value::as_str) else {
            return error_response("missing required argument 'partner_agent_id'");
        };

        if self.prefs.blocked_partners.iter().any(|p| p == partner) {
            return error_response(format!("partner {partner} is in the blocked list"));
        }

        let initial_status = args
            .get("initial_status")
            .and_then(Value::as_str)
            .unwrap_or("proposed");
        // Unknown status values fall back to proposed rather than failing.
        let target = EventStatus::from_str(initial_status).unwrap_or(EventStatus::Proposed);
        let target = match target {
            EventStatus::Proposed | EventStatus::Accepted | EventStatus::Confirmed => target,
            _ => EventStatus::Proposed,
        };

        let title = args
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string);

        let event = match self.engine.propose(start, duration, partner, title) {
            Ok(event) => event,
            Err(e) => return error_response(e.to_string()),
        };

        let event = match target {
            EventStatus::Proposed => event,
            EventStatus::Accepted => match self.engine.accept(&event.event_id) {
                Ok(Some(e)) => e,
                _ => event,
            },
            EventStatus::Confirmed => match self.engine.confirm(&event.event_id) {
                Ok(Some(e)) => e,
                _ => event,
            },
            _ => unreachable!("restricted above"),
        };

        json!({
            "success": true,
            "event_id": event.event_id,
            "start_time": event.start.to_rfc3339(),
            "duration": event.duration,
            "status": event.status.as_str(),
            "partner_agent_id": event.partner_agent_id,
            "matches_preferences": self.prefs.is_preferred_time(event.start),
        })
    }

    // ── Transitions ────────────────────────────────────────────────

    fn transition<F>(&self, args: &Value, op: F) -> Value
    where
        F: FnOnce(&CalendarEngine, &str) -> ca_domain::error::Result<Option<Event>>,
    {
        let Some(event_id) = args.get("event_id").and_then(Value::as_str) else {
            return error_response("missing required argument 'event_id'");
        };
        match op(&self.engine, event_id) {
            Ok(Some(event)) => json!({
                "success": true,
                "event": serde_json::to_value(&event).unwrap_or(Value::Null),
            }),
            Ok(None) => error_response(format!(
                "event {event_id} not found or transition not allowed"
            )),
            Err(e) => error_response(e.to_string()),
        }
    }

    fn cancel_event(&self, args: &Value) -> Value {
        let Some(event_id) = args.get("event_id").and_then(Value::as_str) else {
            return error_response("missing required argument 'event_id'");
        };
        match self.engine.remove(event_id) {
            Ok(true) => json!({"success": true, "event_id": event_id}),
            Ok(false) => error_response(format!("event {event_id} not found")),
            Err(e) => error_response(e.to_string()),
        }
    }

    // ── Reads ──────────────────────────────────────────────────────

    fn get_calendar_events(&self, args: &Value) -> Value {
        match args.get("status").and_then(Value::as_str) {
            Some(raw) => match EventStatus::from_str(raw) {
                Ok(status) => events_response(self.engine.by_status(status)),
                Err(e) => error_response(e.to_string()),
            },
            None => events_response(self.engine.all()),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn slot_is_free(
    blocking: &[Event],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    buffer: Duration,
) -> bool {
    for event in blocking {
        let Ok(event_end) = event.end() else {
            continue;
        };
        // Buffer-padded overlap check.
        if start < event_end + buffer && event.start - buffer < end {
            return false;
        }
    }
    true
}

fn required_instant(args: &Value, key: &str) -> std::result::Result<DateTime<Utc>, String> {
    let Some(raw) = args.get(key).and_then(Value::as_str) else {
        return Err(format!("missing required argument '{key}'"));
    };
    parse_instant(raw).map_err(|e| e.to_string())
}

fn events_response(events: Vec<Event>) -> Value {
    json!({
        "count": events.len(),
        "events": serde_json::to_value(&events).unwrap_or_else(|_| json!([])),
    })
}

fn error_response(message: impl Into<String>) -> Value {
    json!({"success": false, "error": message.into()})
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
