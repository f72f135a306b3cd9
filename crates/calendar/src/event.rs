use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use ca_domain::duration::parse_duration_minutes;
use ca_domain::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Status machine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Lifecycle stage of a calendar event in the negotiation process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Proposed,
    Accepted,
    Rejected,
    Confirmed,
    Booked,
    Failed,
    NoShow,
}

impl EventStatus {
    /// Only accepted/confirmed/booked events block the calendar for
    /// conflict and availability purposes.
    pub fn blocks_calendar(self) -> bool {
        matches!(
            self,
            EventStatus::Accepted | EventStatus::Confirmed | EventStatus::Booked
        )
    }

    /// Terminal states: no transition out except removal.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EventStatus::Rejected | EventStatus::Failed | EventStatus::NoShow
        )
    }

    /// Whether a transition into `next` is legal from this status.
    ///
    /// `accept`/`reject` only apply to proposed events, `confirm` to
    /// proposed or accepted ones, `booked` to any non-terminal state, and
    /// `failed`/`no_show` to any state.  Everything else is a silent
    /// no-change at the engine level, not an error.
    pub fn allows(self, next: EventStatus) -> bool {
        match next {
            EventStatus::Accepted | EventStatus::Rejected => self == EventStatus::Proposed,
            EventStatus::Confirmed => {
                matches!(self, EventStatus::Proposed | EventStatus::Accepted)
            }
            EventStatus::Booked => !self.is_terminal(),
            EventStatus::Failed | EventStatus::NoShow => true,
            EventStatus::Proposed => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Proposed => "proposed",
            EventStatus::Accepted => "accepted",
            EventStatus::Rejected => "rejected",
            EventStatus::Confirmed => "confirmed",
            EventStatus::Booked => "booked",
            EventStatus::Failed => "failed",
            EventStatus::NoShow => "no_show",
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "proposed" => Ok(EventStatus::Proposed),
            "accepted" => Ok(EventStatus::Accepted),
            "rejected" => Ok(EventStatus::Rejected),
            "confirmed" => Ok(EventStatus::Confirmed),
            "booked" => Ok(EventStatus::Booked),
            "failed" => Ok(EventStatus::Failed),
            "no_show" | "no-show" => Ok(EventStatus::NoShow),
            other => Err(Error::Parse(format!("unknown event status '{other}'"))),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A calendar event/meeting — the unit of scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    /// Absolute start instant.
    pub start: DateTime<Utc>,
    /// Duration string, e.g. `"30m"`, `"1h"`.  Validated at construction.
    pub duration: String,
    pub status: EventStatus,
    pub partner_agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Construct a proposed event with a fresh short id.
    ///
    /// Fails if the duration string does not parse to positive minutes.
    pub fn new(
        start: DateTime<Utc>,
        duration: impl Into<String>,
        partner_agent_id: impl Into<String>,
        title: Option<String>,
    ) -> Result<Self> {
        let duration = duration.into();
        parse_duration_minutes(&duration)?;
        let now = Utc::now();
        Ok(Self {
            event_id: new_event_id(),
            start,
            duration,
            status: EventStatus::Proposed,
            partner_agent_id: partner_agent_id.into(),
            title,
            created_at: now,
            updated_at: now,
        })
    }

    /// Duration in minutes (re-parsed from the stored string).
    pub fn duration_minutes(&self) -> Result<u32> {
        parse_duration_minutes(&self.duration)
    }

    /// End instant: start + duration.
    pub fn end(&self) -> Result<DateTime<Utc>> {
        Ok(self.start + Duration::minutes(i64::from(self.duration_minutes()?)))
    }

    /// Overlap rule: `A.start < B.end ∧ B.start < A.end`.
    ///
    /// Back-to-back events (one ends exactly where the other starts) do
    /// not overlap; zero-length events never overlap.
    pub fn overlaps(&self, other: &Event) -> Result<bool> {
        Ok(self.start < other.end()? && other.start < self.end()?)
    }

    /// Apply a status transition, refreshing `updated_at` iff the status
    /// actually changes.  Returns `false` when the transition is not legal
    /// from the current status.
    pub(crate) fn transition(&mut self, next: EventStatus) -> bool {
        if !self.status.allows(next) {
            tracing::debug!(
                event_id = %self.event_id,
                from = %self.status,
                to = %next,
                "ignoring illegal status transition"
            );
            return false;
        }
        if self.status != next {
            self.status = next;
            self.updated_at = Utc::now();
        }
        true
    }
}

/// Short opaque event id: `evt-` + 8 hex chars.
pub(crate) fn new_event_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("evt-{}", &hex[..8])
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, hour, min, 0).unwrap()
    }

    #[test]
    fn new_event_is_proposed_with_short_id() {
        let e = Event::new(at(10, 0), "30m", "agent-beta", None).unwrap();
        assert_eq!(e.status, EventStatus::Proposed);
        assert!(e.event_id.starts_with("evt-"));
        assert_eq!(e.event_id.len(), 12);
        assert_eq!(e.updated_at, e.created_at);
    }

    #[test]
    fn new_event_rejects_bad_duration() {
        assert!(Event::new(at(10, 0), "whenever", "p", None).is_err());
        assert!(Event::new(at(10, 0), "0m", "p", None).is_err());
    }

    #[test]
    fn end_is_start_plus_duration() {
        let e = Event::new(at(10, 0), "45m", "p", None).unwrap();
        assert_eq!(e.end().unwrap(), at(10, 45));
    }

    #[test]
    fn overlap_mid_interval() {
        let a = Event::new(at(10, 0), "30m", "p", None).unwrap();
        let b = Event::new(at(10, 15), "30m", "p", None).unwrap();
        assert!(a.overlaps(&b).unwrap());
        assert!(b.overlaps(&a).unwrap());
    }

    #[test]
    fn back_to_back_is_not_overlap() {
        let a = Event::new(at(10, 0), "30m", "p", None).unwrap();
        let b = Event::new(at(10, 30), "30m", "p", None).unwrap();
        assert!(!a.overlaps(&b).unwrap());
        assert!(!b.overlaps(&a).unwrap());
    }

    #[test]
    fn status_blocking_set() {
        assert!(EventStatus::Accepted.blocks_calendar());
        assert!(EventStatus::Confirmed.blocks_calendar());
        assert!(EventStatus::Booked.blocks_calendar());
        assert!(!EventStatus::Proposed.blocks_calendar());
        assert!(!EventStatus::Rejected.blocks_calendar());
        assert!(!EventStatus::Failed.blocks_calendar());
        assert!(!EventStatus::NoShow.blocks_calendar());
    }

    #[test]
    fn accept_only_from_proposed() {
        assert!(EventStatus::Proposed.allows(EventStatus::Accepted));
        assert!(!EventStatus::Accepted.allows(EventStatus::Accepted));
        assert!(!EventStatus::Confirmed.allows(EventStatus::Accepted));
        assert!(!EventStatus::Rejected.allows(EventStatus::Accepted));
    }

    #[test]
    fn confirm_from_proposed_or_accepted() {
        assert!(EventStatus::Proposed.allows(EventStatus::Confirmed));
        assert!(EventStatus::Accepted.allows(EventStatus::Confirmed));
        assert!(!EventStatus::Booked.allows(EventStatus::Confirmed));
        assert!(!EventStatus::Failed.allows(EventStatus::Confirmed));
    }

    #[test]
    fn booked_from_any_non_terminal() {
        assert!(EventStatus::Proposed.allows(EventStatus::Booked));
        assert!(EventStatus::Accepted.allows(EventStatus::Booked));
        assert!(EventStatus::Confirmed.allows(EventStatus::Booked));
        assert!(!EventStatus::Rejected.allows(EventStatus::Booked));
        assert!(!EventStatus::NoShow.allows(EventStatus::Booked));
    }

    #[test]
    fn failed_and_no_show_from_anywhere() {
        for s in [
            EventStatus::Proposed,
            EventStatus::Accepted,
            EventStatus::Confirmed,
            EventStatus::Booked,
            EventStatus::Rejected,
            EventStatus::Failed,
            EventStatus::NoShow,
        ] {
            assert!(s.allows(EventStatus::Failed));
            assert!(s.allows(EventStatus::NoShow));
        }
    }

    #[test]
    fn transition_refreshes_updated_at_only_on_change() {
        let mut e = Event::new(at(10, 0), "30m", "p", None).unwrap();
        let before = e.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(5));

        assert!(e.transition(EventStatus::Accepted));
        assert!(e.updated_at > before);

        // Failed → Failed is legal but changes nothing.
        e.transition(EventStatus::Failed);
        let after_fail = e.updated_at;
        assert!(e.transition(EventStatus::Failed));
        assert_eq!(e.updated_at, after_fail);
    }

    #[test]
    fn illegal_transition_leaves_event_untouched() {
        let mut e = Event::new(at(10, 0), "30m", "p", None).unwrap();
        e.transition(EventStatus::Rejected);
        let stamp = e.updated_at;
        assert!(!e.transition(EventStatus::Accepted));
        assert_eq!(e.status, EventStatus::Rejected);
        assert_eq!(e.updated_at, stamp);
    }

    #[test]
    fn status_round_trips_serde() {
        let json = serde_json::to_string(&EventStatus::NoShow).unwrap();
        assert_eq!(json, r#""no_show""#);
        let back: EventStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EventStatus::NoShow);
    }

    #[test]
    fn status_from_str_accepts_both_no_show_spellings() {
        assert_eq!("no_show".parse::<EventStatus>().unwrap(), EventStatus::NoShow);
        assert_eq!("no-show".parse::<EventStatus>().unwrap(), EventStatus::NoShow);
        assert!("banana".parse::<EventStatus>().is_err());
    }
}
