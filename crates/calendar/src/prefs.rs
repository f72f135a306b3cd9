//! Booking preferences: the admission policy consulted before accepting
//! a meeting, plus the natural-language rendering injected into agent
//! prompts.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

use ca_domain::duration::parse_duration_minutes;
use ca_domain::error::{Error, Result};

use crate::event::Event;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BookingPreferences
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How the calendar agent should book meetings on the owner's behalf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingPreferences {
    // Time preferences (24-hour clock; inclusive start, exclusive end).
    #[serde(default = "d_start_hour")]
    pub preferred_start_hour: u32,
    #[serde(default = "d_end_hour")]
    pub preferred_end_hour: u32,
    /// Weekday names; empty means any day is fine.
    #[serde(default = "d_weekdays")]
    pub preferred_days: Vec<String>,

    // Duration envelope.
    #[serde(default = "d_preferred_duration")]
    pub preferred_duration: String,
    #[serde(default = "d_min_duration")]
    pub min_duration: String,
    #[serde(default = "d_max_duration")]
    pub max_duration: String,

    // Scheduling constraints.
    #[serde(default = "d_buffer")]
    pub buffer_between_meetings: u32,
    #[serde(default = "d_max_per_day")]
    pub max_meetings_per_day: usize,
    #[serde(default = "d_max_per_week")]
    pub max_meetings_per_week: usize,
    #[serde(default)]
    pub allow_back_to_back: bool,

    // Partner admission lists.
    #[serde(default)]
    pub preferred_partners: Vec<String>,
    #[serde(default)]
    pub blocked_partners: Vec<String>,
    #[serde(default = "d_true")]
    pub allow_new_partners: bool,

    /// Minimum trust score to accept, in `[0.0, 1.0]`.
    #[serde(default)]
    pub min_trust_score: f64,

    #[serde(default = "d_timezone")]
    pub timezone: String,

    /// Free-form operator instructions carried verbatim into agent prompts.
    #[serde(default)]
    pub instructions: String,
}

impl Default for BookingPreferences {
    fn default() -> Self {
        Self {
            preferred_start_hour: d_start_hour(),
            preferred_end_hour: d_end_hour(),
            preferred_days: d_weekdays(),
            preferred_duration: d_preferred_duration(),
            min_duration: d_min_duration(),
            max_duration: d_max_duration(),
            buffer_between_meetings: d_buffer(),
            max_meetings_per_day: d_max_per_day(),
            max_meetings_per_week: d_max_per_week(),
            allow_back_to_back: false,
            preferred_partners: Vec::new(),
            blocked_partners: Vec::new(),
            allow_new_partners: true,
            min_trust_score: 0.0,
            timezone: d_timezone(),
            instructions: String::new(),
        }
    }
}

impl BookingPreferences {
    /// Check the invariants serde cannot express: a sane hour window, a
    /// trust score in range, and parseable duration strings.
    pub fn validate(&self) -> Result<()> {
        if self.preferred_start_hour >= self.preferred_end_hour || self.preferred_end_hour > 24 {
            return Err(Error::Config(format!(
                "preferred hour window {}..{} is invalid",
                self.preferred_start_hour, self.preferred_end_hour
            )));
        }
        if !(0.0..=1.0).contains(&self.min_trust_score) {
            return Err(Error::Config(format!(
                "min_trust_score {} outside [0.0, 1.0]",
                self.min_trust_score
            )));
        }
        for d in [&self.preferred_duration, &self.min_duration, &self.max_duration] {
            parse_duration_minutes(d)?;
        }
        Ok(())
    }

    /// Whether an instant falls in the preferred window: hour within
    /// `[start_hour, end_hour)` and weekday in the preferred set (an empty
    /// set matches every day).
    pub fn is_preferred_time(&self, instant: DateTime<Utc>) -> bool {
        let hour = instant.hour();
        let time_ok = self.preferred_start_hour <= hour && hour < self.preferred_end_hour;

        let day_ok = self.preferred_days.is_empty() || {
            let day_name = weekday_name(instant);
            self.preferred_days.iter().any(|d| d.eq_ignore_ascii_case(day_name))
        };

        time_ok && day_ok
    }

    /// Admission check for an incoming meeting against the existing
    /// calendar: preferred time, partner policy, daily cap, and the
    /// buffer against every blocking event (unless back-to-back meetings
    /// are allowed).
    pub fn can_accept(&self, event: &Event, existing: &[Event]) -> bool {
        if !self.is_preferred_time(event.start) {
            return false;
        }

        if self.blocked_partners.iter().any(|p| p == &event.partner_agent_id) {
            return false;
        }
        if !self.allow_new_partners
            && !self.preferred_partners.iter().any(|p| p == &event.partner_agent_id)
        {
            return false;
        }

        let same_day = existing
            .iter()
            .filter(|e| e.start.date_naive() == event.start.date_naive())
            .count();
        if same_day >= self.max_meetings_per_day {
            return false;
        }

        if !self.allow_back_to_back {
            for other in existing.iter().filter(|e| e.status.blocks_calendar()) {
                if !buffer_respected(event, other, self.buffer_between_meetings) {
                    return false;
                }
            }
        }

        true
    }

    /// Render the preferences as prose for agent prompts.
    pub fn to_natural_language(&self) -> String {
        let mut parts = vec![
            format!(
                "Preferred hours: {:02}:00-{:02}:00",
                self.preferred_start_hour, self.preferred_end_hour
            ),
            format!(
                "Preferred days: {}",
                if self.preferred_days.is_empty() {
                    "any".to_string()
                } else {
                    self.preferred_days.join(", ")
                }
            ),
            format!(
                "Preferred duration: {} (min {}, max {})",
                self.preferred_duration, self.min_duration, self.max_duration
            ),
            format!(
                "Buffer between meetings: {} minutes{}",
                self.buffer_between_meetings,
                if self.allow_back_to_back {
                    " (back-to-back allowed)"
                } else {
                    ""
                }
            ),
        ];
        if !self.instructions.is_empty() {
            parts.push(format!("Instructions: {}", self.instructions));
        }
        parts.join(". ") + "."
    }
}

/// Gap between two non-overlapping events, compared to the buffer.
/// Overlapping events count as a zero gap and therefore fail.
fn buffer_respected(candidate: &Event, existing: &Event, buffer_minutes: u32) -> bool {
    let (Ok(candidate_end), Ok(existing_end)) = (candidate.end(), existing.end()) else {
        return false;
    };
    let gap_minutes = if candidate.start >= existing_end {
        (candidate.start - existing_end).num_minutes()
    } else if existing.start >= candidate_end {
        (existing.start - candidate_end).num_minutes()
    } else {
        0
    };
    gap_minutes >= i64::from(buffer_minutes)
}

fn weekday_name(instant: DateTime<Utc>) -> &'static str {
    match instant.weekday() {
        chrono::Weekday::Mon => "Monday",
        chrono::Weekday::Tue => "Tuesday",
        chrono::Weekday::Wed => "Wednesday",
        chrono::Weekday::Thu => "Thursday",
        chrono::Weekday::Fri => "Friday",
        chrono::Weekday::Sat => "Saturday",
        chrono::Weekday::Sun => "Sunday",
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_start_hour() -> u32 {
    9
}
fn d_end_hour() -> u32 {
    17
}
fn d_weekdays() -> Vec<String> {
    ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn d_preferred_duration() -> String {
    "30m".into()
}
fn d_min_duration() -> String {
    "15m".into()
}
fn d_max_duration() -> String {
    "2h".into()
}
fn d_buffer() -> u32 {
    15
}
fn d_max_per_day() -> usize {
    8
}
fn d_max_per_week() -> usize {
    25
}
fn d_timezone() -> String {
    "UTC".into()
}
fn d_true() -> bool {
    true
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
