//! ISO instant parsing for the tool surface.
//!
//! Accepts RFC 3339 (`2025-06-02T14:00:00Z`, offset forms) and the bare
//! date-time shape LMs tend to emit (`2025-06-02T14:00:00`), which is
//! taken as UTC.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{Error, Result};

/// Parse an ISO instant; trailing `Z` (or any offset) is honored, a
/// missing offset means UTC.
pub fn parse_instant(raw: &str) -> Result<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(Error::Parse(format!("invalid ISO instant '{raw}'")))
}
