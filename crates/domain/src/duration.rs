//! Duration-string parsing.
//!
//! Duration strings appear in wire payloads, user input, and the event
//! store, so the parser lives here once instead of being inlined at each
//! call site.  Accepted forms: `<N>m` (minutes), `<N>h` (whole hours),
//! and bare digits (minutes).

use crate::error::{Error, Result};

/// The durations offered by the tool catalog and the CLI.
pub const CANONICAL_DURATIONS: &[&str] = &["15m", "30m", "45m", "1h", "1.5h", "2h", "3h"];

/// Parse a duration string to a strictly positive number of minutes.
///
/// `"30m"` → 30, `"2h"` → 120, `"1.5h"` → 90, `"45"` → 45.  Anything
/// else (empty, zero, negative, unknown unit, garbage) is a parse error.
pub fn parse_duration_minutes(raw: &str) -> Result<u32> {
    let s = raw.trim().to_ascii_lowercase();
    if s.is_empty() {
        return Err(Error::Parse("empty duration string".into()));
    }

    let minutes = if let Some(num) = s.strip_suffix('m') {
        num.trim()
            .parse::<u32>()
            .map_err(|_| Error::Parse(format!("invalid duration '{raw}'")))?
    } else if let Some(num) = s.strip_suffix('h') {
        // Fractional hours are allowed as long as they land on whole minutes.
        let hours = num
            .trim()
            .parse::<f64>()
            .map_err(|_| Error::Parse(format!("invalid duration '{raw}'")))?;
        let minutes = hours * 60.0;
        if !(minutes.is_finite() && minutes >= 0.0 && minutes.fract() == 0.0) {
            return Err(Error::Parse(format!(
                "duration '{raw}' does not resolve to whole minutes"
            )));
        }
        minutes as u32
    } else {
        s.parse::<u32>()
            .map_err(|_| Error::Parse(format!("invalid duration '{raw}'")))?
    };

    if minutes == 0 {
        return Err(Error::Parse(format!("duration '{raw}' must be positive")));
    }
    Ok(minutes)
}

/// Render a minute count back into the short duration form.
///
/// Whole hours render as `<N>h`, everything else as `<N>m`.
pub fn format_duration_minutes(minutes: u32) -> String {
    if minutes > 0 && minutes % 60 == 0 {
        format!("{}h", minutes / 60)
    } else {
        format!("{minutes}m")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minute_suffix() {
        assert_eq!(parse_duration_minutes("30m").unwrap(), 30);
        assert_eq!(parse_duration_minutes("45m").unwrap(), 45);
        assert_eq!(parse_duration_minutes(" 15M ").unwrap(), 15);
    }

    #[test]
    fn parses_hour_suffix() {
        assert_eq!(parse_duration_minutes("1h").unwrap(), 60);
        assert_eq!(parse_duration_minutes("2h").unwrap(), 120);
        assert_eq!(parse_duration_minutes("1.5h").unwrap(), 90);
    }

    #[test]
    fn parses_bare_digits_as_minutes() {
        assert_eq!(parse_duration_minutes("25").unwrap(), 25);
    }

    #[test]
    fn rejects_zero_and_garbage() {
        assert!(parse_duration_minutes("0m").is_err());
        assert!(parse_duration_minutes("").is_err());
        assert!(parse_duration_minutes("soon").is_err());
        assert!(parse_duration_minutes("-30m").is_err());
    }

    #[test]
    fn fractional_hours_must_land_on_whole_minutes() {
        assert_eq!(parse_duration_minutes("1.25h").unwrap(), 75);
        assert!(parse_duration_minutes("0.333h").is_err());
    }

    #[test]
    fn canonical_set_all_parse() {
        for d in CANONICAL_DURATIONS {
            assert!(parse_duration_minutes(d).is_ok(), "canonical {d} must parse");
        }
    }

    #[test]
    fn formats_round_trip() {
        assert_eq!(format_duration_minutes(30), "30m");
        assert_eq!(format_duration_minutes(60), "1h");
        assert_eq!(format_duration_minutes(90), "90m");
        assert_eq!(format_duration_minutes(180), "3h");
    }
}
