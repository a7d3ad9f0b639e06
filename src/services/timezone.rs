//! Per-user timezones: IANA names or fixed `UTC±hh[:mm]` offsets.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use chrono_tz::Tz;
use regex::Regex;

use crate::utils::datetime::{format_datetime, parse_time_input_at};

#[allow(clippy::expect_used)]
static UTC_OFFSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^utc\s*:?\s*([+-])(\d{1,2})(?::(\d{2}))?$").expect("offset pattern must compile")
});

/// The timezone a user's local times are interpreted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserTimezone {
    /// An IANA zone, including the `Etc/GMT±N` whole-hour zones.
    Named(Tz),
    /// A fixed offset for half- and quarter-hour zones.
    Fixed(FixedOffset),
}

impl Default for UserTimezone {
    fn default() -> Self {
        Self::Named(Tz::UTC)
    }
}

impl UserTimezone {
    /// Accepts an IANA name (`Asia/Kolkata`) or a UTC offset (`UTC:+5:30`).
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(tz) = raw.parse::<Tz>() {
            return Some(Self::Named(tz));
        }
        Self::from_utc_offset(raw)
    }

    /// Parses `UTC:+5`, `UTC-3`, `utc:+5:30`.
    ///
    /// Whole hours map onto `Etc/GMT` zones, whose sign is inverted
    /// (`UTC+5` is `Etc/GMT-5`). Accepted range is -12..=+14.
    pub fn from_utc_offset(raw: &str) -> Option<Self> {
        let caps = UTC_OFFSET.captures(raw.trim())?;
        let negative = &caps[1] == "-";
        let hours: i32 = caps[2].parse().ok()?;
        let minutes: i32 = match caps.get(3) {
            Some(m) => m.as_str().parse().ok()?,
            None => 0,
        };

        if !matches!(minutes, 0 | 30 | 45) {
            return None;
        }
        let limit = if negative { 12 } else { 14 };
        if hours > limit || (hours == limit && minutes > 0) {
            return None;
        }

        if minutes == 0 {
            let name = match (hours, negative) {
                (0, _) => "Etc/GMT".to_string(),
                (h, false) => format!("Etc/GMT-{h}"),
                (h, true) => format!("Etc/GMT+{h}"),
            };
            if let Ok(tz) = name.parse::<Tz>() {
                return Some(Self::Named(tz));
            }
        }

        let sign = if negative { -1 } else { 1 };
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).map(Self::Fixed)
    }

    /// Falls back to UTC for values that no longer parse.
    pub fn resolve_or_utc(raw: &str) -> Self {
        Self::parse(raw).unwrap_or_else(|| {
            tracing::warn!("Unknown timezone '{}', falling back to UTC", raw);
            Self::default()
        })
    }

    /// The string stored in the database for this timezone.
    pub fn name(&self) -> String {
        match self {
            Self::Named(tz) => tz.name().to_string(),
            Self::Fixed(offset) => {
                let seconds = offset.local_minus_utc();
                let sign = if seconds < 0 { '-' } else { '+' };
                let seconds = seconds.abs();
                format!("UTC{}{:02}:{:02}", sign, seconds / 3600, (seconds % 3600) / 60)
            }
        }
    }

    /// Resolves a time expression and keeps the local offset of the result.
    pub fn parse_time_input(&self, input: &str, now: DateTime<Utc>) -> Option<DateTime<FixedOffset>> {
        match self {
            Self::Named(tz) => parse_time_input_at(input, tz, now).map(|dt| dt.fixed_offset()),
            Self::Fixed(offset) => parse_time_input_at(input, offset, now),
        }
    }

    /// Formats a UTC instant as local `dd-mm-yyyy at HH:MM`.
    pub fn format(&self, dt: &DateTime<Utc>) -> String {
        match self {
            Self::Named(tz) => format_datetime(dt, tz),
            Self::Fixed(offset) => format_datetime(dt, offset),
        }
    }

    /// The local calendar date at `now`.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        match self {
            Self::Named(tz) => now.with_timezone(tz).date_naive(),
            Self::Fixed(offset) => now.with_timezone(offset).date_naive(),
        }
    }
}

impl fmt::Display for UserTimezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_iana_names() {
        assert_eq!(UserTimezone::parse("UTC"), Some(UserTimezone::Named(Tz::UTC)));
        assert_eq!(
            UserTimezone::parse(" Asia/Kolkata ").map(|tz| tz.name()),
            Some("Asia/Kolkata".to_string())
        );
        assert_eq!(UserTimezone::parse("Mars/Olympus"), None);
        assert_eq!(UserTimezone::parse(""), None);
    }

    #[test]
    fn test_whole_hour_offsets_map_to_etc_zones() {
        let east = UserTimezone::parse("UTC:+5").unwrap();
        assert_eq!(east.name(), "Etc/GMT-5");

        let west = UserTimezone::parse("utc-3").unwrap();
        assert_eq!(west.name(), "Etc/GMT+3");

        let zero = UserTimezone::parse("UTC:+0").unwrap();
        assert_eq!(zero.name(), "Etc/GMT");
    }

    #[test]
    fn test_half_hour_offsets_use_fixed_offsets() {
        let india = UserTimezone::parse("UTC:+5:30").unwrap();
        assert!(matches!(india, UserTimezone::Fixed(_)));
        assert_eq!(india.name(), "UTC+05:30");

        // The stored name parses back to the same zone.
        assert_eq!(UserTimezone::parse(&india.name()), Some(india));
    }

    #[test]
    fn test_offsets_out_of_range_are_rejected() {
        assert_eq!(UserTimezone::parse("UTC:+15"), None);
        assert_eq!(UserTimezone::parse("UTC:-13"), None);
        assert_eq!(UserTimezone::parse("UTC:+5:15"), None);
        assert_eq!(UserTimezone::parse("UTC:+14:30"), None);
    }

    #[test]
    fn test_resolve_or_utc_falls_back() {
        assert_eq!(UserTimezone::resolve_or_utc("garbage"), UserTimezone::default());
    }
}
