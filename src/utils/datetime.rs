//! Natural-language time expressions and their display format.
//!
//! An expression is lower-cased, trimmed, and matched against an ordered list
//! of patterns, most structured first. The first pattern that matches picks the
//! resolver; when the resolver cannot build a real calendar instant (31-02,
//! 25:00, an overflowing offset) the whole parse yields `None`.

use std::fmt::Display;
use std::sync::LazyLock;

use chrono::{
    DateTime, Datelike, Days, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime,
    NaiveTime, SecondsFormat, TimeZone, Utc, Weekday,
};
use regex::{Captures, Regex};

use crate::services::timezone::UserTimezone;

/// Format used for times shown to users; the parser accepts it back.
pub const DISPLAY_FORMAT: &str = "%d-%m-%Y at %H:%M";

/// Hour of day used when an expression names only a date.
pub const DATE_ONLY_HOUR: u32 = 9;

/// The six families of expression the parser understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionKind {
    /// `dd-mm-yyyy at hh:mm[ am|pm]`
    FullDateTime,
    /// `hh:mm[ am|pm][ today|tomorrow]`
    ClockTime,
    /// `in N minutes|hours|days`
    RelativeOffset,
    /// `tomorrow at h[:mm][ am|pm]`, `next <weekday> at ...`
    NaturalDateTime,
    /// `dd-mm-yyyy`
    DateOnly,
    /// `tomorrow`, `next <weekday>`
    NaturalDate,
}

static PATTERNS: LazyLock<Vec<(ExpressionKind, Regex)>> = LazyLock::new(compile_patterns);

#[allow(clippy::expect_used)]
fn compile_patterns() -> Vec<(ExpressionKind, Regex)> {
    [
        (
            ExpressionKind::FullDateTime,
            r"^(\d{1,2})-(\d{1,2})-(\d{4})\s+at\s+(\d{1,2}):(\d{2})\s*(am|pm)?$",
        ),
        (
            ExpressionKind::ClockTime,
            r"^(\d{1,2}):(\d{2})\s*(am|pm)?\s*(today|tomorrow)?$",
        ),
        (
            ExpressionKind::RelativeOffset,
            r"^in\s+(\d+)\s+(minutes?|hours?|days?)$",
        ),
        (
            ExpressionKind::NaturalDateTime,
            r"^(tomorrow|next\s+\w+)\s+at\s+(\d{1,2}):?(\d{2})?\s*(am|pm)?$",
        ),
        (ExpressionKind::DateOnly, r"^(\d{1,2})-(\d{1,2})-(\d{4})$"),
        (ExpressionKind::NaturalDate, r"^(tomorrow|next\s+\w+)$"),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(pattern).expect("time pattern must compile")))
    .collect()
}

/// Returns which family an expression belongs to, without resolving it.
pub fn classify(input: &str) -> Option<ExpressionKind> {
    let text = input.trim().to_lowercase();
    PATTERNS
        .iter()
        .find(|(_, pattern)| pattern.is_match(&text))
        .map(|(kind, _)| *kind)
}

/// Resolves `input` against a fixed `now`, in timezone `tz`.
///
/// The result is localized to `tz`; callers convert to UTC themselves.
pub fn parse_time_input_at<T: TimeZone>(
    input: &str,
    tz: &T,
    now: DateTime<Utc>,
) -> Option<DateTime<T>> {
    let text = input.trim().to_lowercase();
    let local_now = now.with_timezone(tz);

    let (kind, caps) = PATTERNS
        .iter()
        .find_map(|(kind, pattern)| pattern.captures(&text).map(|caps| (*kind, caps)))?;

    match kind {
        ExpressionKind::FullDateTime => resolve_full_date_time(&caps, tz),
        ExpressionKind::ClockTime => resolve_clock_time(&caps, tz, &local_now),
        ExpressionKind::RelativeOffset => resolve_relative_offset(&caps, &local_now),
        ExpressionKind::NaturalDateTime => resolve_natural_date_time(&caps, tz, &local_now),
        ExpressionKind::DateOnly => {
            let date = numeric_date(&caps)?;
            localize(tz, date.and_hms_opt(DATE_ONLY_HOUR, 0, 0)?)
        }
        ExpressionKind::NaturalDate => {
            let date = natural_date(caps.get(1)?.as_str(), local_now.date_naive())?;
            localize(tz, date.and_hms_opt(DATE_ONLY_HOUR, 0, 0)?)
        }
    }
}

/// Resolves `input` for a stored timezone name at the current instant.
///
/// Unknown timezone names resolve to nothing, like malformed input.
pub fn parse_time_input(input: &str, timezone: &str) -> Option<DateTime<FixedOffset>> {
    UserTimezone::parse(timezone)?.parse_time_input(input, Utc::now())
}

/// Renders an instant in `tz` as `dd-mm-yyyy at HH:MM`.
pub fn format_datetime<T>(dt: &DateTime<Utc>, tz: &T) -> String
where
    T: TimeZone,
    T::Offset: Display,
{
    dt.with_timezone(tz).format(DISPLAY_FORMAT).to_string()
}

/// Maps a local wall-clock reading onto the timeline of `tz`.
///
/// Ambiguous readings (clocks turned back) take the later instant; readings
/// inside a gap (clocks turned forward) move forward by an hour.
pub fn localize<T: TimeZone>(tz: &T, naive: NaiveDateTime) -> Option<DateTime<T>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(first, second) => Some(first.max(second)),
        LocalResult::None => {
            let shifted = naive.checked_add_signed(Duration::hours(1))?;
            tz.from_local_datetime(&shifted).latest()
        }
    }
}

/// Serialises an instant the way the database stores it.
pub fn to_db_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Reads back a stored timestamp.
pub fn from_db_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn resolve_full_date_time<T: TimeZone>(caps: &Captures<'_>, tz: &T) -> Option<DateTime<T>> {
    let date = numeric_date(caps)?;
    let hour = to_24_hour(capture_u32(caps, 4)?, meridiem(caps, 6));
    let time = NaiveTime::from_hms_opt(hour, capture_u32(caps, 5)?, 0)?;
    localize(tz, date.and_time(time))
}

fn resolve_clock_time<T: TimeZone>(
    caps: &Captures<'_>,
    tz: &T,
    local_now: &DateTime<T>,
) -> Option<DateTime<T>> {
    let hour = to_24_hour(capture_u32(caps, 1)?, meridiem(caps, 3));
    let time = NaiveTime::from_hms_opt(hour, capture_u32(caps, 2)?, 0)?;
    let today = local_now.date_naive();
    let tomorrow = today.succ_opt()?;

    match caps.get(4).map(|m| m.as_str()) {
        Some("tomorrow") => localize(tz, tomorrow.and_time(time)),
        Some(_) => localize(tz, today.and_time(time)),
        None => {
            let candidate = localize(tz, today.and_time(time))?;
            if candidate <= *local_now {
                localize(tz, tomorrow.and_time(time))
            } else {
                Some(candidate)
            }
        }
    }
}

fn resolve_relative_offset<T: TimeZone>(
    caps: &Captures<'_>,
    local_now: &DateTime<T>,
) -> Option<DateTime<T>> {
    let amount: i64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps.get(2)?.as_str();
    let offset = if unit.starts_with("minute") {
        Duration::try_minutes(amount)?
    } else if unit.starts_with("hour") {
        Duration::try_hours(amount)?
    } else {
        Duration::try_days(amount)?
    };
    local_now.clone().checked_add_signed(offset)
}

fn resolve_natural_date_time<T: TimeZone>(
    caps: &Captures<'_>,
    tz: &T,
    local_now: &DateTime<T>,
) -> Option<DateTime<T>> {
    let date = natural_date(caps.get(1)?.as_str(), local_now.date_naive())?;
    let hour = to_24_hour(capture_u32(caps, 2)?, meridiem(caps, 4));
    let minute = match caps.get(3) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    localize(tz, date.and_time(time))
}

/// `tomorrow` or `next <weekday>`; an unknown weekday name means a week ahead.
fn natural_date(phrase: &str, today: NaiveDate) -> Option<NaiveDate> {
    if phrase == "tomorrow" {
        return today.succ_opt();
    }

    let days = match phrase.split_whitespace().nth(1).and_then(parse_weekday) {
        Some(target) => {
            let delta = (7 + target.num_days_from_monday() - today.weekday().num_days_from_monday()) % 7;
            if delta == 0 {
                7
            } else {
                delta
            }
        }
        None => 7,
    };
    today.checked_add_days(Days::new(u64::from(days)))
}

fn parse_weekday(name: &str) -> Option<Weekday> {
    match name {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

fn numeric_date(caps: &Captures<'_>) -> Option<NaiveDate> {
    let day = capture_u32(caps, 1)?;
    let month = capture_u32(caps, 2)?;
    let year: i32 = caps.get(3)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn to_24_hour(hour: u32, meridiem: Option<&str>) -> u32 {
    match meridiem {
        Some("pm") if hour != 12 => hour + 12,
        Some("am") if hour == 12 => 0,
        _ => hour,
    }
}

fn meridiem<'t>(caps: &Captures<'t>, index: usize) -> Option<&'t str> {
    caps.get(index).map(|m| m.as_str())
}

fn capture_u32(caps: &Captures<'_>, index: usize) -> Option<u32> {
    caps.get(index)?.as_str().parse().ok()
}
