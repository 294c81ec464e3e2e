//! Date resolution for loosely-formatted date/time text.
//!
//! The model is told to answer in `YYYY-MM-DD HH:MM`, but answers drift:
//! missing years, date-only strings, the literal "none" sentinel, or prose
//! that never parses. Resolution never fails; anything unusable falls back
//! to tomorrow at 09:00.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// The string the model is instructed to emit when no date is present.
pub const NO_DATE_SENTINEL: &str = "none";

const DEFAULT_HOUR: u32 = 9;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%B %d, %Y %H:%M",
    "%b %d, %Y %H:%M",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%B %d, %Y", "%b %d, %Y", "%m/%d/%Y"];

// Year-less forms are parsed with the current year prepended.
const ANCHORED_DATETIME_FORMATS: &[&str] = &["%Y %B %d %H:%M", "%Y %b %d %H:%M", "%Y %m/%d %H:%M"];

const ANCHORED_DATE_FORMATS: &[&str] = &["%Y %B %d", "%Y %b %d", "%Y %m/%d"];

/// Resolve raw date text into an absolute timestamp, using `now` as the
/// disambiguation anchor.
///
/// Order is load-bearing: lenient parse, then unintended-year fix, then
/// past-date rollover. Reordering changes outcomes for dates like
/// "March 3" resolved in November.
pub fn resolve_event_date(raw: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    let raw = match raw {
        Some(value) => value.trim(),
        None => return tomorrow_morning(now),
    };
    if raw.is_empty() || raw.eq_ignore_ascii_case(NO_DATE_SENTINEL) {
        return tomorrow_morning(now);
    }
    match lenient_parse(raw, now) {
        Some(parsed) => correct_year(parsed, raw, now),
        None => tomorrow_morning(now),
    }
}

/// Turn raw date text into a human-readable deadline string for suggestion
/// display. Returns `None` for absent/sentinel dates; text that parses is
/// corrected and formatted, text that does not is shown verbatim.
pub fn display_deadline(raw: &str, now: DateTime<Utc>) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NO_DATE_SENTINEL) {
        return None;
    }
    match lenient_parse(trimmed, now) {
        Some(parsed) => Some(format_deadline(correct_year(parsed, trimmed, now))),
        None => Some(trimmed.to_string()),
    }
}

/// Parse raw date text and apply the year corrections without the
/// tomorrow-09:00 fallback. Used where the caller has its own fallback
/// (e.g. re-running extraction when a stored suggestion date went stale).
pub fn parse_with_corrections(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NO_DATE_SENTINEL) {
        return None;
    }
    lenient_parse(trimmed, now).map(|parsed| correct_year(parsed, trimmed, now))
}

/// "Mar 03, 2026 at 09:00 AM", used for suggestion deadlines.
pub fn format_deadline(value: DateTime<Utc>) -> String {
    value.format("%b %d, %Y at %I:%M %p").to_string()
}

/// "Tuesday, March 03, 2026 at 09:00 AM", used for command confirmations.
pub fn format_confirmation(value: DateTime<Utc>) -> String {
    value.format("%A, %B %d, %Y at %I:%M %p").to_string()
}

/// "Tuesday, March 03 at 09:00 AM", used for event listings.
pub fn format_listing(value: DateTime<Utc>) -> String {
    value.format("%A, %B %d at %I:%M %p").to_string()
}

/// A year that the parser guessed (not literally present in the text) is
/// rewritten to the current year; if that lands strictly in the past on a
/// day other than today, the date is assumed to mean next year. Text that
/// explicitly pins a year is left alone, past or not.
fn correct_year(parsed: DateTime<Utc>, raw: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    if raw.contains(&parsed.year().to_string()) {
        return parsed;
    }
    let mut resolved = parsed;
    if resolved.year() != now.year() {
        resolved = with_year(resolved, now.year());
    }
    if resolved < now && resolved.date_naive() != now.date_naive() {
        resolved = with_year(resolved, resolved.year() + 1);
    }
    resolved
}

fn lenient_parse(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    for format in DATETIME_FORMATS {
        if let Ok(value) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&value));
        }
    }
    // Models sometimes echo full RFC 3339 timestamps back.
    if let Ok(value) = DateTime::parse_from_rfc3339(raw) {
        return Some(value.with_timezone(&Utc));
    }
    for format in DATE_FORMATS {
        if let Ok(value) = NaiveDate::parse_from_str(raw, format) {
            return Some(at_default_time(value));
        }
    }
    let anchored = format!("{} {}", now.year(), raw);
    for format in ANCHORED_DATETIME_FORMATS {
        if let Ok(value) = NaiveDateTime::parse_from_str(&anchored, format) {
            return Some(Utc.from_utc_datetime(&value));
        }
    }
    for format in ANCHORED_DATE_FORMATS {
        if let Ok(value) = NaiveDate::parse_from_str(&anchored, format) {
            return Some(at_default_time(value));
        }
    }
    None
}

fn tomorrow_morning(now: DateTime<Utc>) -> DateTime<Utc> {
    at_default_time(now.date_naive() + Duration::days(1))
}

fn at_default_time(date: NaiveDate) -> DateTime<Utc> {
    let time = date
        .and_hms_opt(DEFAULT_HOUR, 0, 0)
        .expect("09:00 is a valid time");
    Utc.from_utc_datetime(&time)
}

fn with_year(value: DateTime<Utc>, year: i32) -> DateTime<Utc> {
    value.with_year(year).unwrap_or_else(|| {
        // Feb 29 rewritten into a non-leap year.
        let date = NaiveDate::from_ymd_opt(year, 2, 28).expect("Feb 28 is always valid");
        Utc.from_utc_datetime(&date.and_time(value.time()))
    })
}
