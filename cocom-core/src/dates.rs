//! Date parsing and normalization for commit timestamps.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Timelike, Utc};

use crate::error::{CocomError, Result};

const AWARE_FORMATS: &[&str] = &[
    "%a %b %e %H:%M:%S %Y %z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%a %b %e %H:%M:%S %Y",
];

/// A parsed timestamp, with or without a usable UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedDate {
    /// Timestamp carrying its UTC offset.
    Aware(DateTime<FixedOffset>),
    /// Timestamp whose offset could not be used.
    Naive(NaiveDateTime),
}

impl ParsedDate {
    /// Render as ISO-8601, with microseconds only when non-zero.
    pub fn to_iso(&self) -> String {
        match self {
            ParsedDate::Aware(date) => {
                let mut rendered = date.format("%Y-%m-%dT%H:%M:%S").to_string();
                push_micros(&mut rendered, date.nanosecond());
                rendered.push_str(&date.format("%:z").to_string());
                rendered
            }
            ParsedDate::Naive(date) => {
                let mut rendered = date.format("%Y-%m-%dT%H:%M:%S").to_string();
                push_micros(&mut rendered, date.nanosecond());
                rendered
            }
        }
    }

    /// The instant in UTC; naive timestamps are read as UTC.
    pub fn to_utc(&self) -> DateTime<Utc> {
        match self {
            ParsedDate::Aware(date) => date.with_timezone(&Utc),
            ParsedDate::Naive(date) => date.and_utc(),
        }
    }
}

/// Parse a date string in any of the formats git and the analyzers emit.
///
/// Strings without an offset are taken as UTC. A string whose offset is
/// present but out of range is parsed without it and comes back naive.
pub fn parse_date(value: &str) -> Result<ParsedDate> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CocomError::InvalidDate(value.to_string()));
    }

    if let Some(date) = parse_aware(value) {
        return Ok(ParsedDate::Aware(date));
    }
    if let Some(date) = parse_naive(value) {
        return Ok(ParsedDate::Aware(date.and_utc().fixed_offset()));
    }
    if let Some((rest, _offset)) = split_offset(value) {
        if let Some(date) = parse_naive(rest) {
            return Ok(ParsedDate::Naive(date));
        }
    }

    Err(CocomError::InvalidDate(value.to_string()))
}

/// Normalize a date field to ISO-8601 text.
///
/// An unusable timezone offset drops the timezone instead of failing.
pub fn fix_field_date(value: &str) -> Result<String> {
    Ok(parse_date(value)?.to_iso())
}

/// Sort key for an already normalized date field.
pub fn sort_key(value: &str) -> Option<DateTime<Utc>> {
    parse_date(value).ok().map(|date| date.to_utc())
}

fn parse_aware(value: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Some(date);
    }
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date);
    }
    AWARE_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(value, format).ok())
}

fn parse_naive(value: &str) -> Option<NaiveDateTime> {
    if let Some(date) = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
    {
        return Some(date);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Split a trailing `+HHMM`, `-HHMM` or `+HH:MM` offset from the value.
fn split_offset(value: &str) -> Option<(&str, &str)> {
    let sign_at = value.rfind(['+', '-'])?;
    let (rest, offset) = value.split_at(sign_at);
    let digits: String = offset[1..].chars().filter(|c| *c != ':').collect();
    let well_formed = digits.len() == 4 && digits.chars().all(|c| c.is_ascii_digit());
    if !well_formed {
        return None;
    }
    Some((rest.trim_end(), offset))
}

fn push_micros(rendered: &mut String, nanos: u32) {
    let micros = nanos / 1_000;
    if micros != 0 {
        rendered.push_str(&format!(".{micros:06}"));
    }
}
