//! Permissive date parsing shared by every cleaner.
//!
//! Source systems disagree on date layout: ISO dates, day-first and
//! month-first slashed dates, and free-form textual months in any order
//! (`Feb 13 1990`, `1968 October 16`, `January 1951 27`). [`parse_date`]
//! accepts all of them and [`canonicalize_date`] renders the result as
//! `YYYY-MM-DD`, the only representation the caster consumes.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

use crate::data::DATE_FORMAT;

/// Numeric layouts tried in order; day-first wins over month-first when both parse.
const NUMERIC_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%d/%m/%Y", "%m/%d/%Y", "%d-%m-%Y", "%d.%m.%Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const MONTHS: &[&str] = &[
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    parse_any_layout(value.trim()).filter(|date| (1000..=9999).contains(&date.year()))
}

fn parse_any_layout(trimmed: &str) -> Option<NaiveDate> {
    if trimmed.is_empty() {
        return None;
    }
    for fmt in NUMERIC_DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(parsed);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(parsed.date());
        }
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.date_naive());
    }
    parse_textual_date(trimmed)
}

/// Parses `value` permissively and renders it as `YYYY-MM-DD`; `None` rejects the value.
pub fn canonicalize_date(value: &str) -> Option<String> {
    parse_date(value).map(|date| date.format(DATE_FORMAT).to_string())
}

/// Strict ISO check used by the caster on already-canonical columns.
pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

pub fn month_from_name(token: &str) -> Option<u32> {
    let lowered = token.trim_end_matches('.').to_ascii_lowercase();
    if lowered.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|month| month.starts_with(&lowered) && (lowered.len() == 3 || **month == lowered))
        .map(|idx| idx as u32 + 1)
}

/// Handles three-token dates containing one month name, one four-digit year
/// and one day number, in any order.
fn parse_textual_date(value: &str) -> Option<NaiveDate> {
    let tokens = value
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | '/' | '-'))
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>();
    if tokens.len() != 3 {
        return None;
    }

    let mut month = None;
    let mut year = None;
    let mut day = None;
    for token in tokens {
        if let Some(parsed) = month_from_name(token) {
            if month.replace(parsed).is_some() {
                return None;
            }
            continue;
        }
        let digits = strip_ordinal_suffix(token);
        if !digits.chars().all(|c| c.is_ascii_digit()) || digits.is_empty() {
            return None;
        }
        if digits.len() == 4 {
            if year.replace(digits.parse::<i32>().ok()?).is_some() {
                return None;
            }
        } else if digits.len() <= 2 {
            if day.replace(digits.parse::<u32>().ok()?).is_some() {
                return None;
            }
        } else {
            return None;
        }
    }
    NaiveDate::from_ymd_opt(year?, month?, day?)
}

fn strip_ordinal_suffix(token: &str) -> &str {
    for suffix in ["st", "nd", "rd", "th"] {
        if let Some(stripped) = token.strip_suffix(suffix)
            && !stripped.is_empty()
            && stripped.chars().all(|c| c.is_ascii_digit())
        {
            return stripped;
        }
    }
    token
}
