// src/process/date_parser.rs

use chrono::{NaiveDate, NaiveDateTime};

/// Render used for wide-table row keys; sorts chronologically as text.
pub const ROW_KEY_FORMAT: &str = "%Y-%m-%d";

/// Normalise a time identifier to a date.
///
/// Tried in order, first hit wins: `YYYYMMDD`, `YYYYMM`, `YYYY-MM`, `YYYY`.
/// A missing day or month defaults to 1. Anything else goes through
/// [`parse_permissive`].
pub fn normalize_time(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    let digits = s.bytes().all(|b| b.is_ascii_digit());

    if digits && s.len() == 8 {
        if let Some(d) = ymd(&s[0..4], &s[4..6], &s[6..8]) {
            return Some(d);
        }
    }
    if digits && s.len() == 6 {
        if let Some(d) = ymd(&s[0..4], &s[4..6], "1") {
            return Some(d);
        }
    }
    if s.len() == 7 && s.as_bytes()[4] == b'-' {
        if let Some(d) = ymd(&s[0..4], &s[5..7], "1") {
            return Some(d);
        }
    }
    if digits && s.len() == 4 {
        if let Some(d) = ymd(s, "1", "1") {
            return Some(d);
        }
    }
    parse_permissive(s)
}

/// Fallback formats: e-Stat's 10-digit time code (`YYYY` + 2-digit period
/// class + `MM` + 2 more digits), `YYYY-MM-DD`, `YYYY/MM/DD`, `YYYY/MM`, and
/// full `YYYY-MM-DD HH:MM:SS` timestamps.
pub fn parse_permissive(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.len() == 10 && s.bytes().all(|b| b.is_ascii_digit()) {
        return ymd(&s[0..4], &s[6..8], "1");
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    if s.len() == 7 && s.as_bytes()[4] == b'/' {
        return ymd(&s[0..4], &s[5..7], "1");
    }
    None
}

pub fn row_key(date: NaiveDate) -> String {
    date.format(ROW_KEY_FORMAT).to_string()
}

fn ymd(y: &str, m: &str, d: &str) -> Option<NaiveDate> {
    let year: i32 = y.parse().ok()?;
    let month: u32 = m.parse().ok()?;
    let day: u32 = d.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}
