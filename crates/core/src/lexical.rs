//! French numeric and date lexing shared by every statement parser.
//!
//! A French amount uses `,` as the decimal separator and space, non-breaking
//! space or `.` as thousands separators (`1 400,00`, `1.234,56`). Dates come
//! in three shapes: `dd.mm.yy` (BNP rows), `dd/mm/yy(yy)` (most other
//! banks), and bare `dd/mm` short dates whose year is supplied by a period
//! header.
//!
//! The regexes are compiled once and shared; parsers slice raw lines with
//! the byte offsets these matchers return.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::error::ParseError;

/// The French amount pattern: grouped integer part, comma, two decimals.
/// Sign is handled by the callers (column position, explicit marker, hint).
pub const AMOUNT_PATTERN: &str = "\\d{1,3}(?:[ \u{A0}.]\\d{3})*,\\d{2}";

pub static AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(AMOUNT_PATTERN).expect("amount regex"));

/// An amount that is the whole of a positioned-line item, optionally signed.
pub static AMOUNT_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        "^[-\u{2212}]?\\s*{}\\s*(?:EUR|\u{20AC})?$",
        AMOUNT_PATTERN
    ))
    .expect("amount item regex")
});

/// `dd.mm.yy` -- the canonical BNP row date.
pub static DATE_DOT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{2}\.\d{2}\.\d{2}\b").expect("dot date regex"));

/// `dd/mm/yyyy`.
pub static DATE_LONG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{2}/\d{2}/\d{4}\b").expect("long date regex"));

/// `dd/mm/yy` or `dd/mm/yyyy`.
pub static DATE_SLASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{2}/\d{2}/\d{2,4}\b").expect("slash date regex"));

/// Bare `dd/mm` or `dd.mm`, as a complete token.
pub static SHORT_DATE_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}[./]\d{2}$").expect("short date item regex"));

static DATE_DOT_CAP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{2})\.(\d{2})\.(\d{2})$").expect("dot date capture"));

static DATE_SLASH_CAP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{2})/(\d{2})/(\d{2}|\d{4})$").expect("slash date capture"));

static DATE_LONG_CAP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{2})/(\d{2})/(\d{4})$").expect("long date capture"));

static SHORT_DATE_CAP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{2})[./](\d{2})$").expect("short date capture"));

/// Parse a French-formatted amount into a signed `f64`.
///
/// Non-breaking spaces are treated as spaces. When the text contains a
/// comma, thousands separators (space, `.`) are noise and the comma is the
/// decimal point; otherwise the text is read as a plain decimal with `.`.
pub fn parse_amount_fr(s: &str) -> Result<f64, ParseError> {
    let cleaned = s.replace('\u{A0}', " ");
    let mut t = cleaned.trim();

    let mut negative = false;
    if let Some(rest) = t.strip_prefix(['-', '\u{2212}']) {
        negative = true;
        t = rest.trim_start();
    } else if let Some(rest) = t.strip_prefix('+') {
        t = rest.trim_start();
    }

    let body = if t.contains(',') {
        t.replace([' ', '.'], "").replace(',', ".")
    } else {
        t.replace(' ', "")
    };

    let value: f64 = body
        .parse()
        .map_err(|_| ParseError::InvalidAmount(s.to_string()))?;
    if !value.is_finite() {
        return Err(ParseError::InvalidAmount(s.to_string()));
    }

    Ok(if negative { -value } else { value })
}

/// Parse `dd.mm.yy`, also accepting `dd/mm/yy(yy)` which is normalized to
/// the canonical form first. Two-digit years map to `2000 + yy`.
pub fn parse_date_fr(s: &str) -> Result<NaiveDate, ParseError> {
    let t = s.trim();

    let canonical = if t.contains('/') {
        let caps = DATE_SLASH_CAP_RE
            .captures(t)
            .ok_or_else(|| ParseError::InvalidDate(s.to_string()))?;
        let year = &caps[3];
        let short_year = &year[year.len() - 2..];
        format!("{}.{}.{}", &caps[1], &caps[2], short_year)
    } else {
        t.to_string()
    };

    let caps = DATE_DOT_CAP_RE
        .captures(&canonical)
        .ok_or_else(|| ParseError::InvalidDate(s.to_string()))?;

    let day: u32 = caps[1].parse().unwrap();
    let month: u32 = caps[2].parse().unwrap();
    let year: i32 = 2000 + caps[3].parse::<i32>().unwrap();

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| ParseError::InvalidDate(s.to_string()))
}

/// Parse `dd/mm/yyyy`.
pub fn parse_date_fr_long(s: &str) -> Result<NaiveDate, ParseError> {
    let caps = DATE_LONG_CAP_RE
        .captures(s.trim())
        .ok_or_else(|| ParseError::InvalidDate(s.to_string()))?;

    let day: u32 = caps[1].parse().unwrap();
    let month: u32 = caps[2].parse().unwrap();
    let year: i32 = caps[3].parse().unwrap();

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| ParseError::InvalidDate(s.to_string()))
}

/// Parse a bare `dd/mm` or `dd.mm` token against an externally supplied year
/// (period header, or the current UTC year as a last resort).
pub fn parse_short_date(token: &str, reference_year: i32) -> Result<NaiveDate, ParseError> {
    let caps = SHORT_DATE_CAP_RE
        .captures(token.trim())
        .ok_or_else(|| ParseError::InvalidDate(token.to_string()))?;

    let day: u32 = caps[1].parse().unwrap();
    let month: u32 = caps[2].parse().unwrap();

    NaiveDate::from_ymd_opt(reference_year, month, day)
        .ok_or_else(|| ParseError::InvalidDate(token.to_string()))
}

/// Replace non-breaking spaces, collapse whitespace runs, trim.
pub fn normalize_spaces(s: &str) -> String {
    s.replace('\u{A0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// One amount found inside a line, with its byte span.
#[derive(Debug, Clone, PartialEq)]
pub struct AmountMatch {
    pub start: usize,
    pub end: usize,
    pub value: f64,
}

/// All non-overlapping amount matches in a line, left to right.
///
/// Adjacent amounts sharing a boundary (`470,00185,00`) resolve to two
/// matches because the scan resumes at the end of the previous match.
pub fn find_amounts_in_line(s: &str) -> Vec<AmountMatch> {
    AMOUNT_RE
        .find_iter(s)
        .filter_map(|m| {
            parse_amount_fr(m.as_str()).ok().map(|value| AmountMatch {
                start: m.start(),
                end: m.end(),
                value,
            })
        })
        .collect()
}

/// True iff the line looks like an uppercase section heading: at least three
/// characters, no digits, and equal to its own uppercasing.
pub fn is_uppercase_title(s: &str) -> bool {
    s.chars().count() >= 3 && !s.chars().any(|c| c.is_ascii_digit()) && s == s.to_uppercase()
}
