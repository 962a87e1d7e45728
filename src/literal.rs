// 🔤 Literal parsing - dates, amounts and names as printed on statements
//
// Dates:    "%d %b %Y" ("17 Mar 2024"), or "%d %b" with the year supplied
// Amounts:  "," thousands separator, "." decimal point, optional " CR" suffix

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use std::str::FromStr;

pub const DATE_FORMAT: &str = "%d %b %Y";

/// Salutations dropped from holder names.
pub const SALUTATIONS: &[&str] = &["MR", "MRS", "MDM", "MS", "DR"];

// ============================================================================
// AMOUNTS
// ============================================================================

/// A parsed money literal. `credit` is set by a trailing " CR".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Amount {
    pub value: Decimal,
    pub credit: bool,
}

/// Parse "1,234.56" into a decimal. None when the literal is not numeric.
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let cleaned = text.trim().replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}

/// Parse an amount that may carry a " CR" suffix ("120.50 CR").
pub fn parse_amount(text: &str) -> Option<Amount> {
    let trimmed = text.trim();
    match trimmed.strip_suffix("CR") {
        Some(rest) if rest.ends_with(' ') => parse_decimal(rest).map(|value| Amount {
            value,
            credit: true,
        }),
        _ => parse_decimal(trimmed).map(|value| Amount {
            value,
            credit: false,
        }),
    }
}

// ============================================================================
// DATES
// ============================================================================

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).ok()
}

/// Parse "17 Mar" against a statement date.
///
/// The statement's year is used unless that puts the date after the
/// statement date, in which case the row belongs to the previous year.
pub fn parse_day_month(text: &str, statement_date: NaiveDate) -> Option<NaiveDate> {
    let text = text.trim();
    let year = statement_date.year();
    let date = NaiveDate::parse_from_str(&format!("{} {}", text, year), DATE_FORMAT).ok()?;
    if date > statement_date {
        NaiveDate::parse_from_str(&format!("{} {}", text, year - 1), DATE_FORMAT).ok()
    } else {
        Some(date)
    }
}

/// Full date if the literal has a year, otherwise day-month against the
/// statement date.
pub fn parse_row_date(text: &str, statement_date: Option<NaiveDate>) -> Option<NaiveDate> {
    parse_date(text).or_else(|| statement_date.and_then(|d| parse_day_month(text, d)))
}

// ============================================================================
// NAMES
// ============================================================================

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// "JOHN  TAN" -> "John  Tan" (spacing kept as printed).
pub fn title_case(text: &str) -> String {
    text.split(' ').map(capitalize).collect::<Vec<_>>().join(" ")
}

/// Holder name from a printed name line: salutations dropped, title-cased.
pub fn holder_name(line: &str) -> String {
    line.split_whitespace()
        .filter(|w| !SALUTATIONS.contains(w))
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of a dashed banner such as "----- End of Summary -----".
pub fn banner_text(text: &str) -> &str {
    text.trim().trim_matches('-').trim()
}
