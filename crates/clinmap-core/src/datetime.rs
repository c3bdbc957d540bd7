//! ISO 8601 date handling and study-day arithmetic.
//!
//! Standardized tables carry dates in the ISO 8601 extended format with
//! partial dates represented by right truncation (`2024`, `2024-03`,
//! `2024-03-15`, optionally followed by `Thh:mm:ss`). Raw inputs arrive in a
//! handful of legacy shapes that [`normalize_date`] converts.
//!
//! Study-day arithmetic is whole-day: values are `NaiveDate` differences and
//! time-of-day never contributes, so no fractional rounding mode exists.
//! There is no day 0; the reference date itself is day 1.

use chrono::NaiveDate;

/// A right-truncated ISO 8601 date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialDate {
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl PartialDate {
    /// Complete dates convert to a `NaiveDate`; partial dates do not.
    pub fn to_naive_date(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month?, self.day?)
    }

    pub fn is_complete(self) -> bool {
        self.month.is_some() && self.day.is_some()
    }
}

/// Parse the date portion of an ISO 8601 extended value.
///
/// Accepts `YYYY`, `YYYY-MM`, and `YYYY-MM-DD`; anything after a `T`
/// separator is ignored. Returns `None` for empty or malformed input.
pub fn parse_partial_date(value: &str) -> Option<PartialDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.contains(' ') {
        return None;
    }
    let date_part = trimmed.split('T').next().unwrap_or(trimmed);
    let mut parts = date_part.split('-');

    let year_str = parts.next()?;
    if year_str.len() != 4 || !year_str.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let year: i32 = year_str.parse().ok()?;

    let month = match parts.next() {
        Some(text) => {
            if text.len() != 2 || !text.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            let month: u32 = text.parse().ok()?;
            if !(1..=12).contains(&month) {
                return None;
            }
            Some(month)
        }
        None => None,
    };

    let day = match parts.next() {
        Some(text) => {
            if text.len() != 2 || !text.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            let day: u32 = text.parse().ok()?;
            if day < 1 || day > max_days_in_month(year, month) {
                return None;
            }
            Some(day)
        }
        None => None,
    };

    if parts.next().is_some() {
        return None;
    }

    Some(PartialDate { year, month, day })
}

/// Parse a complete ISO 8601 date; partial or invalid values yield `None`.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    parse_partial_date(value)?.to_naive_date()
}

/// Whether a value is a valid (possibly partial) ISO 8601 date, with an
/// optional `Thh:mm[:ss]` time part on complete dates.
pub fn is_iso8601(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return false;
    }
    let Some(parsed) = parse_partial_date(trimmed) else {
        return false;
    };
    match trimmed.split_once('T') {
        None => true,
        // Time requires a complete date.
        Some((_, time)) => parsed.is_complete() && is_valid_time(time),
    }
}

fn is_valid_time(time: &str) -> bool {
    let mut parts = time.split(':');
    let Some(hour) = parts.next().and_then(|t| two_digit(t, 23)) else {
        return false;
    };
    let _ = hour;
    for (limit, part) in [(59u32, parts.next()), (59u32, parts.next())] {
        match part {
            Some(text) => {
                if two_digit(text, limit).is_none() {
                    return false;
                }
            }
            None => break,
        }
    }
    parts.next().is_none()
}

fn two_digit(text: &str, limit: u32) -> Option<u32> {
    if text.len() != 2 || !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let value: u32 = text.parse().ok()?;
    if value <= limit { Some(value) } else { None }
}

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// Normalize a raw date value to an ISO 8601 string.
///
/// Accepted shapes, checked in order:
/// - ISO 8601 (partial or full, time part carried through unchanged)
/// - `YYYY/MM/DD`
/// - `DD-MON-YYYY` (e.g. `5-JAN-2024`)
/// - `DDMONYYYY` (e.g. `05JAN2024`)
/// - `MM/DD/YYYY`, read day-first when the first component exceeds 12
///
/// Returns `None` when no shape matches.
pub fn normalize_date(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if is_iso8601(trimmed) {
        return Some(trimmed.to_string());
    }

    // YYYY/MM/DD
    if let Some(date) = parse_separated(trimmed, '/', SeparatedOrder::YearFirst) {
        return Some(date);
    }
    // DD-MON-YYYY
    if let Some(date) = parse_day_month_name(trimmed, '-') {
        return Some(date);
    }
    // DDMONYYYY
    if let Some(date) = parse_compact_month_name(trimmed) {
        return Some(date);
    }
    // MM/DD/YYYY or DD/MM/YYYY
    parse_separated(trimmed, '/', SeparatedOrder::YearLast)
}

#[derive(Clone, Copy)]
enum SeparatedOrder {
    YearFirst,
    YearLast,
}

fn parse_separated(value: &str, sep: char, order: SeparatedOrder) -> Option<String> {
    let parts: Vec<&str> = value.split(sep).collect();
    if parts.len() != 3 {
        return None;
    }
    let (year, mut first, mut second) = match order {
        SeparatedOrder::YearFirst => {
            if parts[0].len() != 4 {
                return None;
            }
            (
                parts[0].parse::<i32>().ok()?,
                parts[1].parse::<u32>().ok()?,
                parts[2].parse::<u32>().ok()?,
            )
        }
        SeparatedOrder::YearLast => {
            if parts[2].len() != 4 {
                return None;
            }
            (
                parts[2].parse::<i32>().ok()?,
                parts[0].parse::<u32>().ok()?,
                parts[1].parse::<u32>().ok()?,
            )
        }
    };
    let (month, day) = match order {
        SeparatedOrder::YearFirst => (first, second),
        SeparatedOrder::YearLast => {
            // Month-first unless the first component cannot be a month.
            if first > 12 {
                std::mem::swap(&mut first, &mut second);
            }
            (first, second)
        }
    };
    NaiveDate::from_ymd_opt(year, month, day).map(|d| d.format("%Y-%m-%d").to_string())
}

fn parse_day_month_name(value: &str, sep: char) -> Option<String> {
    let parts: Vec<&str> = value.split(sep).collect();
    if parts.len() != 3 || parts[2].len() != 4 {
        return None;
    }
    let day: u32 = parts[0].parse().ok()?;
    let month = month_from_name(parts[1])?;
    let year: i32 = parts[2].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day).map(|d| d.format("%Y-%m-%d").to_string())
}

fn parse_compact_month_name(value: &str) -> Option<String> {
    if value.len() != 9 {
        return None;
    }
    let day: u32 = value.get(0..2)?.parse().ok()?;
    let month = month_from_name(value.get(2..5)?)?;
    let year: i32 = value.get(5..9)?.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day).map(|d| d.format("%Y-%m-%d").to_string())
}

fn month_from_name(name: &str) -> Option<u32> {
    let upper = name.to_ascii_uppercase();
    MONTH_ABBREVIATIONS
        .iter()
        .position(|abbr| *abbr == upper)
        .map(|idx| idx as u32 + 1)
}

fn max_days_in_month(year: i32, month: Option<u32>) -> u32 {
    match month {
        Some(2) => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        Some(4) | Some(6) | Some(9) | Some(11) => 30,
        _ => 31,
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

/// Study day of an observation relative to a subject's reference date.
///
/// On or after the reference date the offset is the day difference plus one;
/// before the reference date it is the plain difference. There is no day 0.
/// Returns `None` when either date is missing or incomplete.
pub fn calculate_study_day(obs_date: &str, ref_date: &str) -> Option<i64> {
    let obs = parse_date(obs_date)?;
    let reference = parse_date(ref_date)?;
    let delta = obs.signed_duration_since(reference).num_days();
    Some(if delta >= 0 { delta + 1 } else { delta })
}
