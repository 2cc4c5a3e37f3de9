//! RFC 3339 date and time checks for schema string formats.
//!
//! - `date`: `YYYY-MM-DD`
//! - `time`: `HH:MM:SS[.fraction][offset]`
//! - `date-time`: `date` + `T` (or a space) + `time`
//!
//! A missing offset is accepted and read as local time.

use thiserror::Error;

/// A string that does not match the expected RFC 3339 shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DateTimeParseError {
    pub message: String,
}

fn invalid(kind: &str, text: &str) -> DateTimeParseError {
    DateTimeParseError {
        message: format!("Invalid RFC 3339 {kind}: {text}"),
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

fn digits<T: std::str::FromStr>(text: &str) -> Option<T> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Parses `Z`, `+HH:MM` or `-HH:MM`, returning the offset in minutes.
fn parse_timezone_offset(offset: &str) -> Option<i16> {
    if offset == "Z" || offset == "z" {
        return Some(0);
    }
    let bytes = offset.as_bytes();
    if bytes.len() != 6 || bytes[3] != b':' {
        return None;
    }
    let sign = match bytes[0] {
        b'+' => 1i16,
        b'-' => -1i16,
        _ => return None,
    };
    let hours: i16 = digits(&offset[1..3])?;
    let minutes: i16 = digits(&offset[4..6])?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(sign * (hours * 60 + minutes))
}

/// Checks an RFC 3339 full date, returning `(year, month, day)`.
pub fn parse_date(text: &str) -> Result<(i32, u32, u32), DateTimeParseError> {
    let err = || invalid("date", text);
    if !text.is_ascii() || text.len() != 10 {
        return Err(err());
    }
    let bytes = text.as_bytes();
    if bytes[4] != b'-' || bytes[7] != b'-' {
        return Err(err());
    }
    let year: i32 = digits(&text[..4]).ok_or_else(err)?;
    let month: u32 = digits(&text[5..7]).ok_or_else(err)?;
    let day: u32 = digits(&text[8..10]).ok_or_else(err)?;
    if !(1..=12).contains(&month) || day < 1 || day > days_in_month(year, month) {
        return Err(err());
    }
    Ok((year, month, day))
}

/// Checks an RFC 3339 time, returning microseconds since midnight and
/// the offset in minutes (None when absent).
pub fn parse_time(text: &str) -> Result<(i64, Option<i16>), DateTimeParseError> {
    let err = || invalid("time", text);
    if !text.is_ascii() || text.len() < 8 {
        return Err(err());
    }
    let bytes = text.as_bytes();
    if bytes[2] != b':' || bytes[5] != b':' {
        return Err(err());
    }
    let hours: i64 = digits(&text[..2]).ok_or_else(err)?;
    let minutes: i64 = digits(&text[3..5]).ok_or_else(err)?;
    // 60 allows a leap second
    let seconds: i64 = digits(&text[6..8]).ok_or_else(err)?;
    if hours > 23 || minutes > 59 || seconds > 60 {
        return Err(err());
    }

    let mut rest = &text[8..];
    let mut micros = 0i64;
    if let Some(fraction) = rest.strip_prefix('.') {
        let end = fraction
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(fraction.len());
        if end == 0 {
            return Err(err());
        }
        let mut padded: String = fraction[..end].chars().take(6).collect();
        while padded.len() < 6 {
            padded.push('0');
        }
        micros = digits(&padded).ok_or_else(err)?;
        rest = &fraction[end..];
    }

    let offset = if rest.is_empty() {
        None
    } else {
        Some(parse_timezone_offset(rest).ok_or_else(err)?)
    };

    let total = ((hours * 60 + minutes) * 60 + seconds) * 1_000_000 + micros;
    Ok((total, offset))
}

/// Checks an RFC 3339 date-time.
pub fn parse_date_time(
    text: &str,
) -> Result<((i32, u32, u32), i64, Option<i16>), DateTimeParseError> {
    let err = || invalid("date-time", text);
    if !text.is_ascii() || text.len() < 19 {
        return Err(err());
    }
    let separator = text.as_bytes()[10];
    if !matches!(separator, b'T' | b't' | b' ') {
        return Err(err());
    }
    let date = parse_date(&text[..10]).map_err(|_| err())?;
    let (micros, offset) = parse_time(&text[11..]).map_err(|_| err())?;
    Ok((date, micros, offset))
}
