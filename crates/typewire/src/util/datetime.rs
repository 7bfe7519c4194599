//! RFC 3339 parsing and formatting for [`Timestamp`].
//!
//! Timestamps are formatted in UTC (`Z` suffix) with the fraction trimmed to
//! the shortest exact form, up to nanosecond precision. Parsing accepts any
//! offset in `[-24:00, +24:00]` and normalizes to UTC.

use thiserror::Error;

use crate::model::Timestamp;

const SECONDS_PER_MINUTE: i64 = 60;
const SECONDS_PER_HOUR: i64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: i64 = 24 * SECONDS_PER_HOUR;
const FRACTION_DIGITS: usize = 9;

/// Error type for RFC 3339 parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DateTimeParseError {
    pub message: String,
}

impl DateTimeParseError {
    fn new(what: &str, input: &str) -> Self {
        Self {
            message: format!("{}: {}", what, input),
        }
    }
}

/// Parses a timezone offset string (Z, +HH:MM, -HH:MM) and returns offset in minutes.
fn parse_timezone_offset(offset: &str) -> Result<i16, DateTimeParseError> {
    if offset == "Z" || offset == "z" {
        return Ok(0);
    }

    let invalid = || DateTimeParseError::new("Invalid timezone offset", offset);
    if offset.len() != 6 || offset.as_bytes()[3] != b':' {
        return Err(invalid());
    }
    let sign = match offset.as_bytes()[0] {
        b'+' => 1i16,
        b'-' => -1i16,
        _ => return Err(invalid()),
    };
    let hours: i16 = parse_digits(&offset[1..3]).ok_or_else(invalid)?;
    let minutes: i16 = parse_digits(&offset[4..6]).ok_or_else(invalid)?;

    // ±24:00 is the only offset with 24 hours
    if hours > 24 || (hours == 24 && minutes != 0) || minutes > 59 {
        return Err(invalid());
    }

    Ok(sign * (hours * 60 + minutes))
}

/// Parses a fixed-width run of ASCII digits.
fn parse_digits<T: std::str::FromStr>(s: &str) -> Option<T> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Parses fractional seconds and returns nanoseconds.
///
/// Digits past nanosecond precision are truncated.
fn parse_fractional_seconds(frac: &str) -> Option<u32> {
    if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut padded = frac.to_string();
    while padded.len() < FRACTION_DIGITS {
        padded.push('0');
    }
    padded.truncate(FRACTION_DIGITS);
    padded.parse().ok()
}

/// Formats nanoseconds as fractional seconds string, omitting if zero.
fn format_fractional_seconds(nanos: u32) -> String {
    if nanos == 0 {
        return String::new();
    }
    let digits = format!("{:09}", nanos);
    format!(".{}", digits.trim_end_matches('0'))
}

/// Returns true if the given year is a leap year.
fn is_leap_year(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

/// Returns the number of days in a given month (1-indexed).
fn days_in_month(year: i64, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

/// Days since Unix epoch for a civil date (Howard Hinnant's algorithm).
fn date_to_days(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let m = if month <= 2 { month + 9 } else { month - 3 } as i64;

    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let doy = (153 * m + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;

    era * 146097 + doe - 719468
}

/// Converts days since Unix epoch to (year, month, day).
fn days_to_date(days: i64) -> (i64, u32, u32) {
    let z = days + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = z - era * 146097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;

    (if m <= 2 { y + 1 } else { y }, m, d)
}

/// Parses an RFC 3339 datetime (`YYYY-MM-DDTHH:MM:SS[.fraction][Z|±HH:MM]`).
///
/// A missing offset is read as UTC. The result must lie in the range a
/// [`Timestamp`] can encode.
pub fn parse_timestamp_rfc3339(input: &str) -> Result<Timestamp, DateTimeParseError> {
    let invalid = |what: &str| DateTimeParseError::new(what, input);

    if !input.is_ascii() || input.len() < 19 {
        return Err(invalid("Invalid RFC 3339 datetime"));
    }
    let bytes = input.as_bytes();
    if bytes[4] != b'-'
        || bytes[7] != b'-'
        || !matches!(bytes[10], b'T' | b't' | b' ')
        || bytes[13] != b':'
        || bytes[16] != b':'
    {
        return Err(invalid("Invalid RFC 3339 datetime"));
    }

    let year: i64 = parse_digits(&input[..4]).ok_or_else(|| invalid("Invalid year in datetime"))?;
    let month: u32 = parse_digits(&input[5..7]).ok_or_else(|| invalid("Invalid month in datetime"))?;
    let day: u32 = parse_digits(&input[8..10]).ok_or_else(|| invalid("Invalid day in datetime"))?;
    let hours: i64 = parse_digits(&input[11..13]).ok_or_else(|| invalid("Invalid hours in datetime"))?;
    let minutes: i64 =
        parse_digits(&input[14..16]).ok_or_else(|| invalid("Invalid minutes in datetime"))?;
    let seconds: i64 =
        parse_digits(&input[17..19]).ok_or_else(|| invalid("Invalid seconds in datetime"))?;

    if !(1..=12).contains(&month) {
        return Err(invalid("Invalid month in datetime"));
    }
    if day < 1 || day > days_in_month(year, month) {
        return Err(invalid("Invalid day in datetime"));
    }
    if hours > 23 {
        return Err(invalid("Invalid hours in datetime"));
    }
    if minutes > 59 {
        return Err(invalid("Invalid minutes in datetime"));
    }
    if seconds > 59 {
        return Err(invalid("Invalid seconds in datetime"));
    }

    let rest = &input[19..];
    let (nanos, offset_str) = match rest.strip_prefix('.') {
        Some(frac_and_tz) => {
            let frac_end = frac_and_tz
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(frac_and_tz.len());
            let nanos = parse_fractional_seconds(&frac_and_tz[..frac_end])
                .ok_or_else(|| invalid("Invalid fractional seconds in datetime"))?;
            (nanos, &frac_and_tz[frac_end..])
        }
        None => (0, rest),
    };
    let offset_min = if offset_str.is_empty() {
        0
    } else {
        parse_timezone_offset(offset_str)?
    };

    // local = UTC + offset
    let local_seconds = date_to_days(year, month, day) * SECONDS_PER_DAY
        + hours * SECONDS_PER_HOUR
        + minutes * SECONDS_PER_MINUTE
        + seconds;
    let ts = Timestamp::new(local_seconds - offset_min as i64 * SECONDS_PER_MINUTE, nanos);
    ts.validate().map_err(|reason| invalid(reason))?;
    Ok(ts)
}

/// Formats a timestamp as an RFC 3339 UTC datetime.
pub fn format_timestamp_rfc3339(ts: &Timestamp) -> String {
    let days = ts.seconds.div_euclid(SECONDS_PER_DAY);
    let secs_of_day = ts.seconds.rem_euclid(SECONDS_PER_DAY);
    let (year, month, day) = days_to_date(days);

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}{}Z",
        year,
        month,
        day,
        secs_of_day / SECONDS_PER_HOUR,
        secs_of_day % SECONDS_PER_HOUR / SECONDS_PER_MINUTE,
        secs_of_day % SECONDS_PER_MINUTE,
        format_fractional_seconds(ts.nanos)
    )
}
