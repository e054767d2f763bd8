//! Days-until-expiry derivation.
//!
//! The same derivation runs on every delivery surface so serving-time
//! features match what the model saw at training time. The reference time is
//! passed in, never read from the wall clock here.

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::ValidationError;

/// Parse a strict `YYYY-MM-DD` calendar date.
///
/// Surrounding whitespace is ignored. Anything else (single-digit months,
/// other separators, impossible dates like `2024-02-30`) is rejected.
pub fn parse_expiry_date(raw: &str) -> Result<NaiveDate, ValidationError> {
    let invalid = || ValidationError::InvalidDateFormat(raw.to_string());
    let s = raw.trim();
    let bytes = s.as_bytes();

    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return Err(invalid());
    }
    let digits_ok = bytes
        .iter()
        .enumerate()
        .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !digits_ok {
        return Err(invalid());
    }

    let year: i32 = s[0..4].parse().map_err(|_| invalid())?;
    let month: u32 = s[5..7].parse().map_err(|_| invalid())?;
    let day: u32 = s[8..10].parse().map_err(|_| invalid())?;

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

/// Whole days from the date of `reference_now` to `expiry`.
///
/// `reference_now` is truncated to midnight, so the time of day never shifts
/// the result. Negative when the date has already passed.
pub fn days_until(expiry: NaiveDate, reference_now: NaiveDateTime) -> i64 {
    (expiry - reference_now.date()).num_days()
}

/// Parse `raw` and compute the days remaining until it relative to
/// `reference_now`.
pub fn derive_days_until_expiry(
    raw: &str,
    reference_now: NaiveDateTime,
) -> Result<i64, ValidationError> {
    parse_expiry_date(raw).map(|expiry| days_until(expiry, reference_now))
}
