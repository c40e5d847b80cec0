//! Duration strings used in configuration.

use std::time::Duration;

use thiserror::Error;

/// Errors from [`parse_duration`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationError {
    #[error("empty duration string")]
    Empty,

    #[error("duration {0:?} is missing a unit (ms, s, m, h, d)")]
    MissingUnit(String),

    #[error("invalid number in duration {0:?}")]
    InvalidNumber(String),

    #[error("duration {0:?} overflows")]
    Overflow(String),
}

/// Parse a duration string like `"500ms"`, `"30s"`, `"5m"`, `"1h"`, `"30d"`.
///
/// Malformed input is an error; there is no fallback default.
pub fn parse_duration(s: &str) -> Result<Duration, DurationError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(DurationError::Empty);
    }

    // "ms" must be checked before "s" and "m".
    let (digits, millis_per_unit): (&str, u64) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1_000)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60_000)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3_600_000)
    } else if let Some(n) = s.strip_suffix('d') {
        (n, 86_400_000)
    } else {
        return Err(DurationError::MissingUnit(s.to_string()));
    };

    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|_| DurationError::InvalidNumber(s.to_string()))?;
    let millis = value
        .checked_mul(millis_per_unit)
        .ok_or_else(|| DurationError::Overflow(s.to_string()))?;

    Ok(Duration::from_millis(millis))
}
