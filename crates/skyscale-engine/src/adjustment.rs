//! Adjustment expressions and instance count arithmetic.

use std::fmt;
use std::num::{ParseFloatError, ParseIntError};
use std::str::FromStr;

use thiserror::Error;

/// A parsed adjustment instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Adjustment {
    /// Add a signed number of instances: `"+1"`, `"-2"`, `"5"`.
    Step(i64),
    /// Scale by a signed percentage: `"+50%"`, `"-90%"`.
    Percent(f64),
}

#[derive(Debug, Error)]
pub enum AdjustmentError {
    #[error("invalid step adjustment {input:?}")]
    Step {
        input: String,
        #[source]
        source: ParseIntError,
    },

    #[error("invalid percentage adjustment {input:?}")]
    Percent {
        input: String,
        #[source]
        source: ParseFloatError,
    },

    #[error("percentage adjustment {0:?} is not finite")]
    NonFinite(String),
}

impl FromStr for Adjustment {
    type Err = AdjustmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.strip_suffix('%') {
            Some(pct) => {
                let value: f64 = pct.parse().map_err(|source| AdjustmentError::Percent {
                    input: s.to_string(),
                    source,
                })?;
                if !value.is_finite() {
                    return Err(AdjustmentError::NonFinite(s.to_string()));
                }
                Ok(Adjustment::Percent(value))
            }
            None => s
                .parse()
                .map(Adjustment::Step)
                .map_err(|source| AdjustmentError::Step {
                    input: s.to_string(),
                    source,
                }),
        }
    }
}

impl fmt::Display for Adjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Adjustment::Step(step) => write!(f, "{step:+}"),
            Adjustment::Percent(pct) => write!(f, "{pct:+}%"),
        }
    }
}

impl Adjustment {
    /// Apply to `current` without bounds. Percentages round half up.
    /// Results saturate at the `i64` range.
    pub fn apply(&self, current: u32) -> i64 {
        match *self {
            Adjustment::Step(step) => i64::from(current).saturating_add(step),
            Adjustment::Percent(pct) => {
                // `as` saturates for out-of-range floats.
                (f64::from(current) * (1.0 + pct / 100.0) + 0.5).floor() as i64
            }
        }
    }
}

/// Which policy bound, if any, limited a computed count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Min(u32),
    Max(u32),
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Min(n) => write!(f, "limited by min instances {n}"),
            Limit::Max(n) => write!(f, "limited by max instances {n}"),
        }
    }
}

/// Clamp a raw count to `max(min, min(raw, max))`, reporting the bound hit.
pub fn clamp_instances(raw: i64, min: u32, max: u32) -> (u32, Option<Limit>) {
    if raw > i64::from(max) {
        let clamped = max.max(min);
        return (clamped, Some(Limit::Max(max)));
    }
    if raw < i64::from(min) {
        return (min, Some(Limit::Min(min)));
    }
    // min <= raw <= max fits in u32.
    (raw as u32, None)
}

/// Compute the new instance count for `current` under `adjustment`, bounded
/// by `[min, max]`.
pub fn compute_new_instance_count(
    current: u32,
    adjustment: &str,
    min: u32,
    max: u32,
) -> Result<u32, AdjustmentError> {
    let adjustment: Adjustment = adjustment.parse()?;
    Ok(clamp_instances(adjustment.apply(current), min, max).0)
}
