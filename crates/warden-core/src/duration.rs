//! The delay grammar: `0 | <n>m | <n>h | <n>d | never`.
//!
//! `n` is a positive integer and units cannot be mixed; everything else
//! is rejected during validation.

use crate::error::WardenError;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A parsed unblock delay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delay {
    /// `"never"`: the item can never be unblocked.
    Never,
    /// `"0"`: the unblock is applied within the same tick.
    Instant,
    /// A positive delay before the unblock executes.
    After { seconds: i64 },
}

impl Delay {
    /// Parse a delay string against the grammar.
    pub fn parse(raw: &str) -> Result<Delay, WardenError> {
        let raw = raw.trim();
        match raw {
            "never" => return Ok(Delay::Never),
            "0" => return Ok(Delay::Instant),
            _ => {}
        }

        if !raw.is_ascii() {
            return Err(WardenError::Validation(format!(
                "invalid delay '{raw}' (expected 0, <n>m, <n>h, <n>d or never)"
            )));
        }

        let (digits, unit) = raw.split_at(raw.len().saturating_sub(1));
        let multiplier = match unit {
            "m" => 60,
            "h" => 3600,
            "d" => 86_400,
            _ => {
                return Err(WardenError::Validation(format!(
                    "invalid delay '{raw}' (expected 0, <n>m, <n>h, <n>d or never)"
                )))
            }
        };

        let n: i64 = digits.parse().map_err(|_| {
            WardenError::Validation(format!(
                "invalid delay '{raw}' (expected 0, <n>m, <n>h, <n>d or never)"
            ))
        })?;
        if n <= 0 {
            return Err(WardenError::Validation(format!(
                "invalid delay '{raw}' (count must be positive)"
            )));
        }

        Ok(Delay::After {
            seconds: n * multiplier,
        })
    }

    /// Seconds until execution, or `None` for `never`.
    pub fn as_seconds(&self) -> Option<i64> {
        match self {
            Delay::Never => None,
            Delay::Instant => Some(0),
            Delay::After { seconds } => Some(*seconds),
        }
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Delay::Never)
    }
}

impl fmt::Display for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delay::Never => write!(f, "never"),
            Delay::Instant => write!(f, "0"),
            Delay::After { seconds } => {
                if seconds % 86_400 == 0 {
                    write!(f, "{}d", seconds / 86_400)
                } else if seconds % 3600 == 0 {
                    write!(f, "{}h", seconds / 3600)
                } else {
                    write!(f, "{}m", seconds / 60)
                }
            }
        }
    }
}

/// Parse a positive duration for the `panic`/`pause` commands.
///
/// Same grammar minus the `0` and `never` sentinels.
pub fn parse_duration(raw: &str) -> Result<Duration, WardenError> {
    match Delay::parse(raw)? {
        Delay::After { seconds } => Ok(Duration::seconds(seconds)),
        _ => Err(WardenError::Validation(format!(
            "invalid duration '{raw}' (expected <n>m, <n>h or <n>d)"
        ))),
    }
}
