//! Minimum gap between accepted restarts, plus the duration parser shared by
//! every duration flag.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::error::ConfigError;

/// Debounce window: a restart is admitted only when at least this much time
/// has passed since the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Debounce(pub Duration);

impl Debounce {
    /// Returns `true` when `now` is at least one window past `last_restart`.
    ///
    /// A `now` earlier than `last_restart` counts as zero elapsed time.
    pub fn allows(&self, last_restart: Instant, now: Instant) -> bool {
        now.saturating_duration_since(last_restart) >= self.0
    }
}

impl fmt::Display for Debounce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0.as_millis())
    }
}

impl FromStr for Debounce {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_duration(s).map(Self)
    }
}

/// Parse `250ms`, `2s`, `1m`, `1h` or a bare integer (milliseconds).
///
/// Fractional values are accepted for every unit except `ms` (`1.5s`).
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let trimmed = input.trim();
    let invalid = |reason: &str| ConfigError::InvalidDuration {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    if trimmed.is_empty() {
        return Err(invalid("empty value"));
    }

    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    if number.is_empty() {
        return Err(invalid("missing number"));
    }

    if unit.is_empty() || unit == "ms" {
        let millis: u64 = number
            .parse()
            .map_err(|_| invalid("milliseconds must be a whole number"))?;
        return Ok(Duration::from_millis(millis));
    }

    let scale = match unit {
        "s" => 1.0,
        "m" => 60.0,
        "h" => 3600.0,
        _ => return Err(invalid("unknown unit; expected ms, s, m or h")),
    };
    let value: f64 = number.parse().map_err(|_| invalid("not a number"))?;
    Duration::try_from_secs_f64(value * scale).map_err(|_| invalid("out of range"))
}
