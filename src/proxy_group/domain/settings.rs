//! Resolution of the macro-capable group configuration strings.
//!
//! Groups store their failover delay and minimum-online count as raw
//! strings. After macro expansion they are parsed here; values that cannot
//! be parsed fall back to the defaults rather than failing the evaluation.

use chrono::TimeDelta;

/// Failover delay used when the configured value cannot be parsed.
pub const DEFAULT_FAILOVER_DELAY: TimeDelta = TimeDelta::seconds(60);

/// Factor applied to the failover delay to obtain the rebalancing grace period.
pub const REBALANCE_DELAY_FACTOR: i32 = 10;

/// Resolved, typed configuration of a proxy group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupSettings {
    /// Window used to confirm both sustained contact and sustained silence.
    pub failover_delay: TimeDelta,
    /// Quorum of proxies required for the group to be serviceable.
    pub min_online: usize,
}

impl GroupSettings {
    /// Parses expanded configuration strings, applying defaults.
    #[must_use]
    pub fn parse(failover_delay: &str, min_online: &str) -> Self {
        Self {
            failover_delay: parse_time_suffix(failover_delay).unwrap_or(DEFAULT_FAILOVER_DELAY),
            min_online: parse_min_online(min_online),
        }
    }

    /// Returns the period an unbalanced group waits before hosts are moved.
    #[must_use]
    pub fn rebalance_delay(&self) -> TimeDelta {
        self.failover_delay
            .checked_mul(REBALANCE_DELAY_FACTOR)
            .unwrap_or(TimeDelta::MAX)
    }
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            failover_delay: DEFAULT_FAILOVER_DELAY,
            min_online: 1,
        }
    }
}

/// Parses a non-negative duration with an optional `s`, `m`, `h`, `d` or
/// `w` suffix, such as `90`, `1m` or `2h`.
///
/// Returns `None` for empty input, signs, fractions, unknown suffixes, and
/// values that overflow.
#[must_use]
pub fn parse_time_suffix(value: &str) -> Option<TimeDelta> {
    let digits_end = value
        .char_indices()
        .find(|(_, character)| !character.is_ascii_digit())
        .map_or(value.len(), |(index, _)| index);
    let (digits, suffix) = value.split_at(digits_end);
    if digits.is_empty() {
        return None;
    }

    let amount: i64 = digits.parse().ok()?;
    let multiplier: i64 = match suffix {
        "" | "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        "w" => 604_800,
        _ => return None,
    };

    let seconds = amount.checked_mul(multiplier)?;
    i32::try_from(seconds).ok()?;
    TimeDelta::try_seconds(seconds)
}

/// Parses the minimum-online count.
///
/// Leading whitespace and a sign are accepted and parsing stops at the first
/// non-digit. Zero, negative, and unparsable values resolve to one.
#[must_use]
pub fn parse_min_online(value: &str) -> usize {
    let trimmed = value.trim_start();
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    if negative {
        return 1;
    }

    let digits: String = unsigned
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    match digits.parse::<usize>() {
        Ok(0) | Err(_) => 1,
        Ok(count) => count,
    }
}
