//! Time, Duration, and Bounds — the engine's event-time primitives.
//!
//! `Time` is a signed nanosecond instant, `Duration` a signed nanosecond
//! span. Both are plain newtypes over `i64` rather than wrapping `chrono`
//! types directly: the hot path (column append, watermark compare) never
//! needs calendar arithmetic, only integer comparison.

use std::fmt;
use std::ops::{Add, Sub};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A signed 64-bit nanosecond instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Time(pub i64);

/// Sentinel used by `range(start: ...)` and friends to mean "the earliest
/// representable instant", mirroring `query.MinTime` in the source engine.
pub const MIN_TIME: Time = Time(i64::MIN + 1);

impl Time {
    pub const fn nanos(self) -> i64 {
        self.0
    }

    pub fn from_rfc3339(s: &str) -> Result<Self, chrono::ParseError> {
        let dt: DateTime<Utc> = DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc);
        Ok(Time(dt.timestamp_nanos_opt().unwrap_or(0)))
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<Duration> for Time {
    type Output = Time;
    fn add(self, rhs: Duration) -> Time {
        Time(self.0 + rhs.0)
    }
}

impl Sub<Time> for Time {
    type Output = Duration;
    fn sub(self, rhs: Time) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

/// A signed 64-bit nanosecond span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Duration(pub i64);

impl Duration {
    pub const fn nanos(self) -> i64 {
        self.0
    }

    /// Parses strings like `"1m"`, `"1s"`, `"-4h"`, `"500ms"`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty duration".into());
        }
        let (sign, rest) = if let Some(stripped) = s.strip_prefix('-') {
            (-1i64, stripped)
        } else {
            (1i64, s)
        };
        let split_at = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(|| format!("missing unit in duration {s:?}"))?;
        let (num, unit) = rest.split_at(split_at);
        let value: f64 = num
            .parse()
            .map_err(|_| format!("invalid duration number in {s:?}"))?;
        let unit_ns: f64 = match unit {
            "ns" => 1.0,
            "us" | "\u{b5}s" => 1_000.0,
            "ms" => 1_000_000.0,
            "s" => 1_000_000_000.0,
            "m" => 60.0 * 1_000_000_000.0,
            "h" => 3_600.0 * 1_000_000_000.0,
            "d" => 24.0 * 3_600.0 * 1_000_000_000.0,
            "w" => 7.0 * 24.0 * 3_600.0 * 1_000_000_000.0,
            other => return Err(format!("unknown duration unit {other:?}")),
        };
        Ok(Duration(sign * (value * unit_ns) as i64))
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// A half-open time interval `[Start, Stop)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    pub start: Time,
    pub stop: Time,
}

impl Bounds {
    pub fn new(start: Time, stop: Time) -> Self {
        Self { start, stop }
    }

    pub fn contains(&self, t: Time) -> bool {
        t >= self.start && t < self.stop
    }

    pub fn overlaps(&self, other: &Bounds) -> bool {
        self.start < other.stop && other.start < self.stop
    }
}

/// A query time, either an absolute instant or a relative offset from
/// `now`, resolved at execution time. Mirrors `query.Time` in the source
/// engine's wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryTime {
    Absolute(Time),
    Relative { relative: Duration, is_relative: bool },
}

impl QueryTime {
    pub fn resolve(self, now: Time) -> Time {
        match self {
            QueryTime::Absolute(t) => t,
            QueryTime::Relative { relative, .. } => now + relative,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_parses_signed_units() {
        assert_eq!(Duration::parse("1m").unwrap(), Duration(60_000_000_000));
        assert_eq!(Duration::parse("1s").unwrap(), Duration(1_000_000_000));
        assert_eq!(Duration::parse("-4h").unwrap(), Duration(-4 * 3_600_000_000_000));
    }

    #[test]
    fn bounds_contains_is_half_open() {
        let b = Bounds::new(Time(0), Time(10));
        assert!(b.contains(Time(0)));
        assert!(!b.contains(Time(10)));
        assert!(b.contains(Time(9)));
    }
}
