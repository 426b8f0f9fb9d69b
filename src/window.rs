//! Time and window vocabulary shared by the windowing engine.
//!
//! Timestamps are milliseconds since the UNIX epoch ([`TimestampMs`]). A
//! [`Window`] is the extent of one time bucket and a [`WindowId`] names it:
//! for tumbling windows the id is the bucket index relative to `align_to`,
//! for session windows it is generated when the session opens and survives
//! merges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Milliseconds since UNIX epoch (UTC).
pub type TimestampMs = i64;

/// Convert a UTC datetime into a [`TimestampMs`].
#[inline]
pub fn timestamp_ms(dt: DateTime<Utc>) -> TimestampMs {
    dt.timestamp_millis()
}

/// Whole milliseconds in `d`, saturating at `i64::MAX`.
#[inline]
pub fn duration_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

/// Identifier of a window within one key of one stateful step.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowId(pub i64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// Extent of a window.
///
/// Tumbling windows are closed-open: `[start, end)`. Session windows use the
/// times of their first and latest item, both inclusive: `[start, end]`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Window {
    pub start: TimestampMs,
    pub end: TimestampMs,
}

impl Window {
    #[inline]
    pub fn new(start: TimestampMs, end: TimestampMs) -> Self {
        debug_assert!(end >= start);
        Self { start, end }
    }

    /// A zero-length extent at `ts`; the shape of a freshly opened session.
    #[inline]
    pub fn point(ts: TimestampMs) -> Self {
        Self { start: ts, end: ts }
    }

    /// Bucket index of `ts` for tumbling windows of `length_ms` aligned to `align_to`.
    ///
    /// Floors toward negative infinity so the arithmetic stays correct for
    /// timestamps on either side of the UNIX epoch.
    #[inline]
    pub fn bucket(ts: TimestampMs, length_ms: i64, align_to: TimestampMs) -> i64 {
        debug_assert!(length_ms > 0);
        ts.saturating_sub(align_to).div_euclid(length_ms)
    }

    /// Extent of tumbling bucket `index`. Bounds saturate at the ends of the
    /// timestamp range, so a bucket longer than the range ends at `i64::MAX`.
    #[inline]
    pub fn tumble(index: i64, length_ms: i64, align_to: TimestampMs) -> Self {
        let start = align_to.saturating_add(index.saturating_mul(length_ms));
        Self {
            start,
            end: start.saturating_add(length_ms),
        }
    }

    /// Grow this extent so it also covers `ts`. Extents never shrink.
    #[inline]
    pub fn extend_to(&mut self, ts: TimestampMs) {
        self.start = self.start.min(ts);
        self.end = self.end.max(ts);
    }

    /// Smallest extent covering both windows.
    #[inline]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Distance between two extents; zero when they overlap or touch.
    #[inline]
    pub fn distance(&self, other: &Self) -> i64 {
        if other.start > self.end {
            other.start.saturating_sub(self.end)
        } else if self.start > other.end {
            self.start.saturating_sub(other.end)
        } else {
            0
        }
    }

    /// Distance from `ts` to this extent; zero when inside.
    #[inline]
    pub fn distance_to(&self, ts: TimestampMs) -> i64 {
        self.distance(&Self::point(ts))
    }
}

/// Window policy of a windowed step.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WindowConfig {
    /// Fixed, contiguous, non-overlapping buckets of `length` starting at `align_to`.
    Tumbling {
        length: Duration,
        align_to: TimestampMs,
    },
    /// Windows that stay open while items keep arriving within `gap` of each other.
    Session { gap: Duration },
}

impl WindowConfig {
    pub fn tumbling(length: Duration, align_to: TimestampMs) -> Self {
        Self::Tumbling { length, align_to }
    }

    /// Tumbling windows aligned to a calendar instant.
    pub fn tumbling_at(length: Duration, align_to: DateTime<Utc>) -> Self {
        Self::Tumbling {
            length,
            align_to: timestamp_ms(align_to),
        }
    }

    pub fn session(gap: Duration) -> Self {
        Self::Session { gap }
    }

    /// Check the parameters; lengths and gaps must be at least one millisecond.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Tumbling { length, .. } if duration_ms(*length) <= 0 => Err(format!(
                "tumbling window length must be at least 1ms, got {length:?}"
            )),
            Self::Session { gap } if duration_ms(*gap) <= 0 => Err(format!(
                "session gap must be at least 1ms, got {gap:?}"
            )),
            _ => Ok(()),
        }
    }

    pub fn is_session(&self) -> bool {
        matches!(self, Self::Session { .. })
    }
}

/// A timestamped element (event-time semantics).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Timestamped<T> {
    pub ts: TimestampMs,
    pub value: T,
}

impl<T> Timestamped<T> {
    #[inline]
    pub fn new(ts: TimestampMs, value: T) -> Self {
        Self { ts, value }
    }

    #[inline]
    pub fn at(dt: DateTime<Utc>, value: T) -> Self {
        Self::new(timestamp_ms(dt), value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_floors_negative_offsets() {
        assert_eq!(Window::bucket(0, 10, 0), 0);
        assert_eq!(Window::bucket(9, 10, 0), 0);
        assert_eq!(Window::bucket(10, 10, 0), 1);
        assert_eq!(Window::bucket(-1, 10, 0), -1);
        assert_eq!(Window::bucket(1_005, 10, 1_000), 0);
        assert_eq!(Window::tumble(-1, 10, 0), Window::new(-10, 0));
    }

    #[test]
    fn tumble_saturates_for_lengths_past_the_timestamp_range() {
        let length = duration_ms(Duration::from_secs(u64::MAX));
        assert_eq!(length, i64::MAX);
        let align_to = 1_700_000_000_000;
        assert_eq!(Window::bucket(align_to + 3, length, align_to), 0);
        assert_eq!(
            Window::tumble(0, length, align_to),
            Window::new(align_to, i64::MAX)
        );
        assert_eq!(Window::bucket(i64::MAX, 1, i64::MIN), i64::MAX);
    }

    #[test]
    fn distance_is_zero_for_overlap() {
        let a = Window::new(0, 500);
        assert_eq!(a.distance(&Window::new(200, 900)), 0);
        assert_eq!(a.distance(&Window::new(1_500, 1_600)), 1_000);
        assert_eq!(Window::new(1_500, 1_600).distance(&a), 1_000);
        assert_eq!(a.distance_to(250), 0);
    }

    #[test]
    fn validate_rejects_zero_and_sub_millisecond() {
        assert!(WindowConfig::tumbling(Duration::ZERO, 0).validate().is_err());
        assert!(WindowConfig::session(Duration::from_micros(10)).validate().is_err());
        assert!(WindowConfig::session(Duration::from_millis(1)).validate().is_ok());
    }

    #[test]
    fn window_config_serde_shape() {
        let cfg: WindowConfig =
            serde_json::from_str(r#"{"type":"session","gap":{"secs":1,"nanos":0}}"#).unwrap();
        assert_eq!(cfg, WindowConfig::session(Duration::from_secs(1)));
    }
}
