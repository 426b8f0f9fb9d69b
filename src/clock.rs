//! Clocks decide the time an item is windowed by.
//!
//! A windowed step is configured with a [`ClockConfig`]:
//!
//! - [`ClockConfig::System`] reads wall-clock time when the item reaches the step.
//! - [`ClockConfig::Epoch`] uses the epoch the item was ingested with, which is
//!   either supplied by the input ([`TimestampedInput`](crate::io::TimestampedInput))
//!   or stamped by the input's own clock.
//! - [`ClockConfig::Custom`] plugs in any [`Clock`], e.g. a [`TestingClock`]
//!   that tests advance by hand.

use crate::window::TimestampMs;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// A source of "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> TimestampMs;
}

/// Wall-clock time in UTC.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimestampMs {
        Utc::now().timestamp_millis()
    }
}

/// A manually driven clock. Clones share the same instant.
///
/// ```
/// use ironstream::clock::{Clock, TestingClock};
/// use std::time::Duration;
///
/// let clock = TestingClock::new(1_000);
/// let handle = clock.clone();
/// handle.advance(Duration::from_millis(250));
/// assert_eq!(clock.now(), 1_250);
/// ```
#[derive(Clone, Debug, Default)]
pub struct TestingClock {
    now: Arc<AtomicI64>,
}

impl TestingClock {
    pub fn new(start: TimestampMs) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start)),
        }
    }

    pub fn set(&self, ts: TimestampMs) {
        self.now.store(ts, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let ms = crate::window::duration_ms(by);
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for TestingClock {
    fn now(&self) -> TimestampMs {
        self.now.load(Ordering::SeqCst)
    }
}

/// Clock policy of a windowed step.
#[derive(Clone, Default)]
pub enum ClockConfig {
    #[default]
    System,
    Epoch,
    Custom(Arc<dyn Clock>),
}

impl ClockConfig {
    pub fn custom(clock: impl Clock + 'static) -> Self {
        Self::Custom(Arc::new(clock))
    }

    /// Resolve the window time of an item ingested at `epoch`.
    #[inline]
    pub(crate) fn time_for(&self, epoch: TimestampMs) -> TimestampMs {
        match self {
            Self::System => SystemClock.now(),
            Self::Epoch => epoch,
            Self::Custom(clock) => clock.now(),
        }
    }
}

impl fmt::Debug for ClockConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("System"),
            Self::Epoch => f.write_str("Epoch"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_clock_uses_item_epoch() {
        assert_eq!(ClockConfig::Epoch.time_for(42), 42);
    }

    #[test]
    fn custom_clock_ignores_epoch() {
        let clock = TestingClock::new(7);
        let cfg = ClockConfig::custom(clock.clone());
        assert_eq!(cfg.time_for(1_000), 7);
        clock.set(9);
        assert_eq!(cfg.time_for(1_000), 9);
    }
}
