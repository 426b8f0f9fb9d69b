//! Completion tracking: when is a window final?
//!
//! Watermarks are tracked **per key**, inside each stateful step partition.
//! A key's watermark is the greatest window time observed for that key; it
//! only moves forward and only when an item for that key arrives. There is
//! no timer: a key that stops receiving items keeps its windows open until the
//! stream ends or the run is stopped.
//!
//! Completion is evaluated at the end of every micro-batch. Items of a batch
//! are placed first; then each key whose watermark moved closes the windows
//! that are complete at it, and that watermark becomes the key's `applied`
//! mark. Lateness is judged against `applied`, so an item is only late when it
//! targets a window that completion already settled. With a batch size of one
//! the two marks are equal after every item.
//!
//! Each key also remembers how far its closed windows reach
//! (`closed_through`). Anything at or below that mark would have to reopen a
//! closed session and is treated as late.

use crate::window::TimestampMs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;

/// Lifecycle of a `(key, window)` record: absent → open → closed → absent.
///
/// `Closed` is terminal. A closed record is emitted and removed from the
/// state store in the same step, so it is never observed by a later item.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WindowStatus {
    Open,
    Closed,
}

/// What to do with an item that targets an already-closed window.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LateDataPolicy {
    /// Drop the item, count it in the step's stats, and keep running.
    #[default]
    Drop,
    /// Abort the run with [`FlowError::LateData`](crate::error::FlowError::LateData).
    Fail,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct KeyProgress {
    /// Greatest window time observed.
    pub watermark: TimestampMs,
    /// Watermark that completion was last evaluated at.
    pub applied: TimestampMs,
    pub closed_through: TimestampMs,
}

impl Default for KeyProgress {
    fn default() -> Self {
        Self {
            watermark: TimestampMs::MIN,
            applied: TimestampMs::MIN,
            closed_through: TimestampMs::MIN,
        }
    }
}

/// Per-key watermark bookkeeping for one step partition.
///
/// A key gets progress when its first item is placed. Placing an item always
/// leaves the key with an open window, and windows only close at a later
/// watermark of the same key, so every tracked key has open state in the
/// step's store until end of stream.
#[derive(Debug)]
pub struct CompletionTracker<K> {
    keys: HashMap<K, KeyProgress>,
}

impl<K: Eq + Hash> Default for CompletionTracker<K> {
    fn default() -> Self {
        Self { keys: HashMap::new() }
    }
}

impl<K: Eq + Hash + Clone> CompletionTracker<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(&self, key: &K) -> KeyProgress {
        self.keys.get(key).copied().unwrap_or_default()
    }

    pub fn watermark(&self, key: &K) -> TimestampMs {
        self.progress(key).watermark
    }

    /// Observe an item at `ts` for `key`. Returns the new watermark and whether it advanced.
    pub fn observe(&mut self, key: &K, ts: TimestampMs) -> (TimestampMs, bool) {
        let progress = self.keys.entry(key.clone()).or_default();
        if ts > progress.watermark {
            progress.watermark = ts;
            (ts, true)
        } else {
            (progress.watermark, false)
        }
    }

    /// Settle `key` at its current watermark and return it.
    pub fn apply(&mut self, key: &K) -> TimestampMs {
        let progress = self.keys.entry(key.clone()).or_default();
        progress.applied = progress.watermark;
        progress.applied
    }

    /// Record that a window of `key` reaching up to `reach` was closed.
    pub fn mark_closed(&mut self, key: &K, reach: TimestampMs) {
        let progress = self.keys.entry(key.clone()).or_default();
        progress.closed_through = progress.closed_through.max(reach);
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }
}
