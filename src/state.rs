//! Keyed state stores owned by stateful step partitions.
//!
//! A store is the only owner of accumulators. Entries appear on first touch
//! and disappear only through `remove` (or a drain at end of stream); there is
//! no implicit eviction. Each store lives inside exactly one partition of one
//! step, and the runner routes every key to a single partition, so a key's
//! accumulator is never touched by two threads at once.
//!
//! Keys remember the order in which they were first touched. Flushes that have
//! to visit every key use that order, which keeps end-of-stream output
//! deterministic without requiring `K: Ord`.

use crate::window::WindowId;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// Per-key accumulators for unwindowed steps.
#[derive(Debug)]
pub struct KeyedStateStore<K, A> {
    entries: HashMap<K, (u64, A)>,
    next_seq: u64,
}

impl<K: Eq + Hash, A> Default for KeyedStateStore<K, A> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<K: Eq + Hash + Clone, A> KeyedStateStore<K, A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The accumulator of `key`, built with `builder` on first touch.
    pub fn get_or_create(&mut self, key: &K, builder: impl FnOnce() -> A) -> &mut A {
        let next_seq = &mut self.next_seq;
        let (_, acc) = self.entries.entry(key.clone()).or_insert_with(|| {
            let seq = *next_seq;
            *next_seq += 1;
            (seq, builder())
        });
        acc
    }

    pub fn get(&self, key: &K) -> Option<&A> {
        self.entries.get(key).map(|(_, acc)| acc)
    }

    /// Take the accumulator out of the store.
    pub fn remove(&mut self, key: &K) -> Option<A> {
        self.entries.remove(key).map(|(_, acc)| acc)
    }

    /// Store `acc` for `key`, replacing any previous accumulator.
    pub fn insert(&mut self, key: K, acc: A) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(key, (seq, acc));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove everything, in first-touch order.
    pub fn drain(&mut self) -> Vec<(K, A)> {
        let mut all: Vec<_> = self.entries.drain().collect();
        all.sort_by_key(|(_, (seq, _))| *seq);
        all.into_iter().map(|(k, (_, acc))| (k, acc)).collect()
    }
}

/// Per-key, per-window accumulators for windowed steps.
#[derive(Debug)]
pub struct WindowedStateStore<K, A> {
    keys: HashMap<K, (u64, BTreeMap<WindowId, A>)>,
    next_seq: u64,
}

impl<K: Eq + Hash, A> Default for WindowedStateStore<K, A> {
    fn default() -> Self {
        Self {
            keys: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<K: Eq + Hash + Clone, A> WindowedStateStore<K, A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The accumulator of `(key, window)`, built on first touch.
    pub fn get_or_create(&mut self, key: &K, window: WindowId, builder: impl FnOnce() -> A) -> &mut A {
        let windows = self.windows_mut(key);
        windows.entry(window).or_insert_with(builder)
    }

    pub fn get(&self, key: &K, window: WindowId) -> Option<&A> {
        self.keys.get(key).and_then(|(_, ws)| ws.get(&window))
    }

    pub fn get_mut(&mut self, key: &K, window: WindowId) -> Option<&mut A> {
        self.keys.get_mut(key).and_then(|(_, ws)| ws.get_mut(&window))
    }

    pub fn contains(&self, key: &K, window: WindowId) -> bool {
        self.get(key, window).is_some()
    }

    /// Remove one window's accumulator. A key with no windows left is dropped.
    pub fn remove(&mut self, key: &K, window: WindowId) -> Option<A> {
        let (_, windows) = self.keys.get_mut(key)?;
        let acc = windows.remove(&window);
        if windows.is_empty() {
            self.keys.remove(key);
        }
        acc
    }

    /// Open windows of `key`, ordered by id.
    pub fn windows(&self, key: &K) -> impl Iterator<Item = (WindowId, &A)> {
        self.keys
            .get(key)
            .into_iter()
            .flat_map(|(_, ws)| ws.iter().map(|(id, acc)| (*id, acc)))
    }

    pub fn window_count(&self) -> usize {
        self.keys.values().map(|(_, ws)| ws.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Remove everything: keys in first-touch order, windows by id.
    pub fn drain(&mut self) -> Vec<(K, WindowId, A)> {
        let mut all: Vec<_> = self.keys.drain().collect();
        all.sort_by_key(|(_, (seq, _))| *seq);
        all.into_iter()
            .flat_map(|(k, (_, ws))| {
                ws.into_iter()
                    .map(move |(id, acc)| (k.clone(), id, acc))
            })
            .collect()
    }

    fn windows_mut(&mut self, key: &K) -> &mut BTreeMap<WindowId, A> {
        let next_seq = &mut self.next_seq;
        let (_, windows) = self.keys.entry(key.clone()).or_insert_with(|| {
            let seq = *next_seq;
            *next_seq += 1;
            (seq, BTreeMap::new())
        });
        windows
    }
}
