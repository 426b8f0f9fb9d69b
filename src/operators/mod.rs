//! Operator implementations behind the [`Node`](crate::node::Node) trait objects.
//!
//! - [`stateless`]: `filter`, `filter_map`, `flat_map`, `map`, `inspect`, `inspect_epoch`
//! - [`reduce`]: per-key reduction with a completion predicate
//! - [`window`]: `fold_window`, `reduce_window`, `collect_window`
//! - [`stateful_map`]: per-key running state, one output per input

pub(crate) mod reduce;
pub(crate) mod stateful_map;
pub(crate) mod stateless;
pub(crate) mod window;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Partition routing hash. `DefaultHasher::new` uses fixed keys, so a key lands
/// in the same partition on every run.
pub(crate) fn route_hash<K: Hash>(key: &K) -> u64 {
    let mut h = DefaultHasher::new();
    key.hash(&mut h);
    h.finish()
}
