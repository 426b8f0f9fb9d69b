//! Assertion functions for comparing pipeline outputs.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

/// Assert that two collections are equal in order and content.
///
/// # Panics
///
/// Panics if the collections differ in length or content.
///
/// # Example
///
/// ```
/// use ironstream::testing::assert_collections_equal;
///
/// assert_collections_equal(&[1, 2, 3], &[1, 2, 3]);
/// ```
pub fn assert_collections_equal<T: Debug + PartialEq>(actual: &[T], expected: &[T]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "Collection length mismatch:\n  Expected length: {}\n  Actual length: {}\n  Expected: {expected:?}\n  Actual: {actual:?}",
        expected.len(),
        actual.len()
    );

    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert_eq!(
            a, e,
            "Collection mismatch at index {i}:\n  Expected: {e:?}\n  Actual: {a:?}\n  Full expected: {expected:?}\n  Full actual: {actual:?}"
        );
    }
}

/// Assert that two keyed outputs carry the same values per key in the same
/// per-key order, while allowing keys to interleave differently.
///
/// This is the guarantee a parallel run gives relative to a sequential one.
///
/// # Panics
///
/// Panics if a key is missing, extra, or sees its values in a different order.
///
/// # Example
///
/// ```
/// use ironstream::testing::assert_key_order_preserved;
///
/// let sequential = vec![("a", 1), ("b", 1), ("a", 2)];
/// let parallel = vec![("b", 1), ("a", 1), ("a", 2)];
/// assert_key_order_preserved(&parallel, &sequential);
/// ```
pub fn assert_key_order_preserved<K, V>(actual: &[(K, V)], expected: &[(K, V)])
where
    K: Debug + Eq + Hash,
    V: Debug + PartialEq,
{
    let actual_by_key = by_key(actual);
    let expected_by_key = by_key(expected);

    let actual_keys: HashSet<_> = actual_by_key.keys().collect();
    let expected_keys: HashSet<_> = expected_by_key.keys().collect();
    assert_eq!(
        actual_keys, expected_keys,
        "Key sets differ:\n  Expected: {expected:?}\n  Actual: {actual:?}"
    );

    for (key, expected_values) in &expected_by_key {
        let actual_values = &actual_by_key[key];
        assert_eq!(
            actual_values, expected_values,
            "Values for key {key:?} differ or arrive in a different order"
        );
    }
}

fn by_key<K: Eq + Hash, V>(items: &[(K, V)]) -> HashMap<&K, Vec<&V>> {
    let mut map: HashMap<&K, Vec<&V>> = HashMap::new();
    for (k, v) in items {
        map.entry(k).or_default().push(v);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "Collection mismatch at index 1")]
    fn ordered_mismatch_reports_index() {
        assert_collections_equal(&[1, 2], &[1, 3]);
    }

    #[test]
    #[should_panic(expected = "different order")]
    fn key_order_violation_is_detected() {
        assert_key_order_preserved(&[("a", 2), ("a", 1)], &[("a", 1), ("a", 2)]);
    }
}
