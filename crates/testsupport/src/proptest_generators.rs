//! Property-based test generators using proptest.
//!
//! Provides strategies for keys, values, sorted key sets, and sequences of
//! tree operations.

use proptest::prelude::*;

/// One mutation applied to a tree under test.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeOp {
    Insert(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Strategy for non-empty keys of up to `max_len` bytes.
pub fn arb_key(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..=max_len.max(1))
}

/// Strategy for values of up to `max_len` bytes, possibly empty.
pub fn arb_value(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Strategy for a strictly increasing list of distinct keys.
///
/// # Example
///
/// ```
/// use proptest::prelude::*;
/// use testsupport::proptest_generators::arb_sorted_keys;
///
/// proptest! {
///     #[test]
///     fn keys_are_sorted(keys in arb_sorted_keys(20, 8)) {
///         assert!(keys.windows(2).all(|w| w[0] < w[1]));
///     }
/// }
/// ```
pub fn arb_sorted_keys(max_count: usize, max_len: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::btree_set(arb_key(max_len), 0..=max_count)
        .prop_map(|set| set.into_iter().collect())
}

/// Strategy for keys drawn from a small alphabet, so inserts and deletes
/// collide often.
pub fn arb_dense_key() -> impl Strategy<Value = Vec<u8>> {
    "[a-h]{1,3}".prop_map(String::into_bytes)
}

/// Strategy for operation sequences over dense keys.
pub fn arb_tree_ops(max_ops: usize, max_val_len: usize) -> impl Strategy<Value = Vec<TreeOp>> {
    let op = prop_oneof![
        3 => (arb_dense_key(), arb_value(max_val_len)).prop_map(|(k, v)| TreeOp::Insert(k, v)),
        1 => arb_dense_key().prop_map(TreeOp::Delete),
    ];
    prop::collection::vec(op, 0..=max_ops)
}

/// Strategy for dense keys padded with `.` to either their own length, a
/// quarter of `max_len`, or `max_len`, so nodes mix short and long keys.
pub fn arb_wide_key(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    let lens = vec![0, max_len / 4, max_len];
    (arb_dense_key(), prop::sample::select(lens)).prop_map(|(mut key, len)| {
        if len > key.len() {
            key.resize(len, b'.');
        }
        key
    })
}

/// Strategy for operation sequences over keys from [`arb_wide_key`].
pub fn arb_wide_tree_ops(
    max_key_len: usize,
    max_ops: usize,
    max_val_len: usize,
) -> impl Strategy<Value = Vec<TreeOp>> {
    let op = prop_oneof![
        3 => (arb_wide_key(max_key_len), arb_value(max_val_len))
            .prop_map(|(k, v)| TreeOp::Insert(k, v)),
        1 => arb_wide_key(max_key_len).prop_map(TreeOp::Delete),
    ];
    prop::collection::vec(op, 0..=max_ops)
}
