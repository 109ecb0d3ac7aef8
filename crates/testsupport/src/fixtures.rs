//! Common test fixtures and data generators.
//!
//! Keys produced here sort in the same order as their indices, which keeps
//! expected results easy to compute.

use std::path::PathBuf;

use storage::FileStore;
use tempfile::TempDir;

/// Zero-padded key for index `i`.
///
/// # Example
///
/// ```
/// use testsupport::prelude::*;
///
/// assert!(seq_key(9) < seq_key(10));
/// ```
pub fn seq_key(i: usize) -> Vec<u8> {
    format!("key{i:06}").into_bytes()
}

/// Value for index `i`, padded with a repeating byte to `len` bytes (or
/// longer, if the index itself does not fit).
pub fn seq_value(i: usize, len: usize) -> Vec<u8> {
    let mut value = format!("val{i}").into_bytes();
    let fill = b'a' + (i % 26) as u8;
    while value.len() < len {
        value.push(fill);
    }
    value
}

/// Key for index `i` padded to `len` bytes, for forcing splits with few
/// records.
pub fn wide_key(i: usize, len: usize) -> Vec<u8> {
    let mut key = seq_key(i);
    key.resize(len.max(key.len()), b'.');
    key
}

/// A fresh file-backed store in a temporary directory.
///
/// Keep the returned `TempDir` alive for as long as the store is used.
pub fn temp_file_store() -> (TempDir, FileStore) {
    let (dir, path) = temp_db_path();
    let store = FileStore::open(&path).expect("open temp file store");
    (dir, store)
}

/// A path for a not-yet-created store file inside a temporary directory.
pub fn temp_db_path() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("tree.db");
    (dir, path)
}
