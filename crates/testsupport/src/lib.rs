//! Test support utilities for the B+Tree workspace.
//!
//! This crate provides shared testing infrastructure:
//! - Deterministic key and value fixtures
//! - Temporary file-backed page stores
//! - Property-based test generators for keys, values, and operation sequences
//!
//! # Example Usage
//!
//! ```
//! use testsupport::prelude::*;
//!
//! let (_dir, store) = temp_file_store();
//! assert!(store.root().is_null());
//! assert_eq!(seq_key(7), b"key000007".to_vec());
//! ```

pub mod fixtures;
pub mod proptest_generators;

/// Convenient re-exports for common testing patterns.
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::proptest_generators::*;
}
