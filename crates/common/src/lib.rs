#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::{fmt, io};
use thiserror::Error;

/// Logical identifier for a page in the storage layer.
/// Examples:
/// - `let meta_page = PageId(0); // reserved, never a node`
/// - `let root = PageId(1);`
/// - `let leaf = PageId(9001);`
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PageId(pub u64);

impl PageId {
    /// The reserved page number. As a root it means "empty tree"; as a child
    /// pointer it never appears in a well-formed internal node.
    pub const NULL: PageId = PageId(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Canonical error type shared across the storage and tree crates.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("storage: {0}")]
    Storage(String),
    #[error("page {0} not found")]
    PageNotFound(PageId),
    #[error("corrupt page: {0}")]
    Corrupt(String),
    #[error("config: {0}")]
    Config(String),
    #[error("empty key is reserved")]
    EmptyKey,
    #[error("key too large: {len} bytes (max {max})")]
    KeyTooLarge { len: usize, max: usize },
    #[error("value too large: {len} bytes (max {max})")]
    ValueTooLarge { len: usize, max: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Runtime limits for trees and the page cache in front of them.
///
/// # Example
/// ```
/// use common::Config;
///
/// let config = Config::builder()
///     .max_key_size(64)
///     .max_val_size(512)
///     .cache_pages(32)
///     .build();
/// assert_eq!(config.max_key_size, 64);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Largest key accepted by `insert`, in bytes.
    #[builder(default = 1000)]
    pub max_key_size: usize,
    /// Largest value accepted by `insert`, in bytes.
    #[builder(default = 3000)]
    pub max_val_size: usize,
    /// Number of pages an LRU page cache keeps resident.
    #[builder(default = 256)]
    pub cache_pages: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_key_size: 1000,
            max_val_size: 3000,
            cache_pages: 256,
        }
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{Config, DbError, DbResult, PageId};
}
