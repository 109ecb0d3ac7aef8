//! Page buffers and the page-lifecycle contract trees are built on.
//!
//! A tree never touches a file directly. It reads, allocates and frees whole
//! pages through a [`PageStore`], so persistence is pluggable:
//! - [`MemStore`]: in-memory store for tests and ephemeral trees
//! - [`FileStore`]: file-backed store with a committed meta page

#[cfg(test)]
mod tests;

mod file;
mod mem;

pub use file::{FREE_IDS_PER_PAGE, FileStore, META_FREE_IDS, Meta};
pub use mem::MemStore;

use common::{DbError, DbResult, PageId};

/// Size of one page, the unit of I/O.
pub const PAGE_SIZE: usize = 4096;

/// A page-sized byte buffer tagged with the page number it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub id: PageId,
    pub data: Vec<u8>,
}

impl Page {
    /// Create a zeroed page.
    pub fn new(id: PageId) -> Self {
        Self {
            id,
            data: vec![0u8; PAGE_SIZE],
        }
    }

    /// Copy `bytes` into a fresh page, zero-padding the tail.
    pub fn from_bytes(id: PageId, bytes: &[u8]) -> DbResult<Self> {
        if bytes.len() > PAGE_SIZE {
            return Err(DbError::Storage(format!(
                "page payload too large: {} bytes (max {PAGE_SIZE})",
                bytes.len()
            )));
        }
        let mut page = Self::new(id);
        page.data[..bytes.len()].copy_from_slice(bytes);
        Ok(page)
    }
}

/// Abstraction for reading, allocating, and releasing immutable pages.
///
/// Implementors own page persistence:
/// - `read` returns a copy of a live page, or `PageNotFound`
/// - `allocate` persists a new page and assigns it a non-zero id
/// - `free` releases a page no longer reachable from the current root
///
/// A page is never modified after `allocate`; edits always produce a new page.
pub trait PageStore {
    /// Read a live page.
    fn read(&mut self, pid: PageId) -> DbResult<Page>;

    /// Persist `data` (at most `PAGE_SIZE` bytes) under a freshly assigned id.
    fn allocate(&mut self, data: &[u8]) -> DbResult<PageId>;

    /// Release a page.
    fn free(&mut self, pid: PageId) -> DbResult<()>;
}

impl<S: PageStore + ?Sized> PageStore for &mut S {
    fn read(&mut self, pid: PageId) -> DbResult<Page> {
        (**self).read(pid)
    }

    fn allocate(&mut self, data: &[u8]) -> DbResult<PageId> {
        (**self).allocate(data)
    }

    fn free(&mut self, pid: PageId) -> DbResult<()> {
        (**self).free(pid)
    }
}
