use common::{DbError, DbResult, PageId};
use hashbrown::HashMap;
use tracing::trace;

use crate::{Page, PageStore};

/// Heap-backed page store.
///
/// Ids are handed out sequentially from 1 and never reused, which makes
/// page accounting in tests exact.
#[derive(Debug)]
pub struct MemStore {
    pages: HashMap<PageId, Page>,
    next_id: u64,
    freed: Vec<PageId>,
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            next_id: 1,
            freed: Vec::new(),
        }
    }

    /// Number of pages allocated and not yet freed.
    pub fn live_pages(&self) -> usize {
        self.pages.len()
    }

    /// Every page released so far, in release order.
    pub fn freed_pages(&self) -> &[PageId] {
        &self.freed
    }

    pub fn contains(&self, pid: PageId) -> bool {
        self.pages.contains_key(&pid)
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PageStore for MemStore {
    fn read(&mut self, pid: PageId) -> DbResult<Page> {
        self.pages
            .get(&pid)
            .cloned()
            .ok_or(DbError::PageNotFound(pid))
    }

    fn allocate(&mut self, data: &[u8]) -> DbResult<PageId> {
        let pid = PageId(self.next_id);
        let page = Page::from_bytes(pid, data)?;
        self.next_id += 1;
        self.pages.insert(pid, page);
        trace!(page = pid.0, "allocated page");
        Ok(pid)
    }

    fn free(&mut self, pid: PageId) -> DbResult<()> {
        if self.pages.remove(&pid).is_none() {
            return Err(DbError::PageNotFound(pid));
        }
        self.freed.push(pid);
        trace!(page = pid.0, "freed page");
        Ok(())
    }
}
