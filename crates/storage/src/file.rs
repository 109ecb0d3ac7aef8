use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use bincode::config::{self, Config};
use bincode::serde::{decode_from_slice, encode_into_slice};
use common::{DbError, DbResult, PageId};
use hashbrown::HashSet;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, trace};

use crate::{PAGE_SIZE, Page, PageStore};

const META_MAGIC: u64 = u64::from_le_bytes(*b"cowtree1");

/// Free page ids kept inline in the meta page. The fixed meta fields and
/// the length prefix take 40 bytes under bincode's legacy encoding.
pub const META_FREE_IDS: usize = 480;

/// Free page ids per overflow page, after `next` and the length prefix.
pub const FREE_IDS_PER_PAGE: usize = (PAGE_SIZE - 16) / 8;

const _: () = assert!(40 + 8 * META_FREE_IDS <= PAGE_SIZE);

fn bincode_config() -> impl Config {
    config::legacy()
}

/// Contents of the meta page (page 0) as of the last commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    magic: u64,
    /// Root of the committed tree, `PageId::NULL` when empty.
    pub root: PageId,
    /// Pages in use by the file, including the meta page.
    pub num_pages: u64,
    /// Pages released by committed roots, free for reuse.
    pub free_list: Vec<PageId>,
    /// First overflow page of the free list, `PageId::NULL` when
    /// `free_list` holds every free page.
    pub free_overflow: PageId,
}

impl Meta {
    fn empty() -> Self {
        Self {
            magic: META_MAGIC,
            root: PageId::NULL,
            num_pages: 1,
            free_list: Vec::new(),
            free_overflow: PageId::NULL,
        }
    }
}

/// One overflow page of the free list.
#[derive(Debug, Serialize, Deserialize)]
struct FreePage {
    next: PageId,
    ids: Vec<PageId>,
}

/// File-backed page store.
///
/// Layout:
/// - Page 0: bincode-encoded [`Meta`]
/// - Pages 1..: tree pages and free-list pages, page `n` at byte offset
///   `n * PAGE_SIZE`
///
/// A page reachable from the last committed root is never overwritten:
/// freeing one defers it until [`FileStore::commit`]. Pages allocated since
/// the last commit are unreachable from it, so freeing them makes them
/// reusable at once.
#[derive(Debug)]
pub struct FileStore {
    file: File,
    committed: Meta,
    num_pages: u64,
    /// Free under the committed meta, or allocated and freed since it.
    reusable: Vec<PageId>,
    /// Freed since the last commit but still reachable from it.
    pending: Vec<PageId>,
    /// Allocated since the last commit.
    fresh: HashSet<PageId>,
    /// Pages holding the committed free list.
    chain: Vec<PageId>,
    /// Every page that does not hold live tree data.
    dead: HashSet<PageId>,
}

impl FileStore {
    /// Open the store at `path`, creating an empty one if the file is new.
    pub fn open(path: &Path) -> DbResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let file_len = file.metadata()?.len();
        let mut store = Self {
            file,
            committed: Meta::empty(),
            num_pages: 1,
            reusable: Vec::new(),
            pending: Vec::new(),
            fresh: HashSet::new(),
            chain: Vec::new(),
            dead: HashSet::new(),
        };

        if file_len == 0 {
            store.write_meta(&Meta::empty())?;
            store.file.sync_all()?;
            return Ok(store);
        }

        let meta = store.read_meta()?;
        if meta.num_pages * (PAGE_SIZE as u64) > file_len {
            return Err(DbError::Corrupt(format!(
                "meta claims {} pages but file holds {} bytes",
                meta.num_pages, file_len
            )));
        }
        store.num_pages = meta.num_pages;
        store.load_free_list(&meta)?;
        store.committed = meta;
        Ok(store)
    }

    /// Root recorded by the last commit.
    pub fn root(&self) -> PageId {
        self.committed.root
    }

    pub fn meta(&self) -> &Meta {
        &self.committed
    }

    /// Pages `allocate` can hand out right now without growing the file.
    pub fn reusable_pages(&self) -> &[PageId] {
        &self.reusable
    }

    /// Make every page written so far durable, then publish `root`.
    ///
    /// The recorded free list covers pages freed since the previous commit
    /// and that commit's overflow chain; both become reusable afterwards.
    /// Ids that do not fit the meta page go to a fresh chain of overflow
    /// pages, taken from pages already free under the previous commit.
    pub fn commit(&mut self, root: PageId) -> DbResult<()> {
        // Each chain page taken off the reusable list shortens the list it
        // has to record.
        let mut chain = Vec::new();
        while chain.len() < self.overflow_pages_needed() {
            let pid = match self.reusable.pop() {
                Some(pid) => pid,
                None => self.grow(),
            };
            chain.push(pid);
        }

        let free_pages = self.reusable.len() + self.pending.len() + self.chain.len();
        let meta = match self.write_commit(root, &chain) {
            Ok(meta) => meta,
            Err(e) => {
                self.reusable.extend(chain);
                return Err(e);
            }
        };

        debug!(
            root = root.0,
            num_pages = meta.num_pages,
            released = self.pending.len(),
            free_pages,
            overflow_pages = chain.len(),
            "committed meta page"
        );
        let old_chain = std::mem::replace(&mut self.chain, chain);
        self.reusable.append(&mut self.pending);
        self.reusable.extend(old_chain);
        self.fresh.clear();
        self.committed = meta;
        Ok(())
    }

    /// Write the overflow chain, then the meta page that points at it.
    fn write_commit(&mut self, root: PageId, chain: &[PageId]) -> DbResult<Meta> {
        self.file.sync_data()?;

        let mut free_list: Vec<PageId> = self
            .reusable
            .iter()
            .chain(&self.pending)
            .chain(&self.chain)
            .copied()
            .collect();
        let overflow = free_list.split_off(free_list.len().min(META_FREE_IDS));
        let mut chunks = overflow.chunks(FREE_IDS_PER_PAGE);
        for (i, &pid) in chain.iter().enumerate() {
            let page = FreePage {
                next: chain.get(i + 1).copied().unwrap_or(PageId::NULL),
                ids: chunks.next().unwrap_or_default().to_vec(),
            };
            self.write_encoded(pid, &page)?;
        }
        self.file.sync_data()?;

        let meta = Meta {
            magic: META_MAGIC,
            root,
            num_pages: self.num_pages,
            free_list,
            free_overflow: chain.first().copied().unwrap_or(PageId::NULL),
        };
        self.write_meta(&meta)?;
        self.file.sync_data()?;
        Ok(meta)
    }

    fn overflow_pages_needed(&self) -> usize {
        let free = self.reusable.len() + self.pending.len() + self.chain.len();
        free.saturating_sub(META_FREE_IDS).div_ceil(FREE_IDS_PER_PAGE)
    }

    /// Extend the file by one page id, which starts out dead.
    fn grow(&mut self) -> PageId {
        let pid = PageId(self.num_pages);
        self.num_pages += 1;
        self.dead.insert(pid);
        pid
    }

    fn load_free_list(&mut self, meta: &Meta) -> DbResult<()> {
        self.reusable = meta.free_list.clone();
        let mut next = meta.free_overflow;
        while !next.is_null() {
            if next.0 >= meta.num_pages || self.chain.len() as u64 >= meta.num_pages {
                return Err(DbError::Corrupt(format!(
                    "free-list chain reaches invalid page {next}"
                )));
            }
            let page: FreePage = self.read_encoded(next)?;
            self.chain.push(next);
            self.reusable.extend(page.ids);
            next = page.next;
        }

        if let Some(bad) = self
            .reusable
            .iter()
            .find(|pid| pid.is_null() || pid.0 >= meta.num_pages)
        {
            return Err(DbError::Corrupt(format!("free list names invalid page {bad}")));
        }
        self.dead = self.reusable.iter().chain(&self.chain).copied().collect();
        Ok(())
    }

    fn read_meta(&mut self) -> DbResult<Meta> {
        let meta: Meta = self.read_encoded(PageId::NULL)?;
        if meta.magic != META_MAGIC {
            return Err(DbError::Corrupt("meta page has wrong magic".into()));
        }
        Ok(meta)
    }

    fn write_meta(&mut self, meta: &Meta) -> DbResult<()> {
        self.write_encoded(PageId::NULL, meta)
    }

    fn read_encoded<T: DeserializeOwned>(&mut self, pid: PageId) -> DbResult<T> {
        let mut buffer = vec![0u8; PAGE_SIZE];
        self.file.seek(SeekFrom::Start(pid.0 * PAGE_SIZE as u64))?;
        self.file.read_exact(&mut buffer)?;

        let (value, _): (T, usize) = decode_from_slice(&buffer, bincode_config())
            .map_err(|e| DbError::Corrupt(format!("failed to decode page {pid}: {e}")))?;
        Ok(value)
    }

    fn write_encoded<T: Serialize>(&mut self, pid: PageId, value: &T) -> DbResult<()> {
        let mut buffer = vec![0u8; PAGE_SIZE];
        encode_into_slice(value, &mut buffer, bincode_config())
            .map_err(|e| DbError::Storage(format!("failed to encode page {pid}: {e}")))?;
        self.file.seek(SeekFrom::Start(pid.0 * PAGE_SIZE as u64))?;
        self.file.write_all(&buffer)?;
        Ok(())
    }

    fn check_live(&self, pid: PageId) -> DbResult<()> {
        if pid.is_null() || pid.0 >= self.num_pages || self.dead.contains(&pid) {
            return Err(DbError::PageNotFound(pid));
        }
        Ok(())
    }
}

impl PageStore for FileStore {
    fn read(&mut self, pid: PageId) -> DbResult<Page> {
        self.check_live(pid)?;

        let mut page = Page::new(pid);
        self.file.seek(SeekFrom::Start(pid.0 * PAGE_SIZE as u64))?;
        self.file.read_exact(&mut page.data)?;
        Ok(page)
    }

    fn allocate(&mut self, data: &[u8]) -> DbResult<PageId> {
        let mut page = Page::from_bytes(PageId::NULL, data)?;
        let pid = match self.reusable.pop() {
            Some(pid) => pid,
            None => self.grow(),
        };

        page.id = pid;
        self.file.seek(SeekFrom::Start(pid.0 * PAGE_SIZE as u64))?;
        self.file.write_all(&page.data)?;
        self.dead.remove(&pid);
        self.fresh.insert(pid);
        trace!(page = pid.0, "wrote page");
        Ok(pid)
    }

    fn free(&mut self, pid: PageId) -> DbResult<()> {
        self.check_live(pid)?;
        self.dead.insert(pid);
        if self.fresh.remove(&pid) {
            self.reusable.push(pid);
            trace!(page = pid.0, "released uncommitted page");
        } else {
            self.pending.push(pid);
            trace!(page = pid.0, "released page");
        }
        Ok(())
    }
}
