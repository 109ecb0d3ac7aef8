use super::*;
use tempfile::tempdir;

#[test]
fn new_page_is_zeroed() {
    let page = Page::new(PageId(42));
    assert_eq!(page.id, PageId(42));
    assert_eq!(page.data.len(), PAGE_SIZE);
    assert!(page.data.iter().all(|&b| b == 0));
}

#[test]
fn from_bytes_pads_and_rejects_oversized() {
    let page = Page::from_bytes(PageId(1), &[1, 2, 3]).unwrap();
    assert_eq!(&page.data[..4], &[1, 2, 3, 0]);
    assert_eq!(page.data.len(), PAGE_SIZE);

    let err = Page::from_bytes(PageId(1), &vec![0u8; PAGE_SIZE + 1]).unwrap_err();
    assert!(matches!(err, DbError::Storage(msg) if msg.contains("too large")));
}

#[test]
fn mem_store_round_trip() {
    let mut store = MemStore::new();
    let a = store.allocate(b"alpha").unwrap();
    let b = store.allocate(b"beta").unwrap();

    assert_eq!(a, PageId(1));
    assert_eq!(b, PageId(2));
    assert_eq!(&store.read(a).unwrap().data[..5], b"alpha");
    assert_eq!(&store.read(b).unwrap().data[..4], b"beta");
    assert_eq!(store.live_pages(), 2);
}

#[test]
fn mem_store_free_is_tracked() {
    let mut store = MemStore::new();
    let a = store.allocate(b"alpha").unwrap();
    store.free(a).unwrap();

    assert!(!store.contains(a));
    assert_eq!(store.freed_pages(), &[a]);
    assert!(matches!(store.read(a), Err(DbError::PageNotFound(pid)) if pid == a));
    assert!(matches!(store.free(a), Err(DbError::PageNotFound(_))));
}

#[test]
fn mem_store_never_reuses_ids() {
    let mut store = MemStore::new();
    let a = store.allocate(b"a").unwrap();
    store.free(a).unwrap();
    let b = store.allocate(b"b").unwrap();
    assert_ne!(a, b);
}

#[test]
fn mem_store_rejects_null_page() {
    let mut store = MemStore::new();
    assert!(matches!(
        store.read(PageId::NULL),
        Err(DbError::PageNotFound(_))
    ));
}

#[test]
fn store_through_mut_reference() {
    fn write_one<S: PageStore>(mut store: S) -> PageId {
        store.allocate(b"via ref").unwrap()
    }

    let mut store = MemStore::new();
    let pid = write_one(&mut store);
    assert!(store.contains(pid));
}

#[test]
fn file_store_starts_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tree.db");

    let store = FileStore::open(&path).unwrap();
    assert!(store.root().is_null());
    assert_eq!(store.meta().num_pages, 1);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), PAGE_SIZE as u64);
}

#[test]
fn file_store_persists_pages_and_root() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tree.db");

    let (a, b) = {
        let mut store = FileStore::open(&path).unwrap();
        let a = store.allocate(b"first").unwrap();
        let b = store.allocate(b"second").unwrap();
        store.commit(b).unwrap();
        (a, b)
    };
    assert_eq!(a, PageId(1));
    assert_eq!(b, PageId(2));

    let mut store = FileStore::open(&path).unwrap();
    assert_eq!(store.root(), b);
    assert_eq!(store.meta().num_pages, 3);
    assert_eq!(&store.read(a).unwrap().data[..5], b"first");
    assert_eq!(&store.read(b).unwrap().data[..6], b"second");
}

#[test]
fn file_store_defers_reuse_until_commit() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tree.db");
    let mut store = FileStore::open(&path).unwrap();

    let a = store.allocate(b"old").unwrap();
    store.commit(a).unwrap();

    store.free(a).unwrap();
    assert!(matches!(store.read(a), Err(DbError::PageNotFound(_))));

    // Not reusable yet: the committed root still points at `a`.
    let b = store.allocate(b"new").unwrap();
    assert_ne!(a, b);

    store.commit(b).unwrap();
    assert_eq!(store.meta().free_list, vec![a]);

    let c = store.allocate(b"reused").unwrap();
    assert_eq!(c, a);
    assert_eq!(&store.read(c).unwrap().data[..6], b"reused");
}

#[test]
fn file_store_reloads_free_list() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tree.db");
    let a = {
        let mut store = FileStore::open(&path).unwrap();
        let a = store.allocate(b"a").unwrap();
        let b = store.allocate(b"b").unwrap();
        store.free(a).unwrap();
        store.commit(b).unwrap();
        a
    };

    let mut store = FileStore::open(&path).unwrap();
    assert_eq!(store.meta().free_list, vec![a]);
    assert!(matches!(store.read(a), Err(DbError::PageNotFound(_))));
    assert_eq!(store.allocate(b"c").unwrap(), a);
}

#[test]
fn file_store_rejects_unknown_pages() {
    let dir = tempdir().unwrap();
    let mut store = FileStore::open(&dir.path().join("tree.db")).unwrap();

    assert!(matches!(store.read(PageId::NULL), Err(DbError::PageNotFound(_))));
    assert!(matches!(store.read(PageId(5)), Err(DbError::PageNotFound(_))));
    assert!(matches!(store.free(PageId(5)), Err(DbError::PageNotFound(_))));
}

#[test]
fn file_store_rejects_foreign_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("garbage.db");
    std::fs::write(&path, vec![0xAB; PAGE_SIZE]).unwrap();

    let err = FileStore::open(&path).unwrap_err();
    assert!(matches!(err, DbError::Corrupt(_)));
}

#[test]
fn file_store_oversized_allocation_keeps_free_list() {
    let dir = tempdir().unwrap();
    let mut store = FileStore::open(&dir.path().join("tree.db")).unwrap();
    let a = store.allocate(b"a").unwrap();
    let b = store.allocate(b"b").unwrap();
    store.free(a).unwrap();
    store.commit(b).unwrap();

    assert!(store.allocate(&vec![0u8; PAGE_SIZE + 1]).is_err());
    assert_eq!(store.allocate(b"fits").unwrap(), a);
}

#[test]
fn file_store_reuses_uncommitted_pages_at_once() {
    let dir = tempdir().unwrap();
    let mut store = FileStore::open(&dir.path().join("tree.db")).unwrap();

    let committed = store.allocate(b"committed").unwrap();
    store.commit(committed).unwrap();

    let scratch = store.allocate(b"scratch").unwrap();
    store.free(scratch).unwrap();
    assert_eq!(store.reusable_pages(), &[scratch]);
    assert_eq!(store.allocate(b"again").unwrap(), scratch);

    // The committed root stays untouched until the next commit.
    store.free(committed).unwrap();
    let next = store.allocate(b"next").unwrap();
    assert_ne!(next, committed);
    assert!(store.reusable_pages().is_empty());
}

#[test]
fn file_store_spills_large_free_lists() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tree.db");
    let total = META_FREE_IDS + FREE_IDS_PER_PAGE + 300;

    let pages = {
        let mut store = FileStore::open(&path).unwrap();
        let pages: Vec<PageId> = (0..total)
            .map(|i| store.allocate(&(i as u64).to_le_bytes()).unwrap())
            .collect();
        store.commit(pages[0]).unwrap();

        for &pid in &pages[1..] {
            store.free(pid).unwrap();
        }
        store.commit(pages[0]).unwrap();
        assert_eq!(store.meta().free_list.len(), META_FREE_IDS);
        assert!(!store.meta().free_overflow.is_null());
        assert_eq!(store.reusable_pages().len(), total - 1);
        pages
    };

    let mut store = FileStore::open(&path).unwrap();
    assert_eq!(store.reusable_pages().len(), total - 1);
    assert_eq!(&store.read(pages[0]).unwrap().data[..8], &0u64.to_le_bytes());
    assert!(matches!(store.read(pages[1]), Err(DbError::PageNotFound(_))));
    let overflow = store.meta().free_overflow;
    assert!(matches!(store.read(overflow), Err(DbError::PageNotFound(_))));

    // Committing again rotates the overflow chain without losing pages.
    let file_pages = store.meta().num_pages;
    store.commit(pages[0]).unwrap();
    drop(store);

    let store = FileStore::open(&path).unwrap();
    assert_eq!(store.reusable_pages().len(), total - 1);
    assert_eq!(store.meta().num_pages, file_pages);
}

#[test]
fn file_store_rejects_broken_free_list() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tree.db");
    {
        let mut store = FileStore::open(&path).unwrap();
        let pages: Vec<PageId> = (0..META_FREE_IDS + 10)
            .map(|_| store.allocate(b"x").unwrap())
            .collect();
        store.commit(pages[0]).unwrap();
        for &pid in &pages[1..] {
            store.free(pid).unwrap();
        }
        store.commit(pages[0]).unwrap();
    }

    // Point the overflow page's `next` past the end of the file.
    let overflow = FileStore::open(&path).unwrap().meta().free_overflow;
    let mut bytes = std::fs::read(&path).unwrap();
    let at = overflow.0 as usize * PAGE_SIZE;
    bytes[at..at + 8].copy_from_slice(&u64::MAX.to_le_bytes());
    std::fs::write(&path, bytes).unwrap();

    let err = FileStore::open(&path).unwrap_err();
    assert!(matches!(err, DbError::Corrupt(msg) if msg.contains("free-list chain")));
}
