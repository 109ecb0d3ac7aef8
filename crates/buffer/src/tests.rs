use super::*;
use common::DbError;
use storage::{FileStore, MemStore};
use tempfile::tempdir;

#[test]
fn allocate_then_read_hits_cache() {
    let mut cache = PageCache::new(MemStore::new(), 4);
    let pid = cache.allocate(b"cached").unwrap();

    let page = cache.read(pid).unwrap();
    assert_eq!(&page.data[..6], b"cached");
    assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 0 });
}

#[test]
fn miss_fills_from_inner_store() {
    let mut store = MemStore::new();
    let pid = store.allocate(b"on disk").unwrap();

    let mut cache = PageCache::new(store, 4);
    assert!(!cache.contains(pid));

    cache.read(pid).unwrap();
    cache.read(pid).unwrap();
    assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    assert!(cache.contains(pid));
}

#[test]
fn hit_matches_inner_read() {
    let mut cache = PageCache::new(MemStore::new(), 4);
    let pid = cache.allocate(b"padded").unwrap();

    let cached = cache.read(pid).unwrap();
    let direct = cache.inner_mut().read(pid).unwrap();
    assert_eq!(cached, direct);
}

#[test]
fn lru_eviction_keeps_recent_pages() {
    let mut cache = PageCache::new(MemStore::new(), 2);
    let p1 = cache.allocate(b"one").unwrap();
    let p2 = cache.allocate(b"two").unwrap();

    // Touch p1 so p2 becomes the eviction candidate.
    cache.read(p1).unwrap();
    let p3 = cache.allocate(b"three").unwrap();

    assert!(cache.contains(p1));
    assert!(!cache.contains(p2));
    assert!(cache.contains(p3));
    assert_eq!(cache.len(), 2);

    // Evicted pages are still readable through the inner store.
    assert_eq!(&cache.read(p2).unwrap().data[..3], b"two");
}

#[test]
fn free_drops_cached_copy() {
    let mut cache = PageCache::new(MemStore::new(), 4);
    let pid = cache.allocate(b"gone").unwrap();

    cache.free(pid).unwrap();
    assert!(!cache.contains(pid));
    assert!(matches!(cache.read(pid), Err(DbError::PageNotFound(_))));
    assert_eq!(cache.inner().freed_pages(), &[pid]);
}

#[test]
fn free_of_unknown_page_propagates() {
    let mut cache = PageCache::new(MemStore::new(), 4);
    assert!(matches!(
        cache.free(PageId(99)),
        Err(DbError::PageNotFound(_))
    ));
}

#[test]
fn caches_file_store_pages() {
    let dir = tempdir().unwrap();
    let store = FileStore::open(&dir.path().join("tree.db")).unwrap();
    let mut cache = PageCache::with_config(store, &Config::default());

    let pid = cache.allocate(b"file page").unwrap();
    cache.inner_mut().commit(pid).unwrap();

    let mut store = cache.into_inner();
    assert_eq!(&store.read(pid).unwrap().data[..9], b"file page");
}

#[test]
#[should_panic(expected = "max_pages must be > 0")]
fn new_cache_panics_with_zero_capacity() {
    let _ = PageCache::new(MemStore::new(), 0);
}
