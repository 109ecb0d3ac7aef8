use super::*;
use std::io;

#[test]
fn config_defaults_are_sane() {
    let cfg = Config::default();
    assert_eq!(cfg.max_key_size, 1000);
    assert_eq!(cfg.max_val_size, 3000);
    assert_eq!(cfg.cache_pages, 256);
}

#[test]
fn builder_defaults_match_default() {
    assert_eq!(Config::builder().build(), Config::default());
}

#[test]
fn db_error_formats_cleanly() {
    let err = DbError::Storage("short write".into());
    assert!(format!("{err}").contains("storage"));

    let err = DbError::KeyTooLarge { len: 1200, max: 1000 };
    assert_eq!(err.to_string(), "key too large: 1200 bytes (max 1000)");

    let err = DbError::PageNotFound(PageId(7));
    assert_eq!(err.to_string(), "page #7 not found");
}

#[test]
fn null_page_is_reserved() {
    assert!(PageId::NULL.is_null());
    assert!(PageId::default().is_null());
    assert!(!PageId(1).is_null());
}

#[test]
fn io_error_converts() {
    let e = io::Error::other("oops");
    let db_err: DbError = e.into();
    assert!(matches!(db_err, DbError::Io(_)));
}
