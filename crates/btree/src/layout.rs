//! Size limits of the node format.

use common::{Config, DbError, DbResult};
use storage::PAGE_SIZE;

/// Bytes taken by `type` and `nkeys`.
pub const HEADER: usize = 4;

/// Default upper bound on key length.
pub const MAX_KEY_SIZE: usize = 1000;

/// Default upper bound on value length.
pub const MAX_VAL_SIZE: usize = 3000;

/// Capacity of a scratch node, which may hold one page plus one record
/// before it is split.
pub const SCRATCH_SIZE: usize = 2 * PAGE_SIZE;

/// Encoded size of a node holding exactly one record.
pub const fn single_record_size(klen: usize, vlen: usize) -> usize {
    HEADER + link_size(klen) + vlen
}

/// Bytes one internal-node link with a `klen`-byte key takes.
pub const fn link_size(klen: usize) -> usize {
    8 + 2 + 4 + klen
}

const _: () = assert!(
    single_record_size(MAX_KEY_SIZE, MAX_VAL_SIZE) <= PAGE_SIZE,
    "a maximum-sized key-value pair must fit in one page"
);
const _: () = assert!(
    HEADER + 3 * link_size(MAX_KEY_SIZE) <= PAGE_SIZE,
    "a root linking a three-way split must fit in one page"
);
const _: () = assert!(
    PAGE_SIZE + 2 * link_size((PAGE_SIZE - HEADER) / 3) <= SCRATCH_SIZE,
    "a full internal node plus two links must fit a scratch node"
);
const _: () = assert!(
    SCRATCH_SIZE <= u16::MAX as usize,
    "node offsets are 16-bit"
);

/// Verify that runtime-configured limits keep every node the tree builds
/// inside its buffer. Trees refuse to start when this fails.
///
/// Any single pair must fit a page, and so must a new root linking the
/// three parts of a split. The second bound also keeps a full internal node
/// that gains two links inside a scratch buffer.
pub fn check_limits(config: &Config) -> DbResult<()> {
    let (klen, vlen) = (config.max_key_size, config.max_val_size);
    if klen == 0 {
        return Err(DbError::Config("max_key_size must be at least 1".into()));
    }

    let pair = klen
        .checked_add(vlen)
        .and_then(|kv| kv.checked_add(single_record_size(0, 0)));
    if !matches!(pair, Some(size) if size <= PAGE_SIZE) {
        return Err(DbError::Config(format!(
            "max_key_size {klen} + max_val_size {vlen} does not fit a {PAGE_SIZE}-byte page"
        )));
    }

    // `klen` fits a page here, so link arithmetic cannot overflow.
    if HEADER + 3 * link_size(klen) > PAGE_SIZE {
        return Err(DbError::Config(format!(
            "max_key_size {klen} leaves no room for three internal links in a page"
        )));
    }
    Ok(())
}
