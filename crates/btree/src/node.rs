//! B+Tree node format and accessors.
//!
//! A node is one page interpreted through offset arithmetic:
//!
//! ```text
//! | type | nkeys |  pointers  |   offsets  | key-values | unused |
//! |  2B  |  2B   | nkeys * 8B | nkeys * 2B |    ...     |        |
//! ```
//!
//! Each key-value record is `| klen 2B | vlen 2B | key | val |`. Offsets are
//! cumulative record ends, so `offsets[i]` is where record `i` starts relative
//! to the first record; `offsets[0]` is always 0 and is not stored. All
//! integers are little-endian.
//!
//! Index arguments outside the documented range are caller bugs and panic.

use std::fmt;

use common::{DbError, DbResult, PageId};
use storage::{PAGE_SIZE, Page};

use crate::layout::{HEADER, SCRATCH_SIZE};

/// The type of a B+Tree node, as stored in the first two bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum NodeType {
    /// Keys and child pointers, no values.
    Internal = 1,
    /// Keys and values, pointers unused.
    Leaf = 2,
}

impl TryFrom<u16> for NodeType {
    type Error = DbError;

    fn try_from(code: u16) -> DbResult<Self> {
        match code {
            1 => Ok(Self::Internal),
            2 => Ok(Self::Leaf),
            other => Err(DbError::Corrupt(format!("unknown node type code {other}"))),
        }
    }
}

/// An owned node buffer with typed accessors.
///
/// Nodes built for persistence are `PAGE_SIZE` bytes; [`Node::scratch`]
/// nodes have room for one page plus one record and must be split before
/// they are written.
#[derive(Clone, PartialEq, Eq)]
pub struct Node {
    data: Vec<u8>,
}

impl Node {
    /// A zeroed page-sized node. Call [`Node::set_header`] before anything else.
    pub fn new() -> Self {
        Self {
            data: vec![0u8; PAGE_SIZE],
        }
    }

    /// A zeroed node that may temporarily exceed one page.
    pub fn scratch() -> Self {
        Self {
            data: vec![0u8; SCRATCH_SIZE],
        }
    }

    /// Interpret a page read from storage.
    ///
    /// The type code, the offsets and each record's key and value lengths are
    /// checked, so accessors cannot index past the buffer; see
    /// [`Node::validate`] for a full structural check.
    pub fn from_page(page: Page) -> DbResult<Self> {
        let node = Self { data: page.data };
        node.check_extent()
            .map_err(|e| DbError::Corrupt(format!("page {}: {e}", page.id)))?;
        Ok(node)
    }

    /// Bytes the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    // ---- header ----

    pub fn node_type(&self) -> NodeType {
        let code = read_u16(&self.data, 0);
        NodeType::try_from(code).unwrap_or_else(|_| panic!("unknown node type code {code}"))
    }

    pub fn is_leaf(&self) -> bool {
        self.node_type() == NodeType::Leaf
    }

    pub fn nkeys(&self) -> u16 {
        read_u16(&self.data, 2)
    }

    pub fn set_header(&mut self, node_type: NodeType, nkeys: u16) {
        write_u16(&mut self.data, 0, node_type as u16);
        write_u16(&mut self.data, 2, nkeys);
    }

    // ---- pointers ----

    pub fn ptr(&self, idx: u16) -> PageId {
        self.assert_key_index(idx, "pointer");
        PageId(read_u64(&self.data, HEADER + 8 * idx as usize))
    }

    pub fn set_ptr(&mut self, idx: u16, ptr: PageId) {
        self.assert_key_index(idx, "pointer");
        write_u64(&mut self.data, HEADER + 8 * idx as usize, ptr.0);
    }

    // ---- offsets ----

    fn offset_pos(&self, idx: u16) -> usize {
        let nkeys = self.nkeys();
        assert!(
            (1..=nkeys).contains(&idx),
            "offset index {idx} out of bounds (1..={nkeys})"
        );
        HEADER + 8 * nkeys as usize + 2 * (idx as usize - 1)
    }

    /// Start of record `idx` relative to the record region. `offset(0)` is 0.
    pub fn offset(&self, idx: u16) -> u16 {
        if idx == 0 {
            return 0;
        }
        read_u16(&self.data, self.offset_pos(idx))
    }

    pub fn set_offset(&mut self, idx: u16, offset: u16) {
        let pos = self.offset_pos(idx);
        write_u16(&mut self.data, pos, offset);
    }

    // ---- key-values ----

    /// Absolute position of record `idx`; `kv_pos(nkeys)` is one past the end.
    pub fn kv_pos(&self, idx: u16) -> u16 {
        let nkeys = self.nkeys();
        assert!(
            idx <= nkeys,
            "record index {idx} out of bounds (0..={nkeys})"
        );
        (HEADER + 10 * nkeys as usize) as u16 + self.offset(idx)
    }

    pub fn key(&self, idx: u16) -> &[u8] {
        self.assert_key_index(idx, "key");
        let pos = self.kv_pos(idx) as usize;
        let klen = read_u16(&self.data, pos) as usize;
        &self.data[pos + 4..][..klen]
    }

    pub fn val(&self, idx: u16) -> &[u8] {
        self.assert_key_index(idx, "value");
        let pos = self.kv_pos(idx) as usize;
        let klen = read_u16(&self.data, pos) as usize;
        let vlen = read_u16(&self.data, pos + 2) as usize;
        &self.data[pos + 4 + klen..][..vlen]
    }

    /// Write the record header and bytes at the start of record `idx`.
    pub(crate) fn write_record(&mut self, idx: u16, key: &[u8], val: &[u8]) {
        let pos = self.kv_pos(idx) as usize;
        write_u16(&mut self.data, pos, key.len() as u16);
        write_u16(&mut self.data, pos + 2, val.len() as u16);
        self.data[pos + 4..][..key.len()].copy_from_slice(key);
        self.data[pos + 4 + key.len()..][..val.len()].copy_from_slice(val);
    }

    /// Copy raw record bytes to absolute position `pos`.
    pub(crate) fn write_raw(&mut self, pos: usize, bytes: &[u8]) {
        self.data[pos..pos + bytes.len()].copy_from_slice(bytes);
    }

    pub(crate) fn raw(&self, start: usize, end: usize) -> &[u8] {
        &self.data[start..end]
    }

    /// Occupied bytes: header, pointer and offset arrays, and every record.
    pub fn nbytes(&self) -> u16 {
        self.kv_pos(self.nkeys())
    }

    /// The occupied prefix of the buffer, ready to hand to a page store.
    pub fn encoded(&self) -> &[u8] {
        let nbytes = self.nbytes() as usize;
        assert!(
            nbytes <= PAGE_SIZE,
            "node of {nbytes} bytes does not fit a {PAGE_SIZE}-byte page"
        );
        &self.data[..nbytes]
    }

    /// Full structural check of a node.
    ///
    /// On top of the extent checks done by [`Node::from_page`], verifies
    /// that keys strictly increase, that the node fits a page, and that
    /// pointers are null in leaves and non-null in internal nodes.
    pub fn validate(&self) -> DbResult<()> {
        self.check_extent()?;
        let node_type = NodeType::try_from(read_u16(&self.data, 0))?;
        let nkeys = self.nkeys();

        let nbytes = self.nbytes() as usize;
        if nbytes > PAGE_SIZE {
            return Err(DbError::Corrupt(format!(
                "node occupies {nbytes} bytes, more than a page"
            )));
        }

        for idx in 0..nkeys {
            let ptr = self.ptr(idx);
            let vlen = self.val(idx).len();
            match node_type {
                NodeType::Leaf if !ptr.is_null() => {
                    return Err(DbError::Corrupt(format!("leaf record {idx} has pointer {ptr}")));
                }
                NodeType::Internal if ptr.is_null() => {
                    return Err(DbError::Corrupt(format!("internal record {idx} has null pointer")));
                }
                NodeType::Internal if vlen != 0 => {
                    return Err(DbError::Corrupt(format!("internal record {idx} carries a value")));
                }
                _ => {}
            }

            if idx > 0 && self.key(idx - 1) >= self.key(idx) {
                return Err(DbError::Corrupt(format!(
                    "keys {} and {idx} are out of order",
                    idx - 1
                )));
            }
        }
        Ok(())
    }

    /// Check that the arrays and every record stay inside the buffer, and
    /// that each record's lengths match its offset span.
    fn check_extent(&self) -> DbResult<()> {
        NodeType::try_from(read_u16(&self.data, 0))?;
        let nkeys = self.nkeys() as usize;
        let arrays_end = HEADER + 10 * nkeys;
        if arrays_end > self.data.len() {
            return Err(DbError::Corrupt(format!(
                "{nkeys} keys do not fit a {}-byte buffer",
                self.data.len()
            )));
        }
        let mut prev = 0u16;
        for idx in 1..=nkeys as u16 {
            let offset = self.offset(idx);
            if offset < prev.saturating_add(4) {
                return Err(DbError::Corrupt(format!(
                    "offset {idx} ({offset}) leaves no room for record {} starting at {prev}",
                    idx - 1
                )));
            }
            prev = offset;
        }
        if arrays_end + prev as usize > self.data.len() {
            return Err(DbError::Corrupt(format!(
                "records end at {} past the {}-byte buffer",
                arrays_end + prev as usize,
                self.data.len()
            )));
        }

        for idx in 0..nkeys as u16 {
            let span = (self.offset(idx + 1) - self.offset(idx)) as usize;
            let pos = self.kv_pos(idx) as usize;
            let klen = read_u16(&self.data, pos) as usize;
            let vlen = read_u16(&self.data, pos + 2) as usize;
            if 4 + klen + vlen != span {
                return Err(DbError::Corrupt(format!(
                    "record {idx} is {} bytes but its offsets span {span}",
                    4 + klen + vlen
                )));
            }
        }
        Ok(())
    }

    fn assert_key_index(&self, idx: u16, what: &str) {
        let nkeys = self.nkeys();
        assert!(
            idx < nkeys,
            "{what} index {idx} out of bounds ({nkeys} keys)"
        );
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = read_u16(&self.data, 0);
        f.debug_struct("Node")
            .field("type", &NodeType::try_from(code).map_err(|_| code))
            .field("nkeys", &self.nkeys())
            .field("capacity", &self.data.len())
            .finish()
    }
}

/// Index of the last key not greater than `key`, searching from index 1.
///
/// Index 0 is the implicit floor: in internal nodes it is the leftmost
/// child, and every leftmost leaf starts with the empty sentinel key. Keys
/// must be sorted.
pub fn lookup_floor(node: &Node, key: &[u8]) -> u16 {
    let nkeys = node.nkeys();
    // First index in 1..nkeys whose key is greater than the target.
    let (mut lo, mut hi) = (1u16, nkeys.max(1));
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if node.key(mid) <= key {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo - 1
}

fn read_u16(buf: &[u8], pos: usize) -> u16 {
    u16::from_le_bytes([buf[pos], buf[pos + 1]])
}

fn write_u16(buf: &mut [u8], pos: usize, value: u16) {
    buf[pos..pos + 2].copy_from_slice(&value.to_le_bytes());
}

fn read_u64(buf: &[u8], pos: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[pos..pos + 8]);
    u64::from_le_bytes(bytes)
}

fn write_u64(buf: &mut [u8], pos: usize, value: u64) {
    buf[pos..pos + 8].copy_from_slice(&value.to_le_bytes());
}
