//! Copy-on-write node builders.
//!
//! Every builder reads from existing nodes and writes into a fresh, zeroed
//! `new` node; nothing here mutates a node that came from storage. Builders
//! append records left to right, and each record's end offset is derived from
//! the previous one, so callers must set the header of `new` first and fill
//! indices in order.
//!
//! Builders do not check that the result fits a page. Results that may
//! overflow are built in [`Node::scratch`] buffers and passed through
//! [`split3`] before anything is persisted.

use common::PageId;
use storage::PAGE_SIZE;

use crate::layout::HEADER;
use crate::node::{Node, NodeType};

/// Write record `idx` of `new` and the offset that ends it.
pub fn append_kv(new: &mut Node, idx: u16, ptr: PageId, key: &[u8], val: &[u8]) {
    new.set_ptr(idx, ptr);
    new.write_record(idx, key, val);
    let end = new.offset(idx) + 4 + key.len() as u16 + val.len() as u16;
    new.set_offset(idx + 1, end);
}

/// Copy records `src..src + n` of `old` into `new` starting at index `dst`.
pub fn append_range(new: &mut Node, old: &Node, dst: u16, src: u16, n: u16) {
    if n == 0 {
        return;
    }

    for i in 0..n {
        new.set_ptr(dst + i, old.ptr(src + i));
    }

    let dst_begin = new.offset(dst);
    let src_begin = old.offset(src);
    for i in 1..=n {
        let offset = dst_begin + old.offset(src + i) - src_begin;
        new.set_offset(dst + i, offset);
    }

    let begin = old.kv_pos(src) as usize;
    let end = old.kv_pos(src + n) as usize;
    let pos = new.kv_pos(dst) as usize;
    new.write_raw(pos, old.raw(begin, end));
}

/// Leaf with `(key, val)` inserted at `idx`, shifting later records right.
pub fn leaf_insert(new: &mut Node, old: &Node, idx: u16, key: &[u8], val: &[u8]) {
    new.set_header(NodeType::Leaf, old.nkeys() + 1);
    append_range(new, old, 0, 0, idx);
    append_kv(new, idx, PageId::NULL, key, val);
    append_range(new, old, idx + 1, idx, old.nkeys() - idx);
}

/// Leaf with record `idx` replaced by `(key, val)`.
pub fn leaf_update(new: &mut Node, old: &Node, idx: u16, key: &[u8], val: &[u8]) {
    new.set_header(NodeType::Leaf, old.nkeys());
    append_range(new, old, 0, 0, idx);
    append_kv(new, idx, PageId::NULL, key, val);
    append_range(new, old, idx + 1, idx + 1, old.nkeys() - (idx + 1));
}

/// Leaf with record `idx` removed.
pub fn leaf_delete(new: &mut Node, old: &Node, idx: u16) {
    new.set_header(NodeType::Leaf, old.nkeys() - 1);
    append_range(new, old, 0, 0, idx);
    append_range(new, old, idx, idx + 1, old.nkeys() - (idx + 1));
}

/// Internal node with child `idx` replaced by `kids`, each given as its page
/// and the first key of that page.
pub fn replace_kids(new: &mut Node, old: &Node, idx: u16, kids: &[(PageId, Vec<u8>)]) {
    let inc = kids.len() as u16;
    new.set_header(NodeType::Internal, old.nkeys() + inc - 1);
    append_range(new, old, 0, 0, idx);
    for (i, (ptr, key)) in kids.iter().enumerate() {
        append_kv(new, idx + i as u16, *ptr, key, &[]);
    }
    append_range(new, old, idx + inc, idx + 1, old.nkeys() - (idx + 1));
}

/// Internal node with children `idx` and `idx + 1` collapsed into one link.
pub fn replace_two_kids(new: &mut Node, old: &Node, idx: u16, ptr: PageId, key: &[u8]) {
    new.set_header(NodeType::Internal, old.nkeys() - 1);
    append_range(new, old, 0, 0, idx);
    append_kv(new, idx, ptr, key, &[]);
    append_range(new, old, idx + 1, idx + 2, old.nkeys() - (idx + 2));
}

/// Concatenation of two adjacent siblings of the same type.
pub fn merge(new: &mut Node, left: &Node, right: &Node) {
    new.set_header(left.node_type(), left.nkeys() + right.nkeys());
    append_range(new, left, 0, 0, left.nkeys());
    append_range(new, right, left.nkeys(), 0, right.nkeys());
}

/// Split `old` in two so that `right` fits a page.
///
/// The split point starts at the middle key, moves left until the left half
/// fits a page, then right until the right half does. `left` should be a
/// scratch node: when one half must hold most of the bytes it is the left.
pub fn split2(left: &mut Node, right: &mut Node, old: &Node) {
    let nkeys = old.nkeys();
    assert!(nkeys >= 2, "cannot split a node with {nkeys} keys");

    let left_bytes = |nleft: u16| HEADER + 10 * nleft as usize + old.offset(nleft) as usize;
    let right_bytes = |nleft: u16| old.nbytes() as usize - left_bytes(nleft) + HEADER;

    let mut nleft = nkeys / 2;
    while left_bytes(nleft) > PAGE_SIZE {
        nleft -= 1;
    }
    assert!(nleft >= 1, "left half of split is empty");
    while right_bytes(nleft) > PAGE_SIZE {
        nleft += 1;
    }
    assert!(nleft < nkeys, "right half of split is empty");
    let nright = nkeys - nleft;

    left.set_header(old.node_type(), nleft);
    right.set_header(old.node_type(), nright);
    append_range(left, old, 0, 0, nleft);
    append_range(right, old, 0, nleft, nright);
    assert!(
        right.nbytes() as usize <= PAGE_SIZE,
        "right half of split overflows a page"
    );
}

/// Split a possibly oversized node into one, two, or three page-sized nodes,
/// in key order.
pub fn split3(old: Node) -> Vec<Node> {
    if old.nbytes() as usize <= PAGE_SIZE {
        return vec![shrink(old)];
    }

    let mut left = Node::scratch();
    let mut right = Node::new();
    split2(&mut left, &mut right, &old);
    if left.nbytes() as usize <= PAGE_SIZE {
        return vec![shrink(left), right];
    }

    let mut leftleft = Node::scratch();
    let mut middle = Node::new();
    split2(&mut leftleft, &mut middle, &left);
    assert!(
        leftleft.nbytes() as usize <= PAGE_SIZE,
        "three-way split still overflows a page"
    );
    vec![shrink(leftleft), middle, right]
}

/// Copy a node that fits a page into a page-sized buffer.
fn shrink(node: Node) -> Node {
    if node.capacity() == PAGE_SIZE {
        return node;
    }
    let mut page = Node::new();
    page.write_raw(0, node.encoded());
    page
}
