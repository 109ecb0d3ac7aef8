//! Copy-on-write B+Tree over fixed-size pages.
//!
//! This crate provides the node format ([`Node`]), the floor search
//! ([`lookup_floor`]), the copy-on-write builders in [`builder`], and the
//! [`BTree`] handle that drives them against any [`PageStore`].
//!
//! Pages are never modified after they are written. An insert or delete
//! rebuilds every node on the path from the root to the affected leaf,
//! allocates the new pages, swaps the root, and only then frees the pages the
//! old path occupied. A reader still holding the old root sees an unchanged
//! tree until the store reclaims those pages.
//!
//! # Example
//!
//! ```
//! use btree::BTree;
//! use common::Config;
//! use storage::MemStore;
//!
//! let mut tree = BTree::new(MemStore::new(), &Config::default()).unwrap();
//! tree.insert(b"a", b"1").unwrap();
//! tree.insert(b"b", b"2").unwrap();
//!
//! assert_eq!(tree.get(b"a").unwrap(), Some(b"1".to_vec()));
//! assert_eq!(tree.get(b"z").unwrap(), None);
//! ```

pub mod builder;
mod layout;
mod node;

pub use layout::{
    HEADER, MAX_KEY_SIZE, MAX_VAL_SIZE, SCRATCH_SIZE, check_limits, link_size, single_record_size,
};
pub use node::{Node, NodeType, lookup_floor};

use builder::{
    append_kv, leaf_delete, leaf_insert, leaf_update, merge, replace_kids, replace_two_kids,
    split3,
};
use common::{Config, DbError, DbResult, PageId};
use storage::{PAGE_SIZE, PageStore};
use tracing::debug;

/// A sibling chosen to absorb a shrunken child.
enum Sibling {
    Left(Node),
    Right(Node),
}

/// Handle to one copy-on-write B+Tree.
///
/// Holds the current root page (`PageId::NULL` for an empty tree) and the
/// store every page goes through. All mutation takes `&mut self`, so one
/// handle has a single writer.
#[derive(Debug)]
pub struct BTree<S> {
    root: PageId,
    store: S,
    config: Config,
}

impl<S: PageStore> BTree<S> {
    /// Create an empty tree.
    ///
    /// Fails with `DbError::Config` if the configured key and value limits
    /// cannot fit a page.
    pub fn new(store: S, config: &Config) -> DbResult<Self> {
        Self::open(store, PageId::NULL, config)
    }

    /// Attach to an existing tree rooted at `root`.
    pub fn open(store: S, root: PageId, config: &Config) -> DbResult<Self> {
        check_limits(config)?;
        let mut tree = Self {
            root,
            store,
            config: config.clone(),
        };
        if !root.is_null() {
            tree.read_node(root)?;
        }
        Ok(tree)
    }

    pub fn root(&self) -> PageId {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_null()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Look up the value stored under `key`.
    pub fn get(&mut self, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        if self.root.is_null() || key.is_empty() {
            return Ok(None);
        }

        let mut node = self.read_node(self.root)?;
        loop {
            let idx = lookup_floor(&node, key);
            match node.node_type() {
                NodeType::Internal => node = self.read_node(node.ptr(idx))?,
                NodeType::Leaf => {
                    let found = node.nkeys() > 0 && node.key(idx) == key;
                    return Ok(found.then(|| node.val(idx).to_vec()));
                }
            }
        }
    }

    /// Insert `key` or overwrite its value, returning the new root.
    pub fn insert(&mut self, key: &[u8], val: &[u8]) -> DbResult<PageId> {
        self.check_pair(key, val)?;

        if self.root.is_null() {
            // Every tree starts with the empty sentinel key, so the floor
            // search always has an index 0 to fall back on.
            let mut root = Node::new();
            root.set_header(NodeType::Leaf, 2);
            append_kv(&mut root, 0, PageId::NULL, &[], &[]);
            append_kv(&mut root, 1, PageId::NULL, key, val);
            let pid = self.store.allocate(root.encoded())?;
            self.swap_root(pid, Vec::new())?;
            return Ok(pid);
        }

        let mut obsolete = Vec::new();
        let old = self.read_node(self.root)?;
        let updated = self.tree_insert(&old, key, val, &mut obsolete)?;
        obsolete.push(self.root);

        let pid = self.persist_root(updated)?;
        self.swap_root(pid, obsolete)?;
        Ok(pid)
    }

    /// Remove `key`, returning whether it was present.
    pub fn delete(&mut self, key: &[u8]) -> DbResult<bool> {
        if self.root.is_null() || key.is_empty() || key.len() > self.config.max_key_size {
            return Ok(false);
        }

        let mut obsolete = Vec::new();
        let old = self.read_node(self.root)?;
        let Some(updated) = self.tree_delete(&old, key, &mut obsolete)? else {
            return Ok(false);
        };
        obsolete.push(self.root);

        let pid = match (updated.node_type(), updated.nkeys()) {
            // Only the sentinel is left.
            (NodeType::Leaf, 0..=1) | (NodeType::Internal, 0) => PageId::NULL,
            (NodeType::Internal, 1) => self.collapse_root(&updated, &mut obsolete)?,
            _ => self.persist_root(updated)?,
        };
        self.swap_root(pid, obsolete)?;
        Ok(true)
    }

    /// Every key-value pair in key order.
    pub fn scan_all(&mut self) -> DbResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut results = Vec::new();
        if !self.root.is_null() {
            self.collect(self.root, &mut results)?;
        }
        Ok(results)
    }

    /// Walk the whole tree and verify its structure.
    ///
    /// Checks every node with [`Node::validate`], that each internal key
    /// equals the first key of its child, that keys stay below the next
    /// separator, and that all leaves sit at the same depth.
    pub fn check(&mut self) -> DbResult<()> {
        if self.root.is_null() {
            return Ok(());
        }
        let mut leaf_depth = None;
        self.check_node(self.root, &[], None, 0, &mut leaf_depth)
    }

    // ---- Private helpers ----

    fn read_node(&mut self, pid: PageId) -> DbResult<Node> {
        Node::from_page(self.store.read(pid)?)
    }

    fn check_pair(&self, key: &[u8], val: &[u8]) -> DbResult<()> {
        if key.is_empty() {
            return Err(DbError::EmptyKey);
        }
        if key.len() > self.config.max_key_size {
            return Err(DbError::KeyTooLarge {
                len: key.len(),
                max: self.config.max_key_size,
            });
        }
        if val.len() > self.config.max_val_size {
            return Err(DbError::ValueTooLarge {
                len: val.len(),
                max: self.config.max_val_size,
            });
        }
        Ok(())
    }

    /// Publish `root`, then release the pages the previous version used.
    fn swap_root(&mut self, root: PageId, obsolete: Vec<PageId>) -> DbResult<()> {
        let old = std::mem::replace(&mut self.root, root);
        debug!(old = old.0, new = root.0, freed = obsolete.len(), "swapped root");
        for pid in obsolete {
            self.store.free(pid)?;
        }
        Ok(())
    }

    /// Allocate pages for an updated root, adding a level if it had to split.
    fn persist_root(&mut self, updated: Node) -> DbResult<PageId> {
        let kids = self.allocate_split(updated)?;
        if let [(pid, _)] = kids.as_slice() {
            return Ok(*pid);
        }

        debug!(kids = kids.len(), "root split, adding a level");
        let mut root = Node::new();
        root.set_header(NodeType::Internal, kids.len() as u16);
        for (i, (ptr, key)) in kids.iter().enumerate() {
            append_kv(&mut root, i as u16, *ptr, key, &[]);
        }
        self.store.allocate(root.encoded())
    }

    /// Replace a single-child root by its descendant, skipping any further
    /// single-child levels. A lone leaf holding only the sentinel leaves the
    /// tree empty.
    fn collapse_root(&mut self, root: &Node, obsolete: &mut Vec<PageId>) -> DbResult<PageId> {
        let mut child = root.ptr(0);
        loop {
            let kid = self.read_node(child)?;
            match (kid.node_type(), kid.nkeys()) {
                (NodeType::Internal, 1) => {
                    obsolete.push(child);
                    child = kid.ptr(0);
                }
                (NodeType::Leaf, 0..=1) => {
                    obsolete.push(child);
                    return Ok(PageId::NULL);
                }
                _ => {
                    debug!(root = child.0, "root has a single child, removing a level");
                    return Ok(child);
                }
            }
        }
    }

    /// Split `node` into page-sized parts and allocate each, returning the
    /// links a parent needs.
    fn allocate_split(&mut self, node: Node) -> DbResult<Vec<(PageId, Vec<u8>)>> {
        let parts = split3(node);
        if parts.len() > 1 {
            debug!(parts = parts.len(), "split node");
        }
        parts
            .into_iter()
            .map(|part| {
                let pid = self.store.allocate(part.encoded())?;
                Ok((pid, part.key(0).to_vec()))
            })
            .collect()
    }

    /// Rebuild the subtree under `node` with `key` set to `val`. The result
    /// may exceed a page.
    fn tree_insert(
        &mut self,
        node: &Node,
        key: &[u8],
        val: &[u8],
        obsolete: &mut Vec<PageId>,
    ) -> DbResult<Node> {
        let mut new = Node::scratch();
        let idx = lookup_floor(node, key);

        match node.node_type() {
            NodeType::Leaf => {
                if node.nkeys() == 0 {
                    leaf_insert(&mut new, node, 0, key, val);
                } else if node.key(idx) == key {
                    leaf_update(&mut new, node, idx, key, val);
                } else {
                    leaf_insert(&mut new, node, idx + 1, key, val);
                }
            }
            NodeType::Internal => {
                let kptr = node.ptr(idx);
                let kid = self.read_node(kptr)?;
                let updated = self.tree_insert(&kid, key, val, obsolete)?;
                obsolete.push(kptr);

                let kids = self.allocate_split(updated)?;
                replace_kids(&mut new, node, idx, &kids);
            }
        }
        Ok(new)
    }

    /// Rebuild the subtree under `node` without `key`, or `None` if the key
    /// is absent. The result may exceed a page, since a shorter child can
    /// promote a longer first key into its parent.
    fn tree_delete(
        &mut self,
        node: &Node,
        key: &[u8],
        obsolete: &mut Vec<PageId>,
    ) -> DbResult<Option<Node>> {
        let idx = lookup_floor(node, key);

        match node.node_type() {
            NodeType::Leaf => {
                if node.nkeys() == 0 || node.key(idx) != key {
                    return Ok(None);
                }
                let mut new = Node::new();
                leaf_delete(&mut new, node, idx);
                Ok(Some(new))
            }
            NodeType::Internal => self.node_delete(node, idx, key, obsolete),
        }
    }

    fn node_delete(
        &mut self,
        node: &Node,
        idx: u16,
        key: &[u8],
        obsolete: &mut Vec<PageId>,
    ) -> DbResult<Option<Node>> {
        let kptr = node.ptr(idx);
        let kid = self.read_node(kptr)?;
        let Some(updated) = self.tree_delete(&kid, key, obsolete)? else {
            return Ok(None);
        };
        obsolete.push(kptr);

        let mut new = Node::scratch();
        match self.merge_target(node, idx, &updated)? {
            Some(Sibling::Left(sibling)) => {
                let mut merged = Node::new();
                merge(&mut merged, &sibling, &updated);
                obsolete.push(node.ptr(idx - 1));
                debug!(idx, "merged child into left sibling");
                let pid = self.store.allocate(merged.encoded())?;
                replace_two_kids(&mut new, node, idx - 1, pid, merged.key(0));
            }
            Some(Sibling::Right(sibling)) => {
                let mut merged = Node::new();
                merge(&mut merged, &updated, &sibling);
                obsolete.push(node.ptr(idx + 1));
                debug!(idx, "merged right sibling into child");
                let pid = self.store.allocate(merged.encoded())?;
                replace_two_kids(&mut new, node, idx, pid, merged.key(0));
            }
            None if updated.nkeys() == 0 => {
                // An empty child without siblings empties its parent, which
                // the grandparent then merges away.
                assert!(
                    node.nkeys() == 1 && idx == 0,
                    "empty child {idx} of a node with {} keys was not merged",
                    node.nkeys()
                );
                new.set_header(NodeType::Internal, 0);
            }
            None => {
                let kids = self.allocate_split(updated)?;
                replace_kids(&mut new, node, idx, &kids);
            }
        }
        Ok(Some(new))
    }

    /// Pick a sibling to merge a shrunken child with: the left one if the
    /// result fits a page, else the right one.
    fn merge_target(&mut self, node: &Node, idx: u16, updated: &Node) -> DbResult<Option<Sibling>> {
        let size = updated.nbytes() as usize;
        if size > PAGE_SIZE / 4 {
            return Ok(None);
        }

        if idx > 0 {
            let sibling = self.read_node(node.ptr(idx - 1))?;
            if sibling.nbytes() as usize + size - HEADER <= PAGE_SIZE {
                return Ok(Some(Sibling::Left(sibling)));
            }
        }
        if idx + 1 < node.nkeys() {
            let sibling = self.read_node(node.ptr(idx + 1))?;
            if sibling.nbytes() as usize + size - HEADER <= PAGE_SIZE {
                return Ok(Some(Sibling::Right(sibling)));
            }
        }
        Ok(None)
    }

    fn collect(&mut self, pid: PageId, out: &mut Vec<(Vec<u8>, Vec<u8>)>) -> DbResult<()> {
        let node = self.read_node(pid)?;
        for i in 0..node.nkeys() {
            match node.node_type() {
                NodeType::Internal => self.collect(node.ptr(i), out)?,
                NodeType::Leaf if node.key(i).is_empty() => {}
                NodeType::Leaf => out.push((node.key(i).to_vec(), node.val(i).to_vec())),
            }
        }
        Ok(())
    }

    fn check_node(
        &mut self,
        pid: PageId,
        first: &[u8],
        upper: Option<&[u8]>,
        depth: usize,
        leaf_depth: &mut Option<usize>,
    ) -> DbResult<()> {
        let node = self.read_node(pid)?;
        node.validate()
            .map_err(|e| DbError::Corrupt(format!("page {pid}: {e}")))?;

        let nkeys = node.nkeys();
        if nkeys == 0 {
            return Err(DbError::Corrupt(format!("page {pid} is an empty node")));
        }
        if node.key(0) != first {
            return Err(DbError::Corrupt(format!(
                "page {pid} starts with a key that differs from its parent link"
            )));
        }
        if let Some(upper) = upper {
            if node.key(nkeys - 1) >= upper {
                return Err(DbError::Corrupt(format!(
                    "page {pid} holds keys past the next separator"
                )));
            }
        }

        match node.node_type() {
            NodeType::Leaf => match *leaf_depth {
                None => *leaf_depth = Some(depth),
                Some(expected) if expected != depth => {
                    return Err(DbError::Corrupt(format!(
                        "leaf {pid} at depth {depth}, expected {expected}"
                    )));
                }
                Some(_) => {}
            },
            NodeType::Internal => {
                for i in 0..nkeys {
                    let child_upper = if i + 1 < nkeys {
                        Some(node.key(i + 1))
                    } else {
                        upper
                    };
                    self.check_node(node.ptr(i), node.key(i), child_upper, depth + 1, leaf_depth)?;
                }
            }
        }
        Ok(())
    }
}
