//! Disk-resident B+ tree
//!
//! Maps fixed 64-byte keys to composite values, tolerating duplicates. Nodes
//! live on 4096-byte pages behind an LRU cache; the root is always an
//! internal node, so the tree height is at least two once it holds data.
//! Equal keys may spill across adjacent subtrees, which is why lookups and
//! removals scan forward from the rightmost strictly-smaller separator.

use std::path::Path;

use log::debug;

use crate::file::{CACHE_CAPACITY, FREE_LIST_SLOT, PageCache, PageId, Pager, ROOT_PAGE_SLOT};

use super::codec;
use super::error::{IndexError, IndexResult};
use super::node::{InternalEntry, InternalNode, LeafNode, MAX_INTERNAL_ENTRIES, MAX_LEAF_ENTRIES, Node};
use super::value::{KEY_LEN, Key, ValueRecord};

/// Disk-resident B+ tree over a single paged file
pub struct BPTree {
    pager: Pager,
    cache: PageCache,
    root_page: PageId,
}

impl BPTree {
    /// Open a dataset file, building a fresh tree if the header has no root
    pub fn open<P: AsRef<Path>>(path: P) -> IndexResult<Self> {
        let mut pager = Pager::open(path)?;
        let root_page = pager.read_header(ROOT_PAGE_SLOT)?;

        let mut tree = Self {
            pager,
            cache: PageCache::with_capacity(CACHE_CAPACITY),
            root_page,
        };
        if tree.root_page == 0 {
            tree.bootstrap()?;
        }
        Ok(tree)
    }

    /// Current root page id
    pub fn root_page(&self) -> PageId {
        self.root_page
    }

    /// Insert a (key, value) pair; duplicates are kept, identical pairs too
    pub fn insert(&mut self, key: &Key, value: ValueRecord) -> IndexResult<()> {
        let root_page = self.root_page;
        let mut root = self.read_node(root_page)?;
        self.insert_rec(key, value, &mut root, root_page)?;

        if root.count() >= MAX_INTERNAL_ENTRIES {
            self.grow_root(root, root_page)?;
        }
        Ok(())
    }

    /// Remove the first entry matching both key and value; returns whether
    /// one was removed
    pub fn remove(&mut self, key: &Key, value: ValueRecord) -> IndexResult<bool> {
        let root_page = self.root_page;
        let mut root = self.read_node(root_page)?;
        let removed = self.remove_rec(key, value, &mut root, root_page)?;

        if root.count() == 1 {
            self.shrink_root(&root, root_page)?;
        }
        Ok(removed)
    }

    /// Collect every value stored under `key`, in traversal order
    pub fn find(&mut self, key: &Key) -> IndexResult<Vec<ValueRecord>> {
        let root = self.read_node(self.root_page)?;
        let mut matches = Vec::new();
        self.collect_rec(key, &root, &mut matches)?;
        Ok(matches)
    }

    /// Build the initial two-level tree: an empty leaf under an internal
    /// root whose single separator is the all-zero sentinel key
    fn bootstrap(&mut self) -> IndexResult<()> {
        let mut leaf = Node::Leaf(LeafNode::new());
        let leaf_page = self.alloc_node(&leaf)?;

        let root = Node::Internal(InternalNode {
            parent: 0,
            next_leaf: 0,
            entries: vec![InternalEntry {
                key: [0u8; KEY_LEN],
                child: leaf_page,
            }],
        });
        let root_page = self.alloc_node(&root)?;

        leaf.set_parent(root_page);
        self.write_node(&leaf, leaf_page)?;

        self.pager.write_header(ROOT_PAGE_SLOT, root_page)?;
        self.pager.write_header(FREE_LIST_SLOT, 0)?;
        self.root_page = root_page;
        Ok(())
    }

    fn insert_rec(
        &mut self,
        key: &Key,
        value: ValueRecord,
        node: &mut Node,
        page: PageId,
    ) -> IndexResult<()> {
        let parent = match node {
            Node::Leaf(leaf) => {
                leaf.insert(key, value);
                // One entry past the limit no longer fits a page; the parent
                // split that follows rewrites both halves, so the oversized
                // image is never flushed.
                if leaf.entries.len() <= MAX_LEAF_ENTRIES {
                    self.write_node(node, page)?;
                }
                return Ok(());
            }
            Node::Internal(internal) => internal,
        };

        let i = parent.route(key);
        let child_page = parent.entries[i].child;
        let mut child = self.read_node(child_page)?;
        self.insert_rec(key, value, &mut child, child_page)?;

        if child.count() < child.limit() {
            return Ok(());
        }

        // Split: the child keeps the lower half, a new right sibling takes
        // the rest; the separator is the sibling's first key
        let half = child.limit() / 2;
        let (sibling, separator) = match &mut child {
            Node::Leaf(c) => {
                let moved = c.entries.split_off(half);
                let separator = moved[0].key;
                (
                    Node::Leaf(LeafNode {
                        parent: c.parent,
                        next_leaf: c.next_leaf,
                        entries: moved,
                    }),
                    separator,
                )
            }
            Node::Internal(c) => {
                let moved = c.entries.split_off(half);
                let separator = moved[0].key;
                (
                    Node::Internal(InternalNode {
                        parent: c.parent,
                        next_leaf: 0,
                        entries: moved,
                    }),
                    separator,
                )
            }
        };
        let sibling_page = self.alloc_node(&sibling)?;
        if let Node::Leaf(c) = &mut child {
            c.next_leaf = sibling_page;
        }
        self.write_node(&child, child_page)?;

        parent.entries.insert(
            i + 1,
            InternalEntry {
                key: separator,
                child: sibling_page,
            },
        );
        self.write_node(node, page)?;
        Ok(())
    }

    /// Split an overflowing root under a fresh internal root
    fn grow_root(&mut self, mut old_root: Node, old_root_page: PageId) -> IndexResult<()> {
        let entries = match &mut old_root {
            Node::Internal(internal) => &mut internal.entries,
            Node::Leaf(_) => return Err(IndexError::CorruptedNode(old_root_page)),
        };

        let moved = entries.split_off(MAX_INTERNAL_ENTRIES / 2);
        let first_key = entries[0].key;
        let carved_first = moved[0].key;
        let mut carved = Node::Internal(InternalNode {
            parent: 0,
            next_leaf: 0,
            entries: moved,
        });
        let carved_page = self.alloc_node(&carved)?;

        let new_root = Node::Internal(InternalNode {
            parent: 0,
            next_leaf: 0,
            entries: vec![
                InternalEntry {
                    key: first_key,
                    child: old_root_page,
                },
                InternalEntry {
                    key: carved_first,
                    child: carved_page,
                },
            ],
        });
        let new_root_page = self.alloc_node(&new_root)?;

        old_root.set_parent(new_root_page);
        // Legacy link kept in the page format; internal nodes never read it
        old_root.set_next_leaf(carved_page);
        self.write_node(&old_root, old_root_page)?;

        carved.set_parent(new_root_page);
        self.write_node(&carved, carved_page)?;

        self.root_page = new_root_page;
        self.pager.write_header(ROOT_PAGE_SLOT, new_root_page)?;
        debug!("root grown: {} -> {}", old_root_page, new_root_page);
        Ok(())
    }

    fn remove_rec(
        &mut self,
        key: &Key,
        value: ValueRecord,
        node: &mut Node,
        page: PageId,
    ) -> IndexResult<bool> {
        let parent = match node {
            Node::Leaf(leaf) => {
                let found = leaf
                    .entries
                    .iter()
                    .position(|e| e.key == *key && e.value == value);
                let Some(j) = found else {
                    return Ok(false);
                };
                leaf.entries.remove(j);
                self.write_node(node, page)?;
                return Ok(true);
            }
            Node::Internal(internal) => internal,
        };

        // Equal keys may span several children; try each in turn, but stop
        // at the first successful removal
        let mut i = parent.route_before(key);
        while i < parent.entries.len() && parent.entries[i].key <= *key {
            let child_page = parent.entries[i].child;
            let mut child = self.read_node(child_page)?;
            if !self.remove_rec(key, value, &mut child, child_page)? {
                i += 1;
                continue;
            }

            if child.count() < child.limit() / 2 && parent.entries.len() > 1 {
                self.rebalance(node, page, i, child, child_page)?;
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// Restock an underflowed child from a sibling: merge when both fit in
    /// one node, otherwise borrow a single boundary entry.
    ///
    /// The left sibling is preferred; the right one is only used for the
    /// leftmost child.
    fn rebalance(
        &mut self,
        node: &mut Node,
        page: PageId,
        i: usize,
        mut child: Node,
        child_page: PageId,
    ) -> IndexResult<()> {
        let parent = match node.as_internal_mut() {
            Some(internal) => internal,
            None => return Err(IndexError::CorruptedNode(page)),
        };

        let from_left = i > 0;
        let sibling_page = if from_left {
            parent.entries[i - 1].child
        } else {
            parent.entries[i + 1].child
        };
        let mut sibling = self.read_node(sibling_page)?;

        if sibling.count() + child.count() <= child.limit() {
            if from_left {
                match (&mut sibling, &mut child) {
                    (Node::Leaf(s), Node::Leaf(c)) => {
                        s.entries.append(&mut c.entries);
                        // The absorbed child drops out of the leaf chain
                        s.next_leaf = c.next_leaf;
                    }
                    (Node::Internal(s), Node::Internal(c)) => {
                        s.entries.append(&mut c.entries);
                    }
                    _ => return Err(IndexError::CorruptedNode(sibling_page)),
                }
                self.write_node(&sibling, sibling_page)?;
                parent.entries.remove(i);
                self.write_node(node, page)?;
                self.free_node(child_page)?;
            } else {
                match (&mut child, &mut sibling) {
                    (Node::Leaf(c), Node::Leaf(s)) => {
                        c.entries.append(&mut s.entries);
                        // The absorbed sibling drops out of the leaf chain
                        c.next_leaf = s.next_leaf;
                    }
                    (Node::Internal(c), Node::Internal(s)) => {
                        c.entries.append(&mut s.entries);
                    }
                    _ => return Err(IndexError::CorruptedNode(sibling_page)),
                }
                self.write_node(&child, child_page)?;
                parent.entries.remove(i + 1);
                self.write_node(node, page)?;
                self.free_node(sibling_page)?;
            }
        } else {
            // Borrow one boundary entry and refresh the separator between
            // the two nodes
            match (&mut child, &mut sibling) {
                (Node::Leaf(c), Node::Leaf(s)) => {
                    if from_left {
                        let moved = s
                            .entries
                            .pop()
                            .ok_or(IndexError::CorruptedNode(sibling_page))?;
                        c.entries.insert(0, moved);
                        parent.entries[i].key = c.entries[0].key;
                    } else {
                        c.entries.push(s.entries.remove(0));
                        parent.entries[i + 1].key = s.entries[0].key;
                    }
                }
                (Node::Internal(c), Node::Internal(s)) => {
                    if from_left {
                        let moved = s
                            .entries
                            .pop()
                            .ok_or(IndexError::CorruptedNode(sibling_page))?;
                        c.entries.insert(0, moved);
                        parent.entries[i].key = c.entries[0].key;
                    } else {
                        c.entries.push(s.entries.remove(0));
                        parent.entries[i + 1].key = s.entries[0].key;
                    }
                }
                _ => return Err(IndexError::CorruptedNode(sibling_page)),
            }
            self.write_node(&child, child_page)?;
            self.write_node(&sibling, sibling_page)?;
            self.write_node(node, page)?;
        }

        Ok(())
    }

    /// Collapse a single-entry root onto its child when that child is
    /// internal; a lone leaf child stays put so the root remains internal
    fn shrink_root(&mut self, root: &Node, root_page: PageId) -> IndexResult<()> {
        let child_page = match root.as_internal() {
            Some(internal) => internal.entries[0].child,
            None => return Err(IndexError::CorruptedNode(root_page)),
        };

        let mut child = self.read_node(child_page)?;
        if child.is_leaf() {
            return Ok(());
        }

        self.free_node(root_page)?;
        child.set_parent(0);
        self.write_node(&child, child_page)?;
        self.root_page = child_page;
        self.pager.write_header(ROOT_PAGE_SLOT, child_page)?;
        debug!("root collapsed: {} -> {}", root_page, child_page);
        Ok(())
    }

    fn collect_rec(
        &mut self,
        key: &Key,
        node: &Node,
        out: &mut Vec<ValueRecord>,
    ) -> IndexResult<()> {
        let internal = match node {
            Node::Leaf(leaf) => {
                for entry in &leaf.entries {
                    if entry.key == *key {
                        out.push(entry.value);
                    }
                }
                return Ok(());
            }
            Node::Internal(internal) => internal,
        };

        if internal.entries.is_empty() {
            return Ok(());
        }

        // Matches may sit in every child from the rightmost strictly-smaller
        // separator up to the last separator not above the key
        let mut i = internal.route_before(key);
        while i < internal.entries.len() && internal.entries[i].key <= *key {
            let child = self.read_node(internal.entries[i].child)?;
            self.collect_rec(key, &child, out)?;
            i += 1;
        }
        Ok(())
    }

    /// Read a node through the cache, falling back to the pager on a miss
    pub(crate) fn read_node(&mut self, page: PageId) -> IndexResult<Node> {
        if let Some(image) = self.cache.get(page) {
            return codec::decode_node(image);
        }

        let mut buf = vec![0u8; crate::file::BLOCK_SIZE];
        self.pager.read_page(page, &mut buf)?;
        let node = codec::decode_node(&buf)?;
        self.cache.put(page, buf);
        Ok(node)
    }

    /// Write a node through the pager and refresh the cached image
    fn write_node(&mut self, node: &Node, page: PageId) -> IndexResult<()> {
        let buf = codec::encode_node(node);
        self.pager.write_page(page, &buf)?;
        self.cache.put(page, buf);
        Ok(())
    }

    /// Allocate a page for a node and seed the cache with its image
    fn alloc_node(&mut self, node: &Node) -> IndexResult<PageId> {
        let buf = codec::encode_node(node);
        let page = self.pager.alloc_page(&buf)?;
        self.cache.put(page, buf);
        Ok(page)
    }

    /// Return a page to the free list; the cached image, if any, is left to
    /// be overwritten when the id is reused
    fn free_node(&mut self, page: PageId) -> IndexResult<()> {
        self.pager.free_page(page)?;
        Ok(())
    }

    pub(crate) fn pager_mut(&mut self) -> &mut Pager {
        &mut self.pager
    }
}
