//! Page image encoding and decoding for B+ tree nodes

use crate::file::BLOCK_SIZE;

use super::error::{IndexError, IndexResult};
use super::node::{InternalEntry, InternalNode, LeafEntry, LeafNode, Node};
use super::value::{KEY_LEN, Key, VALUE_STR_LEN, ValueRecord};

/// Node header: is_leaf (1) + count (4) + parent (4) + next_leaf (4)
pub(crate) const NODE_HEADER_LEN: usize = 13;

/// Serialized value size: two fixed strings plus an i32 tag
pub(crate) const VALUE_LEN: usize = 2 * VALUE_STR_LEN + 4;

/// Serialized leaf entry size
pub(crate) const LEAF_ENTRY_LEN: usize = KEY_LEN + VALUE_LEN;

/// Serialized internal entry size
pub(crate) const INTERNAL_ENTRY_LEN: usize = KEY_LEN + 4;

/// Leaf entries that fit in one page
pub(crate) const LEAF_CAPACITY: usize = (BLOCK_SIZE - NODE_HEADER_LEN) / LEAF_ENTRY_LEN;

/// Internal entries that fit in one page.
///
/// This exceeds the split limit: an internal node holds limit + 1 entries on
/// disk between a child split and its own split.
pub(crate) const INTERNAL_CAPACITY: usize = (BLOCK_SIZE - NODE_HEADER_LEN) / INTERNAL_ENTRY_LEN;

/// Encode a node into a full page image; unused bytes are zero
pub(crate) fn encode_node(node: &Node) -> Vec<u8> {
    let mut buf = vec![0u8; BLOCK_SIZE];

    buf[0] = node.is_leaf() as u8;
    buf[1..5].copy_from_slice(&(node.count() as i32).to_le_bytes());
    buf[5..9].copy_from_slice(&node.parent().to_le_bytes());
    buf[9..13].copy_from_slice(&node.next_leaf().to_le_bytes());

    let mut offset = NODE_HEADER_LEN;
    match node {
        Node::Leaf(leaf) => {
            for entry in &leaf.entries {
                buf[offset..offset + KEY_LEN].copy_from_slice(&entry.key);
                offset += KEY_LEN;
                buf[offset..offset + VALUE_STR_LEN].copy_from_slice(&entry.value.s1);
                offset += VALUE_STR_LEN;
                buf[offset..offset + VALUE_STR_LEN].copy_from_slice(&entry.value.s2);
                offset += VALUE_STR_LEN;
                buf[offset..offset + 4].copy_from_slice(&entry.value.num.to_le_bytes());
                offset += 4;
            }
        }
        Node::Internal(internal) => {
            for entry in &internal.entries {
                buf[offset..offset + KEY_LEN].copy_from_slice(&entry.key);
                offset += KEY_LEN;
                buf[offset..offset + 4].copy_from_slice(&entry.child.to_le_bytes());
                offset += 4;
            }
        }
    }

    buf
}

/// Decode a node from a page image
pub(crate) fn decode_node(buf: &[u8]) -> IndexResult<Node> {
    if buf.len() < BLOCK_SIZE {
        return Err(IndexError::TruncatedPage(buf.len()));
    }

    let kind = buf[0];
    let count = read_i32(buf, 1);
    let parent = read_u32(buf, 5);
    let next_leaf = read_u32(buf, 9);

    let capacity = match kind {
        0 => INTERNAL_CAPACITY,
        1 => LEAF_CAPACITY,
        other => return Err(IndexError::InvalidNodeKind(other)),
    };
    if count < 0 || count as usize > capacity {
        return Err(IndexError::InvalidEntryCount(count));
    }
    let count = count as usize;

    let mut offset = NODE_HEADER_LEN;
    if kind == 1 {
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let key = read_key(buf, offset);
            offset += KEY_LEN;

            let mut s1 = [0u8; VALUE_STR_LEN];
            s1.copy_from_slice(&buf[offset..offset + VALUE_STR_LEN]);
            offset += VALUE_STR_LEN;
            let mut s2 = [0u8; VALUE_STR_LEN];
            s2.copy_from_slice(&buf[offset..offset + VALUE_STR_LEN]);
            offset += VALUE_STR_LEN;
            let num = read_i32(buf, offset);
            offset += 4;

            entries.push(LeafEntry {
                key,
                value: ValueRecord { s1, s2, num },
            });
        }
        Ok(Node::Leaf(LeafNode {
            parent,
            next_leaf,
            entries,
        }))
    } else {
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let key = read_key(buf, offset);
            offset += KEY_LEN;
            let child = read_u32(buf, offset);
            offset += 4;

            entries.push(InternalEntry { key, child });
        }
        Ok(Node::Internal(InternalNode {
            parent,
            next_leaf,
            entries,
        }))
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

fn read_i32(buf: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

fn read_key(buf: &[u8], offset: usize) -> Key {
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&buf[offset..offset + KEY_LEN]);
    key
}
