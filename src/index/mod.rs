//! Disk-resident B+ tree index

mod btree;
mod codec;
mod error;
mod node;
#[cfg(test)]
mod tests;
mod value;

pub use btree::BPTree;
pub use error::{IndexError, IndexResult};
pub use node::{
    InternalEntry, InternalNode, LeafEntry, LeafNode, MAX_INTERNAL_ENTRIES, MAX_LEAF_ENTRIES, Node,
};
pub use value::{KEY_LEN, Key, VALUE_STR_LEN, ValueRecord, key_from_str};
