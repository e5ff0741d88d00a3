pub mod command;
pub mod file;
pub mod index;

pub use file::{BLOCK_SIZE, PageCache, PageId, Pager};
pub use index::{BPTree, Key, ValueRecord, key_from_str};
