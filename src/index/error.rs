use thiserror::Error;

use crate::file::{FileError, PageId};

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors that can occur during index operations
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Truncated page image: {0} bytes")]
    TruncatedPage(usize),

    #[error("Invalid node kind byte: {0}")]
    InvalidNodeKind(u8),

    #[error("Invalid entry count: {0}")]
    InvalidEntryCount(i32),

    #[error("Corrupted node at page {0}")]
    CorruptedNode(PageId),
}
