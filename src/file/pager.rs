use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::error::{FileError, FileResult};
use super::{BLOCK_SIZE, FREE_LIST_SLOT, HEADER_SIZE, INFO_SLOTS, PageId};

/// Single paged file with a small header and a free-list allocator.
///
/// The file starts with `INFO_SLOTS` little-endian u32 header slots; pages
/// follow, 1-based, each exactly `BLOCK_SIZE` bytes. Freed pages are threaded
/// into a singly-linked list whose head lives in header slot
/// `FREE_LIST_SLOT`; each free page stores the next free id in its first
/// four bytes.
pub struct Pager {
    file: File,
    path: PathBuf,
}

impl Pager {
    /// Open an existing dataset file, or create it with a zeroed header
    pub fn open<P: AsRef<Path>>(path: P) -> FileResult<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let mut pager = Self { file, path };

        // A fresh file gets its header before any page exists
        if pager.file.metadata()?.len() < HEADER_SIZE {
            pager.file.seek(SeekFrom::Start(0))?;
            pager.file.write_all(&[0u8; HEADER_SIZE as usize])?;
        }

        Ok(pager)
    }

    /// Path this pager was opened with
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a header slot (1-based)
    pub fn read_header(&mut self, slot: usize) -> FileResult<u32> {
        Self::check_slot(slot)?;

        self.file.seek(SeekFrom::Start(((slot - 1) * 4) as u64))?;
        let mut buf = [0u8; 4];
        self.file.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Write a header slot (1-based)
    pub fn write_header(&mut self, slot: usize, value: u32) -> FileResult<()> {
        Self::check_slot(slot)?;

        self.file.seek(SeekFrom::Start(((slot - 1) * 4) as u64))?;
        self.file.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    /// Read a page into a caller-supplied buffer of exactly `BLOCK_SIZE` bytes
    pub fn read_page(&mut self, page: PageId, buf: &mut [u8]) -> FileResult<()> {
        if buf.len() != BLOCK_SIZE {
            return Err(FileError::InvalidPageSize {
                expected: BLOCK_SIZE,
                actual: buf.len(),
            });
        }

        self.file.seek(SeekFrom::Start(Self::page_offset(page)?))?;
        let bytes_read = self.file.read(buf)?;

        // A page past the current end of file reads back as zeros
        if bytes_read < BLOCK_SIZE {
            buf[bytes_read..].fill(0);
        }

        Ok(())
    }

    /// Write a full page, extending the file if necessary
    pub fn write_page(&mut self, page: PageId, buf: &[u8]) -> FileResult<()> {
        if buf.len() != BLOCK_SIZE {
            return Err(FileError::InvalidPageSize {
                expected: BLOCK_SIZE,
                actual: buf.len(),
            });
        }

        let offset = Self::page_offset(page)?;
        let required = offset + BLOCK_SIZE as u64;
        if self.file.metadata()?.len() < required {
            self.file.set_len(required)?;
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    /// Allocate a page and write its initial image.
    ///
    /// Reuses the free-list head when one exists (reading the next free id
    /// out of the reused page), otherwise appends past the last page.
    pub fn alloc_page(&mut self, initial: &[u8]) -> FileResult<PageId> {
        if initial.len() != BLOCK_SIZE {
            return Err(FileError::InvalidPageSize {
                expected: BLOCK_SIZE,
                actual: initial.len(),
            });
        }

        let head = self.read_header(FREE_LIST_SLOT)?;
        let page = if head != 0 {
            self.file.seek(SeekFrom::Start(Self::page_offset(head)?))?;
            let mut next = [0u8; 4];
            self.file.read_exact(&mut next)?;
            self.write_header(FREE_LIST_SLOT, u32::from_le_bytes(next))?;
            head
        } else {
            let len = self.file.metadata()?.len();
            ((len - HEADER_SIZE) / BLOCK_SIZE as u64) as PageId + 1
        };

        self.write_page(page, initial)?;
        Ok(page)
    }

    /// Push a page onto the free list; its contents become undefined
    pub fn free_page(&mut self, page: PageId) -> FileResult<()> {
        let head = self.read_header(FREE_LIST_SLOT)?;

        self.file.seek(SeekFrom::Start(Self::page_offset(page)?))?;
        self.file.write_all(&head.to_le_bytes())?;

        self.write_header(FREE_LIST_SLOT, page)
    }

    /// Number of pages currently in the file
    pub fn page_count(&mut self) -> FileResult<u32> {
        let len = self.file.metadata()?.len();
        Ok((len - HEADER_SIZE).div_ceil(BLOCK_SIZE as u64) as u32)
    }

    fn check_slot(slot: usize) -> FileResult<()> {
        if slot == 0 || slot > INFO_SLOTS {
            return Err(FileError::InvalidHeaderSlot(slot));
        }
        Ok(())
    }

    fn page_offset(page: PageId) -> FileResult<u64> {
        if page == 0 {
            return Err(FileError::InvalidPageId(page));
        }
        Ok(HEADER_SIZE + (page as u64 - 1) * BLOCK_SIZE as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Pager) {
        let temp_dir = tempfile::tempdir().unwrap();
        let pager = Pager::open(temp_dir.path().join("test.db")).unwrap();
        (temp_dir, pager)
    }

    #[test]
    fn test_create_writes_zeroed_header() {
        let (_temp_dir, mut pager) = setup();

        assert_eq!(pager.read_header(1).unwrap(), 0);
        assert_eq!(pager.read_header(2).unwrap(), 0);
        assert_eq!(pager.page_count().unwrap(), 0);
    }

    #[test]
    fn test_header_roundtrip() {
        let (_temp_dir, mut pager) = setup();

        pager.write_header(1, 7).unwrap();
        pager.write_header(2, 42).unwrap();

        assert_eq!(pager.read_header(1).unwrap(), 7);
        assert_eq!(pager.read_header(2).unwrap(), 42);
    }

    #[test]
    fn test_invalid_header_slot() {
        let (_temp_dir, mut pager) = setup();

        assert!(matches!(
            pager.read_header(0),
            Err(FileError::InvalidHeaderSlot(0))
        ));
        assert!(matches!(
            pager.write_header(3, 1),
            Err(FileError::InvalidHeaderSlot(3))
        ));
    }

    #[test]
    fn test_read_write_page() {
        let (_temp_dir, mut pager) = setup();

        let mut image = vec![0u8; BLOCK_SIZE];
        image[0] = 42;
        image[BLOCK_SIZE - 1] = 255;
        pager.write_page(1, &image).unwrap();

        let mut buf = vec![0u8; BLOCK_SIZE];
        pager.read_page(1, &mut buf).unwrap();
        assert_eq!(buf, image);
    }

    #[test]
    fn test_page_zero_rejected() {
        let (_temp_dir, mut pager) = setup();

        let buf = vec![0u8; BLOCK_SIZE];
        assert!(matches!(
            pager.write_page(0, &buf),
            Err(FileError::InvalidPageId(0))
        ));
    }

    #[test]
    fn test_read_past_end_is_zeroed() {
        let (_temp_dir, mut pager) = setup();

        let mut buf = vec![1u8; BLOCK_SIZE];
        pager.read_page(5, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_invalid_buffer_size() {
        let (_temp_dir, mut pager) = setup();

        let mut small = vec![0u8; BLOCK_SIZE - 1];
        assert!(matches!(
            pager.read_page(1, &mut small),
            Err(FileError::InvalidPageSize { .. })
        ));

        let large = vec![0u8; BLOCK_SIZE + 1];
        assert!(matches!(
            pager.write_page(1, &large),
            Err(FileError::InvalidPageSize { .. })
        ));
    }

    #[test]
    fn test_alloc_appends_sequentially() {
        let (_temp_dir, mut pager) = setup();

        let image = vec![0u8; BLOCK_SIZE];
        assert_eq!(pager.alloc_page(&image).unwrap(), 1);
        assert_eq!(pager.alloc_page(&image).unwrap(), 2);
        assert_eq!(pager.alloc_page(&image).unwrap(), 3);
        assert_eq!(pager.page_count().unwrap(), 3);
    }

    #[test]
    fn test_free_then_alloc_reuses_lifo() {
        let (_temp_dir, mut pager) = setup();

        let image = vec![0u8; BLOCK_SIZE];
        for _ in 0..3 {
            pager.alloc_page(&image).unwrap();
        }

        pager.free_page(2).unwrap();
        assert_eq!(pager.read_header(FREE_LIST_SLOT).unwrap(), 2);
        pager.free_page(1).unwrap();
        assert_eq!(pager.read_header(FREE_LIST_SLOT).unwrap(), 1);

        // Most recently freed comes back first
        assert_eq!(pager.alloc_page(&image).unwrap(), 1);
        assert_eq!(pager.read_header(FREE_LIST_SLOT).unwrap(), 2);
        assert_eq!(pager.alloc_page(&image).unwrap(), 2);
        assert_eq!(pager.read_header(FREE_LIST_SLOT).unwrap(), 0);

        // Exhausted free list falls back to appending
        assert_eq!(pager.alloc_page(&image).unwrap(), 4);
    }

    #[test]
    fn test_alloc_overwrites_reused_page() {
        let (_temp_dir, mut pager) = setup();

        let mut image = vec![0u8; BLOCK_SIZE];
        image[100] = 9;
        pager.alloc_page(&image).unwrap();
        pager.free_page(1).unwrap();

        let fresh = vec![7u8; BLOCK_SIZE];
        assert_eq!(pager.alloc_page(&fresh).unwrap(), 1);

        let mut buf = vec![0u8; BLOCK_SIZE];
        pager.read_page(1, &mut buf).unwrap();
        assert_eq!(buf, fresh);
    }

    #[test]
    fn test_header_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("test.db");

        {
            let mut pager = Pager::open(&path).unwrap();
            pager.write_header(1, 11).unwrap();
            let image = vec![3u8; BLOCK_SIZE];
            pager.alloc_page(&image).unwrap();
        }

        let mut pager = Pager::open(&path).unwrap();
        assert_eq!(pager.read_header(1).unwrap(), 11);
        assert_eq!(pager.page_count().unwrap(), 1);

        let mut buf = vec![0u8; BLOCK_SIZE];
        pager.read_page(1, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 3));
    }
}
