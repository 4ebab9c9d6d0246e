use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

use log::debug;

use crate::common::config::{Fd, PageNo, INVALID_PAGE_ID, PAGE_SIZE};
use crate::common::error::Result;

/// Block-oriented I/O and page-number allocation within a file.
///
/// This is the external collaborator the buffer pool is built against: it
/// knows nothing about frames, pinning, or the slotted-page layout above it.
pub trait DiskManager: Send + Sync {
    /// Fills `buf` (exactly `PAGE_SIZE` bytes) with the contents of `page_no`
    /// in file `fd`. Reading past the end of the file is not an error; the
    /// remainder of `buf` is zero-filled.
    fn read_page(&self, fd: Fd, page_no: PageNo, buf: &mut [u8]) -> Result<()>;

    /// Persists `buf` (exactly `PAGE_SIZE` bytes) as `page_no` in file `fd`.
    fn write_page(&self, fd: Fd, page_no: PageNo, buf: &[u8]) -> Result<()>;

    /// Returns a fresh page number in file `fd`, or `INVALID_PAGE_ID` if `fd`
    /// is not a file this manager knows about.
    fn allocate_page(&self, fd: Fd) -> PageNo;
}

struct FileEntry {
    file: Mutex<File>,
    next_page_no: AtomicI32,
}

/// A `DiskManager` backed by one real file per registered `fd`.
///
/// Generalizes the reference disk manager (which speaks to a single `.db`
/// file) into a small `fd`-keyed registry, since this core's `PageId` is
/// `(fd, page_no)` rather than an implicit single file.
pub struct FileDiskManager {
    files: HashMap<Fd, FileEntry>,
}

impl FileDiskManager {
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
        }
    }

    /// Opens (creating if needed) `path` and registers it under `fd`.
    /// `next_page_no` is the first page number `allocate_page` will hand out.
    /// For a file a `FileHandle` will create, this must be 0: `FileHandle::create`
    /// allocates the header page itself (page 0) via its first `allocate_page`
    /// call, and every later reader of the header hardcodes page 0.
    pub fn register_file<P: AsRef<Path>>(
        &mut self,
        fd: Fd,
        path: P,
        next_page_no: PageNo,
    ) -> Result<()> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .or_else(|_| {
                OpenOptions::new()
                    .create(true)
                    .read(true)
                    .write(true)
                    .open(&path)
            })?;
        self.files.insert(
            fd,
            FileEntry {
                file: Mutex::new(file),
                next_page_no: AtomicI32::new(next_page_no),
            },
        );
        Ok(())
    }
}

impl Default for FileDiskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskManager for FileDiskManager {
    fn read_page(&self, fd: Fd, page_no: PageNo, buf: &mut [u8]) -> Result<()> {
        assert_eq!(buf.len(), PAGE_SIZE);
        let Some(entry) = self.files.get(&fd) else {
            return Err(crate::common::error::CoreError::PageNotExist(
                crate::common::config::PageId::new(fd, page_no),
            ));
        };
        let offset = page_no as u64 * PAGE_SIZE as u64;
        let mut file = entry.file.lock().unwrap();
        let len = file.metadata()?.len();
        if offset >= len {
            debug!("read past end of file for fd={fd} page_no={page_no}");
            buf.fill(0);
            return Ok(());
        }
        file.seek(SeekFrom::Start(offset))?;
        let read = file.read(buf)?;
        if read < PAGE_SIZE {
            debug!("short read for fd={fd} page_no={page_no}: {read} bytes");
            buf[read..].fill(0);
        }
        Ok(())
    }

    fn write_page(&self, fd: Fd, page_no: PageNo, buf: &[u8]) -> Result<()> {
        assert_eq!(buf.len(), PAGE_SIZE);
        let Some(entry) = self.files.get(&fd) else {
            return Err(crate::common::error::CoreError::PageNotExist(
                crate::common::config::PageId::new(fd, page_no),
            ));
        };
        let offset = page_no as u64 * PAGE_SIZE as u64;
        let mut file = entry.file.lock().unwrap();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        file.flush()?;
        Ok(())
    }

    fn allocate_page(&self, fd: Fd) -> PageNo {
        match self.files.get(&fd) {
            Some(entry) => entry.next_page_no.fetch_add(1, Ordering::SeqCst),
            None => INVALID_PAGE_ID,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn read_write_page() {
        let dir = TempDir::new("test").unwrap();
        let db_file = dir.path().join("test.db");

        let mut dm = FileDiskManager::new();
        dm.register_file(0, &db_file, 1).unwrap();

        let mut buf = [0u8; PAGE_SIZE];
        dm.read_page(0, 0, &mut buf).unwrap(); // tolerate empty read
        assert_eq!(buf, [0u8; PAGE_SIZE]);

        let mut data = [0u8; PAGE_SIZE];
        let test_str = b"A test string.";
        data[..test_str.len()].copy_from_slice(test_str);

        dm.write_page(0, 0, &data).unwrap();
        dm.read_page(0, 0, &mut buf).unwrap();
        assert_eq!(buf, data);

        buf.fill(0);
        dm.write_page(0, 5, &data).unwrap();
        dm.read_page(0, 5, &mut buf).unwrap();
        assert_eq!(buf, data);
    }

    #[test]
    fn allocate_page_increments_and_rejects_unknown_fd() {
        let dir = TempDir::new("test").unwrap();
        let db_file = dir.path().join("test.db");
        let mut dm = FileDiskManager::new();
        dm.register_file(0, &db_file, 1).unwrap();

        assert_eq!(dm.allocate_page(0), 1);
        assert_eq!(dm.allocate_page(0), 2);
        assert_eq!(dm.allocate_page(0), 3);
        assert_eq!(dm.allocate_page(7), INVALID_PAGE_ID);
    }
}
