use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, instrument, trace};

use crate::buffer::BufferPoolManager;
use crate::common::config::{Fd, PageId, PageNo, Rid, INVALID_PAGE_ID, RM_NO_PAGE};
use crate::common::error::{CoreError, Result};
use crate::record::header::{FileHeader, PageHeader, FILE_HEADER_SIZE};
use crate::record::page::RmPageHandle;

/// The mutable part of the file header: everything except `record_size` and
/// `slots_per_page`, which are fixed for the life of the file and so need no
/// locking once read at `create`/`open` time.
struct FileHandleState {
    num_pages: i32,
    first_free_page_no: PageNo,
}

/// A slotted-page record file: page 0 holds the file header, every other
/// page is interpreted via [`RmPageHandle`].
///
/// None of the operations below unpin the pages they fetch (callers are
/// responsible for that, per the buffer pool's pinning contract).
pub struct FileHandle {
    fd: Fd,
    pool: Arc<BufferPoolManager>,
    record_size: usize,
    slots_per_page: usize,
    state: Mutex<FileHandleState>,
}

impl FileHandle {
    /// Computes `slots_per_page` from `record_size`, writes a fresh file
    /// header to page 0, and unpins it. The caller must already have
    /// registered `fd` with the pool's disk manager with `next_page_no = 0`.
    #[instrument(skip(pool))]
    pub fn create(fd: Fd, record_size: usize, pool: Arc<BufferPoolManager>) -> Result<FileHandle> {
        let file_hdr = FileHeader::new(record_size);

        let mut page_id = PageId::header(fd);
        let frame = pool.new_page(&mut page_id).ok_or(CoreError::AllocationFailed)?;
        file_hdr.encode(&mut frame.data_mut()[..FILE_HEADER_SIZE]);
        frame.mark_dirty();
        pool.flush_page(page_id);
        pool.unpin_page(page_id, false);

        Ok(FileHandle {
            fd,
            pool,
            record_size: file_hdr.record_size,
            slots_per_page: file_hdr.slots_per_page,
            state: Mutex::new(FileHandleState {
                num_pages: file_hdr.num_pages,
                first_free_page_no: file_hdr.first_free_page_no,
            }),
        })
    }

    /// Fetches page 0, decodes the file header, and unpins it.
    #[instrument(skip(pool))]
    pub fn open(fd: Fd, pool: Arc<BufferPoolManager>) -> Result<FileHandle> {
        let page_id = PageId::header(fd);
        let frame = pool.fetch_page(page_id).ok_or(CoreError::PageNotExist(page_id))?;
        let file_hdr = FileHeader::decode(&frame.data()[..FILE_HEADER_SIZE]);
        pool.unpin_page(page_id, false);

        Ok(FileHandle {
            fd,
            pool,
            record_size: file_hdr.record_size,
            slots_per_page: file_hdr.slots_per_page,
            state: Mutex::new(FileHandleState {
                num_pages: file_hdr.num_pages,
                first_free_page_no: file_hdr.first_free_page_no,
            }),
        })
    }

    /// Serializes the in-memory header back to page 0 and flushes it.
    /// Not called automatically by any mutation below.
    pub fn sync_header(&self) -> Result<()> {
        let page_id = PageId::header(self.fd);
        let frame = self.pool.fetch_page(page_id).ok_or(CoreError::PageNotExist(page_id))?;
        let state = self.state.lock();
        let file_hdr = FileHeader {
            record_size: self.record_size,
            slots_per_page: self.slots_per_page,
            num_pages: state.num_pages,
            first_free_page_no: state.first_free_page_no,
        };
        drop(state);
        file_hdr.encode(&mut frame.data_mut()[..FILE_HEADER_SIZE]);
        frame.mark_dirty();
        self.pool.flush_page(page_id);
        self.pool.unpin_page(page_id, false);
        Ok(())
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn slots_per_page(&self) -> usize {
        self.slots_per_page
    }

    pub fn num_pages(&self) -> i32 {
        self.state.lock().num_pages
    }

    pub fn first_free_page_no(&self) -> PageNo {
        self.state.lock().first_free_page_no
    }

    pub fn fetch_page_handle(&self, page_no: PageNo) -> Result<RmPageHandle> {
        let page_id = PageId::new(self.fd, page_no);
        let frame = self.pool.fetch_page(page_id).ok_or(CoreError::PageNotExist(page_id))?;
        Ok(RmPageHandle::new(page_id, frame, self.slots_per_page, self.record_size))
    }

    fn create_new_page_handle(&self) -> Result<RmPageHandle> {
        let mut page_id = PageId::new(self.fd, INVALID_PAGE_ID);
        let frame = self.pool.new_page(&mut page_id).ok_or(CoreError::AllocationFailed)?;
        let handle = RmPageHandle::new(page_id, frame, self.slots_per_page, self.record_size);
        handle.set_header(PageHeader {
            num_records: 0,
            next_free_page_no: RM_NO_PAGE,
        });
        handle.mark_dirty();

        let mut state = self.state.lock();
        debug_assert_eq!(page_id.page_no, state.num_pages, "disk manager and file header page counters drifted apart");
        state.first_free_page_no = state.num_pages;
        state.num_pages += 1;
        Ok(handle)
    }

    fn create_page_handle(&self) -> Result<RmPageHandle> {
        let first_free = self.state.lock().first_free_page_no;
        if first_free == RM_NO_PAGE {
            self.create_new_page_handle()
        } else {
            self.fetch_page_handle(first_free)
        }
    }

    /// Splices the now-full page `page_no_this` out of the free chain,
    /// replacing any link into it with its own `next_free_page_no`.
    fn splice_out_full_page(&self, page_no_this: PageNo, next_free_page_no: PageNo) -> Result<()> {
        let mut state = self.state.lock();
        if state.first_free_page_no == page_no_this {
            state.first_free_page_no = next_free_page_no;
            return Ok(());
        }
        let mut cur_no = state.first_free_page_no;
        drop(state);

        while cur_no != RM_NO_PAGE {
            let cur = self.fetch_page_handle(cur_no)?;
            let mut cur_hdr = cur.header();
            if cur_hdr.next_free_page_no == page_no_this {
                cur_hdr.next_free_page_no = next_free_page_no;
                cur.set_header(cur_hdr);
                cur.mark_dirty();
                self.pool.unpin_page(cur.page_id, true);
                return Ok(());
            }
            let next = cur_hdr.next_free_page_no;
            self.pool.unpin_page(cur.page_id, false);
            cur_no = next;
        }
        Ok(())
    }

    /// Inserts `page` into the free chain in ascending page-number order.
    /// Called when a page transitions from full to non-full.
    #[instrument(skip(self, page))]
    fn release_page_handle(&self, page: &RmPageHandle) -> Result<()> {
        let page_no_this = page.page_id.page_no;
        let first_free = self.state.lock().first_free_page_no;

        if first_free == RM_NO_PAGE || first_free > page_no_this {
            let mut hdr = page.header();
            hdr.next_free_page_no = first_free;
            page.set_header(hdr);
            page.mark_dirty();
            self.state.lock().first_free_page_no = page_no_this;
            debug!(page_no_this, "released page became new free-chain head");
            return Ok(());
        }

        let mut cur_no = first_free;
        loop {
            let cur = self.fetch_page_handle(cur_no)?;
            let cur_hdr = cur.header();
            if cur_hdr.next_free_page_no == RM_NO_PAGE || cur_hdr.next_free_page_no > page_no_this {
                let mut hdr = page.header();
                hdr.next_free_page_no = cur_hdr.next_free_page_no;
                page.set_header(hdr);
                page.mark_dirty();

                let mut new_cur_hdr = cur_hdr;
                new_cur_hdr.next_free_page_no = page_no_this;
                cur.set_header(new_cur_hdr);
                cur.mark_dirty();
                self.pool.unpin_page(cur.page_id, true);
                debug!(page_no_this, predecessor = cur_no, "spliced page into free chain");
                break;
            }
            let next_no = cur_hdr.next_free_page_no;
            self.pool.unpin_page(cur.page_id, false);
            cur_no = next_no;
        }
        Ok(())
    }

    /// Returns the record at `rid`, or `None` if its slot is unoccupied.
    /// Leaves the page pinned; the caller unpins it.
    pub fn get_record(&self, rid: Rid) -> Result<Option<Vec<u8>>> {
        let page = self.fetch_page_handle(rid.page_no)?;
        if page.is_record(rid.slot_no as usize) {
            Ok(Some(page.read_slot(rid.slot_no as usize)))
        } else {
            Ok(None)
        }
    }

    /// Inserts `buf` into the first available slot and returns its `Rid`.
    /// Leaves the page pinned; the caller unpins it.
    #[instrument(skip(self, buf))]
    pub fn insert_record(&self, buf: &[u8]) -> Result<Rid> {
        debug_assert_eq!(buf.len(), self.record_size);
        let page = self.create_page_handle()?;
        let free_slot = page.first_bit(false);

        page.write_slot(free_slot, buf);
        page.set_slot_bit(free_slot);
        let mut hdr = page.header();
        hdr.num_records += 1;
        page.set_header(hdr);
        page.mark_dirty();

        let rid = Rid::new(page.page_id.page_no, free_slot as i32);
        trace!(?rid, "inserted record");

        if page.first_bit(false) == self.slots_per_page {
            // `create_page_handle` only ever hands back the chain head or a
            // brand-new page that set itself as head, so this is always the
            // splice-the-head-out case.
            self.state.lock().first_free_page_no = hdr.next_free_page_no;
        }
        Ok(rid)
    }

    /// Inserts `buf` at exactly `rid`. Fails with `CallerContractViolation`
    /// if `rid` already holds a record. Leaves the page pinned.
    #[instrument(skip(self, buf))]
    pub fn insert_record_at(&self, rid: Rid, buf: &[u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), self.record_size);
        let page = self.fetch_page_handle(rid.page_no)?;
        let slot_no = rid.slot_no as usize;
        if page.is_record(slot_no) {
            return Err(CoreError::CallerContractViolation);
        }

        page.write_slot(slot_no, buf);
        page.set_slot_bit(slot_no);
        let mut hdr = page.header();
        hdr.num_records += 1;
        page.set_header(hdr);
        page.mark_dirty();

        if hdr.num_records as usize == self.slots_per_page {
            self.splice_out_full_page(rid.page_no, hdr.next_free_page_no)?;
        }
        Ok(())
    }

    /// Clears the bitmap bit for `rid`. If the page was full, re-links it
    /// into the free chain. Leaves the page pinned.
    #[instrument(skip(self))]
    pub fn delete_record(&self, rid: Rid) -> Result<()> {
        let page = self.fetch_page_handle(rid.page_no)?;
        let was_full = page.header().num_records as usize == self.slots_per_page;

        page.reset_slot_bit(rid.slot_no as usize);
        if was_full {
            self.release_page_handle(&page)?;
        }
        let mut hdr = page.header();
        hdr.num_records -= 1;
        page.set_header(hdr);
        page.mark_dirty();
        Ok(())
    }

    /// Overwrites the bytes at `rid` without touching the bitmap. Leaves the
    /// page pinned.
    pub fn update_record(&self, rid: Rid, buf: &[u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), self.record_size);
        let page = self.fetch_page_handle(rid.page_no)?;
        page.write_slot(rid.slot_no as usize, buf);
        page.mark_dirty();
        Ok(())
    }
}
