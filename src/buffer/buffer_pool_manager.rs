use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, instrument, trace};

use super::lru_replacer::LruReplacer;
use crate::common::config::{FrameId, PageId};
use crate::storage::disk::DiskManager;
use crate::storage::page::Frame;

/// Coordinating state the pool's single latch protects: the page table, the
/// free-frame list, and the frame array itself (frame *identity*, not frame
/// *contents*; see `Frame`'s own doc comment).
struct PoolInner {
    frames: Vec<Frame>,
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
}

/// Where a victim frame handed back by `find_victim_frame` came from. A
/// frame sourced from the replacer still has a live page's identity in
/// `page_table` until `replace_frame_contents` runs; one sourced from the
/// free list never had one.
#[derive(Clone, Copy, PartialEq, Eq)]
enum VictimSource {
    FreeList,
    Replacer,
}

/// Reads disk pages into a fixed pool of frames, evicting the
/// least-recently-unpinned frame (via [`LruReplacer`]) when the pool is full.
pub struct BufferPoolManager {
    pool_size: usize,
    inner: Mutex<PoolInner>,
    replacer: LruReplacer,
    disk_manager: Arc<dyn DiskManager>,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, disk_manager: Arc<dyn DiskManager>) -> Self {
        let mut free_list = VecDeque::with_capacity(pool_size);
        let mut frames = Vec::with_capacity(pool_size);
        for i in 0..pool_size {
            free_list.push_back(i as FrameId);
            frames.push(Frame::new());
        }
        Self {
            pool_size,
            inner: Mutex::new(PoolInner {
                frames,
                page_table: HashMap::new(),
                free_list,
            }),
            replacer: LruReplacer::new(pool_size),
            disk_manager,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Pops a free frame if one exists, otherwise asks the replacer for a
    /// victim. `None` iff the pool is fully pinned. The caller needs to know
    /// which source a frame came from: a victim pulled from the replacer
    /// still holds a live, unpinned page's identity in `page_table` (nothing
    /// has evicted it yet), while one popped from `free_list` holds no
    /// identity at all.
    fn find_victim_frame(&self, inner: &mut PoolInner) -> Option<(FrameId, VictimSource)> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Some((frame_id, VictimSource::FreeList));
        }
        self.replacer.victim().map(|frame_id| (frame_id, VictimSource::Replacer))
    }

    /// The only path by which a frame's identity changes: evict the old
    /// mapping, flush if dirty, then install the new `PageId`. A conditional
    /// "only update identity if dirty" shortcut is the classic bug this
    /// procedure exists to rule out.
    fn replace_frame_contents(&self, inner: &mut PoolInner, frame_id: FrameId, new_page_id: PageId) {
        let frame = inner.frames[frame_id].clone();
        if let Some(old_page_id) = frame.page_id() {
            inner.page_table.remove(&old_page_id);
            if frame.is_dirty() {
                let data = frame.data();
                // Disk errors at this layer are not recoverable by the pool;
                // the reference implementation treats writes as infallible
                // too. We at least make the failure visible.
                if let Err(err) =
                    self.disk_manager
                        .write_page(old_page_id.fd, old_page_id.page_no, &*data)
                {
                    debug!(?old_page_id, ?err, "eviction write-back failed");
                }
                drop(data);
                frame.clear_dirty();
            }
        }
        frame.set_page_id(new_page_id);
        frame.data_mut().fill(0);
        inner.page_table.insert(new_page_id, frame_id);
    }

    #[instrument(skip(self))]
    pub fn fetch_page(&self, page_id: PageId) -> Option<Frame> {
        let mut inner = self.inner.lock();
        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let frame = inner.frames[frame_id].clone();
            frame.pin();
            self.replacer.pin(frame_id);
            trace!(?page_id, frame_id, "fetch_page hit");
            return Some(frame);
        }

        let (frame_id, _source) = self.find_victim_frame(&mut inner)?;
        self.replace_frame_contents(&mut inner, frame_id, page_id);
        let frame = inner.frames[frame_id].clone();
        {
            let mut data = frame.data_mut();
            if let Err(err) = self.disk_manager.read_page(page_id.fd, page_id.page_no, &mut *data) {
                debug!(?page_id, ?err, "fetch_page read failed");
            }
        }
        frame.pin();
        self.replacer.pin(frame_id);
        trace!(?page_id, frame_id, "fetch_page miss, loaded from disk");
        Some(frame)
    }

    #[instrument(skip(self, page_id))]
    pub fn new_page(&self, page_id: &mut PageId) -> Option<Frame> {
        let mut inner = self.inner.lock();
        let (frame_id, source) = self.find_victim_frame(&mut inner)?;

        let page_no = self.disk_manager.allocate_page(page_id.fd);
        if page_no == crate::common::config::INVALID_PAGE_ID {
            // Give the frame back to wherever it came from. A free-list frame
            // never held a page table entry, but a replacer-sourced frame's
            // old page identity is still live in `page_table` (we haven't
            // called `replace_frame_contents` yet), so it belongs back with
            // the replacer as an unpinned, evictable frame, not the free list.
            match source {
                VictimSource::FreeList => inner.free_list.push_back(frame_id),
                VictimSource::Replacer => self.replacer.unpin(frame_id),
            }
            return None;
        }
        page_id.page_no = page_no;

        self.replace_frame_contents(&mut inner, frame_id, *page_id);
        let frame = inner.frames[frame_id].clone();
        frame.pin();
        self.replacer.pin(frame_id);
        trace!(?page_id, frame_id, "new_page allocated");
        Some(frame)
    }

    #[instrument(skip(self))]
    pub fn unpin_page(&self, page_id: PageId, mark_dirty: bool) -> bool {
        let inner = self.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return false;
        };
        let frame = inner.frames[frame_id].clone();
        if frame.pin_count() <= 0 {
            return false;
        }
        frame.unpin();
        if mark_dirty {
            frame.mark_dirty();
        }
        if frame.pin_count() == 0 {
            self.replacer.unpin(frame_id);
        }
        true
    }

    #[instrument(skip(self))]
    pub fn flush_page(&self, page_id: PageId) -> bool {
        let inner = self.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return false;
        };
        let frame = inner.frames[frame_id].clone();
        let data = frame.data();
        if let Err(err) = self.disk_manager.write_page(page_id.fd, page_id.page_no, &*data) {
            debug!(?page_id, ?err, "flush_page failed");
            return false;
        }
        drop(data);
        frame.clear_dirty();
        true
    }

    /// Flushes every page belonging to `fd`. Takes a stable snapshot of the
    /// matching page ids under the pool latch before flushing each one, so a
    /// concurrent eviction can't mutate the page table mid-iteration.
    pub fn flush_all_pages(&self, fd: crate::common::config::Fd) {
        let page_ids: Vec<PageId> = {
            let inner = self.inner.lock();
            inner
                .page_table
                .keys()
                .filter(|pid| pid.fd == fd)
                .copied()
                .collect()
        };
        for page_id in page_ids {
            self.flush_page(page_id);
        }
    }

    #[instrument(skip(self))]
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut inner = self.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return true;
        };
        let frame = inner.frames[frame_id].clone();
        if frame.pin_count() != 0 {
            return false;
        }
        if frame.is_dirty() {
            let data = frame.data();
            if let Err(err) = self.disk_manager.write_page(page_id.fd, page_id.page_no, &*data) {
                debug!(?page_id, ?err, "delete_page flush failed");
            }
        }
        frame.reset();
        inner.page_table.remove(&page_id);
        self.replacer.pin(frame_id); // no-op if untracked; guarantees removal
        inner.free_list.push_back(frame_id);
        true
    }

    /// Only used by tests that want to peek at a frame without going through
    /// `fetch_page` (e.g. to assert eviction picked the expected victim).
    #[cfg(test)]
    fn frame_for(&self, page_id: PageId) -> Option<Frame> {
        let inner = self.inner.lock();
        inner
            .page_table
            .get(&page_id)
            .map(|&fid| inner.frames[fid].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::PAGE_SIZE;
    use crate::storage::disk::FileDiskManager;
    use rand::distributions::{Distribution, Uniform};
    use tempdir::TempDir;

    fn new_pool(pool_size: usize) -> (BufferPoolManager, TempDir) {
        let dir = TempDir::new("bpm_test").unwrap();
        let db_file = dir.path().join("test.db");
        let mut dm = FileDiskManager::new();
        dm.register_file(0, &db_file, 0).unwrap();
        (BufferPoolManager::new(pool_size, Arc::new(dm)), dir)
    }

    #[test]
    fn binary_data_round_trips_through_eviction() {
        let (bpm, _dir) = new_pool(10);

        let mut rng = rand::thread_rng();
        let dist = Uniform::from(u8::MIN..=u8::MAX);
        let mut random_data: Vec<u8> = (0..PAGE_SIZE).map(|_| dist.sample(&mut rng)).collect();
        random_data[PAGE_SIZE / 2] = 0;
        random_data[PAGE_SIZE - 1] = 0;

        let mut page_id = PageId::new(0, -1);
        let frame0 = bpm.new_page(&mut page_id).unwrap();
        frame0.data_mut().copy_from_slice(&random_data);

        for _ in 1..10 {
            let mut pid = PageId::new(0, -1);
            assert!(bpm.new_page(&mut pid).is_some());
        }

        // Pool is full and nothing is unpinned: no more pages can be created.
        let mut pid = PageId::new(0, -1);
        assert!(bpm.new_page(&mut pid).is_none());

        for i in 0..5 {
            assert!(bpm.unpin_page(PageId::new(0, i), true));
        }
        for _ in 0..5 {
            let mut pid = PageId::new(0, -1);
            let frame = bpm.new_page(&mut pid).unwrap();
            bpm.unpin_page(pid, false);
            drop(frame);
        }

        let fetched = bpm.fetch_page(page_id).unwrap();
        assert_eq!(fetched.data().as_slice(), random_data.as_slice());
        assert!(bpm.unpin_page(page_id, true));
    }

    #[test]
    fn pool_exhaustion_and_refill() {
        let (bpm, _dir) = new_pool(10);
        let mut page_id = PageId::new(0, -1);
        assert!(bpm.new_page(&mut page_id).is_some());
        assert_eq!(page_id.page_no, 0);

        for _ in 1..10 {
            let mut pid = PageId::new(0, -1);
            assert!(bpm.new_page(&mut pid).is_some());
        }
        let mut pid = PageId::new(0, -1);
        assert!(bpm.new_page(&mut pid).is_none());

        for i in 0..5 {
            assert!(bpm.unpin_page(PageId::new(0, i), true));
        }
        for _ in 0..4 {
            let mut pid = PageId::new(0, -1);
            assert!(bpm.new_page(&mut pid).is_some());
        }

        // One frame (page 0) is still free for a read.
        let frame0 = bpm.fetch_page(page_id);
        assert!(frame0.is_some());

        assert!(bpm.unpin_page(page_id, true));
        let mut pid = PageId::new(0, -1);
        assert!(bpm.new_page(&mut pid).is_some());
        assert!(bpm.fetch_page(page_id).is_none());
    }

    #[test]
    fn eviction_picks_least_recently_unpinned() {
        let (bpm, _dir) = new_pool(3);
        let mut ids = vec![];
        for _ in 0..3 {
            let mut pid = PageId::new(0, -1);
            bpm.new_page(&mut pid).unwrap();
            ids.push(pid);
        }
        for &pid in &ids {
            assert!(bpm.unpin_page(pid, false));
        }

        let mut new_id = PageId::new(0, -1);
        bpm.new_page(&mut new_id).unwrap();

        // The first page created was unpinned first, so it's the victim.
        assert!(bpm.frame_for(ids[0]).is_none());
        assert!(bpm.frame_for(ids[1]).is_some());
        assert!(bpm.frame_for(ids[2]).is_some());
        assert!(bpm.frame_for(new_id).is_some());
    }

    #[test]
    fn dirty_page_is_written_back_on_eviction() {
        let (bpm, _dir) = new_pool(1);
        let mut page_id = PageId::new(0, -1);
        let frame = bpm.new_page(&mut page_id).unwrap();
        frame.data_mut()[0] = 42;
        drop(frame);
        assert!(bpm.unpin_page(page_id, true));

        // Force eviction of the only frame by fetching a second page.
        let mut other_id = PageId::new(0, -1);
        bpm.new_page(&mut other_id).unwrap();

        let refetched = bpm.fetch_page(page_id).unwrap();
        assert_eq!(refetched.data()[0], 42);
    }

    #[test]
    fn delete_page_requires_unpinned_and_frees_the_frame() {
        let (bpm, _dir) = new_pool(3);
        let mut page_id = PageId::new(0, -1);
        bpm.new_page(&mut page_id).unwrap();

        assert!(!bpm.delete_page(page_id));
        assert!(bpm.unpin_page(page_id, false));
        assert!(bpm.delete_page(page_id));
        assert!(bpm.frame_for(page_id).is_none());

        // Deleting an already-absent page is a no-op success.
        assert!(bpm.delete_page(page_id));
    }

    #[test]
    fn unpin_more_times_than_pinned_is_rejected() {
        let (bpm, _dir) = new_pool(3);
        let mut page_id = PageId::new(0, -1);
        bpm.new_page(&mut page_id).unwrap();
        assert!(bpm.unpin_page(page_id, false));
        assert!(!bpm.unpin_page(page_id, false));
    }

    #[test]
    fn failed_allocation_does_not_double_book_a_replacer_sourced_frame() {
        let (bpm, _dir) = new_pool(1);
        let mut page_id = PageId::new(0, -1);
        let frame = bpm.new_page(&mut page_id).unwrap();
        frame.data_mut()[0] = 7;
        drop(frame);
        assert!(bpm.unpin_page(page_id, true));

        // The free list is now empty and the only frame is unpinned, so the
        // next new_page call must source its victim from the replacer.
        let mut bad_id = PageId::new(99, -1); // fd 99 was never registered
        assert!(bpm.new_page(&mut bad_id).is_none());

        // The replacer-sourced frame must still be fetchable under its old
        // identity, with its contents intact, and not also sitting in the
        // free list ready to be handed out to someone else.
        let refetched = bpm.fetch_page(page_id).unwrap();
        assert_eq!(refetched.data()[0], 7);
        assert!(bpm.unpin_page(page_id, false));
    }

    #[test]
    fn dirty_flag_is_monotonic() {
        let (bpm, _dir) = new_pool(3);
        let mut page_id = PageId::new(0, -1);
        let frame = bpm.new_page(&mut page_id).unwrap();
        frame.pin(); // hold a second pin so unpinning once leaves it pinned
        drop(frame);

        assert!(bpm.unpin_page(page_id, true));
        assert!(bpm.unpin_page(page_id, false));
        assert!(bpm.flush_page(page_id));
        // If dirty had been cleared by the second, false, unpin, this flush
        // would be observably a no-op rather than a real write; we can at
        // least confirm the page is clean now and the call succeeded.
        let frame = bpm.frame_for(page_id).unwrap();
        assert!(!frame.is_dirty());
    }
}
