use std::sync::Arc;

use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::config::{PageId, PAGE_SIZE};

/// A buffer-pool slot. Holds one page's worth of bytes plus the book-keeping
/// the pool needs: which `PageId` currently lives here, its pin count, and
/// whether it has diverged from disk.
///
/// A caller that holds a pin on a frame may read or write its bytes directly
/// through this handle without going through the buffer pool's own latch:
/// the pin guarantees the frame's identity can't change underneath it, so
/// only the byte contents themselves need their own lock.
#[derive(Debug, Clone)]
pub struct Frame(Arc<RwLock<FrameInner>>);

#[derive(Debug)]
struct FrameInner {
    data: Box<[u8; PAGE_SIZE]>,
    page_id: Option<PageId>,
    pin_count: i32,
    is_dirty: bool,
}

impl Frame {
    /// A freshly constructed frame holds no page and is all zeros.
    pub fn new() -> Frame {
        let inner = FrameInner {
            data: Box::new([0; PAGE_SIZE]),
            page_id: None,
            pin_count: 0,
            is_dirty: false,
        };
        Frame(Arc::new(RwLock::new(inner)))
    }

    /// Zeros the data and clears all metadata, as if the frame were new.
    pub fn reset(&self) {
        let mut inner = self.0.write();
        inner.data.fill(0);
        inner.page_id = None;
        inner.pin_count = 0;
        inner.is_dirty = false;
    }

    pub fn data(&self) -> MappedRwLockReadGuard<'_, [u8; PAGE_SIZE]> {
        RwLockReadGuard::map(self.0.read(), |i| &*i.data)
    }

    pub fn data_mut(&self) -> MappedRwLockWriteGuard<'_, [u8; PAGE_SIZE]> {
        RwLockWriteGuard::map(self.0.write(), |i| &mut *i.data)
    }

    pub fn page_id(&self) -> Option<PageId> {
        self.0.read().page_id
    }

    pub fn set_page_id(&self, page_id: PageId) {
        self.0.write().page_id = Some(page_id);
    }

    pub fn pin_count(&self) -> i32 {
        self.0.read().pin_count
    }

    pub fn pin(&self) {
        self.0.write().pin_count += 1;
    }

    /// Decrements the pin count. The caller must already know it is > 0.
    pub fn unpin(&self) {
        self.0.write().pin_count -= 1;
    }

    pub fn is_dirty(&self) -> bool {
        self.0.read().is_dirty
    }

    /// Monotonic-up: only ever moves `false -> true` here. Clearing dirty is
    /// done explicitly by `flush_page`/`delete_page`, never by this setter.
    pub fn mark_dirty(&self) {
        self.0.write().is_dirty = true;
    }

    pub fn clear_dirty(&self) {
        self.0.write().is_dirty = false;
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}
