use std::collections::HashMap;

use parking_lot::Mutex;

use crate::common::config::FrameId;

/// One entry in the doubly-linked unpin order. `prev`/`next` point at
/// neighboring frame ids rather than using a `std::collections::LinkedList`
/// cursor, since that API is not stable; a hash map of nodes gives the same
/// O(1) insert/remove/lookup the replacer's contract calls for.
#[derive(Debug)]
struct Node {
    prev: Option<FrameId>,
    next: Option<FrameId>,
}

#[derive(Debug)]
struct LruState {
    nodes: HashMap<FrameId, Node>,
    /// Most-recently-unpinned frame.
    head: Option<FrameId>,
    /// Least-recently-unpinned frame; the next victim.
    tail: Option<FrameId>,
}

impl LruState {
    fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    fn push_front(&mut self, frame_id: FrameId) {
        let old_head = self.head;
        self.nodes.insert(
            frame_id,
            Node {
                prev: None,
                next: old_head,
            },
        );
        if let Some(old_head) = old_head {
            self.nodes.get_mut(&old_head).unwrap().prev = Some(frame_id);
        }
        self.head = Some(frame_id);
        if self.tail.is_none() {
            self.tail = Some(frame_id);
        }
    }

    fn remove(&mut self, frame_id: FrameId) -> bool {
        let Some(node) = self.nodes.remove(&frame_id) else {
            return false;
        };
        match node.prev {
            Some(prev) => self.nodes.get_mut(&prev).unwrap().next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => self.nodes.get_mut(&next).unwrap().prev = node.prev,
            None => self.tail = node.prev,
        }
        true
    }

    fn pop_back(&mut self) -> Option<FrameId> {
        let frame_id = self.tail?;
        self.remove(frame_id);
        Some(frame_id)
    }
}

/// Tracks which frames are currently evictable and picks a victim by
/// least-recently-unpinned order.
///
/// A frame is tracked here iff it holds a live page and its pin count is 0.
/// `unpin` is idempotent: re-unpinning an already-tracked frame does not move
/// it, because the ordering we maintain is "time since the pin count last
/// hit zero", not "time since last touched".
#[derive(Debug)]
pub struct LruReplacer {
    state: Mutex<LruState>,
}

impl LruReplacer {
    pub fn new(_num_frames: usize) -> Self {
        Self {
            state: Mutex::new(LruState::new()),
        }
    }

    /// Removes and returns the least-recently-unpinned frame, or `None` if no
    /// frame is currently evictable.
    pub fn victim(&self) -> Option<FrameId> {
        self.state.lock().pop_back()
    }

    /// Marks `frame_id` as no longer evictable. No-op if it wasn't tracked.
    pub fn pin(&self, frame_id: FrameId) {
        self.state.lock().remove(frame_id);
    }

    /// Marks `frame_id` as evictable. No-op if it was already tracked.
    pub fn unpin(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        if !state.nodes.contains_key(&frame_id) {
            state.push_front(frame_id);
        }
    }

    /// Number of frames currently evictable.
    pub fn size(&self) -> usize {
        self.state.lock().nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::LruReplacer;

    #[test]
    fn victim_order_follows_unpin_order() {
        let replacer = LruReplacer::new(7);
        replacer.unpin(1);
        replacer.unpin(2);
        replacer.unpin(3);
        assert_eq!(replacer.size(), 3);

        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), Some(3));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn pin_removes_from_tracking() {
        let replacer = LruReplacer::new(7);
        replacer.unpin(1);
        replacer.unpin(2);
        replacer.pin(1);
        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.victim(), Some(2));
    }

    #[test]
    fn re_unpin_is_idempotent_and_does_not_reorder() {
        let replacer = LruReplacer::new(7);
        replacer.unpin(1);
        replacer.unpin(2);
        // 1 was unpinned first; re-unpinning it must not move it to the front.
        replacer.unpin(1);
        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(2));
    }

    #[test]
    fn pin_on_untracked_frame_is_a_no_op() {
        let replacer = LruReplacer::new(7);
        replacer.pin(42);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn cmu_sample_sequence() {
        // Specialized to plain LRU (k=1): unpin order determines victim order
        // directly.
        let replacer = LruReplacer::new(7);
        replacer.unpin(1);
        replacer.unpin(2);
        replacer.unpin(3);
        replacer.unpin(4);
        replacer.unpin(5);
        assert_eq!(replacer.size(), 5);

        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.size(), 3);

        replacer.unpin(6);
        replacer.unpin(7);
        assert_eq!(replacer.size(), 5);

        assert_eq!(replacer.victim(), Some(3));
        assert_eq!(replacer.victim(), Some(4));
        assert_eq!(replacer.victim(), Some(5));
        assert_eq!(replacer.victim(), Some(6));
        assert_eq!(replacer.victim(), Some(7));
        assert_eq!(replacer.victim(), None);
        assert_eq!(replacer.size(), 0);
    }
}
