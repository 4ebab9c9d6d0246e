use crate::common::config::PageId;
use crate::record::bitmap::{self, bitmap_size};
use crate::record::header::PageHeader;
use crate::storage::page::Frame;

/// A `Frame` interpreted as a slotted record page: `PageHeader`, then a
/// bitmap of `slots_per_page` bits, then `slots_per_page` slots of
/// `record_size` bytes each.
pub struct RmPageHandle {
    pub page_id: PageId,
    pub frame: Frame,
    pub slots_per_page: usize,
    pub record_size: usize,
}

impl RmPageHandle {
    pub fn new(page_id: PageId, frame: Frame, slots_per_page: usize, record_size: usize) -> Self {
        Self {
            page_id,
            frame,
            slots_per_page,
            record_size,
        }
    }

    fn bitmap_offset(&self) -> usize {
        PageHeader::FIXED_SIZE
    }

    fn bitmap_len(&self) -> usize {
        bitmap_size(self.slots_per_page)
    }

    fn slots_offset(&self) -> usize {
        self.bitmap_offset() + self.bitmap_len()
    }

    fn slot_offset(&self, slot_no: usize) -> usize {
        self.slots_offset() + slot_no * self.record_size
    }

    pub fn header(&self) -> PageHeader {
        PageHeader::decode(&*self.frame.data())
    }

    pub fn set_header(&self, header: PageHeader) {
        header.encode(&mut self.frame.data_mut()[..PageHeader::FIXED_SIZE]);
    }

    pub fn is_record(&self, slot_no: usize) -> bool {
        let off = self.bitmap_offset();
        let len = self.bitmap_len();
        bitmap::is_set(&self.frame.data()[off..off + len], slot_no)
    }

    pub fn set_slot_bit(&self, slot_no: usize) {
        let off = self.bitmap_offset();
        let len = self.bitmap_len();
        bitmap::set_bit(&mut self.frame.data_mut()[off..off + len], slot_no);
    }

    pub fn reset_slot_bit(&self, slot_no: usize) {
        let off = self.bitmap_offset();
        let len = self.bitmap_len();
        bitmap::reset_bit(&mut self.frame.data_mut()[off..off + len], slot_no);
    }

    /// First slot whose bit equals `set`, or `slots_per_page` if none.
    pub fn first_bit(&self, set: bool) -> usize {
        let off = self.bitmap_offset();
        let len = self.bitmap_len();
        bitmap::first_bit(set, &self.frame.data()[off..off + len], self.slots_per_page)
    }

    /// First slot after `after` whose bit equals `set`, or `slots_per_page`
    /// if none. Pass `usize::MAX` for `after` to search from the start.
    pub fn next_bit(&self, set: bool, after: usize) -> usize {
        let off = self.bitmap_offset();
        let len = self.bitmap_len();
        bitmap::next_bit(set, &self.frame.data()[off..off + len], self.slots_per_page, after)
    }

    pub fn read_slot(&self, slot_no: usize) -> Vec<u8> {
        let off = self.slot_offset(slot_no);
        self.frame.data()[off..off + self.record_size].to_vec()
    }

    pub fn write_slot(&self, slot_no: usize, buf: &[u8]) {
        let off = self.slot_offset(slot_no);
        self.frame.data_mut()[off..off + self.record_size].copy_from_slice(buf);
    }

    pub fn mark_dirty(&self) {
        self.frame.mark_dirty();
    }
}
