use crate::common::config::Rid;
use crate::common::error::Result;
use crate::record::file_handle::FileHandle;

/// Forward iterator over every occupied slot in a file, in ascending
/// `(page_no, slot_no)` order. Does not unpin the pages it fetches (same
/// contract as the rest of this module).
pub struct Scan<'a> {
    file_handle: &'a FileHandle,
    rid: Rid,
}

fn after_arg(slot_no: i32) -> usize {
    if slot_no < 0 {
        usize::MAX
    } else {
        slot_no as usize
    }
}

impl<'a> Scan<'a> {
    pub fn new(file_handle: &'a FileHandle) -> Result<Scan<'a>> {
        let mut scan = Scan {
            file_handle,
            rid: Rid::new(1, -1),
        };
        scan.next()?;
        Ok(scan)
    }

    /// Advances to the next occupied slot after the current `rid`, or to
    /// the terminal position `(num_pages-1, slots_per_page)` if none remain.
    pub fn next(&mut self) -> Result<()> {
        let num_pages = self.file_handle.num_pages();
        let slots_per_page = self.file_handle.slots_per_page();

        // No data pages at all (only the header): nothing to scan.
        if num_pages < 2 {
            self.rid = Rid::new(num_pages - 1, slots_per_page as i32);
            return Ok(());
        }

        let page = self.file_handle.fetch_page_handle(self.rid.page_no)?;
        let next_in_this_page = page.next_bit(true, after_arg(self.rid.slot_no));

        if next_in_this_page != slots_per_page {
            self.rid.slot_no = next_in_this_page as i32;
            return Ok(());
        }

        if self.rid.page_no == num_pages - 1 {
            self.rid.slot_no = slots_per_page as i32;
            return Ok(());
        }

        for page_no in (self.rid.page_no + 1)..num_pages {
            let p = self.file_handle.fetch_page_handle(page_no)?;
            let first = p.first_bit(true);
            if first != slots_per_page {
                self.rid.page_no = page_no;
                self.rid.slot_no = first as i32;
                return Ok(());
            }
            if page_no == num_pages - 1 {
                self.rid.page_no = num_pages - 1;
                self.rid.slot_no = slots_per_page as i32;
                return Ok(());
            }
        }
        Ok(())
    }

    pub fn is_end(&self) -> bool {
        let num_pages = self.file_handle.num_pages();
        let slots_per_page = self.file_handle.slots_per_page();
        self.rid.page_no == num_pages - 1 && self.rid.slot_no == slots_per_page as i32
    }

    pub fn rid(&self) -> Rid {
        self.rid
    }
}
