/// Size in bytes of a single page, shared by the buffer pool and every on-disk
/// page layout built on top of it.
pub const PAGE_SIZE: usize = 4096;

/// File descriptor identifying which record file a page belongs to.
pub type Fd = i32;

/// Page number within a file. Page 0 is reserved for the file header.
pub type PageNo = i32;

/// Sentinel `page_no` meaning "no such page".
pub const INVALID_PAGE_ID: PageNo = -1;

/// Sentinel terminating a free-page chain.
pub const RM_NO_PAGE: PageNo = -1;

/// Index into the buffer pool's frame array.
pub type FrameId = usize;

/// Identifies a page uniquely across every open file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageId {
    pub fd: Fd,
    pub page_no: PageNo,
}

impl PageId {
    pub fn new(fd: Fd, page_no: PageNo) -> Self {
        Self { fd, page_no }
    }

    pub fn header(fd: Fd) -> Self {
        Self { fd, page_no: 0 }
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(fd={}, page_no={})", self.fd, self.page_no)
    }
}

/// Record identifier: a page number plus a slot number within that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rid {
    pub page_no: PageNo,
    pub slot_no: i32,
}

impl Rid {
    pub fn new(page_no: PageNo, slot_no: i32) -> Self {
        Self { page_no, slot_no }
    }
}

impl std::fmt::Display for Rid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.page_no, self.slot_no)
    }
}
