use crate::common::config::PageId;

/// Errors surfaced by the record storage core.
///
/// The buffer pool itself keeps the `Option`/`bool` return shapes its spec
/// mandates (a `None` or `false` already says "not fatal, caller decides");
/// this enum exists for the layers above it that need a real error to
/// propagate, namely the record file handle and its disk-manager backend.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("buffer pool exhausted: every frame is pinned")]
    PoolExhausted,

    #[error("page {0} does not exist")]
    PageNotExist(PageId),

    #[error("disk manager failed to allocate a new page")]
    AllocationFailed,

    #[error("operation violates the buffer pool's pin/unpin contract")]
    CallerContractViolation,

    #[error("disk I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
