mod buffer_pool;
mod disk_manager;
mod error;
mod frame;
mod guard;
mod replacer;

pub use buffer_pool::BufferPoolManager;
pub use disk_manager::DiskManager;
pub use error::{StorageError, StorageResult};
pub use frame::{FrameInfo, FrameState};
pub use guard::PageGuard;
pub use replacer::EvictionQueue;

/// Default page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Default number of frames in the buffer pool
pub const BUFFER_POOL_SIZE: usize = 10;

/// Default upper bound on page ids the pool will address.
/// Together with the page size this caps the database file at
/// `MAX_PAGES * PAGE_SIZE` bytes.
pub const MAX_PAGES: usize = 100;

/// Page ID type, doubles as the page offset in the backing file
pub type PageId = usize;

/// Frame ID type, index into the in-memory frame array
pub type FrameId = usize;
