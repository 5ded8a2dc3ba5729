pub mod config;
pub mod storage;

pub use config::{ConfigError, ConfigResult, PoolConfig};
pub use storage::{
    BUFFER_POOL_SIZE, BufferPoolManager, DiskManager, EvictionQueue, FrameId, FrameInfo,
    FrameState, MAX_PAGES, PAGE_SIZE, PageGuard, PageId, StorageError, StorageResult,
};
