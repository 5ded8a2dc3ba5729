use std::io;
use thiserror::Error;

use super::PageId;
use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Buffer pool exhausted: all {0} frames are pinned")]
    PoolExhausted(usize),

    #[error("Page not resident: page_id={0}")]
    PageNotResident(PageId),

    #[error("Page not pinned: page_id={0}")]
    PageNotPinned(PageId),

    #[error("Page is only pinned by live guards: page_id={0}")]
    PinHeldByGuard(PageId),

    #[error("Page id out of range: page_id={page_id}, max_pages={max_pages}")]
    PageIdOutOfRange { page_id: PageId, max_pages: usize },

    #[error("Invalid page size: expected {expected}, got {actual}")]
    InvalidPageSize { expected: usize, actual: usize },

    #[error("Page is being modified through a guard: page_id={0}")]
    PageLatched(PageId),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type StorageResult<T> = Result<T, StorageError>;
