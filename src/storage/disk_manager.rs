use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};

use super::error::{StorageError, StorageResult};
use super::{PAGE_SIZE, PageId};
use crate::config::ConfigError;

/// Owns the backing file and moves whole pages between it and memory.
///
/// Page `i` lives at byte range `[i * page_size, (i + 1) * page_size)`.
/// There is no header and no free-space map: page ids are handed out by
/// appending and are never reused.
pub struct DiskManager {
    file: File,
    path: PathBuf,
    page_size: usize,
    /// Next id `allocate_page` will return, unless the file has grown past it
    next_page_id: PageId,
}

impl DiskManager {
    /// Open (or create) a database file with the default page size
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        Self::open_with_page_size(path, PAGE_SIZE)
    }

    /// Open (or create) a database file with the given page size
    pub fn open_with_page_size<P: AsRef<Path>>(path: P, page_size: usize) -> StorageResult<Self> {
        let path = path.as_ref();

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let manager = Self::from_file(file, path, page_size)?;
        info!(
            "disk: opened {} ({} pages of {} bytes)",
            manager.path.display(),
            manager.next_page_id,
            page_size
        );
        Ok(manager)
    }

    /// Wrap an already opened file
    pub fn from_file<P: AsRef<Path>>(file: File, path: P, page_size: usize) -> StorageResult<Self> {
        if page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be positive".to_string()).into());
        }

        let file_size = file.metadata()?.len();
        Ok(Self {
            file,
            path: path.as_ref().to_path_buf(),
            page_size,
            next_page_id: file_size.div_ceil(page_size as u64) as PageId,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn offset(&self, page_id: PageId) -> u64 {
        page_id as u64 * self.page_size as u64
    }

    fn check_buffer(&self, len: usize) -> StorageResult<()> {
        if len != self.page_size {
            return Err(StorageError::InvalidPageSize {
                expected: self.page_size,
                actual: len,
            });
        }
        Ok(())
    }

    /// Read a page into `buffer`.
    ///
    /// Reading at or past the end of the file is not an error: whatever
    /// part of the page is missing comes back as zeros.
    pub fn read_page(&mut self, page_id: PageId, buffer: &mut [u8]) -> StorageResult<()> {
        self.check_buffer(buffer.len())?;

        let offset = self.offset(page_id);
        self.file.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < buffer.len() {
            match self.file.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        // If we read less than a page, fill the rest with zeros
        if filled < buffer.len() {
            buffer[filled..].fill(0);
        }

        Ok(())
    }

    /// Write one full page at the page's offset, extending the file if needed
    pub fn write_page(&mut self, page_id: PageId, buffer: &[u8]) -> StorageResult<()> {
        self.check_buffer(buffer.len())?;

        let offset = self.offset(page_id);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buffer)?;
        // No sync here, flush_all_pages syncs once for the whole batch

        self.next_page_id = self.next_page_id.max(page_id + 1);
        Ok(())
    }

    /// Reserve the next page id.
    ///
    /// Nothing is written; the first write at that id extends the file.
    /// Reservations are remembered, so back-to-back allocations yield
    /// consecutive ids even before any of them has been written.
    pub fn allocate_page(&mut self) -> StorageResult<PageId> {
        let page_id = self.next_page_id()?;
        self.next_page_id = page_id + 1;
        debug!("disk: allocated page {}", page_id);
        Ok(page_id)
    }

    /// The id the next `allocate_page` call will return, without reserving it
    pub fn next_page_id(&self) -> StorageResult<PageId> {
        Ok(self.next_page_id.max(self.page_count()?))
    }

    /// Number of pages physically present in the file
    pub fn page_count(&self) -> StorageResult<usize> {
        let file_size = self.file.metadata()?.len();
        Ok(file_size.div_ceil(self.page_size as u64) as usize)
    }

    /// Sync the file to disk (flush all OS buffers)
    pub fn sync(&mut self) -> StorageResult<()> {
        self.file.sync_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_dir() -> TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn test_open_creates_file() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("nested").join("test.db");

        let manager = DiskManager::open(&test_file).unwrap();
        assert!(test_file.exists());
        assert_eq!(manager.path(), test_file.as_path());
        assert_eq!(manager.page_size(), PAGE_SIZE);
        assert_eq!(manager.page_count().unwrap(), 0);
    }

    #[test]
    fn test_open_directory_fails() {
        let temp_dir = setup_test_dir();

        let result = DiskManager::open(temp_dir.path());
        assert!(matches!(result, Err(StorageError::Io(_))));
    }

    #[test]
    fn test_read_write_page() {
        let temp_dir = setup_test_dir();
        let mut manager = DiskManager::open(temp_dir.path().join("test.db")).unwrap();

        let mut write_buffer = vec![0u8; PAGE_SIZE];
        write_buffer[0] = 42;
        write_buffer[100] = 99;
        write_buffer[PAGE_SIZE - 1] = 255;
        manager.write_page(0, &write_buffer).unwrap();

        let mut read_buffer = vec![0u8; PAGE_SIZE];
        manager.read_page(0, &mut read_buffer).unwrap();
        assert_eq!(read_buffer, write_buffer);
    }

    #[test]
    fn test_write_multiple_pages() {
        let temp_dir = setup_test_dir();
        let mut manager = DiskManager::open(temp_dir.path().join("test.db")).unwrap();

        for page_id in 0..10 {
            let mut buffer = vec![0u8; PAGE_SIZE];
            buffer[0] = page_id as u8;
            manager.write_page(page_id, &buffer).unwrap();
        }

        for page_id in 0..10 {
            let mut buffer = vec![0u8; PAGE_SIZE];
            manager.read_page(page_id, &mut buffer).unwrap();
            assert_eq!(buffer[0], page_id as u8);
        }
        assert_eq!(manager.page_count().unwrap(), 10);
    }

    #[test]
    fn test_read_past_end_is_zero_filled() {
        let temp_dir = setup_test_dir();
        let mut manager = DiskManager::open(temp_dir.path().join("test.db")).unwrap();

        // Stale bytes in the caller's buffer must not survive the read
        let mut buffer = vec![0xAAu8; PAGE_SIZE];
        manager.read_page(100, &mut buffer).unwrap();
        assert!(buffer.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_partial_page_is_zero_filled() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        fs::write(&test_file, [7u8; 10]).unwrap();

        let mut manager = DiskManager::open(&test_file).unwrap();
        let mut buffer = vec![0xAAu8; PAGE_SIZE];
        manager.read_page(0, &mut buffer).unwrap();
        assert!(buffer[..10].iter().all(|&b| b == 7));
        assert!(buffer[10..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_allocate_is_monotonic() {
        let temp_dir = setup_test_dir();
        let mut manager = DiskManager::open(temp_dir.path().join("test.db")).unwrap();

        assert_eq!(manager.next_page_id().unwrap(), 0);
        assert_eq!(manager.next_page_id().unwrap(), 0);
        assert_eq!(manager.allocate_page().unwrap(), 0);
        assert_eq!(manager.next_page_id().unwrap(), 1);
        assert_eq!(manager.allocate_page().unwrap(), 1);
        assert_eq!(manager.allocate_page().unwrap(), 2);
        // Allocation itself does not touch the file
        assert_eq!(manager.page_count().unwrap(), 0);

        let buffer = vec![1u8; PAGE_SIZE];
        manager.write_page(0, &buffer).unwrap();
        manager.write_page(1, &buffer).unwrap();
        manager.write_page(2, &buffer).unwrap();
        assert_eq!(manager.page_count().unwrap(), 3);
        assert_eq!(manager.allocate_page().unwrap(), 3);
    }

    #[test]
    fn test_allocate_resumes_from_file_size() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");

        {
            let mut manager = DiskManager::open(&test_file).unwrap();
            let buffer = vec![0u8; PAGE_SIZE];
            for _ in 0..4 {
                let page_id = manager.allocate_page().unwrap();
                manager.write_page(page_id, &buffer).unwrap();
            }
        }

        let mut manager = DiskManager::open(&test_file).unwrap();
        assert_eq!(manager.page_count().unwrap(), 4);
        assert_eq!(manager.allocate_page().unwrap(), 4);
    }

    #[test]
    fn test_write_beyond_allocated_advances_allocation() {
        let temp_dir = setup_test_dir();
        let mut manager = DiskManager::open(temp_dir.path().join("test.db")).unwrap();

        let buffer = vec![0u8; PAGE_SIZE];
        manager.write_page(5, &buffer).unwrap();
        assert_eq!(manager.page_count().unwrap(), 6);
        assert_eq!(manager.allocate_page().unwrap(), 6);
    }

    #[test]
    fn test_custom_page_size() {
        let temp_dir = setup_test_dir();
        let mut manager =
            DiskManager::open_with_page_size(temp_dir.path().join("test.db"), 512).unwrap();

        let buffer = vec![3u8; 512];
        manager.write_page(1, &buffer).unwrap();
        assert_eq!(manager.page_count().unwrap(), 2);

        let mut read_buffer = vec![0u8; 512];
        manager.read_page(1, &mut read_buffer).unwrap();
        assert_eq!(read_buffer, buffer);
        manager.read_page(0, &mut read_buffer).unwrap();
        assert!(read_buffer.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_invalid_buffer_size() {
        let temp_dir = setup_test_dir();
        let mut manager = DiskManager::open(temp_dir.path().join("test.db")).unwrap();

        let mut small_buffer = vec![0u8; PAGE_SIZE - 1];
        let result = manager.read_page(0, &mut small_buffer);
        assert!(matches!(result, Err(StorageError::InvalidPageSize { .. })));

        let large_buffer = vec![0u8; PAGE_SIZE + 1];
        let result = manager.write_page(0, &large_buffer);
        assert!(matches!(result, Err(StorageError::InvalidPageSize { .. })));
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let temp_dir = setup_test_dir();
        let result = DiskManager::open_with_page_size(temp_dir.path().join("test.db"), 0);
        assert!(matches!(
            result,
            Err(StorageError::Config(ConfigError::Invalid(_)))
        ));
    }

    #[test]
    fn test_write_to_read_only_file_fails() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        fs::write(&test_file, vec![0u8; PAGE_SIZE]).unwrap();

        let file = File::open(&test_file).unwrap();
        let mut manager = DiskManager::from_file(file, &test_file, PAGE_SIZE).unwrap();

        let buffer = vec![1u8; PAGE_SIZE];
        let result = manager.write_page(0, &buffer);
        assert!(matches!(result, Err(StorageError::Io(_))));
    }
}
