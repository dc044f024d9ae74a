//! Memory-mapped backing region.
//!
//! A region is a file mapped into memory with a fixed capacity, plus the
//! write cursor marking the end of the stored records. The file length is
//! the data bound: it grows as records are written and never holds bytes
//! past the last record, so the cursor of a reopened file is its length.
//! The mapping always spans the full capacity.
//!
//! Bytes below the cursor are published: they are never written again
//! through this region, so readers may borrow them without locking. The
//! writer only touches bytes at or above the cursor and publishes them by
//! advancing the cursor with release ordering.

use crate::error::{Result, StoreError};
use crate::store::SyncMode;
use memmap2::{MmapOptions, MmapRaw};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// A mapped, fixed-capacity byte region.
#[derive(Debug)]
pub(crate) struct Region {
    mmap: MmapRaw,
    file: File,
    capacity: usize,
    cursor: AtomicUsize,
    /// Current file length; only the writer changes it.
    file_len: AtomicUsize,
}

impl Region {
    /// Opens or creates the backing file at `path` and maps `capacity` bytes.
    ///
    /// An existing file must have a length that is a multiple of
    /// `entry_size` and no larger than `capacity`; its records end at that
    /// length, which becomes the cursor.
    ///
    /// Returns the region and whether the file already existed.
    pub fn open(path: &Path, capacity: usize, entry_size: usize) -> Result<(Self, bool)> {
        if capacity == 0 || capacity % entry_size != 0 {
            return Err(StoreError::open(
                path,
                format!("capacity {capacity} is not a positive multiple of entry size {entry_size}"),
            ));
        }
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
                return Err(StoreError::open(
                    path,
                    format!("parent directory {parent:?} does not exist"),
                ));
            }
            _ => {}
        }

        let existed = path.exists();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|err| StoreError::open(path, err.to_string()))?;

        match Self::map(path, file, capacity, entry_size) {
            Ok(region) => Ok((region, existed)),
            Err(err) => {
                if !existed {
                    let _ = std::fs::remove_file(path);
                }
                Err(err)
            }
        }
    }

    /// Creates a fresh empty region at `path`, truncating any file.
    pub fn create(path: &Path, capacity: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mmap = MmapOptions::new().len(capacity).map_raw(&file)?;
        Ok(Self {
            mmap,
            file,
            capacity,
            cursor: AtomicUsize::new(0),
            file_len: AtomicUsize::new(0),
        })
    }

    fn map(path: &Path, file: File, capacity: usize, entry_size: usize) -> Result<Self> {
        let len = file
            .metadata()
            .map_err(|err| StoreError::open(path, err.to_string()))?
            .len() as usize;
        if len % entry_size != 0 {
            return Err(StoreError::open(
                path,
                format!("file length {len} is not a multiple of entry size {entry_size}"),
            ));
        }
        if len > capacity {
            return Err(StoreError::open(
                path,
                format!("file length {len} exceeds provisioned capacity {capacity}"),
            ));
        }

        let mmap = MmapOptions::new()
            .len(capacity)
            .map_raw(&file)
            .map_err(|err| StoreError::open(path, err.to_string()))?;

        Ok(Self {
            mmap,
            file,
            capacity,
            cursor: AtomicUsize::new(len),
            file_len: AtomicUsize::new(len),
        })
    }

    /// Provisioned size in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current published cursor.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Borrows published bytes.
    ///
    /// Returns `None` if the span reaches past the published cursor.
    pub fn read(&self, offset: usize, len: usize) -> Option<&[u8]> {
        let end = offset.checked_add(len)?;
        if end > self.cursor() {
            return None;
        }
        // SAFETY: bytes below the published cursor lie within the file, are
        // never written again through this mapping, and the mapping lives as
        // long as `self`.
        Some(unsafe { std::slice::from_raw_parts(self.mmap.as_ptr().add(offset), len) })
    }

    /// Grows the file to cover `bytes` at `offset` and copies them in.
    ///
    /// Nothing is visible to readers until [`publish`](Self::publish).
    ///
    /// # Safety
    ///
    /// The caller must be the only writer of this region for the duration
    /// of the call (the store's writer lock).
    pub unsafe fn write_unpublished(&self, offset: usize, bytes: &[u8]) -> Result<()> {
        assert!(offset >= self.cursor(), "write below published cursor");
        let end = offset + bytes.len();
        assert!(end <= self.capacity, "write past capacity");

        // Pages past the end of the file must not be touched.
        if end > self.file_len.load(Ordering::Relaxed) {
            self.file.set_len(end as u64)?;
            self.file_len.store(end, Ordering::Relaxed);
        }
        std::ptr::copy_nonoverlapping(
            bytes.as_ptr(),
            self.mmap.as_mut_ptr().add(offset),
            bytes.len(),
        );
        Ok(())
    }

    /// Makes every byte below `cursor` visible to readers.
    ///
    /// # Safety
    ///
    /// Same contract as [`write_unpublished`](Self::write_unpublished).
    pub unsafe fn publish(&self, cursor: usize) {
        debug_assert!(cursor >= self.cursor() && cursor <= self.file_len.load(Ordering::Relaxed));
        self.cursor.store(cursor, Ordering::Release);
    }

    /// Flushes the stored records to the backing file.
    pub fn flush(&self, sync_mode: SyncMode) -> Result<()> {
        let len = self.cursor();
        match sync_mode {
            SyncMode::Sync => {
                if len > 0 {
                    self.mmap.flush_range(0, len)?;
                }
                self.file.sync_all()?;
            }
            SyncMode::Async => {
                if len > 0 {
                    self.mmap.flush_async_range(0, len)?;
                }
            }
            SyncMode::None => {}
        }
        debug!("Flushed region ({} of {} bytes used)", len, self.capacity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_region_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("region");
        let (region, existed) = Region::open(&path, 64, 16).unwrap();

        assert!(!existed);
        assert_eq!(region.cursor(), 0);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_publish_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("region");
        let (region, _) = Region::open(&path, 32, 8).unwrap();

        unsafe {
            region.write_unpublished(0, &[7u8; 8]).unwrap();
        }
        assert!(region.read(0, 8).is_none());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 8);

        unsafe {
            region.publish(8);
        }
        assert_eq!(region.read(0, 8).unwrap(), &[7u8; 8]);
        assert!(region.read(8, 8).is_none());
    }

    #[test]
    fn test_cursor_from_file_length_after_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("region");
        {
            let (region, _) = Region::open(&path, 32, 8).unwrap();
            unsafe {
                region.write_unpublished(0, &[1u8; 8]).unwrap();
                region.write_unpublished(8, &[0u8; 8]).unwrap();
                region.publish(16);
            }
            region.flush(SyncMode::Sync).unwrap();
        }

        let (region, existed) = Region::open(&path, 32, 8).unwrap();
        assert!(existed);
        assert_eq!(region.cursor(), 16);
        assert_eq!(region.read(8, 8).unwrap(), &[0u8; 8]);
    }

    #[test]
    fn test_rejects_misaligned_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("region");
        std::fs::write(&path, [0u8; 10]).unwrap();

        let err = Region::open(&path, 32, 8).unwrap_err();
        assert!(matches!(err, StoreError::StoreOpen { .. }));
        assert!(path.exists());
    }

    #[test]
    fn test_rejects_missing_parent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join("region");

        let err = Region::open(&path, 32, 8).unwrap_err();
        assert!(matches!(err, StoreError::StoreOpen { .. }));
    }

    #[test]
    fn test_rejects_oversized_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("region");
        std::fs::write(&path, [0u8; 64]).unwrap();

        let err = Region::open(&path, 32, 8).unwrap_err();
        assert!(matches!(err, StoreError::StoreOpen { .. }));
    }
}
