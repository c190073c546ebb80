//! Bucket files holding swapped-out pages.

use crate::constants::LOCK_TIMEOUT;
use blobcache_common::page::{PageId, PAGE_SIZE};
use blobcache_common::{CacheError, Result};
use log::debug;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Where a page lives on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PagePlacement {
    /// Bucket file number.
    pub bucket: u64,
    /// Byte offset of the page inside its bucket file.
    pub offset: u64,
}

impl PagePlacement {
    /// Computes the placement of `page_id` for buckets of `bucket_size` bytes.
    ///
    /// `bucket_size` must be a non-zero multiple of PAGE_SIZE.
    #[inline]
    pub fn of(page_id: PageId, bucket_size: u64) -> Self {
        let position = page_id.byte_offset();
        let bucket = position / bucket_size;
        Self {
            bucket,
            offset: position - bucket * bucket_size,
        }
    }

    /// Returns the file length needed to hold this page.
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + PAGE_SIZE as u64
    }
}

/// One bucket file. All I/O on it happens under its lock.
pub struct BucketFile {
    bucket: u64,
    path: PathBuf,
    file: Mutex<File>,
}

impl BucketFile {
    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Locks the file, waiting at most LOCK_TIMEOUT.
    pub fn lock(&self) -> Result<BucketGuard<'_>> {
        let file = self
            .file
            .try_lock_for(LOCK_TIMEOUT)
            .ok_or_else(|| CacheError::LockTimeout {
                resource: format!("bucket file {}", self.path.display()),
            })?;
        debug!("Bucket file is locked, bucket={}", self.bucket);
        Ok(BucketGuard {
            bucket: self.bucket,
            file,
        })
    }
}

/// Exclusive access to an open bucket file.
pub struct BucketGuard<'a> {
    bucket: u64,
    file: MutexGuard<'a, File>,
}

impl BucketGuard<'_> {
    /// Returns the current file length.
    pub fn file_len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Extends the file with zero bytes so it is at least `min_len` long.
    pub fn ensure_len(&mut self, min_len: u64) -> Result<()> {
        if self.file_len()? < min_len {
            self.file.set_len(min_len)?;
        }
        Ok(())
    }

    /// Writes one page at `offset`.
    pub fn write_page(&mut self, offset: u64, data: &[u8; PAGE_SIZE]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(())
    }

    /// Reads one page at `offset`.
    pub fn read_page(&mut self, offset: u64) -> Result<Box<[u8; PAGE_SIZE]>> {
        let mut buffer = Box::new([0u8; PAGE_SIZE]);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buffer[..])?;
        Ok(buffer)
    }
}

impl Drop for BucketGuard<'_> {
    fn drop(&mut self) {
        debug!("Bucket file is unlocked, bucket={}", self.bucket);
    }
}

/// Lazily created bucket files of one page manager.
pub struct BucketFiles {
    dir: PathBuf,
    bucket_size: u64,
    files: Mutex<HashMap<u64, Arc<BucketFile>>>,
}

impl BucketFiles {
    /// Creates an empty set of bucket files rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>, bucket_size: u64) -> Self {
        Self {
            dir: dir.into(),
            bucket_size,
            files: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the placement of a page.
    pub fn placement(&self, page_id: PageId) -> PagePlacement {
        PagePlacement::of(page_id, self.bucket_size)
    }

    /// Returns the bucket file if it has been created.
    pub fn get(&self, bucket: u64) -> Option<Arc<BucketFile>> {
        self.files.lock().get(&bucket).cloned()
    }

    /// Returns the bucket file, creating it on first use.
    pub fn get_or_create(&self, bucket: u64) -> Result<Arc<BucketFile>> {
        let mut files = self.files.lock();
        if let Some(file) = files.get(&bucket) {
            return Ok(Arc::clone(file));
        }

        debug!("The storage file does not exist, bucket={}", bucket);
        let path = self.dir.join(Self::generate_file_name());
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        debug!(
            "The storage file is created successfully, path={}, bucket={}",
            path.display(),
            bucket
        );

        let bucket_file = Arc::new(BucketFile {
            bucket,
            path,
            file: Mutex::new(file),
        });
        files.insert(bucket, Arc::clone(&bucket_file));
        Ok(bucket_file)
    }

    /// Returns the number of bucket files created so far.
    pub fn count(&self) -> usize {
        self.files.lock().len()
    }

    /// Closes every bucket file handle.
    pub fn close_all(&self) {
        self.files.lock().clear();
    }

    fn generate_file_name() -> String {
        format!("pagemanager_{}.data", Uuid::new_v4().simple())
    }
}
