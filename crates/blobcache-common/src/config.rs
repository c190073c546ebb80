//! Configuration structures for blobcache.

use crate::error::{CacheError, Result};
use crate::page::PAGE_SIZE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default number of pages allowed to stay resident (16 MB with 32 KB pages).
pub const DEFAULT_MAX_PAGES_IN_MEMORY: usize = 512;

/// Default size cap of one page bucket file (64 MB).
pub const DEFAULT_MAX_BUCKET_FILE_SIZE: u64 = 64 * 1024 * 1024;

/// Default size at which the binary data manager rotates to a new logical file (512 MB).
pub const DEFAULT_MAX_DATA_FILE_SIZE: u64 = 512 * 1024 * 1024;

/// Default chunk size used when copying an incoming payload.
pub const DEFAULT_WRITE_CHUNK_SIZE: usize = 4 * 1024;

/// Default chunk size used when reading a payload back.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 10 * 1024;

/// Configuration for the page manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageManagerConfig {
    /// Directory holding the bucket files. Must exist; removed on close.
    pub working_dir: PathBuf,
    /// Maximum number of pages resident in memory.
    pub max_pages_in_memory: usize,
    /// Size cap of one bucket file, rounded up to a multiple of the page size.
    pub max_bucket_file_size: u64,
}

impl Default for PageManagerConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("./blobcache"),
            max_pages_in_memory: DEFAULT_MAX_PAGES_IN_MEMORY,
            max_bucket_file_size: DEFAULT_MAX_BUCKET_FILE_SIZE,
        }
    }
}

impl PageManagerConfig {
    /// Creates a config for the given directory with default limits.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            ..Default::default()
        }
    }

    /// Sets the resident page limit.
    pub fn with_max_pages_in_memory(mut self, max_pages_in_memory: usize) -> Self {
        self.max_pages_in_memory = max_pages_in_memory;
        self
    }

    /// Sets the bucket file size cap.
    pub fn with_max_bucket_file_size(mut self, max_bucket_file_size: u64) -> Self {
        self.max_bucket_file_size = max_bucket_file_size;
        self
    }

    /// Returns the bucket size rounded up to the nearest multiple of PAGE_SIZE.
    pub fn rounded_bucket_file_size(&self) -> u64 {
        let page_size = PAGE_SIZE as u64;
        self.max_bucket_file_size.div_ceil(page_size) * page_size
    }

    /// Returns the number of pages one bucket file can hold.
    pub fn pages_per_bucket(&self) -> u64 {
        self.rounded_bucket_file_size() / PAGE_SIZE as u64
    }

    /// Checks limits and the working directory.
    pub fn validate(&self) -> Result<()> {
        if self.max_pages_in_memory == 0 {
            return Err(CacheError::invalid_parameter(
                "max_pages_in_memory",
                self.max_pages_in_memory,
            ));
        }
        if self.max_bucket_file_size == 0 {
            return Err(CacheError::invalid_parameter(
                "max_bucket_file_size",
                self.max_bucket_file_size,
            ));
        }
        check_directory(&self.working_dir)
    }
}

/// Configuration for the binary data manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryDataConfig {
    /// Parent directory. A private subdirectory is created underneath it.
    pub working_dir: PathBuf,
    /// Resident page limit for the underlying page manager.
    pub max_pages_in_memory: usize,
    /// Bucket file size cap for the underlying page manager.
    pub max_bucket_file_size: u64,
    /// Logical file length at which writes rotate to a new file.
    pub max_data_file_size: u64,
    /// Chunk size for copying incoming payloads.
    pub write_chunk_size: usize,
    /// Chunk size for reading payloads back.
    pub read_chunk_size: usize,
}

impl Default for BinaryDataConfig {
    fn default() -> Self {
        Self {
            working_dir: std::env::temp_dir(),
            max_pages_in_memory: DEFAULT_MAX_PAGES_IN_MEMORY,
            max_bucket_file_size: DEFAULT_MAX_BUCKET_FILE_SIZE,
            max_data_file_size: DEFAULT_MAX_DATA_FILE_SIZE,
            write_chunk_size: DEFAULT_WRITE_CHUNK_SIZE,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }
}

impl BinaryDataConfig {
    /// Creates a config for the given parent directory with default limits.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            ..Default::default()
        }
    }

    /// Checks limits and the parent directory.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("max_pages_in_memory", self.max_pages_in_memory as u64),
            ("max_bucket_file_size", self.max_bucket_file_size),
            ("max_data_file_size", self.max_data_file_size),
            ("write_chunk_size", self.write_chunk_size as u64),
            ("read_chunk_size", self.read_chunk_size as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(CacheError::invalid_parameter(name, value));
            }
        }
        check_directory(&self.working_dir)
    }

    /// Derives the page manager config for a private directory.
    pub fn page_manager_config(&self, working_dir: impl Into<PathBuf>) -> PageManagerConfig {
        PageManagerConfig {
            working_dir: working_dir.into(),
            max_pages_in_memory: self.max_pages_in_memory,
            max_bucket_file_size: self.max_bucket_file_size,
        }
    }
}

fn check_directory(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Err(CacheError::ConfigError(format!(
            "working directory does not exist: {}",
            dir.display()
        )));
    }
    if !dir.is_dir() {
        return Err(CacheError::ConfigError(format!(
            "working directory is not a directory: {}",
            dir.display()
        )));
    }
    Ok(())
}
