//! Logical file metadata sidecar.
//!
//! The sidecar lives next to the logical file as `<file>.meta` and holds:
//! - The logical to physical page table
//! - The high-water mark of bytes ever written
//!
//! It is written to a temporary file in the same directory and renamed
//! into place, so a reader never sees a half-written sidecar.

use crate::pointer::LogicalPointer;
use blobcache_common::page::PAGE_SIZE;
use blobcache_common::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Current sidecar schema version.
pub const META_VERSION: u32 = 1;

/// Extension appended to a logical file path to name its sidecar.
pub const META_EXTENSION: &str = "meta";

/// Page table and length of one logical file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaInfo {
    version: u32,
    page_table: BTreeMap<u32, u32>,
    last_pointer: LogicalPointer,
}

impl Default for MetaInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl MetaInfo {
    /// Creates metadata for an empty file.
    pub fn new() -> Self {
        Self {
            version: META_VERSION,
            page_table: BTreeMap::new(),
            last_pointer: LogicalPointer::default(),
        }
    }

    /// Returns the sidecar path for a logical file.
    pub fn sidecar_path(path: &Path) -> PathBuf {
        let mut name = OsString::from(path.as_os_str());
        name.push(".");
        name.push(META_EXTENSION);
        PathBuf::from(name)
    }

    /// Returns the physical page backing a logical page.
    pub fn physical(&self, logical_page_id: u32) -> Result<u32> {
        self.page_table
            .get(&logical_page_id)
            .copied()
            .ok_or(CacheError::LogicalPageNotMapped { logical_page_id })
    }

    /// Returns the physical page backing a logical page, if mapped.
    pub fn lookup(&self, logical_page_id: u32) -> Option<u32> {
        self.page_table.get(&logical_page_id).copied()
    }

    /// Maps a logical page. A logical page can be mapped only once.
    pub fn map(&mut self, logical_page_id: u32, physical_page_id: u32) -> Result<()> {
        if let Some(existing) = self.page_table.get(&logical_page_id) {
            return Err(CacheError::PageAlreadyMapped {
                logical_page_id,
                physical_page_id: *existing,
            });
        }
        self.page_table.insert(logical_page_id, physical_page_id);
        Ok(())
    }

    /// Returns the number of mapped logical pages.
    pub fn mapped_pages(&self) -> usize {
        self.page_table.len()
    }

    /// Returns the high-water mark.
    pub fn last_pointer(&self) -> LogicalPointer {
        self.last_pointer
    }

    /// Returns the file length in bytes.
    pub fn length(&self) -> u64 {
        self.last_pointer.position()
    }

    /// Raises the high-water mark to `pointer` if it is further.
    pub fn advance_to(&mut self, pointer: LogicalPointer) {
        if pointer > self.last_pointer {
            self.last_pointer = pointer;
        }
    }

    /// Loads a sidecar, checking its version and that every page below
    /// the high-water mark is mapped.
    pub fn load(meta_path: &Path) -> Result<Self> {
        let content = std::fs::read(meta_path)?;
        let meta: MetaInfo = serde_json::from_slice(&content).map_err(|e| {
            CacheError::MetaCorrupted(format!("{}: {}", meta_path.display(), e))
        })?;

        if meta.version != META_VERSION {
            return Err(CacheError::MetaCorrupted(format!(
                "{}: unsupported version {}, expected {}",
                meta_path.display(),
                meta.version,
                META_VERSION
            )));
        }
        if meta.last_pointer.offset as usize >= PAGE_SIZE {
            return Err(CacheError::MetaCorrupted(format!(
                "{}: pointer offset {} out of range",
                meta_path.display(),
                meta.last_pointer.offset
            )));
        }
        let used_pages = meta.length().div_ceil(PAGE_SIZE as u64);
        for logical_page_id in 0..used_pages {
            if !meta.page_table.contains_key(&(logical_page_id as u32)) {
                return Err(CacheError::MetaCorrupted(format!(
                    "{}: logical page {} below the end of file is not mapped",
                    meta_path.display(),
                    logical_page_id
                )));
            }
        }
        Ok(meta)
    }

    /// Writes the sidecar atomically.
    pub fn persist(&self, meta_path: &Path) -> Result<()> {
        let dir = match meta_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut tmp, self)?;
        tmp.flush()?;
        tmp.persist(meta_path).map_err(|e| CacheError::Io(e.error))?;
        Ok(())
    }
}
