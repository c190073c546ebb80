//! Page identifiers and sizing.

use serde::{Deserialize, Serialize};

/// Storage layer page size in bytes (32 KB).
pub const PAGE_SIZE: usize = 32 * 1024;

/// Identifier of a physical page.
///
/// Ids are handed out by a monotonically increasing counter and are never
/// reused, so an id alone determines where a page lives on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(pub u32);

impl PageId {
    /// Creates a new PageId.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[inline]
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Returns the first byte of this page in an unbounded page-addressed space.
    #[inline]
    pub fn byte_offset(&self) -> u64 {
        self.0 as u64 * PAGE_SIZE as u64
    }
}

impl From<u32> for PageId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "page:{}", self.0)
    }
}
