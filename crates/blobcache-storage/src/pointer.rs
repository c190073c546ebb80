//! Logical positions inside a paged file.

use blobcache_common::page::PAGE_SIZE;
use blobcache_common::{CacheError, Result};
use serde::{Deserialize, Serialize};

/// A byte position split into logical page and offset within that page.
///
/// The offset is always below PAGE_SIZE. Pointers order by position.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct LogicalPointer {
    pub logical_page_id: u32,
    pub offset: u32,
}

impl LogicalPointer {
    /// Splits a byte position.
    pub fn from_position(position: u64) -> Result<Self> {
        let page_size = PAGE_SIZE as u64;
        let logical_page_id = u32::try_from(position / page_size)
            .map_err(|_| CacheError::invalid_parameter("position", position))?;
        Ok(Self {
            logical_page_id,
            offset: (position % page_size) as u32,
        })
    }

    /// Returns the byte position.
    #[inline]
    pub fn position(&self) -> u64 {
        self.logical_page_id as u64 * PAGE_SIZE as u64 + self.offset as u64
    }

    /// Moves the pointer to a new byte position.
    pub fn seek(&mut self, position: u64) -> Result<()> {
        *self = Self::from_position(position)?;
        Ok(())
    }

    /// Returns the logical pages touched by `len` bytes starting here.
    pub fn span(&self, len: u64) -> std::ops::RangeInclusive<u32> {
        if len == 0 {
            return std::ops::RangeInclusive::new(1, 0);
        }
        let last = (self.position() + len - 1) / PAGE_SIZE as u64;
        self.logical_page_id..=last as u32
    }
}

impl std::fmt::Display for LogicalPointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.logical_page_id, self.offset)
    }
}
