//! Fixed-size pages, leases and cursors.

use blobcache_common::page::{PageId, PAGE_SIZE};
use blobcache_common::{CacheError, Result};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::time::Duration;

/// A single 32 KB page managed by the page manager.
///
/// Each page contains:
/// - The page content (PAGE_SIZE bytes)
/// - A lease lock, held while the page is being evicted, loaded or modified
///
/// Reading or writing content does not take the lease. Holding a lease only
/// guarantees that the page is not swapped out underneath the holder.
pub struct Page {
    /// Physical page identifier.
    page_id: PageId,
    /// Page content.
    data: RwLock<Box<[u8; PAGE_SIZE]>>,
    /// Exclusive lease guarding eviction and modification.
    lease: Mutex<()>,
}

impl Page {
    /// Creates a zero-filled page.
    pub fn empty(page_id: PageId) -> Self {
        Self {
            page_id,
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
            lease: Mutex::new(()),
        }
    }

    /// Creates a page holding a copy of `content`.
    ///
    /// `content` must be exactly PAGE_SIZE bytes long.
    pub fn from_bytes(page_id: PageId, content: &[u8]) -> Result<Self> {
        if content.len() != PAGE_SIZE {
            return Err(CacheError::PageOverflow {
                capacity: PAGE_SIZE,
                requested: content.len(),
            });
        }
        let page = Self::empty(page_id);
        page.data.write().copy_from_slice(content);
        Ok(page)
    }

    /// Creates a page that takes ownership of `content`.
    pub fn with_content(page_id: PageId, content: Box<[u8; PAGE_SIZE]>) -> Self {
        Self {
            page_id,
            data: RwLock::new(content),
            lease: Mutex::new(()),
        }
    }

    /// Returns the page ID.
    #[inline]
    pub fn id(&self) -> PageId {
        self.page_id
    }

    /// Copies bytes starting at `offset` into `dst`.
    ///
    /// Returns the number of bytes copied, bounded by the end of the page.
    pub fn read_at(&self, offset: usize, dst: &mut [u8]) -> usize {
        let offset = offset.min(PAGE_SIZE);
        let len = dst.len().min(PAGE_SIZE - offset);
        let data = self.data.read();
        dst[..len].copy_from_slice(&data[offset..offset + len]);
        len
    }

    /// Copies `src` into the page starting at `offset`.
    ///
    /// Fails without touching the page if `src` does not fit.
    pub fn write_at(&self, offset: usize, src: &[u8]) -> Result<()> {
        let capacity = PAGE_SIZE.saturating_sub(offset);
        if offset > PAGE_SIZE || src.len() > capacity {
            return Err(CacheError::PageOverflow {
                capacity,
                requested: src.len(),
            });
        }
        let mut data = self.data.write();
        data[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    /// Returns a copy of the whole page content.
    pub fn snapshot(&self) -> Box<[u8; PAGE_SIZE]> {
        let data = self.data.read();
        let mut copy = Box::new([0u8; PAGE_SIZE]);
        copy.copy_from_slice(&**data);
        copy
    }

    /// Overwrites this page with the content of `src`.
    ///
    /// The source is copied, never aliased. Copying a page onto itself is a no-op.
    pub fn copy_from(&self, src: &Page) {
        if std::ptr::eq(self, src) {
            return;
        }
        let content = src.snapshot();
        self.data.write().copy_from_slice(&*content);
    }

    /// Returns a read guard over the content.
    #[inline]
    pub fn read_data(&self) -> parking_lot::RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.read()
    }

    /// Acquires the lease, waiting at most `timeout`.
    pub fn lease(&self, timeout: Duration) -> Result<PageLease<'_>> {
        self.lease
            .try_lock_for(timeout)
            .map(|guard| PageLease {
                page_id: self.page_id,
                _guard: guard,
            })
            .ok_or_else(|| CacheError::LockTimeout {
                resource: self.page_id.to_string(),
            })
    }

    /// Acquires the lease only if nobody holds it.
    pub fn try_lease(&self) -> Option<PageLease<'_>> {
        self.lease.try_lock().map(|guard| PageLease {
            page_id: self.page_id,
            _guard: guard,
        })
    }

    /// Returns true if someone currently holds the lease.
    #[inline]
    pub fn is_leased(&self) -> bool {
        self.lease.is_locked()
    }

    /// Returns a cursor over this page with both positions at 0.
    pub fn cursor(&self) -> PageCursor<'_> {
        PageCursor {
            page: self,
            read_pos: 0,
            write_pos: 0,
        }
    }
}

impl PartialEq for Page {
    fn eq(&self, other: &Self) -> bool {
        self.page_id == other.page_id
    }
}

impl Eq for Page {}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("page_id", &self.page_id)
            .field("leased", &self.is_leased())
            .finish()
    }
}

/// Exclusive lease on a page. While held the page cannot be swapped out.
#[derive(Debug)]
pub struct PageLease<'a> {
    page_id: PageId,
    _guard: MutexGuard<'a, ()>,
}

impl PageLease<'_> {
    /// Returns the leased page's ID.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }
}

/// Independent read and write positions over one page.
///
/// A cursor belongs to whoever created it, so two callers working on the
/// same page never disturb each other's positions.
pub struct PageCursor<'a> {
    page: &'a Page,
    read_pos: usize,
    write_pos: usize,
}

impl<'a> PageCursor<'a> {
    /// Moves the read position, clamped to the page size.
    pub fn seek_for_read(&mut self, position: usize) {
        self.read_pos = position.min(PAGE_SIZE);
    }

    /// Moves the write position, clamped to the page size.
    pub fn seek_for_write(&mut self, position: usize) {
        self.write_pos = position.min(PAGE_SIZE);
    }

    /// Returns the current read position.
    pub fn read_position(&self) -> usize {
        self.read_pos
    }

    /// Returns the current write position.
    pub fn write_position(&self) -> usize {
        self.write_pos
    }

    /// Reads into `buf` from the read position.
    ///
    /// Returns `None` once the end of the page has been reached.
    pub fn read(&mut self, buf: &mut [u8]) -> Option<usize> {
        let n = self.page.read_at(self.read_pos, buf);
        self.read_pos += n;
        if n == 0 && !buf.is_empty() {
            return None;
        }
        Some(n)
    }

    /// Writes all of `buf` at the write position.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.page.write_at(self.write_pos, buf)?;
        self.write_pos += buf.len();
        Ok(())
    }

    /// Returns the page this cursor points into.
    pub fn page(&self) -> &'a Page {
        self.page
    }
}
