//! Page manager.

use crate::bucket::{BucketFiles, PagePlacement};
use crate::constants::{LOCK_TIMEOUT, MAX_RETRY_COUNT, MIN_AUTO_SIZED_PAGES, RETRY_WAIT};
use crate::gate::{AdmissionGate, GatePermit};
use crate::page::Page;
use crate::resident::ResidentPageIndex;
use blobcache_common::config::PageManagerConfig;
use blobcache_common::page::{PageId, PAGE_SIZE};
use blobcache_common::{CacheError, Result};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use sysinfo::System;

/// Point-in-time counters of a page manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageManagerStats {
    /// Resident page limit.
    pub max_pages_in_memory: usize,
    /// Pages currently in the resident index.
    pub resident_pages: usize,
    /// Admission permits not held by any resident page.
    pub available_permits: usize,
    /// Bucket files created so far.
    pub bucket_files: usize,
    /// Page ids handed out so far.
    pub allocated_pages: u32,
    /// Pages loaded back from bucket files.
    pub swapped_in: u64,
    /// Pages written out to bucket files and dropped from memory.
    pub swapped_out: u64,
}

/// Page manager.
///
/// Owns every page of one working directory and keeps at most
/// `max_pages_in_memory` of them resident:
/// - Page ids come from an atomic counter and are never reused
/// - Admission takes a permit from an [`AdmissionGate`], eviction returns it
/// - Least recently used unleased pages are written to bucket files
/// - Swapped out pages are reloaded transparently on lookup
///
/// All operations take `&self`; share the manager through an `Arc`.
pub struct PageManager {
    /// Configuration with the bucket size already rounded.
    config: PageManagerConfig,
    /// Resident pages in recency order.
    resident: ResidentPageIndex,
    /// One permit per resident page.
    gate: AdmissionGate,
    /// Bucket files of the working directory.
    buckets: BucketFiles,
    /// Next page id to hand out.
    next_page_id: AtomicU32,
    /// Set once close has started.
    closed: AtomicBool,
    /// True once the working directory has been torn down.
    lifecycle: Mutex<bool>,
    /// Serializes eviction rounds.
    eviction: Mutex<()>,
    /// Serializes loads so a stale copy is never admitted over a newer one.
    loading: Mutex<()>,
    swapped_in: AtomicU64,
    swapped_out: AtomicU64,
}

impl PageManager {
    /// Creates a page manager over an existing working directory.
    pub fn new(mut config: PageManagerConfig) -> Result<Self> {
        config.validate()?;
        config.max_bucket_file_size = config.rounded_bucket_file_size();

        debug!(
            "Page manager is created, dir={}, max_pages_in_memory={}, bucket_size={}, pages_per_bucket={}",
            config.working_dir.display(),
            config.max_pages_in_memory,
            config.max_bucket_file_size,
            config.pages_per_bucket()
        );

        Ok(Self {
            resident: ResidentPageIndex::with_capacity(config.max_pages_in_memory),
            gate: AdmissionGate::new(config.max_pages_in_memory),
            buckets: BucketFiles::new(&config.working_dir, config.max_bucket_file_size),
            next_page_id: AtomicU32::new(0),
            closed: AtomicBool::new(false),
            lifecycle: Mutex::new(false),
            eviction: Mutex::new(()),
            loading: Mutex::new(()),
            swapped_in: AtomicU64::new(0),
            swapped_out: AtomicU64::new(0),
            config,
        })
    }

    /// Creates a page manager whose resident limit is 25% of available RAM.
    ///
    /// Never goes below MIN_AUTO_SIZED_PAGES pages, so low-memory systems
    /// still get a useful working set.
    pub fn auto_sized(working_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut sys = System::new();
        sys.refresh_memory();

        let available_bytes = sys.available_memory() as usize;
        let target_bytes = available_bytes / 4;
        let max_pages = (target_bytes / PAGE_SIZE).max(MIN_AUTO_SIZED_PAGES);

        Self::new(PageManagerConfig::new(working_dir).with_max_pages_in_memory(max_pages))
    }

    /// Returns the working directory.
    pub fn working_dir(&self) -> &Path {
        &self.config.working_dir
    }

    /// Returns the resident page limit.
    pub fn max_pages_in_memory(&self) -> usize {
        self.config.max_pages_in_memory
    }

    /// Returns the bucket file size, a multiple of PAGE_SIZE.
    pub fn bucket_file_size(&self) -> u64 {
        self.config.max_bucket_file_size
    }

    /// Returns the number of pages currently holding an admission permit.
    pub fn size(&self) -> usize {
        self.gate.capacity() - self.gate.available_permits()
    }

    /// Returns the number of page ids handed out so far.
    pub fn allocated_pages(&self) -> u32 {
        self.next_page_id.load(Ordering::Acquire)
    }

    /// Returns true if the page is currently resident.
    pub fn is_resident(&self, page_id: PageId) -> bool {
        self.resident.contains(page_id)
    }

    /// Returns where the page is stored once swapped out.
    pub fn placement(&self, page_id: PageId) -> PagePlacement {
        self.buckets.placement(page_id)
    }

    /// Returns true once close has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns current counters.
    pub fn stats(&self) -> PageManagerStats {
        PageManagerStats {
            max_pages_in_memory: self.config.max_pages_in_memory,
            resident_pages: self.resident.len(),
            available_permits: self.gate.available_permits(),
            bucket_files: self.buckets.count(),
            allocated_pages: self.allocated_pages(),
            swapped_in: self.swapped_in.load(Ordering::Relaxed),
            swapped_out: self.swapped_out.load(Ordering::Relaxed),
        }
    }

    /// Allocates one zero-filled page and makes it resident.
    pub fn create(&self) -> Result<Arc<Page>> {
        let mut pages = self.create_many(1)?;
        pages
            .pop()
            .ok_or_else(|| CacheError::Internal("no page was created".to_string()))
    }

    /// Allocates `count` zero-filled pages with consecutive ids.
    ///
    /// Evicts least recently used pages when the resident limit would be
    /// exceeded.
    pub fn create_many(&self, count: usize) -> Result<Vec<Arc<Page>>> {
        self.ensure_open()?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let requested = u32::try_from(count)
            .map_err(|_| CacheError::invalid_parameter("count", count))?;
        let first = self
            .next_page_id
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |next| {
                next.checked_add(requested)
            })
            .map_err(|_| CacheError::Internal("page id space exhausted".to_string()))?;

        let pages = (first..first + requested)
            .map(|id| Arc::new(Page::empty(PageId(id))))
            .collect();
        let pages = self.admit(pages)?;
        debug!("Pages are created, first={}, count={}", first, count);
        Ok(pages)
    }

    /// Returns the page with the given id, loading it from disk if needed.
    ///
    /// The page becomes the most recently used one.
    pub fn get(&self, page_id: PageId) -> Result<Arc<Page>> {
        self.ensure_open()?;
        self.check_allocated(page_id)?;

        for attempt in 1..=MAX_RETRY_COUNT {
            if let Some(page) = self.resident.find_by_id_with_lru(page_id) {
                return Ok(page);
            }
            if attempt > 1 {
                warn!(
                    "Page was evicted right after loading, retrying, page={}, attempt={}",
                    page_id, attempt
                );
            }
            self.swap_in(&[page_id])?;
        }

        self.resident
            .find_by_id_with_lru(page_id)
            .ok_or(CacheError::RetriesExhausted {
                operation: "get",
                page_id: page_id.0,
                attempts: MAX_RETRY_COUNT,
            })
    }

    /// Returns the pages with the given ids, in request order.
    ///
    /// At most `max_pages_in_memory` pages are loaded per batch.
    pub fn get_many(&self, page_ids: &[PageId]) -> Result<Vec<Arc<Page>>> {
        self.ensure_open()?;
        for page_id in page_ids {
            self.check_allocated(*page_id)?;
        }

        let mut pages = Vec::with_capacity(page_ids.len());
        for chunk in page_ids.chunks(self.config.max_pages_in_memory) {
            let missing: Vec<PageId> = chunk
                .iter()
                .copied()
                .filter(|page_id| !self.resident.contains(*page_id))
                .collect();
            if !missing.is_empty() {
                self.swap_in(&missing)?;
            }
            for page_id in chunk {
                pages.push(self.get(*page_id)?);
            }
        }
        Ok(pages)
    }

    /// Copies the content of `page` into the managed page with the same id.
    ///
    /// The managed page is leased while it is written, so it cannot be
    /// swapped out halfway. Returns the managed page. Passing the managed
    /// page itself only refreshes its recency.
    pub fn modify(&self, page: &Arc<Page>) -> Result<Arc<Page>> {
        self.ensure_open()?;
        let page_id = page.id();
        self.check_allocated(page_id)?;

        for attempt in 1..=MAX_RETRY_COUNT {
            let managed = match self.resident.find_by_id_with_lru(page_id) {
                Some(managed) => managed,
                None => {
                    self.swap_in(&[page_id])?;
                    match self.resident.find_by_id_with_lru(page_id) {
                        Some(managed) => managed,
                        None => {
                            warn!(
                                "Page is not resident after loading, page={}, attempt={}",
                                page_id, attempt
                            );
                            continue;
                        }
                    }
                }
            };

            let lease = managed.lease(LOCK_TIMEOUT)?;
            if !self.resident.contains_page(&managed) {
                // Evicted between lookup and lease
                warn!(
                    "Page was evicted before it could be leased, page={}, attempt={}",
                    lease.page_id(),
                    attempt
                );
                drop(lease);
                continue;
            }
            managed.copy_from(page);
            drop(lease);
            return Ok(managed);
        }

        Err(CacheError::RetriesExhausted {
            operation: "modify",
            page_id: page_id.0,
            attempts: MAX_RETRY_COUNT,
        })
    }

    /// Applies [`PageManager::modify`] to every page, in order.
    ///
    /// Missing pages are loaded in batches of at most `max_pages_in_memory`
    /// before they are written.
    pub fn modify_many(&self, pages: &[Arc<Page>]) -> Result<Vec<Arc<Page>>> {
        self.ensure_open()?;
        let mut managed = Vec::with_capacity(pages.len());
        for chunk in pages.chunks(self.config.max_pages_in_memory) {
            let ids: Vec<PageId> = chunk.iter().map(|page| page.id()).collect();
            self.get_many(&ids)?;
            for page in chunk {
                managed.push(self.modify(page)?);
            }
        }
        Ok(managed)
    }

    /// Writes every unleased resident page to its bucket file and drops it
    /// from memory. Returns the number of pages written.
    pub fn flush(&self) -> Result<usize> {
        self.ensure_open()?;
        let flushed = self.evict_all()?;
        debug!("Page manager is flushed, pages={}", flushed);
        Ok(flushed)
    }

    /// Writes back every resident page and deletes the working directory.
    ///
    /// Calling close again after it succeeded is a no-op. Fails with
    /// `PagesLeased` if some pages stay leased through every round; the
    /// directory is kept in that case and close may be called again.
    pub fn close(&self) -> Result<()> {
        let mut torn_down = self.lifecycle.lock();
        if *torn_down {
            return Ok(());
        }
        self.closed.store(true, Ordering::Release);

        for round in 1..=MAX_RETRY_COUNT {
            self.evict_all()?;
            if self.resident.is_empty() {
                break;
            }
            warn!(
                "Pages are still leased at close, round={}, pages={}",
                round,
                self.resident.len()
            );
            for page in self.resident.snapshot() {
                // Wait briefly for the holder to let go
                let _ = page.lease(RETRY_WAIT);
            }
        }

        let remaining = self.resident.ids();
        if !remaining.is_empty() {
            warn!(
                "Pages could not be written back at close, pages={:?}",
                remaining
            );
            return Err(CacheError::PagesLeased {
                count: remaining.len(),
            });
        }

        self.buckets.close_all();
        match std::fs::remove_dir_all(&self.config.working_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        *torn_down = true;

        let stats = self.stats();
        info!(
            "Page manager is closed, dir={}, pages={}, swapped_in={}, swapped_out={}",
            self.config.working_dir.display(),
            stats.allocated_pages,
            stats.swapped_in,
            stats.swapped_out
        );
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(CacheError::Closed("page manager"));
        }
        Ok(())
    }

    fn check_allocated(&self, page_id: PageId) -> Result<()> {
        if page_id.0 >= self.allocated_pages() {
            return Err(CacheError::PageNotFound { page_id: page_id.0 });
        }
        Ok(())
    }

    /// Makes `pages` resident, evicting as needed.
    ///
    /// If a page with the same id is already resident, that instance is
    /// returned instead of the given one.
    fn admit(&self, pages: Vec<Arc<Page>>) -> Result<Vec<Arc<Page>>> {
        let mut admitted = Vec::with_capacity(pages.len());
        let mut pending: VecDeque<Arc<Page>> = pages.into();
        let mut fruitless_rounds = 0;

        while let Some(page) = pending.pop_front() {
            self.ensure_open()?;

            let permit = match self.gate.try_acquire() {
                Some(permit) => permit,
                None => {
                    let wanted = (pending.len() + 1).min(self.config.max_pages_in_memory);
                    if self.swap_out(wanted)? > 0 {
                        fruitless_rounds = 0;
                        pending.push_front(page);
                        continue;
                    }
                    match self.gate.acquire_timeout(RETRY_WAIT) {
                        Some(permit) => permit,
                        None => {
                            fruitless_rounds += 1;
                            if fruitless_rounds >= MAX_RETRY_COUNT {
                                return Err(CacheError::CapacityExhausted {
                                    requested: pending.len() + 1,
                                    attempts: fruitless_rounds,
                                });
                            }
                            warn!(
                                "No page could be swapped out, retrying, round={}",
                                fruitless_rounds
                            );
                            pending.push_front(page);
                            continue;
                        }
                    }
                }
            };

            fruitless_rounds = 0;
            admitted.push(self.install(page, permit)?);
        }
        Ok(admitted)
    }

    /// Inserts an admitted page under the lifecycle lock. Fails with
    /// `Closed` once close has started.
    fn install(&self, page: Arc<Page>, permit: GatePermit<'_>) -> Result<Arc<Page>> {
        let _lifecycle = self.lifecycle.lock();
        self.ensure_open()?;
        if self.resident.add_first(Arc::clone(&page)) {
            permit.forget();
            return Ok(page);
        }
        drop(permit);
        Ok(self.resident.find_by_id_with_lru(page.id()).unwrap_or(page))
    }

    /// Evicts up to `count` unleased pages from the least recently used end.
    fn swap_out(&self, count: usize) -> Result<usize> {
        let _eviction = self.eviction.lock();
        let victims = self.resident.lru_candidates(count, |page| !page.is_leased());
        if victims.is_empty() {
            return Ok(0);
        }
        let evicted = self.write_back(victims)?;
        debug!("Pages are swapped out, requested={}, evicted={}", count, evicted);
        Ok(evicted)
    }

    fn evict_all(&self) -> Result<usize> {
        let _eviction = self.eviction.lock();
        let pages = self
            .resident
            .lru_candidates(usize::MAX, |page| !page.is_leased());
        self.write_back(pages)
    }

    /// Writes pages to their bucket files and removes them from the index.
    ///
    /// Must be called with the eviction lock held. Pages that got leased or
    /// left the index in the meantime are skipped. Every removed page
    /// returns its permit.
    fn write_back(&self, pages: Vec<Arc<Page>>) -> Result<usize> {
        let mut by_bucket: BTreeMap<u64, Vec<(PagePlacement, Arc<Page>)>> = BTreeMap::new();
        for page in pages {
            let placement = self.buckets.placement(page.id());
            by_bucket
                .entry(placement.bucket)
                .or_default()
                .push((placement, page));
        }

        let mut evicted = 0;
        for (bucket, mut group) in by_bucket {
            group.sort_by_key(|(_, page)| page.id());
            let file = self.buckets.get_or_create(bucket)?;
            let mut guard = file.lock()?;
            if let Some((last, _)) = group.last() {
                guard.ensure_len(last.end())?;
            }

            let mut written = 0;
            for (placement, page) in &group {
                let Some(_lease) = page.try_lease() else {
                    continue;
                };
                if !self.resident.contains_page(page) {
                    continue;
                }
                guard.write_page(placement.offset, &page.snapshot())?;
                self.resident.remove_by_id(page.id());
                self.gate.release(1);
                self.swapped_out.fetch_add(1, Ordering::Relaxed);
                written += 1;
            }
            debug!(
                "Pages are written back, file={}, pages={}",
                file.path().display(),
                written
            );
            evicted += written;
        }
        Ok(evicted)
    }

    /// Loads non-resident pages from their bucket files and admits them.
    fn swap_in(&self, page_ids: &[PageId]) -> Result<usize> {
        let _loading = self.loading.lock();

        let mut by_bucket: BTreeMap<u64, Vec<(PagePlacement, PageId)>> = BTreeMap::new();
        for page_id in page_ids {
            if self.resident.contains(*page_id) {
                continue;
            }
            let placement = self.buckets.placement(*page_id);
            by_bucket
                .entry(placement.bucket)
                .or_default()
                .push((placement, *page_id));
        }

        let mut loaded = Vec::new();
        for (bucket, mut group) in by_bucket {
            group.sort_by_key(|(_, page_id)| *page_id);
            group.dedup_by_key(|(_, page_id)| *page_id);

            let Some(file) = self.buckets.get(bucket) else {
                return Err(CacheError::PageNotFound {
                    page_id: group[0].1.as_u32(),
                });
            };
            let mut guard = file.lock()?;
            let len = guard.file_len()?;
            for (placement, page_id) in group {
                if placement.end() > len {
                    return Err(CacheError::PageNotFound { page_id: page_id.0 });
                }
                let content = guard.read_page(placement.offset)?;
                loaded.push(Arc::new(Page::with_content(page_id, content)));
            }
        }

        let count = loaded.len();
        if count > 0 {
            self.admit(loaded)?;
            self.swapped_in.fetch_add(count as u64, Ordering::Relaxed);
            debug!("Pages are swapped in, count={}", count);
        }
        Ok(count)
    }
}

impl Drop for PageManager {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(
                "Page manager could not be closed cleanly, dir={}, error={}",
                self.config.working_dir.display(),
                e
            );
        }
    }
}

impl std::fmt::Debug for PageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageManager")
            .field("working_dir", &self.config.working_dir)
            .field("stats", &self.stats())
            .finish()
    }
}
