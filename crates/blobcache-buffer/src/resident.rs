//! Most-recently-used ordered index of resident pages.

use crate::page::Page;
use blobcache_common::page::PageId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Sentinel for "no slot".
const NIL: u32 = u32::MAX;

/// Pages ordered from most to least recently used, with O(1) lookup by id.
///
/// Nodes live in a slot arena linked by index, with a free list for reuse.
/// Only [`ResidentPageIndex::find_by_id_with_lru`] and the `add_*`
/// operations change the order; scans never do. All operations are
/// serialized by one mutex.
pub struct ResidentPageIndex {
    inner: Mutex<IndexInner>,
}

struct Slot {
    page: Option<Arc<Page>>,
    prev: u32,
    next: u32,
}

struct IndexInner {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_id: HashMap<PageId, u32>,
    /// Most recently used end.
    head: u32,
    /// Least recently used end.
    tail: u32,
}

impl IndexInner {
    fn allocate(&mut self, page: Arc<Page>) -> u32 {
        let slot = Slot {
            page: Some(page),
            prev: NIL,
            next: NIL,
        };
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx as usize] = slot;
                idx
            }
            None => {
                self.slots.push(slot);
                (self.slots.len() - 1) as u32
            }
        }
    }

    fn link_front(&mut self, idx: u32) {
        self.slots[idx as usize].prev = NIL;
        self.slots[idx as usize].next = self.head;
        if self.head != NIL {
            self.slots[self.head as usize].prev = idx;
        } else {
            self.tail = idx;
        }
        self.head = idx;
    }

    fn link_back(&mut self, idx: u32) {
        self.slots[idx as usize].next = NIL;
        self.slots[idx as usize].prev = self.tail;
        if self.tail != NIL {
            self.slots[self.tail as usize].next = idx;
        } else {
            self.head = idx;
        }
        self.tail = idx;
    }

    fn unlink(&mut self, idx: u32) {
        let (prev, next) = {
            let slot = &self.slots[idx as usize];
            (slot.prev, slot.next)
        };
        if prev != NIL {
            self.slots[prev as usize].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.slots[next as usize].prev = prev;
        } else {
            self.tail = prev;
        }
        self.slots[idx as usize].prev = NIL;
        self.slots[idx as usize].next = NIL;
    }

    fn release(&mut self, idx: u32) -> Option<Arc<Page>> {
        self.unlink(idx);
        let page = self.slots[idx as usize].page.take();
        self.free.push(idx);
        if let Some(page) = &page {
            self.by_id.remove(&page.id());
        }
        page
    }

    fn page_at(&self, idx: u32) -> Option<&Arc<Page>> {
        self.slots[idx as usize].page.as_ref()
    }
}

impl ResidentPageIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty index with room for `capacity` pages.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(IndexInner {
                slots: Vec::with_capacity(capacity),
                free: Vec::new(),
                by_id: HashMap::with_capacity(capacity),
                head: NIL,
                tail: NIL,
            }),
        }
    }

    /// Returns the number of pages in the index.
    pub fn len(&self) -> usize {
        self.inner.lock().by_id.len()
    }

    /// Returns true if the index holds no page.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts a page at the most recently used end.
    ///
    /// Returns false, leaving the index unchanged, if a page with the same id is present.
    pub fn add_first(&self, page: Arc<Page>) -> bool {
        let mut inner = self.inner.lock();
        if inner.by_id.contains_key(&page.id()) {
            return false;
        }
        let page_id = page.id();
        let idx = inner.allocate(page);
        inner.link_front(idx);
        inner.by_id.insert(page_id, idx);
        true
    }

    /// Inserts a page at the least recently used end.
    pub fn add_last(&self, page: Arc<Page>) -> bool {
        let mut inner = self.inner.lock();
        if inner.by_id.contains_key(&page.id()) {
            return false;
        }
        let page_id = page.id();
        let idx = inner.allocate(page);
        inner.link_back(idx);
        inner.by_id.insert(page_id, idx);
        true
    }

    /// Same as [`ResidentPageIndex::add_last`].
    pub fn add(&self, page: Arc<Page>) -> bool {
        self.add_last(page)
    }

    /// Removes and returns the page with the given id.
    pub fn remove_by_id(&self, page_id: PageId) -> Option<Arc<Page>> {
        let mut inner = self.inner.lock();
        let idx = *inner.by_id.get(&page_id)?;
        inner.release(idx)
    }

    /// Removes and returns the least recently used page.
    pub fn remove_last(&self) -> Option<Arc<Page>> {
        let mut inner = self.inner.lock();
        if inner.tail == NIL {
            return None;
        }
        let idx = inner.tail;
        inner.release(idx)
    }

    /// Looks up a page without changing the order.
    pub fn find_by_id(&self, page_id: PageId) -> Option<Arc<Page>> {
        let inner = self.inner.lock();
        let idx = *inner.by_id.get(&page_id)?;
        inner.page_at(idx).cloned()
    }

    /// Looks up a page and moves it to the most recently used end.
    pub fn find_by_id_with_lru(&self, page_id: PageId) -> Option<Arc<Page>> {
        let mut inner = self.inner.lock();
        let idx = *inner.by_id.get(&page_id)?;
        if inner.head != idx {
            inner.unlink(idx);
            inner.link_front(idx);
        }
        inner.page_at(idx).cloned()
    }

    /// Returns true if a page with the given id is present.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.inner.lock().by_id.contains_key(&page_id)
    }

    /// Returns true if exactly this page instance is present.
    pub fn contains_page(&self, page: &Arc<Page>) -> bool {
        let inner = self.inner.lock();
        inner
            .by_id
            .get(&page.id())
            .and_then(|idx| inner.page_at(*idx))
            .is_some_and(|resident| Arc::ptr_eq(resident, page))
    }

    /// Walks from the least recently used end and collects up to `count`
    /// pages accepted by `filter`. The order is not changed.
    pub fn lru_candidates<F>(&self, count: usize, mut filter: F) -> Vec<Arc<Page>>
    where
        F: FnMut(&Page) -> bool,
    {
        let inner = self.inner.lock();
        let mut candidates = Vec::with_capacity(count.min(inner.by_id.len()));
        let mut idx = inner.tail;
        while idx != NIL && candidates.len() < count {
            if let Some(page) = inner.page_at(idx) {
                if filter(page) {
                    candidates.push(Arc::clone(page));
                }
            }
            idx = inner.slots[idx as usize].prev;
        }
        candidates
    }

    /// Returns all pages from most to least recently used.
    pub fn snapshot(&self) -> Vec<Arc<Page>> {
        let inner = self.inner.lock();
        let mut pages = Vec::with_capacity(inner.by_id.len());
        let mut idx = inner.head;
        while idx != NIL {
            if let Some(page) = inner.page_at(idx) {
                pages.push(Arc::clone(page));
            }
            idx = inner.slots[idx as usize].next;
        }
        pages
    }

    /// Returns the ids of all pages from most to least recently used.
    pub fn ids(&self) -> Vec<PageId> {
        self.snapshot().iter().map(|page| page.id()).collect()
    }

    /// Removes every page, returning them from most to least recently used.
    pub fn drain(&self) -> Vec<Arc<Page>> {
        let mut inner = self.inner.lock();
        let mut pages = Vec::with_capacity(inner.by_id.len());
        let mut idx = inner.head;
        while idx != NIL {
            let next = inner.slots[idx as usize].next;
            if let Some(page) = inner.slots[idx as usize].page.take() {
                pages.push(page);
            }
            idx = next;
        }
        inner.slots.clear();
        inner.free.clear();
        inner.by_id.clear();
        inner.head = NIL;
        inner.tail = NIL;
        pages
    }
}

impl Default for ResidentPageIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResidentPageIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResidentPageIndex")
            .field("len", &self.len())
            .finish()
    }
}
