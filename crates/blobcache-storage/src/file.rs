//! Logical files laid over managed pages.

use crate::meta::MetaInfo;
use crate::pointer::LogicalPointer;
use blobcache_buffer::{Page, PageManager, ResidentPageIndex};
use blobcache_common::page::{PageId, PAGE_SIZE};
use blobcache_common::{CacheError, Result};
use log::debug;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Upper bound on the pages a logical file keeps for itself.
const MAX_LOCAL_PAGES: usize = 16;

/// Read and write positions of one caller.
///
/// A fresh cursor reads from the start of the file and appends at its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileCursor {
    read: LogicalPointer,
    write: LogicalPointer,
}

impl FileCursor {
    /// Returns the read position in bytes.
    pub fn read_position(&self) -> u64 {
        self.read.position()
    }

    /// Returns the write position in bytes.
    pub fn write_position(&self) -> u64 {
        self.write.position()
    }
}

struct FileState {
    meta: MetaInfo,
    /// Recently written pages kept out of the page manager's hands.
    buffer: ResidentPageIndex,
    /// Pages allocated ahead of time for unmapped logical pages.
    precreated: VecDeque<Arc<Page>>,
    closed: bool,
}

impl FileState {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(CacheError::Closed("logical file"));
        }
        Ok(())
    }
}

/// A growable byte file stored as logical pages mapped onto physical pages
/// of a [`PageManager`].
///
/// The file at `path` stays empty. Its sidecar holds the page table and the
/// bytes live in the page manager's bucket files. Positions are per caller,
/// see [`FileCursor`] and [`FileSession`].
pub struct LogicalFile {
    path: PathBuf,
    meta_path: PathBuf,
    pages: Arc<PageManager>,
    state: Mutex<FileState>,
    buffer_capacity: usize,
    precreate_batch: usize,
}

impl LogicalFile {
    /// Creates a new empty logical file at `path`.
    ///
    /// Fails if a file already exists there.
    pub fn create(path: impl Into<PathBuf>, pages: Arc<PageManager>) -> Result<Self> {
        let path = path.into();
        OpenOptions::new().write(true).create_new(true).open(&path)?;
        let meta_path = MetaInfo::sidecar_path(&path);
        let meta = MetaInfo::new();
        meta.persist(&meta_path)?;
        debug!("Logical file is created, path={}", path.display());
        Ok(Self::with_meta(path, meta_path, meta, pages))
    }

    /// Reopens a logical file from its sidecar.
    pub fn open(path: impl Into<PathBuf>, pages: Arc<PageManager>) -> Result<Self> {
        let path = path.into();
        let meta_path = MetaInfo::sidecar_path(&path);
        let meta = MetaInfo::load(&meta_path)?;
        debug!(
            "Logical file is opened, path={}, length={}, pages={}",
            path.display(),
            meta.length(),
            meta.mapped_pages()
        );
        Ok(Self::with_meta(path, meta_path, meta, pages))
    }

    fn with_meta(path: PathBuf, meta_path: PathBuf, meta: MetaInfo, pages: Arc<PageManager>) -> Self {
        let capacity = (pages.max_pages_in_memory().saturating_sub(1) / 2).min(MAX_LOCAL_PAGES);
        let buffer_capacity = capacity / 2;
        let precreate_batch = (capacity - buffer_capacity).max(1);
        Self {
            path,
            meta_path,
            pages,
            state: Mutex::new(FileState {
                meta,
                buffer: ResidentPageIndex::with_capacity(buffer_capacity),
                precreated: VecDeque::with_capacity(precreate_batch),
                closed: false,
            }),
            buffer_capacity,
            precreate_batch,
        }
    }

    /// Returns the logical file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the sidecar path.
    pub fn meta_path(&self) -> &Path {
        &self.meta_path
    }

    /// Returns the file length in bytes.
    pub fn length(&self) -> u64 {
        self.state.lock().meta.length()
    }

    /// Returns the number of mapped logical pages.
    pub fn mapped_pages(&self) -> usize {
        self.state.lock().meta.mapped_pages()
    }

    /// Returns true once the file has been closed.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Returns a cursor reading from 0 and writing at the current end.
    pub fn cursor(&self) -> FileCursor {
        FileCursor {
            read: LogicalPointer::default(),
            write: self.state.lock().meta.last_pointer(),
        }
    }

    /// Returns a session that reads and writes through `std::io`.
    pub fn session(&self) -> FileSession<'_> {
        FileSession {
            file: self,
            cursor: self.cursor(),
        }
    }

    /// Moves the read position, clamped to the file length.
    pub fn seek_for_read(&self, cursor: &mut FileCursor, position: u64) -> Result<()> {
        cursor.read.seek(position.min(self.length()))
    }

    /// Moves the write position, clamped to the file length.
    pub fn seek_for_write(&self, cursor: &mut FileCursor, position: u64) -> Result<()> {
        cursor.write.seek(position.min(self.length()))
    }

    /// Writes all of `buf` at the cursor's write position.
    ///
    /// Unmapped logical pages are mapped to fresh physical pages. Advances
    /// the write position and the file length. A write position past the
    /// end of the file is rejected with `InvalidParameter`.
    pub fn write(&self, cursor: &mut FileCursor, buf: &[u8]) -> Result<usize> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        let length = state.meta.length();
        if cursor.write.position() > length {
            return Err(CacheError::invalid_parameter(
                "write_position",
                format!("{} beyond length {}", cursor.write.position(), length),
            ));
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let start = cursor.write;
        let end = LogicalPointer::from_position(start.position() + buf.len() as u64)?;
        let logical_ids: Vec<u32> = start.span(buf.len() as u64).collect();
        let pages = self.pages_for_write(&mut state, &logical_ids)?;

        let mut written = 0;
        for (index, page) in pages.iter().enumerate() {
            let offset = if index == 0 { start.offset as usize } else { 0 };
            let len = (PAGE_SIZE - offset).min(buf.len() - written);
            let mut page_cursor = page.cursor();
            page_cursor.seek_for_write(offset);
            page_cursor.write(&buf[written..written + len])?;
            written += len;
        }

        // Everything not kept locally goes back to the page manager now
        let mut write_back = self.keep_local(&state, &pages);
        for page in &pages {
            if !state.buffer.contains_page(page) && !write_back.iter().any(|p| Arc::ptr_eq(p, page)) {
                write_back.push(Arc::clone(page));
            }
        }
        if !write_back.is_empty() {
            self.pages.modify_many(&write_back)?;
        }

        cursor.write = end;
        state.meta.advance_to(end);
        Ok(written)
    }

    /// Reads into `buf` from the cursor's read position.
    ///
    /// Returns the number of bytes read, 0 once the end of the file is reached.
    pub fn read(&self, cursor: &mut FileCursor, buf: &mut [u8]) -> Result<usize> {
        let state = self.state.lock();
        state.ensure_open()?;

        let start = cursor.read;
        let available = state.meta.length().saturating_sub(start.position());
        let len = (buf.len() as u64).min(available) as usize;
        if len == 0 {
            return Ok(0);
        }

        let logical_ids: Vec<u32> = start.span(len as u64).collect();
        let pages = self.pages_for_read(&state, &logical_ids)?;

        let mut read = 0;
        for (index, page) in pages.iter().enumerate() {
            let offset = if index == 0 { start.offset as usize } else { 0 };
            let want = (PAGE_SIZE - offset).min(len - read);
            let mut page_cursor = page.cursor();
            page_cursor.seek_for_read(offset);
            let n = page_cursor.read(&mut buf[read..read + want]).unwrap_or(0);
            if n != want {
                return Err(CacheError::ShortRead {
                    expected: want as u64,
                    actual: n as u64,
                });
            }
            read += n;
        }

        cursor.read = LogicalPointer::from_position(start.position() + read as u64)?;
        Ok(read)
    }

    /// Hands locally kept pages back to the page manager and persists the
    /// sidecar. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }

        let buffered = state.buffer.snapshot();
        if !buffered.is_empty() {
            self.pages.modify_many(&buffered)?;
        }
        state.buffer.drain();
        state.precreated.clear();
        state.meta.persist(&self.meta_path)?;
        state.closed = true;

        debug!(
            "Logical file is closed, path={}, length={}, pages={}",
            self.path.display(),
            state.meta.length(),
            state.meta.mapped_pages()
        );
        Ok(())
    }

    /// Resolves the pages behind `logical_ids`, mapping unmapped ones.
    fn pages_for_write(&self, state: &mut FileState, logical_ids: &[u32]) -> Result<Vec<Arc<Page>>> {
        let mut slots: Vec<Option<Arc<Page>>> = vec![None; logical_ids.len()];
        let mut unmapped = Vec::new();
        let mut missing = Vec::new();

        for (index, logical_page_id) in logical_ids.iter().enumerate() {
            match state.meta.lookup(*logical_page_id) {
                Some(physical) => match state.buffer.find_by_id_with_lru(PageId(physical)) {
                    Some(page) => slots[index] = Some(page),
                    None => missing.push((index, PageId(physical))),
                },
                None => unmapped.push(index),
            }
        }

        if state.precreated.len() < unmapped.len() {
            let count = unmapped.len() - state.precreated.len() + self.precreate_batch;
            let fresh = self.pages.create_many(count)?;
            state.precreated.extend(fresh);
        }
        for index in unmapped {
            let page = state
                .precreated
                .pop_front()
                .ok_or_else(|| CacheError::Internal("pre-created page pool is empty".to_string()))?;
            state.meta.map(logical_ids[index], page.id().as_u32())?;
            slots[index] = Some(page);
        }

        self.fetch_into(&mut slots, &missing)?;
        Self::collect(slots)
    }

    fn pages_for_read(&self, state: &FileState, logical_ids: &[u32]) -> Result<Vec<Arc<Page>>> {
        let mut slots: Vec<Option<Arc<Page>>> = vec![None; logical_ids.len()];
        let mut missing = Vec::new();

        for (index, logical_page_id) in logical_ids.iter().enumerate() {
            let physical = PageId(state.meta.physical(*logical_page_id)?);
            match state.buffer.find_by_id_with_lru(physical) {
                Some(page) => slots[index] = Some(page),
                None => missing.push((index, physical)),
            }
        }

        self.fetch_into(&mut slots, &missing)?;
        Self::collect(slots)
    }

    fn fetch_into(&self, slots: &mut [Option<Arc<Page>>], missing: &[(usize, PageId)]) -> Result<()> {
        if missing.is_empty() {
            return Ok(());
        }
        let ids: Vec<PageId> = missing.iter().map(|(_, page_id)| *page_id).collect();
        let fetched = self.pages.get_many(&ids)?;
        for ((index, _), page) in missing.iter().zip(fetched) {
            slots[*index] = Some(page);
        }
        Ok(())
    }

    fn collect(slots: Vec<Option<Arc<Page>>>) -> Result<Vec<Arc<Page>>> {
        slots
            .into_iter()
            .map(|slot| slot.ok_or_else(|| CacheError::Internal("page was not resolved".to_string())))
            .collect()
    }

    /// Moves up to `buffer_capacity` of `pages` into the local buffer and
    /// returns the pages pushed out to make room.
    fn keep_local(&self, state: &FileState, pages: &[Arc<Page>]) -> Vec<Arc<Page>> {
        let mut spilled = Vec::new();
        if self.buffer_capacity == 0 {
            return spilled;
        }

        let mut added = 0;
        for page in pages {
            if added == self.buffer_capacity {
                break;
            }
            if state.buffer.contains_page(page) {
                continue;
            }
            if state.buffer.len() >= self.buffer_capacity {
                if let Some(last) = state.buffer.remove_last() {
                    spilled.push(last);
                }
            }
            state.buffer.add_first(Arc::clone(page));
            added += 1;
        }
        spilled
    }
}

impl std::fmt::Debug for LogicalFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LogicalFile")
            .field("path", &self.path)
            .field("length", &state.meta.length())
            .field("mapped_pages", &state.meta.mapped_pages())
            .field("buffered", &state.buffer.len())
            .field("closed", &state.closed)
            .finish()
    }
}

/// A [`LogicalFile`] paired with its own cursor.
///
/// Implements `std::io::Read` and `std::io::Write`.
pub struct FileSession<'a> {
    file: &'a LogicalFile,
    cursor: FileCursor,
}

impl FileSession<'_> {
    /// Returns the session's cursor.
    pub fn cursor(&self) -> FileCursor {
        self.cursor
    }

    /// Moves the read position, clamped to the file length.
    pub fn seek_for_read(&mut self, position: u64) -> Result<()> {
        self.file.seek_for_read(&mut self.cursor, position)
    }

    /// Moves the write position, clamped to the file length.
    pub fn seek_for_write(&mut self, position: u64) -> Result<()> {
        self.file.seek_for_write(&mut self.cursor, position)
    }
}

impl io::Read for FileSession<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.file.read(&mut self.cursor, buf)?)
    }
}

impl io::Write for FileSession<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.file.write(&mut self.cursor, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobcache_common::config::PageManagerConfig;
    use rand::{Rng, SeedableRng};
    use std::io::{Read, Write};
    use tempfile::{tempdir, TempDir};

    const PAGE: usize = PAGE_SIZE;

    struct Fixture {
        dir: TempDir,
        pages: Arc<PageManager>,
    }

    fn fixture(max_pages: usize) -> Fixture {
        let dir = tempdir().unwrap();
        let working_dir = dir.path().join("pages");
        std::fs::create_dir_all(&working_dir).unwrap();
        let pages = Arc::new(
            PageManager::new(
                PageManagerConfig::new(&working_dir)
                    .with_max_pages_in_memory(max_pages)
                    .with_max_bucket_file_size(4 * PAGE as u64),
            )
            .unwrap(),
        );
        Fixture { dir, pages }
    }

    fn payload(len: usize, seed: u64) -> Vec<u8> {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        (0..len).map(|_| rng.gen()).collect()
    }

    #[test]
    fn test_local_buffer_sizing() {
        let f = fixture(512);
        let file = LogicalFile::create(f.dir.path().join("a.bin"), Arc::clone(&f.pages)).unwrap();
        assert_eq!(file.buffer_capacity, 8);
        assert_eq!(file.precreate_batch, 8);

        let f = fixture(1);
        let file = LogicalFile::create(f.dir.path().join("a.bin"), Arc::clone(&f.pages)).unwrap();
        assert_eq!(file.buffer_capacity, 0);
        assert_eq!(file.precreate_batch, 1);

        let f = fixture(11);
        let file = LogicalFile::create(f.dir.path().join("a.bin"), Arc::clone(&f.pages)).unwrap();
        assert_eq!(file.buffer_capacity, 2);
        assert_eq!(file.precreate_batch, 3);
    }

    #[test]
    fn test_create_writes_sidecar() {
        let f = fixture(8);
        let path = f.dir.path().join("a.bin");
        let file = LogicalFile::create(&path, Arc::clone(&f.pages)).unwrap();
        assert_eq!(file.path(), path.as_path());
        assert!(file.meta_path().exists());
        assert_eq!(file.length(), 0);

        let err = LogicalFile::create(&path, Arc::clone(&f.pages)).unwrap_err();
        assert!(matches!(err, CacheError::Io(_)));
    }

    #[test]
    fn test_write_then_read() {
        let f = fixture(8);
        let file = LogicalFile::create(f.dir.path().join("a.bin"), Arc::clone(&f.pages)).unwrap();
        let mut cursor = file.cursor();

        assert_eq!(file.write(&mut cursor, b"hello paged world").unwrap(), 17);
        assert_eq!(file.length(), 17);
        assert_eq!(cursor.write_position(), 17);

        let mut buf = [0u8; 64];
        assert_eq!(file.read(&mut cursor, &mut buf).unwrap(), 17);
        assert_eq!(&buf[..17], b"hello paged world");
        assert_eq!(file.read(&mut cursor, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_write_spans_pages() {
        let f = fixture(4);
        let file = LogicalFile::create(f.dir.path().join("a.bin"), Arc::clone(&f.pages)).unwrap();
        let data = payload(3 * PAGE + 123, 1);

        let mut cursor = file.cursor();
        file.write(&mut cursor, &data).unwrap();
        assert_eq!(file.length(), data.len() as u64);
        assert_eq!(file.mapped_pages(), 4);

        let mut out = vec![0u8; data.len()];
        let mut read = 0;
        while read < out.len() {
            let end = (read + 1000).min(out.len());
            let n = file.read(&mut cursor, &mut out[read..end]).unwrap();
            assert!(n > 0);
            read += n;
        }
        assert_eq!(out, data);
    }

    #[test]
    fn test_unaligned_appends() {
        let f = fixture(5);
        let file = LogicalFile::create(f.dir.path().join("a.bin"), Arc::clone(&f.pages)).unwrap();
        let data = payload(5 * PAGE, 2);

        let mut cursor = file.cursor();
        for chunk in data.chunks(PAGE - 7) {
            file.write(&mut cursor, chunk).unwrap();
        }
        assert_eq!(file.length(), data.len() as u64);

        let mut out = vec![0u8; data.len()];
        let mut reader = file.cursor();
        assert_eq!(file.read(&mut reader, &mut out).unwrap(), data.len());
        assert_eq!(out, data);
    }

    #[test]
    fn test_overwrite_inside_file() {
        let f = fixture(8);
        let file = LogicalFile::create(f.dir.path().join("a.bin"), Arc::clone(&f.pages)).unwrap();
        let mut cursor = file.cursor();
        file.write(&mut cursor, &vec![b'a'; 2 * PAGE]).unwrap();

        file.seek_for_write(&mut cursor, PAGE as u64 - 2).unwrap();
        file.write(&mut cursor, b"XXXX").unwrap();
        assert_eq!(file.length(), 2 * PAGE as u64);
        assert_eq!(file.mapped_pages(), 2);

        file.seek_for_read(&mut cursor, PAGE as u64 - 3).unwrap();
        let mut buf = [0u8; 6];
        file.read(&mut cursor, &mut buf).unwrap();
        assert_eq!(&buf, b"aXXXXa");
    }

    #[test]
    fn test_seek_clamps_to_length() {
        let f = fixture(8);
        let file = LogicalFile::create(f.dir.path().join("a.bin"), Arc::clone(&f.pages)).unwrap();
        let mut cursor = file.cursor();
        file.write(&mut cursor, b"0123456789").unwrap();

        file.seek_for_read(&mut cursor, 1_000).unwrap();
        assert_eq!(cursor.read_position(), 10);
        file.seek_for_write(&mut cursor, 1_000).unwrap();
        assert_eq!(cursor.write_position(), 10);

        let mut buf = [0u8; 4];
        assert_eq!(file.read(&mut cursor, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_write_past_end_rejected() {
        let f = fixture(8);
        let a = LogicalFile::create(f.dir.path().join("a.bin"), Arc::clone(&f.pages)).unwrap();
        let b = LogicalFile::create(f.dir.path().join("b.bin"), Arc::clone(&f.pages)).unwrap();
        let mut foreign = a.cursor();
        a.write(&mut foreign, &payload(3 * PAGE, 8)).unwrap();

        let err = b.write(&mut foreign, b"xyz").unwrap_err();
        assert!(matches!(err, CacheError::InvalidParameter { .. }));
        assert_eq!(b.length(), 0);
        assert_eq!(b.mapped_pages(), 0);

        // The file stays consistent and reopens cleanly
        let mut cursor = b.cursor();
        b.write(&mut cursor, b"xyz").unwrap();
        b.close().unwrap();
        let reopened = LogicalFile::open(b.path(), Arc::clone(&f.pages)).unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(reopened.read(&mut reopened.cursor(), &mut buf).unwrap(), 3);
        assert_eq!(&buf, b"xyz");
    }

    #[test]
    fn test_cursors_are_independent() {
        let f = fixture(8);
        let file = LogicalFile::create(f.dir.path().join("a.bin"), Arc::clone(&f.pages)).unwrap();
        let mut first = file.cursor();
        file.write(&mut first, b"abc").unwrap();

        // A new cursor appends after existing data
        let mut second = file.cursor();
        assert_eq!(second.write_position(), 3);
        file.write(&mut second, b"def").unwrap();

        let mut buf = [0u8; 6];
        assert_eq!(file.read(&mut first, &mut buf).unwrap(), 6);
        assert_eq!(&buf, b"abcdef");
        assert_eq!(second.read_position(), 0);
    }

    #[test]
    fn test_session_io_traits() {
        let f = fixture(8);
        let file = LogicalFile::create(f.dir.path().join("a.bin"), Arc::clone(&f.pages)).unwrap();
        let data = payload(PAGE + 99, 3);

        let mut session = file.session();
        session.write_all(&data).unwrap();
        session.flush().unwrap();

        let mut out = Vec::new();
        session.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(session.cursor().read_position(), data.len() as u64);
    }

    #[test]
    fn test_close_and_reopen() {
        let f = fixture(6);
        let path = f.dir.path().join("a.bin");
        let data = payload(2 * PAGE + 10, 4);
        {
            let file = LogicalFile::create(&path, Arc::clone(&f.pages)).unwrap();
            let mut cursor = file.cursor();
            file.write(&mut cursor, &data).unwrap();
            file.close().unwrap();
            file.close().unwrap();
            assert!(file.is_closed());

            let mut buf = [0u8; 4];
            assert!(matches!(
                file.read(&mut cursor, &mut buf),
                Err(CacheError::Closed(_))
            ));
            assert!(matches!(
                file.write(&mut cursor, b"x"),
                Err(CacheError::Closed(_))
            ));
        }

        let file = LogicalFile::open(&path, Arc::clone(&f.pages)).unwrap();
        assert_eq!(file.length(), data.len() as u64);
        let mut out = vec![0u8; data.len()];
        let mut cursor = file.cursor();
        assert_eq!(cursor.write_position(), data.len() as u64);
        assert_eq!(file.read(&mut cursor, &mut out).unwrap(), data.len());
        assert_eq!(out, data);
    }

    #[test]
    fn test_open_missing_sidecar() {
        let f = fixture(4);
        let err = LogicalFile::open(f.dir.path().join("nope.bin"), Arc::clone(&f.pages)).unwrap_err();
        assert!(matches!(err, CacheError::Io(_)));
    }

    #[test]
    fn test_data_survives_page_manager_pressure() {
        let f = fixture(3);
        let a = LogicalFile::create(f.dir.path().join("a.bin"), Arc::clone(&f.pages)).unwrap();
        let b = LogicalFile::create(f.dir.path().join("b.bin"), Arc::clone(&f.pages)).unwrap();
        let data_a = payload(4 * PAGE, 5);
        let data_b = payload(4 * PAGE, 6);

        let mut ca = a.cursor();
        let mut cb = b.cursor();
        for (chunk_a, chunk_b) in data_a.chunks(4096).zip(data_b.chunks(4096)) {
            a.write(&mut ca, chunk_a).unwrap();
            b.write(&mut cb, chunk_b).unwrap();
        }
        assert!(f.pages.stats().swapped_out > 0);

        let mut out = vec![0u8; data_a.len()];
        a.read(&mut ca, &mut out).unwrap();
        assert_eq!(out, data_a);
        b.read(&mut cb, &mut out).unwrap();
        assert_eq!(out, data_b);
        assert!(f.pages.size() <= 3);
    }

    #[test]
    fn test_buffered_pages_flushed_on_close() {
        let f = fixture(16);
        let path = f.dir.path().join("a.bin");
        let file = LogicalFile::create(&path, Arc::clone(&f.pages)).unwrap();
        let mut cursor = file.cursor();
        file.write(&mut cursor, &vec![7u8; PAGE]).unwrap();
        file.close().unwrap();

        // Everything is reachable through the page manager alone
        f.pages.flush().unwrap();
        let reopened = LogicalFile::open(&path, Arc::clone(&f.pages)).unwrap();
        let mut out = vec![0u8; PAGE];
        let mut cursor = reopened.cursor();
        reopened.read(&mut cursor, &mut out).unwrap();
        assert!(out.iter().all(|b| *b == 7));
    }
}
