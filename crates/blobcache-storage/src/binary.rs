//! Binary payload manager.

use crate::file::LogicalFile;
use crate::handle::BinaryContentMetaData;
use blobcache_buffer::PageManager;
use blobcache_common::config::BinaryDataConfig;
use blobcache_common::{CacheError, Result};
use bytes::{Bytes, BytesMut};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

struct DataFiles {
    /// File new payloads are appended to.
    active: Option<Arc<LogicalFile>>,
    /// Every logical file created so far, in creation order.
    created: Vec<PathBuf>,
    closed: bool,
}

/// Stores whole binary payloads in rotating logical files.
///
/// Each manager works in a private `binary_<uuid>` directory under the
/// configured parent and removes it on close. Writes are serialized;
/// a payload is never split across two logical files.
pub struct BinaryDataManager {
    config: BinaryDataConfig,
    working_dir: PathBuf,
    pages: Arc<PageManager>,
    files: Mutex<DataFiles>,
}

impl BinaryDataManager {
    /// Creates a manager with its own working directory.
    pub fn new(config: BinaryDataConfig) -> Result<Self> {
        config.validate()?;

        let working_dir = config
            .working_dir
            .join(format!("binary_{}", Uuid::new_v4().simple()));
        std::fs::create_dir_all(&working_dir)?;
        let pages = Arc::new(PageManager::new(config.page_manager_config(&working_dir))?);

        info!(
            "Binary data manager is created, dir={}, max_pages_in_memory={}, max_data_file_size={}",
            working_dir.display(),
            config.max_pages_in_memory,
            config.max_data_file_size
        );

        Ok(Self {
            config,
            working_dir,
            pages,
            files: Mutex::new(DataFiles {
                active: None,
                created: Vec::new(),
                closed: false,
            }),
        })
    }

    /// Returns the private working directory.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Returns the page manager backing all logical files.
    pub fn page_manager(&self) -> &Arc<PageManager> {
        &self.pages
    }

    /// Returns the paths of all logical files created so far.
    pub fn data_files(&self) -> Vec<PathBuf> {
        self.files.lock().created.clone()
    }

    /// Appends everything `reader` yields to the active logical file.
    ///
    /// Rotates to a new file first if the active one has reached
    /// `max_data_file_size`.
    pub fn write<R: Read + ?Sized>(&self, reader: &mut R) -> Result<BinaryContentMetaData> {
        let mut files = self.files.lock();
        if files.closed {
            return Err(CacheError::Closed("binary data manager"));
        }

        let file = self.active_file(&mut files)?;
        let mut cursor = file.cursor();
        let offset = cursor.write_position();

        let mut chunk = vec![0u8; self.config.write_chunk_size];
        let mut total = 0u64;
        loop {
            let n = match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            file.write(&mut cursor, &chunk[..n])?;
            total += n as u64;
        }

        let handle = BinaryContentMetaData::new(file.path().to_string_lossy(), offset, total);
        debug!("Binary payload is written, handle={}", handle);
        Ok(handle)
    }

    /// Same as [`BinaryDataManager::write`] for an in-memory payload.
    pub fn write_bytes(&self, data: &[u8]) -> Result<BinaryContentMetaData> {
        let mut reader = data;
        self.write(&mut reader)
    }

    /// Reads a payload back as an in-memory stream.
    pub fn read(&self, handle: &BinaryContentMetaData) -> Result<Cursor<Bytes>> {
        Ok(Cursor::new(self.read_bytes(handle)?))
    }

    /// Reads a payload back.
    ///
    /// Fails with `ShortRead` if the file ends before the payload does.
    pub fn read_bytes(&self, handle: &BinaryContentMetaData) -> Result<Bytes> {
        let path = Path::new(handle.file_path());
        if !path.starts_with(&self.working_dir) {
            return Err(CacheError::invalid_parameter("file_path", handle.file_path()));
        }

        let files = self.files.lock();
        if files.closed {
            return Err(CacheError::Closed("binary data manager"));
        }
        if let Some(active) = files.active.as_ref().filter(|file| file.path() == path) {
            return self.read_from(active, handle);
        }
        drop(files);

        let file = LogicalFile::open(path, Arc::clone(&self.pages))?;
        self.read_from(&file, handle)
    }

    /// Closes the active file and the page manager, then removes the
    /// working directory. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut files = self.files.lock();
        if files.closed {
            return Ok(());
        }

        if let Some(active) = files.active.take() {
            active.close()?;
        }
        self.pages.close()?;
        match std::fs::remove_dir_all(&self.working_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        files.closed = true;

        info!(
            "Binary data manager is closed, dir={}, files={}",
            self.working_dir.display(),
            files.created.len()
        );
        Ok(())
    }

    fn active_file(&self, files: &mut DataFiles) -> Result<Arc<LogicalFile>> {
        if let Some(active) = &files.active {
            if active.length() < self.config.max_data_file_size {
                return Ok(Arc::clone(active));
            }
            active.close()?;
            debug!(
                "Data file is full, rotating, path={}, length={}",
                active.path().display(),
                active.length()
            );
        }

        let path = self
            .working_dir
            .join(format!("data_{}.bin", files.created.len()));
        let file = Arc::new(LogicalFile::create(&path, Arc::clone(&self.pages))?);
        files.created.push(path);
        files.active = Some(Arc::clone(&file));
        Ok(file)
    }

    fn read_from(&self, file: &LogicalFile, handle: &BinaryContentMetaData) -> Result<Bytes> {
        let size = handle.size_in_bytes();
        let available = file.length().saturating_sub(handle.offset());
        if available < size {
            return Err(CacheError::ShortRead {
                expected: size,
                actual: available,
            });
        }

        let capacity = usize::try_from(size)
            .map_err(|_| CacheError::invalid_parameter("size_in_bytes", size))?;
        let mut cursor = file.cursor();
        file.seek_for_read(&mut cursor, handle.offset())?;

        let mut out = BytesMut::with_capacity(capacity);
        let mut chunk = vec![0u8; self.config.read_chunk_size];
        while out.len() < capacity {
            let want = chunk.len().min(capacity - out.len());
            let n = file.read(&mut cursor, &mut chunk[..want])?;
            if n == 0 {
                return Err(CacheError::ShortRead {
                    expected: size,
                    actual: out.len() as u64,
                });
            }
            out.extend_from_slice(&chunk[..n]);
        }
        Ok(out.freeze())
    }
}

impl Drop for BinaryDataManager {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(
                "Binary data manager could not be closed cleanly, dir={}, error={}",
                self.working_dir.display(),
                e
            );
        }
    }
}

impl std::fmt::Debug for BinaryDataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryDataManager")
            .field("working_dir", &self.working_dir)
            .field("pages", &self.pages)
            .finish()
    }
}
