//! Error types for blobcache.

use thiserror::Error;

/// Result type alias using CacheError.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Broad classification of a [`CacheError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Invalid construction parameters. Never retryable.
    Configuration,
    /// The resident page budget could not be freed in time.
    Capacity,
    /// Broken internal invariants: missing pages, short reads, double mapping.
    Consistency,
    /// A bounded lock acquisition gave up.
    Contention,
    /// Underlying file system failure.
    Io,
}

/// Errors that can occur in blobcache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },

    // Lifecycle
    #[error("{0} is closed")]
    Closed(&'static str),

    // Page errors
    #[error("Page with id {page_id} does not exist")]
    PageNotFound { page_id: u32 },

    #[error("Physical page is not found for logical page {logical_page_id}")]
    LogicalPageNotMapped { logical_page_id: u32 },

    #[error("Logical page {logical_page_id} has been mapped to physical page {physical_page_id}")]
    PageAlreadyMapped {
        logical_page_id: u32,
        physical_page_id: u32,
    },

    #[error("Page overflow: capacity {capacity}, requested {requested}")]
    PageOverflow { capacity: usize, requested: usize },

    // Capacity errors
    #[error("Failed to admit {requested} pages, no page could be swapped out after {attempts} attempts")]
    CapacityExhausted { requested: usize, attempts: usize },

    #[error("Failed to {operation} page {page_id} after {attempts} attempts")]
    RetriesExhausted {
        operation: &'static str,
        page_id: u32,
        attempts: usize,
    },

    // Contention errors
    #[error("Timed out acquiring lock on {resource}")]
    LockTimeout { resource: String },

    #[error("Failed to close page manager, {count} pages are still leased")]
    PagesLeased { count: usize },

    // Consistency errors
    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: u64, actual: u64 },

    #[error("Metadata corrupted: {0}")]
    MetaCorrupted(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Returns the broad class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            CacheError::Io(_) => ErrorClass::Io,
            CacheError::ConfigError(_) | CacheError::InvalidParameter { .. } => {
                ErrorClass::Configuration
            }
            CacheError::CapacityExhausted { .. } | CacheError::RetriesExhausted { .. } => {
                ErrorClass::Capacity
            }
            CacheError::LockTimeout { .. } | CacheError::PagesLeased { .. } => {
                ErrorClass::Contention
            }
            CacheError::Serde(_)
            | CacheError::Closed(_)
            | CacheError::PageNotFound { .. }
            | CacheError::LogicalPageNotMapped { .. }
            | CacheError::PageAlreadyMapped { .. }
            | CacheError::PageOverflow { .. }
            | CacheError::ShortRead { .. }
            | CacheError::MetaCorrupted(_)
            | CacheError::Internal(_) => ErrorClass::Consistency,
        }
    }

    /// Shorthand for an [`CacheError::InvalidParameter`].
    pub fn invalid_parameter(name: &str, value: impl std::fmt::Display) -> Self {
        CacheError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

impl From<CacheError> for std::io::Error {
    fn from(err: CacheError) -> Self {
        use std::io::ErrorKind;
        let kind = match &err {
            CacheError::Io(e) => e.kind(),
            CacheError::ConfigError(_) | CacheError::InvalidParameter { .. } => {
                ErrorKind::InvalidInput
            }
            CacheError::LockTimeout { .. } => ErrorKind::TimedOut,
            CacheError::ShortRead { .. } => ErrorKind::UnexpectedEof,
            CacheError::MetaCorrupted(_) | CacheError::Serde(_) => ErrorKind::InvalidData,
            _ => ErrorKind::Other,
        };
        match err {
            CacheError::Io(e) => e,
            other => std::io::Error::new(kind, other),
        }
    }
}
