//! blobcache common types, errors, and configuration.
//!
//! This crate provides shared definitions used across all blobcache components.

pub mod config;
pub mod error;
pub mod page;

pub use config::{BinaryDataConfig, PageManagerConfig};
pub use error::{CacheError, ErrorClass, Result};
pub use page::{PageId, PAGE_SIZE};
