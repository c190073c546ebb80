//! Logical files and binary payload storage for blobcache.
//!
//! This crate provides:
//! - Logical pointers and the versioned metadata sidecar
//! - Logical files mapping byte positions onto managed pages
//! - A payload manager writing whole binary values into rotating files

mod binary;
mod file;
mod handle;
pub mod meta;
mod pointer;

pub use binary::BinaryDataManager;
pub use file::{FileCursor, FileSession, LogicalFile};
pub use handle::BinaryContentMetaData;
pub use meta::MetaInfo;
pub use pointer::LogicalPointer;
