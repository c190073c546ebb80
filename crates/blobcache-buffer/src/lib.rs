//! Page pool management for blobcache.
//!
//! This crate provides a bounded in-memory page set with:
//! - Fixed-size 32 KB pages with exclusive leases and explicit cursors
//! - Admission gate capping the number of resident pages
//! - LRU eviction that skips leased pages
//! - Swap-out to bucket files at deterministic offsets

mod bucket;
pub mod constants;
mod gate;
mod manager;
mod page;
mod resident;

pub use bucket::PagePlacement;
pub use gate::{AdmissionGate, GatePermit};
pub use manager::{PageManager, PageManagerStats};
pub use page::{Page, PageCursor, PageLease};
pub use resident::ResidentPageIndex;
