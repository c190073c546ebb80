//! Page manager constants.

use std::time::Duration;

/// Attempts made by `get`, `modify` and `close` before giving up, and the
/// number of consecutive fruitless eviction rounds tolerated on admission.
pub const MAX_RETRY_COUNT: usize = 3;

/// Timeout for page leases and bucket file locks.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(3);

/// How long a retry round waits for a permit or lease released by another thread.
pub const RETRY_WAIT: Duration = Duration::from_millis(100);

/// Lower bound on the resident page limit picked by `PageManager::auto_sized`.
pub const MIN_AUTO_SIZED_PAGES: usize = 64;
