//! Counting admission gate bounding the resident page set.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A counting semaphore sized to the resident page limit.
///
/// Every resident page owns exactly one permit. A permit is acquired
/// before a page enters the resident set and released when the page is
/// swapped out, so `capacity - available_permits()` is the resident count.
pub struct AdmissionGate {
    capacity: usize,
    available: Mutex<usize>,
    released: Condvar,
}

impl AdmissionGate {
    /// Creates a gate with `capacity` permits available.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            available: Mutex::new(capacity),
            released: Condvar::new(),
        }
    }

    /// Returns the number of permits the gate was created with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of permits currently available.
    pub fn available_permits(&self) -> usize {
        *self.available.lock()
    }

    /// Takes a permit if one is available, without blocking.
    pub fn try_acquire(&self) -> Option<GatePermit<'_>> {
        let mut available = self.available.lock();
        if *available == 0 {
            return None;
        }
        *available -= 1;
        Some(GatePermit { gate: self })
    }

    /// Takes a permit, waiting at most `timeout` for one to be released.
    pub fn acquire_timeout(&self, timeout: Duration) -> Option<GatePermit<'_>> {
        let deadline = Instant::now() + timeout;
        let mut available = self.available.lock();
        while *available == 0 {
            if self.released.wait_until(&mut available, deadline).timed_out() {
                if *available == 0 {
                    return None;
                }
                break;
            }
        }
        *available -= 1;
        Some(GatePermit { gate: self })
    }

    /// Returns `count` permits to the gate.
    ///
    /// The available count never exceeds the capacity.
    pub fn release(&self, count: usize) {
        if count == 0 {
            return;
        }
        let mut available = self.available.lock();
        *available = (*available + count).min(self.capacity);
        drop(available);
        self.released.notify_all();
    }
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("capacity", &self.capacity)
            .field("available", &self.available_permits())
            .finish()
    }
}

/// A permit taken from an [`AdmissionGate`].
///
/// Dropping the permit returns it to the gate. Calling
/// [`GatePermit::forget`] hands it over to a resident page instead; it is
/// then returned through [`AdmissionGate::release`] on eviction.
#[must_use = "dropping a permit releases it immediately"]
pub struct GatePermit<'a> {
    gate: &'a AdmissionGate,
}

impl GatePermit<'_> {
    /// Keeps the permit consumed after this guard is gone.
    pub fn forget(self) {
        std::mem::forget(self);
    }
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        self.gate.release(1);
    }
}
