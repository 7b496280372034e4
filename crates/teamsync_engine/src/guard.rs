//! Binary gate preventing overlapping sync sessions.

use std::sync::atomic::{AtomicBool, Ordering};

/// A non-queuing mutual-exclusion gate.
///
/// A caller that cannot acquire the gate is expected to skip its attempt
/// rather than wait: the next scheduled tick retries soon, and waiting
/// callers would pile up behind a slow remote.
#[derive(Debug, Default)]
pub struct ConcurrencyGuard {
    held: AtomicBool,
}

impl ConcurrencyGuard {
    /// Creates an open gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to close the gate. Returns false if it is already held.
    pub fn try_acquire(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Reopens the gate.
    pub fn release(&self) {
        self.held.store(false, Ordering::Release);
    }

    /// Returns true while some caller holds the gate.
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Acquires the gate, returning a permit that releases it on drop.
    pub fn try_lock(&self) -> Option<GuardPermit<'_>> {
        self.try_acquire().then_some(GuardPermit { guard: self })
    }
}

/// Proof of holding a [`ConcurrencyGuard`]; releases it when dropped.
#[derive(Debug)]
pub struct GuardPermit<'a> {
    guard: &'a ConcurrencyGuard,
}

impl Drop for GuardPermit<'_> {
    fn drop(&mut self) {
        self.guard.release();
    }
}
