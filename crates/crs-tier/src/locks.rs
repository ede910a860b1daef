use std::sync::{Mutex, MutexGuard, TryLockError};

use crs_types::ContentDigest;

/// Per-digest mutual exclusion, striped over a fixed set of mutexes.
///
/// The ingest path holds a stripe across its lookup-then-insert so two
/// stores of the same content serialize. Background work only ever
/// `try_lock`s, so nothing blocks on a stripe while holding another.
pub struct StripedLocks {
    stripes: Vec<Mutex<()>>,
}

/// Proof that a stripe is held.
pub struct StripeGuard<'a> {
    index: usize,
    _guard: MutexGuard<'a, ()>,
}

impl StripeGuard<'_> {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl StripedLocks {
    pub const DEFAULT_STRIPES: usize = 64;

    pub fn new(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    /// The stripe guarding `digest`.
    pub fn stripe_of(&self, digest: &ContentDigest) -> usize {
        let bytes = digest.as_bytes();
        u16::from_be_bytes([bytes[0], bytes[1]]) as usize % self.stripes.len()
    }

    pub fn lock(&self, digest: &ContentDigest) -> StripeGuard<'_> {
        let index = self.stripe_of(digest);
        StripeGuard {
            index,
            _guard: self.stripes[index].lock().expect("lock poisoned"),
        }
    }

    /// Acquire the stripe without blocking. `None` when contended.
    pub fn try_lock(&self, digest: &ContentDigest) -> Option<StripeGuard<'_>> {
        let index = self.stripe_of(digest);
        match self.stripes[index].try_lock() {
            Ok(guard) => Some(StripeGuard {
                index,
                _guard: guard,
            }),
            Err(TryLockError::WouldBlock) => None,
            Err(TryLockError::Poisoned(_)) => panic!("lock poisoned"),
        }
    }
}

impl Default for StripedLocks {
    fn default() -> Self {
        Self::new(Self::DEFAULT_STRIPES)
    }
}

impl std::fmt::Debug for StripedLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripedLocks")
            .field("stripes", &self.stripes.len())
            .finish()
    }
}
