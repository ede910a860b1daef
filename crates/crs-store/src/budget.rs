use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free byte budget shared by the backends of one tier.
///
/// Reservations either fit entirely or fail; the counter never exceeds the
/// capacity.
#[derive(Debug)]
pub struct CapacityBudget {
    capacity: u64,
    used: AtomicU64,
}

impl CapacityBudget {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            used: AtomicU64::new(0),
        }
    }

    /// Reserve `bytes`. On failure returns the bytes that were available.
    pub fn try_reserve(&self, bytes: u64) -> Result<(), u64> {
        let mut current = self.used.load(Ordering::Acquire);
        loop {
            let next = current.saturating_add(bytes);
            if next > self.capacity {
                return Err(self.capacity.saturating_sub(current));
            }
            match self.used.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(observed) => current = observed,
            }
        }
    }

    /// Account for bytes that are already resident, even past capacity.
    ///
    /// Only used when indexing payloads found on disk at open time.
    pub fn charge(&self, bytes: u64) {
        self.used.fetch_add(bytes, Ordering::AcqRel);
    }

    /// Return previously reserved bytes.
    pub fn release(&self, bytes: u64) {
        let mut current = self.used.load(Ordering::Acquire);
        loop {
            let next = current.saturating_sub(bytes);
            match self.used.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn available(&self) -> u64 {
        self.capacity.saturating_sub(self.used())
    }

    /// Fraction of the budget still free, in `[0.0, 1.0]`.
    pub fn headroom_fraction(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.available() as f64 / self.capacity as f64
    }
}
