use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use crs_types::{ContentDigest, Handle, Location, MemoryPool};

use crate::budget::CapacityBudget;
use crate::error::{StoreError, StoreResult};
use crate::traits::TierBackend;

/// One bounded in-memory pool.
///
/// Payloads are held as [`Bytes`], so reads hand out cheap reference-counted
/// views instead of copies. Capacity is charged against a budget that may be
/// shared with sibling pools.
pub struct MemoryPoolBackend {
    pool: MemoryPool,
    budget: Arc<CapacityBudget>,
    bytes_used: AtomicU64,
    payloads: RwLock<HashMap<ContentDigest, Bytes>>,
}

impl MemoryPoolBackend {
    /// Create a pool charging against `budget`.
    pub fn new(pool: MemoryPool, budget: Arc<CapacityBudget>) -> Self {
        Self {
            pool,
            budget,
            bytes_used: AtomicU64::new(0),
            payloads: RwLock::new(HashMap::new()),
        }
    }

    pub fn pool(&self) -> MemoryPool {
        self.pool
    }

    /// Number of payloads in this pool.
    pub fn len(&self) -> usize {
        self.payloads.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.read().expect("lock poisoned").is_empty()
    }

    fn owns(&self, handle: &Handle) -> bool {
        handle.location == Location::Memory(self.pool)
    }
}

impl TierBackend for MemoryPoolBackend {
    fn location(&self) -> Location {
        Location::Memory(self.pool)
    }

    fn put(&self, digest: &ContentDigest, data: Bytes) -> StoreResult<Handle> {
        let handle = Handle::new(self.location(), *digest);
        let size = data.len() as u64;
        let mut map = self.payloads.write().expect("lock poisoned");
        if map.contains_key(digest) {
            return Ok(handle);
        }
        self.budget
            .try_reserve(size)
            .map_err(|available| StoreError::CapacityExceeded {
                location: self.location(),
                requested: size,
                available,
            })?;
        map.insert(*digest, data);
        self.bytes_used.fetch_add(size, Ordering::AcqRel);
        Ok(handle)
    }

    fn get(&self, handle: &Handle) -> StoreResult<Bytes> {
        if !self.owns(handle) {
            return Err(StoreError::NotFound(handle.digest));
        }
        let map = self.payloads.read().expect("lock poisoned");
        map.get(&handle.digest)
            .cloned()
            .ok_or(StoreError::NotFound(handle.digest))
    }

    fn remove(&self, handle: &Handle) -> StoreResult<u64> {
        if !self.owns(handle) {
            return Err(StoreError::NotFound(handle.digest));
        }
        let mut map = self.payloads.write().expect("lock poisoned");
        let data = map
            .remove(&handle.digest)
            .ok_or(StoreError::NotFound(handle.digest))?;
        let size = data.len() as u64;
        self.bytes_used.fetch_sub(size, Ordering::AcqRel);
        self.budget.release(size);
        Ok(size)
    }

    fn contains(&self, handle: &Handle) -> bool {
        self.owns(handle)
            && self
                .payloads
                .read()
                .expect("lock poisoned")
                .contains_key(&handle.digest)
    }

    fn current_bytes_used(&self) -> u64 {
        self.bytes_used.load(Ordering::Acquire)
    }

    fn capacity_bytes(&self) -> u64 {
        self.budget.capacity()
    }

    fn available_bytes(&self) -> u64 {
        self.budget.available()
    }
}

impl std::fmt::Debug for MemoryPoolBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPoolBackend")
            .field("pool", &self.pool)
            .field("payload_count", &self.len())
            .field("bytes_used", &self.current_bytes_used())
            .finish()
    }
}

/// The memory tier: a general pool and a small-binary pool sharing one budget.
#[derive(Debug)]
pub struct MemoryTier {
    budget: Arc<CapacityBudget>,
    general: MemoryPoolBackend,
    small_binary: MemoryPoolBackend,
}

impl MemoryTier {
    pub fn new(capacity_bytes: u64) -> Self {
        let budget = Arc::new(CapacityBudget::new(capacity_bytes));
        Self {
            general: MemoryPoolBackend::new(MemoryPool::General, Arc::clone(&budget)),
            small_binary: MemoryPoolBackend::new(MemoryPool::SmallBinary, Arc::clone(&budget)),
            budget,
        }
    }

    pub fn pool(&self, pool: MemoryPool) -> &MemoryPoolBackend {
        match pool {
            MemoryPool::General => &self.general,
            MemoryPool::SmallBinary => &self.small_binary,
        }
    }

    /// The budget shared by both pools.
    pub fn budget(&self) -> &Arc<CapacityBudget> {
        &self.budget
    }

    /// Bytes held across both pools.
    pub fn bytes_used(&self) -> u64 {
        self.budget.used()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(n: u8) -> ContentDigest {
        ContentDigest::from_hash([n; 32])
    }

    #[test]
    fn put_and_get() {
        let tier = MemoryTier::new(1024);
        let pool = tier.pool(MemoryPool::General);
        let handle = pool.put(&digest(1), Bytes::from_static(b"hello")).unwrap();
        assert_eq!(handle.location, Location::Memory(MemoryPool::General));
        assert_eq!(pool.get(&handle).unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(pool.current_bytes_used(), 5);
        assert_eq!(tier.bytes_used(), 5);
    }

    #[test]
    fn put_is_idempotent() {
        let tier = MemoryTier::new(1024);
        let pool = tier.pool(MemoryPool::General);
        pool.put(&digest(1), Bytes::from_static(b"abc")).unwrap();
        pool.put(&digest(1), Bytes::from_static(b"abc")).unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(tier.bytes_used(), 3);
    }

    #[test]
    fn pools_share_the_budget() {
        let tier = MemoryTier::new(10);
        tier.pool(MemoryPool::General)
            .put(&digest(1), Bytes::from(vec![0u8; 6]))
            .unwrap();
        let err = tier
            .pool(MemoryPool::SmallBinary)
            .put(&digest(2), Bytes::from(vec![0u8; 6]))
            .unwrap_err();
        match err {
            StoreError::CapacityExceeded {
                location,
                requested,
                available,
            } => {
                assert_eq!(location, Location::Memory(MemoryPool::SmallBinary));
                assert_eq!(requested, 6);
                assert_eq!(available, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(tier.pool(MemoryPool::SmallBinary).available_bytes(), 4);
    }

    #[test]
    fn remove_frees_budget() {
        let tier = MemoryTier::new(10);
        let pool = tier.pool(MemoryPool::SmallBinary);
        let handle = pool.put(&digest(3), Bytes::from(vec![1u8; 8])).unwrap();
        assert_eq!(pool.remove(&handle).unwrap(), 8);
        assert_eq!(tier.bytes_used(), 0);
        assert!(!pool.contains(&handle));
    }

    #[test]
    fn stale_handle_is_not_found() {
        let tier = MemoryTier::new(10);
        let pool = tier.pool(MemoryPool::General);
        let handle = pool.put(&digest(4), Bytes::from_static(b"x")).unwrap();
        pool.remove(&handle).unwrap();
        assert!(matches!(pool.get(&handle), Err(StoreError::NotFound(_))));
        assert!(matches!(pool.remove(&handle), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn handle_from_other_pool_is_rejected() {
        let tier = MemoryTier::new(100);
        let handle = tier
            .pool(MemoryPool::General)
            .put(&digest(5), Bytes::from_static(b"general"))
            .unwrap();
        let small = tier.pool(MemoryPool::SmallBinary);
        assert!(!small.contains(&handle));
        assert!(matches!(small.get(&handle), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn debug_format() {
        let tier = MemoryTier::new(100);
        let debug = format!("{:?}", tier.pool(MemoryPool::General));
        assert!(debug.contains("MemoryPoolBackend"));
        assert!(debug.contains("payload_count"));
    }
}
