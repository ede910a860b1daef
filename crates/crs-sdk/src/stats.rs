use serde::Serialize;

/// Point-in-time counters for a store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub entries: usize,
    pub memory_entries: usize,
    pub disk_entries: usize,
    pub memory_bytes_used: u64,
    pub general_pool_bytes_used: u64,
    pub small_binary_pool_bytes_used: u64,
    pub memory_capacity_bytes: u64,
    pub disk_bytes_used: u64,
    pub disk_capacity_bytes: u64,
    /// Stores that wrote new content.
    pub stores: u64,
    /// Stores answered by an existing entry.
    pub dedup_hits: u64,
    pub retrieves: u64,
    pub evictions: u64,
    pub expired_evictions: u64,
    pub demotions: u64,
    pub promotions: u64,
    pub eviction_passes: u64,
    pub degraded_events: u64,
    pub contended_skips: u64,
}

impl StoreStats {
    /// Fraction of store calls answered by deduplication.
    pub fn dedup_ratio(&self) -> f64 {
        let total = self.stores + self.dedup_hits;
        if total == 0 {
            return 0.0;
        }
        self.dedup_hits as f64 / total as f64
    }
}
