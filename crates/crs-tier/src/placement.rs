use crs_types::{ContentKind, Location, MemoryPool};
use tracing::debug;

/// Default boundary between small and large binary payloads (1 MiB).
pub const DEFAULT_SMALL_BINARY_THRESHOLD: u64 = 1024 * 1024;

/// Routes a new payload to its initial location.
///
/// - binary under the threshold: memory, small-binary pool
/// - binary at or above the threshold: disk
/// - text and structured: memory, general pool, unless larger than the
///   memory-object ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementPolicy {
    pub small_binary_threshold: u64,
    pub memory_object_ceiling: u64,
}

impl PlacementPolicy {
    pub fn new(small_binary_threshold: u64, memory_object_ceiling: u64) -> Self {
        Self {
            small_binary_threshold,
            memory_object_ceiling,
        }
    }

    pub fn classify(&self, kind: ContentKind, size_bytes: u64) -> Location {
        let location = match kind {
            ContentKind::Binary if size_bytes < self.small_binary_threshold => {
                Location::Memory(MemoryPool::SmallBinary)
            }
            ContentKind::Binary => Location::Disk,
            ContentKind::Text | ContentKind::Structured
                if size_bytes > self.memory_object_ceiling =>
            {
                Location::Disk
            }
            ContentKind::Text | ContentKind::Structured => Location::Memory(MemoryPool::General),
        };
        debug!(%kind, size_bytes, %location, "placement");
        location
    }
}

impl Default for PlacementPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_SMALL_BINARY_THRESHOLD, 64 * 1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;

    #[test]
    fn small_binary_goes_to_dedicated_pool() {
        let p = PlacementPolicy::default();
        assert_eq!(
            p.classify(ContentKind::Binary, 500 * KIB),
            Location::Memory(MemoryPool::SmallBinary)
        );
    }

    #[test]
    fn large_binary_goes_to_disk() {
        let p = PlacementPolicy::default();
        assert_eq!(p.classify(ContentKind::Binary, 2 * MIB), Location::Disk);
        assert_eq!(p.classify(ContentKind::Binary, MIB), Location::Disk);
        assert_eq!(
            p.classify(ContentKind::Binary, MIB - 1),
            Location::Memory(MemoryPool::SmallBinary)
        );
    }

    #[test]
    fn text_stays_in_memory_regardless_of_binary_threshold() {
        let p = PlacementPolicy::default();
        assert_eq!(
            p.classify(ContentKind::Text, 10 * MIB),
            Location::Memory(MemoryPool::General)
        );
        assert_eq!(
            p.classify(ContentKind::Structured, 0),
            Location::Memory(MemoryPool::General)
        );
    }

    #[test]
    fn ceiling_routes_oversized_text_to_disk() {
        let p = PlacementPolicy::new(MIB, 4 * MIB);
        assert_eq!(
            p.classify(ContentKind::Text, 4 * MIB),
            Location::Memory(MemoryPool::General)
        );
        assert_eq!(p.classify(ContentKind::Text, 4 * MIB + 1), Location::Disk);
        assert_eq!(p.classify(ContentKind::Structured, 5 * MIB), Location::Disk);
    }
}
