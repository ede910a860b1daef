use std::fmt;

use serde::{Deserialize, Serialize};

use crate::digest::ContentDigest;

/// A storage tier with its own cost, latency, and capacity profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Memory,
    Disk,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Disk => write!(f, "disk"),
        }
    }
}

/// Subdivision of the memory tier.
///
/// Both pools draw from one shared memory budget; the split only affects
/// placement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryPool {
    /// Text and structured payloads, plus promoted entries.
    General,
    /// Binary payloads under the small-binary threshold.
    SmallBinary,
}

impl fmt::Display for MemoryPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::General => write!(f, "general"),
            Self::SmallBinary => write!(f, "small-binary"),
        }
    }
}

/// Concrete backend a payload resides in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Location {
    Memory(MemoryPool),
    Disk,
}

impl Location {
    /// The tier this location belongs to.
    pub fn tier(&self) -> Tier {
        match self {
            Self::Memory(_) => Tier::Memory,
            Self::Disk => Tier::Disk,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory(pool) => write!(f, "memory/{pool}"),
            Self::Disk => write!(f, "disk"),
        }
    }
}

/// Backend-specific handle to a resident payload.
///
/// Handles are lookup keys only; they never own bytes. A handle goes stale
/// once its payload is moved or reclaimed, after which backend reads fail
/// with `NotFound`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle {
    pub location: Location,
    pub digest: ContentDigest,
}

impl Handle {
    pub fn new(location: Location, digest: ContentDigest) -> Self {
        Self { location, digest }
    }

    pub fn tier(&self) -> Tier {
        self.location.tier()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_maps_to_tier() {
        assert_eq!(Location::Memory(MemoryPool::General).tier(), Tier::Memory);
        assert_eq!(Location::Memory(MemoryPool::SmallBinary).tier(), Tier::Memory);
        assert_eq!(Location::Disk.tier(), Tier::Disk);
    }

    #[test]
    fn location_display() {
        assert_eq!(
            Location::Memory(MemoryPool::SmallBinary).to_string(),
            "memory/small-binary"
        );
        assert_eq!(Location::Disk.to_string(), "disk");
    }

    #[test]
    fn handle_tier_follows_location() {
        let handle = Handle::new(Location::Disk, ContentDigest::from_hash([4; 32]));
        assert_eq!(handle.tier(), Tier::Disk);
    }
}
