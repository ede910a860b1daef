use serde::{Deserialize, Serialize};

use crate::content::ContextMetadata;
use crate::digest::ContentDigest;
use crate::tier::{Handle, Tier};

/// Read-only snapshot of a reference-table record.
///
/// Callers receive these from the store and hand them back for `retrieve` and
/// `release`. Mutating a copy has no effect on the store; the table is the
/// single source of truth.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextReference {
    pub digest: ContentDigest,
    pub metadata: ContextMetadata,
    pub tier: Tier,
    pub handle: Handle,
    pub ref_count: u64,
    pub last_access_ms: u64,
    pub access_count: u64,
    pub expires_at_ms: Option<u64>,
}

impl ContextReference {
    /// Returns `true` once `now_ms` has reached the expiry timestamp.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_ms.is_some_and(|at| now_ms >= at)
    }

    /// Size of the stored payload in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.metadata.size_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentKind;
    use crate::tier::Location;

    fn sample(expires_at_ms: Option<u64>) -> ContextReference {
        let digest = ContentDigest::from_hash([9; 32]);
        ContextReference {
            digest,
            metadata: ContextMetadata::new(ContentKind::Binary, 10, 0),
            tier: Tier::Disk,
            handle: Handle::new(Location::Disk, digest),
            ref_count: 1,
            last_access_ms: 0,
            access_count: 0,
            expires_at_ms,
        }
    }

    #[test]
    fn expiry_is_inclusive() {
        let reference = sample(Some(500));
        assert!(!reference.is_expired(499));
        assert!(reference.is_expired(500));
        assert!(reference.is_expired(501));
    }

    #[test]
    fn no_expiry_never_expires() {
        assert!(!sample(None).is_expired(u64::MAX));
    }
}
