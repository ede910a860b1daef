use crs_types::{ContentDigest, ContextReference};

/// Transient scoring view of a resident entry. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionCandidate {
    pub digest: ContentDigest,
    pub size_bytes: u64,
    pub created_at_ms: u64,
    pub last_access_ms: u64,
    pub access_count: u64,
    pub expires_at_ms: Option<u64>,
    pub ref_count: u64,
}

impl EvictionCandidate {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_ms.is_some_and(|at| now_ms >= at)
    }

    /// Held by at least one caller or in-flight read.
    pub fn in_use(&self) -> bool {
        self.ref_count > 0
    }

    /// Milliseconds since the last access.
    pub fn idle_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_access_ms)
    }

    /// Milliseconds since ingestion.
    pub fn resident_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.created_at_ms)
    }
}

impl From<&ContextReference> for EvictionCandidate {
    fn from(reference: &ContextReference) -> Self {
        Self {
            digest: reference.digest,
            size_bytes: reference.metadata.size_bytes,
            created_at_ms: reference.metadata.created_at_ms,
            last_access_ms: reference.last_access_ms,
            access_count: reference.access_count,
            expires_at_ms: reference.expires_at_ms,
            ref_count: reference.ref_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crs_types::{ContentKind, ContextMetadata, Handle, Location, Tier};

    #[test]
    fn from_reference_copies_scoring_fields() {
        let digest = ContentDigest::from_hash([2; 32]);
        let reference = ContextReference {
            digest,
            metadata: ContextMetadata::new(ContentKind::Text, 77, 100),
            tier: Tier::Memory,
            handle: Handle::new(Location::Disk, digest),
            ref_count: 3,
            last_access_ms: 400,
            access_count: 5,
            expires_at_ms: Some(900),
        };
        let candidate = EvictionCandidate::from(&reference);
        assert_eq!(candidate.size_bytes, 77);
        assert_eq!(candidate.created_at_ms, 100);
        assert_eq!(candidate.access_count, 5);
        assert!(candidate.in_use());
        assert!(candidate.is_expired(900));
        assert_eq!(candidate.idle_ms(1_000), 600);
        assert_eq!(candidate.resident_ms(50), 0);
    }
}
