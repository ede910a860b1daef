use crs_types::{ContentDigest, ContentKind};

use crate::canonical::canonicalize;

/// Domain-separated BLAKE3 content hasher.
///
/// The domain tag is prepended to every hash computation, so CRS digests
/// never collide with plain BLAKE3 hashes of the same bytes computed by
/// other systems sharing a disk root.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for context payloads. Every store digest comes from this one.
    pub const CONTEXT: Self = Self {
        domain: "crs-context-v1",
    };

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> ContentDigest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        ContentDigest::from_hash(*hasher.finalize().as_bytes())
    }

    /// Canonicalize `data` for `kind`, then hash the canonical form.
    ///
    /// Returns the digest together with the bytes that must be stored.
    pub fn digest(
        &self,
        kind: ContentKind,
        data: &[u8],
    ) -> Result<(ContentDigest, Vec<u8>), HasherError> {
        let canonical = canonicalize(kind, data)?;
        let digest = self.hash(&canonical);
        Ok((digest, canonical.into_owned()))
    }
}

/// Errors from hashing and canonicalization.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("text content is not valid UTF-8: {0}")]
    InvalidUtf8(String),

    #[error("structured content is not valid JSON: {0}")]
    InvalidJson(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let data = b"hello world";
        assert_eq!(
            ContentHasher::CONTEXT.hash(data),
            ContentHasher::CONTEXT.hash(data)
        );
    }

    #[test]
    fn digest_differs_from_plain_blake3() {
        let plain = *blake3::hash(b"payload").as_bytes();
        assert_ne!(*ContentHasher::CONTEXT.hash(b"payload").as_bytes(), plain);
    }

    #[test]
    fn different_content_different_digest() {
        assert_ne!(
            ContentHasher::CONTEXT.hash(b"original"),
            ContentHasher::CONTEXT.hash(b"tampered")
        );
    }

    #[test]
    fn binary_digest_keeps_bytes() {
        let data = vec![0u8, 159, 146, 150];
        let (digest, stored) = ContentHasher::CONTEXT
            .digest(ContentKind::Binary, &data)
            .unwrap();
        assert_eq!(stored, data);
        assert_eq!(digest, ContentHasher::CONTEXT.hash(&data));
    }

    #[test]
    fn structured_digest_ignores_key_order() {
        let (a, _) = ContentHasher::CONTEXT
            .digest(ContentKind::Structured, br#"{"b": 2, "a": 1}"#)
            .unwrap();
        let (b, stored) = ContentHasher::CONTEXT
            .digest(ContentKind::Structured, br#"{"a":1,"b":2}"#)
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(stored, br#"{"a":1,"b":2}"#);
    }

    #[test]
    fn text_must_be_utf8() {
        let err = ContentHasher::CONTEXT
            .digest(ContentKind::Text, &[0xff, 0xfe])
            .unwrap_err();
        assert!(matches!(err, HasherError::InvalidUtf8(_)));
    }
}
