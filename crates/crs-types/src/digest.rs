use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Width of a [`ContentDigest`] in bytes.
pub const DIGEST_LEN: usize = 32;

/// 256-bit cryptographic fingerprint of a payload's canonical bytes.
///
/// Equal content always produces an equal digest, which makes the digest the
/// deduplication key for the whole store. Digests are produced by
/// `crs_crypto::ContentHasher`; this type only carries and encodes them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentDigest([u8; DIGEST_LEN]);

impl ContentDigest {
    /// Wrap a pre-computed hash.
    pub const fn from_hash(hash: [u8; DIGEST_LEN]) -> Self {
        Self(hash)
    }

    /// The raw 32-byte hash.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Hex-encoded string representation (64 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// First byte of the digest, used for fan-out and shard selection.
    pub fn fan_out(&self) -> u8 {
        self.0[0]
    }

    /// Parse from a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s.trim()).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != DIGEST_LEN {
            return Err(TypeError::InvalidLength {
                expected: DIGEST_LEN,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; DIGEST_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.short_hex())
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; DIGEST_LEN]> for ContentDigest {
    fn from(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn hex_roundtrip() {
        let digest = ContentDigest::from_hash([0xab; 32]);
        let parsed = ContentDigest::from_hex(&digest.to_hex()).unwrap();
        assert_eq!(digest, parsed);
    }

    #[test]
    fn short_hex_is_8_chars() {
        let digest = ContentDigest::from_hash([7; 32]);
        assert_eq!(digest.short_hex(), "07070707");
    }

    #[test]
    fn display_is_full_hex() {
        let digest = ContentDigest::from_hash([1; 32]);
        let display = format!("{digest}");
        assert_eq!(display.len(), 64);
        assert_eq!(display, digest.to_hex());
    }

    #[test]
    fn debug_uses_short_form() {
        let digest = ContentDigest::from_hash([0xff; 32]);
        assert_eq!(format!("{digest:?}"), "ContentDigest(ffffffff)");
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        let err = ContentDigest::from_hex("abcd").unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 32,
                actual: 2
            }
        );
    }

    #[test]
    fn from_hex_rejects_garbage() {
        assert!(matches!(
            ContentDigest::from_hex("zz"),
            Err(TypeError::InvalidHex(_))
        ));
    }

    #[test]
    fn from_hex_tolerates_surrounding_whitespace() {
        let digest = ContentDigest::from_hash([3; 32]);
        let padded = format!("  {}\n", digest.to_hex());
        assert_eq!(ContentDigest::from_hex(&padded).unwrap(), digest);
    }

    #[test]
    fn fan_out_is_first_byte() {
        let mut raw = [0u8; 32];
        raw[0] = 0x9c;
        assert_eq!(ContentDigest::from_hash(raw).fan_out(), 0x9c);
    }

    proptest! {
        #[test]
        fn ordering_follows_bytes(a in any::<[u8; 32]>(), b in any::<[u8; 32]>()) {
            let da = ContentDigest::from_hash(a);
            let db = ContentDigest::from_hash(b);
            prop_assert_eq!(da.cmp(&db), a.cmp(&b));
        }
    }
}
