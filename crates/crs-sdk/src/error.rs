use std::time::Duration;

use crs_crypto::HasherError;
use crs_store::StoreError;
use crs_types::{ContentDigest, Location};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced to store callers.
#[derive(Debug, Error)]
pub enum CrsError {
    /// The reference was evicted (and not demoted), or never existed.
    #[error("context not found: {0}")]
    NotFound(ContentDigest),

    /// A stored payload no longer hashes to its digest.
    #[error("corrupt payload {digest}: stored bytes hash to {computed}")]
    Corrupt {
        digest: ContentDigest,
        computed: ContentDigest,
    },

    /// The target tier could not make room even after an eviction pass.
    #[error("capacity exceeded on {location}: requested {requested} bytes, {available} available")]
    CapacityExceeded {
        location: Location,
        requested: u64,
        available: u64,
    },

    /// A blocking read outlived the caller's deadline. Safe to retry.
    #[error("read of {digest} timed out after {after:?}")]
    Timeout {
        digest: ContentDigest,
        after: Duration,
    },

    #[error("invalid content: {0}")]
    InvalidContent(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrsError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<StoreError> for CrsError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(digest) => Self::NotFound(digest),
            StoreError::Corrupt { digest, computed } => Self::Corrupt { digest, computed },
            StoreError::CapacityExceeded {
                location,
                requested,
                available,
            } => Self::CapacityExceeded {
                location,
                requested,
                available,
            },
            StoreError::Io(e) => Self::Io(e),
        }
    }
}

impl From<HasherError> for CrsError {
    fn from(err: HasherError) -> Self {
        Self::InvalidContent(err.to_string())
    }
}

pub type CrsResult<T> = Result<T, CrsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timeouts_are_retryable() {
        let d = ContentDigest::from_hash([1; 32]);
        assert!(CrsError::Timeout {
            digest: d,
            after: Duration::from_millis(5)
        }
        .is_retryable());
        assert!(!CrsError::NotFound(d).is_retryable());
        assert!(!CrsError::InvalidContent("x".into()).is_retryable());
    }

    #[test]
    fn store_errors_map_one_to_one() {
        let d = ContentDigest::from_hash([2; 32]);
        assert!(matches!(
            CrsError::from(StoreError::NotFound(d)),
            CrsError::NotFound(x) if x == d
        ));
        assert!(matches!(
            CrsError::from(StoreError::CapacityExceeded {
                location: Location::Disk,
                requested: 10,
                available: 3,
            }),
            CrsError::CapacityExceeded { requested: 10, available: 3, .. }
        ));
    }

    #[test]
    fn hasher_errors_become_invalid_content() {
        let err = CrsError::from(HasherError::InvalidJson("eof".into()));
        assert!(matches!(err, CrsError::InvalidContent(msg) if msg.contains("eof")));
    }
}
