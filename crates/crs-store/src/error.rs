use crs_types::{ContentDigest, Location};

/// Errors from tier backend operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The handle is stale or was never issued by this backend.
    #[error("payload not found: {0}")]
    NotFound(ContentDigest),

    /// Re-read payload does not hash to its digest.
    #[error("corrupt payload {digest}: stored bytes hash to {computed}")]
    Corrupt {
        digest: ContentDigest,
        computed: ContentDigest,
    },

    /// The backend cannot accept the payload without reclaiming space first.
    #[error("capacity exceeded on {location}: requested {requested} bytes, {available} available")]
    CapacityExceeded {
        location: Location,
        requested: u64,
        available: u64,
    },

    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for backend operations.
pub type StoreResult<T> = Result<T, StoreError>;
