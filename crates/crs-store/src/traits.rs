use bytes::Bytes;
use crs_types::{ContentDigest, Handle, Location};

use crate::error::StoreResult;

/// A storage engine for one placement location.
///
/// All implementations must satisfy these invariants:
/// - `put` of a digest already resident is a no-op returning the live handle.
/// - `put` fails with `CapacityExceeded` instead of exceeding capacity; the
///   caller decides whether to reclaim space and retry.
/// - `get` returns exactly the bytes that were put, or an error. Backends that
///   re-read from durable media verify the digest and fail with `Corrupt`.
/// - `remove` frees the payload and its accounted bytes; a stale handle fails
///   with `NotFound`.
pub trait TierBackend: Send + Sync {
    /// The location this backend serves.
    fn location(&self) -> Location;

    /// Store a payload under its digest and return a handle to it.
    fn put(&self, digest: &ContentDigest, data: Bytes) -> StoreResult<Handle>;

    /// Read the payload behind a handle.
    fn get(&self, handle: &Handle) -> StoreResult<Bytes>;

    /// Reclaim a payload. Returns the number of bytes freed.
    fn remove(&self, handle: &Handle) -> StoreResult<u64>;

    /// Check whether the handle is live in this backend.
    fn contains(&self, handle: &Handle) -> bool;

    /// Bytes currently held by this backend.
    fn current_bytes_used(&self) -> u64;

    /// Configured capacity in bytes.
    fn capacity_bytes(&self) -> u64;

    /// Bytes that can still be accepted without reclaiming anything.
    ///
    /// Default implementation is `capacity - used`. Backends sharing a budget
    /// override this with the budget's view.
    fn available_bytes(&self) -> u64 {
        self.capacity_bytes()
            .saturating_sub(self.current_bytes_used())
    }
}
