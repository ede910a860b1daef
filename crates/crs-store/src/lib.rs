//! Tier backends for the Context Reference Store.
//!
//! A backend exclusively owns payload bytes and hands out [`Handle`]s that
//! callers use to read or reclaim them. Two implementations share the
//! [`TierBackend`] contract:
//!
//! - [`MemoryPoolBackend`]: a bounded in-memory pool; the memory tier is a
//!   [`MemoryTier`] holding a general pool and a small-binary pool that draw
//!   from one [`CapacityBudget`]
//! - [`DiskBackend`]: one file per digest under a fan-out directory,
//!   verified against its digest on every read
//!
//! # Design Rules
//!
//! 1. Payloads are immutable once written (content-addressing guarantees this).
//! 2. Write-then-link: a payload is fully written before its handle exists.
//! 3. Capacity is reserved before bytes are accepted; `put` never overshoots.
//! 4. A stale handle reads as `NotFound`, never as someone else's bytes.
//! 5. All I/O errors are propagated, never silently ignored.
//!
//! [`Handle`]: crs_types::Handle

pub mod budget;
pub mod disk;
pub mod error;
pub mod memory;
pub mod traits;

pub use budget::CapacityBudget;
pub use disk::DiskBackend;
pub use error::{StoreError, StoreResult};
pub use memory::{MemoryPoolBackend, MemoryTier};
pub use traits::TierBackend;
