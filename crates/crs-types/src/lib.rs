//! Foundation types for the Context Reference Store (CRS).
//!
//! Every other CRS crate depends on `crs-types`. The types here describe
//! *what* is stored and *where* it lives; none of them own payload bytes.
//!
//! # Key Types
//!
//! - [`ContentDigest`]: 256-bit content fingerprint, the deduplication key
//! - [`ContextMetadata`]: immutable facts recorded once at ingestion
//! - [`Tier`] / [`Location`] / [`Handle`]: where a payload currently lives
//! - [`ContextReference`]: read-only view of a reference-table record
//! - [`Clock`]: millisecond time source (system or manual)

pub mod clock;
pub mod content;
pub mod digest;
pub mod error;
pub mod reference;
pub mod tier;

pub use clock::{Clock, ManualClock, SystemClock};
pub use content::{ContentKind, ContextMetadata, PayloadFormat};
pub use digest::ContentDigest;
pub use error::TypeError;
pub use reference::ContextReference;
pub use tier::{Handle, Location, MemoryPool, Tier};
