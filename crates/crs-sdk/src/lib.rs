//! Context Reference Store: share large context across sessions without
//! copying it.
//!
//! Content is hashed to a [`ContentDigest`]; identical content is stored
//! once and reference-counted. Payloads live in a bounded memory tier or a
//! disk tier and move between them under a composite eviction policy (TTL,
//! recency, frequency, memory pressure).
//!
//! ```no_run
//! use crs_sdk::{ContentKind, ContextReferenceStore, StoreConfig, StoreHints};
//!
//! # fn main() -> crs_sdk::CrsResult<()> {
//! let store = ContextReferenceStore::open(StoreConfig::with_root("/tmp/crs"))?;
//! let reference = store.store(b"a long document", ContentKind::Text, StoreHints::new())?;
//! let bytes = store.retrieve(&reference, None)?;
//! assert_eq!(&bytes[..], b"a long document");
//! store.release(&reference)?;
//! # Ok(())
//! # }
//! ```
//!
//! Collaborators that only hold references should depend on
//! [`ContextStoreApi`] and can use [`ContextSession`] to tie reference
//! lifetimes to their own.

pub mod config;
pub mod error;
pub mod hints;
pub mod monitor;
mod runtime;
pub mod session;
pub mod stats;
pub mod store;

pub use config::{ConfigError, PressureSourceKind, StoreConfig};
pub use error::{CrsError, CrsResult};
pub use hints::StoreHints;
pub use monitor::MonitorHandle;
pub use session::{ContextSession, ContextStoreApi};
pub use stats::StoreStats;
pub use store::{ContextReferenceStore, StoreBuilder};

// Re-export key types
pub use crs_eviction::{
    EvictionWeights, PressureLevel, PressureSource, ScoringMode, SimulatedPressure,
    SystemMemoryPressure,
};
pub use crs_tier::EvictionReport;
pub use crs_types::{
    Clock, ContentDigest, ContentKind, ContextMetadata, ContextReference, ManualClock,
    PayloadFormat, SystemClock, Tier,
};
