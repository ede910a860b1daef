//! Placement and tier management for the Context Reference Store.
//!
//! This crate sits between the facade and the backends:
//!
//! - [`ReferenceTable`]: digest to reference mapping, sharded, the single
//!   source of truth for "does this content already exist"
//! - [`StripedLocks`]: per-digest mutual exclusion for check-then-act
//! - [`PlacementPolicy`]: which location a new payload lands in
//! - [`TierManager`]: placement with eviction-and-retry, promotion,
//!   demotion, TTL sweeps, and pressure relief
//!
//! # Transitions
//!
//! ```text
//!  memory ──(durable victim)──▶ disk       copy ▸ re-point if idle ▸ free
//!  disk   ──(hot, N reads)───▶ memory     copy ▸ re-point ▸ free
//!  any    ──(victim/expired)─▶ gone       unlink if idle ▸ free
//! ```

pub mod error;
pub mod locks;
pub mod manager;
pub mod placement;
pub mod pressure;
pub mod table;

pub use error::{TableError, TableResult};
pub use locks::{StripeGuard, StripedLocks};
pub use manager::{EvictionReport, PromotionRule, TierCounters, TierManager, TierManagerConfig};
pub use placement::{PlacementPolicy, DEFAULT_SMALL_BINARY_THRESHOLD};
pub use pressure::BudgetPressure;
pub use table::{Pin, ReferenceTable, Released};
