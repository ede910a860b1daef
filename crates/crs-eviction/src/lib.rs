//! Eviction policy engine for the Context Reference Store.
//!
//! Given the resident entries of one tier, the engine decides which of them
//! to reclaim. It never touches payloads itself; the tier manager carries out
//! the plan.
//!
//! # Selection order
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ 1. TTL          expired + idle entries, always, first        │
//! │ 2. Normal pass  score idle, unshielded entries; lowest first │
//! │ 3. Relaxed pass only under memory pressure: shields dropped, │
//! │                 pressure weights applied                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entries with a nonzero reference count are never victims. When the
//! ranking reaches one, it is reported as *deferred* so the caller can flag
//! it for eviction-on-release.
//!
//! # Modules
//!
//! - [`candidate`]: the per-entry view the policy scores
//! - [`policy`]: scoring modes, weights, and victim selection
//! - [`pressure`]: pressure levels and pluggable headroom sources

pub mod candidate;
pub mod policy;
pub mod pressure;

pub use candidate::EvictionCandidate;
pub use policy::{EvictionPlan, EvictionPolicy, EvictionWeights, PolicyConfig, ScoringMode};
pub use pressure::{
    PressureLevel, PressureSource, SimulatedPressure, SystemMemoryPressure,
};
