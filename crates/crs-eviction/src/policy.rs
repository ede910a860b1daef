use std::cmp::Ordering;

use crs_types::ContentDigest;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::candidate::EvictionCandidate;
use crate::pressure::PressureLevel;

/// How idle entries are ranked once expired entries are gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMode {
    /// Least recently used first.
    Lru,
    /// Least frequently used first; ties broken by recency.
    Lfu,
    /// Weighted blend of normalized recency and frequency.
    #[default]
    Composite,
}

/// Relative weights of recency and frequency in the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvictionWeights {
    pub recency: f64,
    pub frequency: f64,
}

impl EvictionWeights {
    pub const fn new(recency: f64, frequency: f64) -> Self {
        Self { recency, frequency }
    }

    /// The aggressive blend used under memory pressure.
    pub const fn pressure_default() -> Self {
        Self::new(0.25, 0.75)
    }

    /// Weights scaled to sum to 1. Degenerate input falls back to equal.
    pub fn normalized(&self) -> Self {
        let recency = self.recency.max(0.0);
        let frequency = self.frequency.max(0.0);
        let sum = recency + frequency;
        if !sum.is_finite() || sum <= 0.0 {
            return Self::default();
        }
        Self::new(recency / sum, frequency / sum)
    }
}

impl Default for EvictionWeights {
    fn default() -> Self {
        Self::new(0.5, 0.5)
    }
}

/// Tunables for [`EvictionPolicy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub mode: ScoringMode,
    /// Weights for the normal pass.
    pub weights: EvictionWeights,
    /// Weights once memory pressure is active.
    pub pressure_weights: EvictionWeights,
    /// Minimum bytes a non-empty request reclaims (batch floor).
    pub min_batch_bytes: u64,
    /// Batch floor under memory pressure.
    pub pressure_min_batch_bytes: u64,
    /// Entries younger than this are shielded from the normal pass.
    pub min_residency_ms: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            mode: ScoringMode::Composite,
            weights: EvictionWeights::default(),
            pressure_weights: EvictionWeights::pressure_default(),
            min_batch_bytes: 0,
            pressure_min_batch_bytes: 0,
            min_residency_ms: 0,
        }
    }
}

/// Outcome of one selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionPlan {
    /// Idle entries past their expiry, reclaimed unconditionally.
    pub expired: Vec<ContentDigest>,
    /// Idle entries chosen by score, lowest first.
    pub victims: Vec<ContentDigest>,
    /// In-use entries the ranking reached; flag for eviction-on-release.
    pub deferred: Vec<ContentDigest>,
    pub bytes_requested: u64,
    pub bytes_reclaimed: u64,
    /// Scoring passes run (0 when TTL alone sufficed).
    pub passes: u8,
    /// Whether a relaxed pass ran.
    pub relaxed: bool,
}

impl EvictionPlan {
    pub fn satisfied(&self) -> bool {
        self.bytes_reclaimed >= self.bytes_requested
    }

    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.victims.is_empty()
    }
}

/// Composite eviction policy: TTL first, then scored passes.
#[derive(Debug, Clone, Default)]
pub struct EvictionPolicy {
    config: PolicyConfig,
}

impl EvictionPolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Select entries to reclaim at least `bytes_needed` bytes.
    ///
    /// Expired idle entries are always included, even when `bytes_needed` is
    /// zero. Scored passes only run while the target is unmet.
    pub fn select(
        &self,
        candidates: &[EvictionCandidate],
        bytes_needed: u64,
        now_ms: u64,
        pressure: PressureLevel,
    ) -> EvictionPlan {
        let mut plan = EvictionPlan::default();
        let mut chosen = vec![false; candidates.len()];

        for (i, c) in candidates.iter().enumerate() {
            if !c.is_expired(now_ms) {
                continue;
            }
            chosen[i] = true;
            if c.in_use() {
                plan.deferred.push(c.digest);
            } else {
                plan.expired.push(c.digest);
                plan.bytes_reclaimed += c.size_bytes;
            }
        }

        let floor = if pressure.is_active() {
            self.config.pressure_min_batch_bytes
        } else {
            self.config.min_batch_bytes
        };
        plan.bytes_requested = if bytes_needed == 0 {
            0
        } else {
            bytes_needed.max(floor)
        };

        let weights = if pressure.is_active() {
            self.config.pressure_weights
        } else {
            self.config.weights
        };
        let relaxed_first = pressure == PressureLevel::Critical;

        if !plan.satisfied() {
            self.run_pass(candidates, &mut chosen, &mut plan, now_ms, weights, relaxed_first);
            plan.relaxed = relaxed_first;
        }

        if !plan.satisfied() && pressure.is_active() && !relaxed_first {
            self.run_pass(candidates, &mut chosen, &mut plan, now_ms, weights, true);
            plan.relaxed = true;
        }

        debug!(
            expired = plan.expired.len(),
            victims = plan.victims.len(),
            deferred = plan.deferred.len(),
            requested = plan.bytes_requested,
            reclaimed = plan.bytes_reclaimed,
            passes = plan.passes,
            %pressure,
            "eviction plan"
        );
        plan
    }

    /// Composite keep-score in `[0, 1]`; higher means more worth keeping.
    pub fn score(
        candidate: &EvictionCandidate,
        now_ms: u64,
        max_idle_ms: u64,
        max_access_count: u64,
        weights: EvictionWeights,
    ) -> f64 {
        let w = weights.normalized();
        let recency = 1.0 - candidate.idle_ms(now_ms) as f64 / max_idle_ms.max(1) as f64;
        let frequency = candidate.access_count as f64 / max_access_count.max(1) as f64;
        w.recency * recency.clamp(0.0, 1.0) + w.frequency * frequency.clamp(0.0, 1.0)
    }

    fn is_shielded(&self, c: &EvictionCandidate, now_ms: u64) -> bool {
        let ttl_pending = c.expires_at_ms.is_some() && !c.is_expired(now_ms);
        ttl_pending || c.resident_ms(now_ms) < self.config.min_residency_ms
    }

    fn run_pass(
        &self,
        candidates: &[EvictionCandidate],
        chosen: &mut [bool],
        plan: &mut EvictionPlan,
        now_ms: u64,
        weights: EvictionWeights,
        relaxed: bool,
    ) {
        plan.passes += 1;
        let pool: Vec<usize> = (0..candidates.len())
            .filter(|&i| !chosen[i])
            .filter(|&i| relaxed || !self.is_shielded(&candidates[i], now_ms))
            .collect();
        let refs: Vec<&EvictionCandidate> = pool.iter().map(|&i| &candidates[i]).collect();

        for pos in self.order(&refs, now_ms, weights) {
            if plan.satisfied() {
                break;
            }
            let idx = pool[pos];
            let c = &candidates[idx];
            chosen[idx] = true;
            if c.in_use() {
                plan.deferred.push(c.digest);
                continue;
            }
            plan.victims.push(c.digest);
            plan.bytes_reclaimed += c.size_bytes;
        }
    }

    /// Indices into `refs`, in eviction order.
    fn order(&self, refs: &[&EvictionCandidate], now_ms: u64, weights: EvictionWeights) -> Vec<usize> {
        let mut idx: Vec<usize> = (0..refs.len()).collect();
        let by_recency = |a: &EvictionCandidate, b: &EvictionCandidate| {
            a.last_access_ms
                .cmp(&b.last_access_ms)
                .then_with(|| a.digest.cmp(&b.digest))
        };

        match self.config.mode {
            ScoringMode::Lru => idx.sort_by(|&a, &b| by_recency(refs[a], refs[b])),
            ScoringMode::Lfu => idx.sort_by(|&a, &b| {
                refs[a]
                    .access_count
                    .cmp(&refs[b].access_count)
                    .then_with(|| by_recency(refs[a], refs[b]))
            }),
            ScoringMode::Composite => {
                let max_idle = refs.iter().map(|c| c.idle_ms(now_ms)).max().unwrap_or(0);
                let max_count = refs.iter().map(|c| c.access_count).max().unwrap_or(0);
                let scores: Vec<f64> = refs
                    .iter()
                    .map(|c| Self::score(c, now_ms, max_idle, max_count, weights))
                    .collect();
                idx.sort_by(|&a, &b| {
                    scores[a]
                        .partial_cmp(&scores[b])
                        .unwrap_or(Ordering::Equal)
                        .then_with(|| by_recency(refs[a], refs[b]))
                });
            }
        }
        idx
    }
}
