use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use crs_eviction::{EvictionPolicy, PolicyConfig, PressureLevel, PressureSource};
use crs_store::{DiskBackend, MemoryTier, StoreError, StoreResult, TierBackend};
use crs_types::{Clock, ContentDigest, ContentKind, Handle, Location, MemoryPool, Tier};
use tracing::{debug, info, warn};

use crate::locks::StripedLocks;
use crate::placement::PlacementPolicy;
use crate::pressure::BudgetPressure;
use crate::table::ReferenceTable;

const MAX_REDIRECTS: usize = 4;

/// When a disk-resident entry earns a copy in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromotionRule {
    /// Reads inside the window that trigger promotion. Zero disables it.
    pub access_count: u32,
    pub window_ms: u64,
}

impl PromotionRule {
    pub fn is_due(&self, reads_in_window: u32) -> bool {
        self.access_count > 0 && reads_in_window >= self.access_count
    }
}

impl Default for PromotionRule {
    fn default() -> Self {
        Self {
            access_count: 3,
            window_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TierManagerConfig {
    pub placement: PlacementPolicy,
    pub policy: PolicyConfig,
    pub promotion: PromotionRule,
    /// Headroom fraction below which memory pressure is active.
    pub pressure_threshold: f64,
}

impl Default for TierManagerConfig {
    fn default() -> Self {
        Self {
            placement: PlacementPolicy::default(),
            policy: PolicyConfig::default(),
            promotion: PromotionRule::default(),
            pressure_threshold: 0.1,
        }
    }
}

/// Cumulative transition counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierCounters {
    /// Entries discarded by score.
    pub evictions: u64,
    /// Entries discarded because their TTL ran out.
    pub expired_evictions: u64,
    pub demotions: u64,
    pub promotions: u64,
    pub eviction_passes: u64,
    /// Eviction under pressure that fell short, or a failed demotion.
    pub degraded_events: u64,
    /// Victims or promotions skipped because their digest was locked.
    pub contended_skips: u64,
}

#[derive(Debug, Default)]
struct Counters {
    evictions: AtomicU64,
    expired_evictions: AtomicU64,
    demotions: AtomicU64,
    promotions: AtomicU64,
    eviction_passes: AtomicU64,
    degraded_events: AtomicU64,
    contended_skips: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> TierCounters {
        TierCounters {
            evictions: self.evictions.load(Ordering::Relaxed),
            expired_evictions: self.expired_evictions.load(Ordering::Relaxed),
            demotions: self.demotions.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            eviction_passes: self.eviction_passes.load(Ordering::Relaxed),
            degraded_events: self.degraded_events.load(Ordering::Relaxed),
            contended_skips: self.contended_skips.load(Ordering::Relaxed),
        }
    }
}

/// What one eviction pass actually did.
#[derive(Debug, Clone)]
pub struct EvictionReport {
    pub tier: Tier,
    pub pressure: PressureLevel,
    pub bytes_requested: u64,
    pub bytes_freed: u64,
    pub expired: Vec<ContentDigest>,
    pub discarded: Vec<ContentDigest>,
    pub demoted: Vec<ContentDigest>,
    /// In-use entries flagged for eviction-on-release.
    pub deferred: usize,
    /// Victims left in place: contended, re-pinned, or failed to move.
    pub skipped: usize,
}

impl EvictionReport {
    fn new(tier: Tier, pressure: PressureLevel, bytes_requested: u64) -> Self {
        Self {
            tier,
            pressure,
            bytes_requested,
            bytes_freed: 0,
            expired: Vec::new(),
            discarded: Vec::new(),
            demoted: Vec::new(),
            deferred: 0,
            skipped: 0,
        }
    }

    pub fn satisfied(&self) -> bool {
        self.bytes_freed >= self.bytes_requested
    }

    /// Entries that left the tier.
    pub fn reclaimed(&self) -> usize {
        self.expired.len() + self.discarded.len() + self.demoted.len()
    }
}

enum Outcome {
    Expired(u64),
    Discarded(u64),
    Demoted(u64),
    Skipped,
}

/// Places payloads, moves them between tiers, and carries out eviction.
///
/// The manager never owns bytes; it drives the backends through handles and
/// keeps the reference table pointing at wherever a payload lives. Every
/// transition is copy, then re-point, then free, so a reader holding a pin
/// either finishes against the old location or is redirected to the new one.
pub struct TierManager {
    memory: MemoryTier,
    disk: DiskBackend,
    table: Arc<ReferenceTable>,
    locks: Arc<StripedLocks>,
    clock: Arc<dyn Clock>,
    pressure: Arc<dyn PressureSource>,
    policy: EvictionPolicy,
    placement: PlacementPolicy,
    promotion: PromotionRule,
    pressure_threshold: f64,
    counters: Counters,
}

impl TierManager {
    /// Pressure defaults to the memory tier's own budget headroom.
    pub fn new(
        config: TierManagerConfig,
        memory: MemoryTier,
        disk: DiskBackend,
        table: Arc<ReferenceTable>,
        locks: Arc<StripedLocks>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let pressure: Arc<dyn PressureSource> =
            Arc::new(BudgetPressure::new(Arc::clone(memory.budget())));
        Self {
            memory,
            disk,
            table,
            locks,
            clock,
            pressure,
            policy: EvictionPolicy::new(config.policy),
            placement: config.placement,
            promotion: config.promotion,
            pressure_threshold: config.pressure_threshold,
            counters: Counters::default(),
        }
    }

    pub fn with_pressure_source(mut self, source: Arc<dyn PressureSource>) -> Self {
        self.pressure = source;
        self
    }

    pub fn memory(&self) -> &MemoryTier {
        &self.memory
    }

    pub fn disk(&self) -> &DiskBackend {
        &self.disk
    }

    pub fn table(&self) -> &ReferenceTable {
        &self.table
    }

    pub fn placement(&self) -> &PlacementPolicy {
        &self.placement
    }

    pub fn promotion(&self) -> &PromotionRule {
        &self.promotion
    }

    pub fn pressure_source(&self) -> &dyn PressureSource {
        self.pressure.as_ref()
    }

    pub fn counters(&self) -> TierCounters {
        self.counters.snapshot()
    }

    pub fn backend(&self, location: Location) -> &dyn TierBackend {
        match location {
            Location::Memory(pool) => self.memory.pool(pool),
            Location::Disk => &self.disk,
        }
    }

    pub fn pressure_level(&self) -> PressureLevel {
        PressureLevel::from_headroom(self.pressure.headroom_fraction(), self.pressure_threshold)
    }

    // -----------------------------------------------------------------------
    // Placement and reads
    // -----------------------------------------------------------------------

    /// Write a new payload to its initial location.
    ///
    /// On `CapacityExceeded` one eviction pass runs on the target tier and
    /// the write is retried once; a second failure is returned. `held` is the
    /// caller's stripe, if it holds one.
    pub fn place(
        &self,
        digest: &ContentDigest,
        data: Bytes,
        kind: ContentKind,
        held: Option<usize>,
    ) -> StoreResult<Handle> {
        let location = self.placement.classify(kind, data.len() as u64);
        let backend = self.backend(location);
        match backend.put(digest, data.clone()) {
            Err(StoreError::CapacityExceeded {
                requested,
                available,
                ..
            }) if requested <= backend.capacity_bytes() => {
                let report =
                    self.make_room(location.tier(), requested.saturating_sub(available), held);
                debug!(
                    %digest,
                    %location,
                    freed = report.bytes_freed,
                    "retrying placement after eviction"
                );
                backend.put(digest, data)
            }
            other => other,
        }
    }

    /// Read a payload, following the table if the entry moved mid-read.
    pub fn fetch(&self, digest: &ContentDigest, handle: Handle) -> StoreResult<Bytes> {
        let mut handle = handle;
        for _ in 0..MAX_REDIRECTS {
            match self.backend(handle.location).get(&handle) {
                Err(StoreError::NotFound(_)) => match self.table.handle_of(digest) {
                    Some(current) if current != handle => {
                        debug!(%digest, from = %handle.location, to = %current.location, "read redirected");
                        handle = current;
                    }
                    _ => return Err(StoreError::NotFound(*digest)),
                },
                other => return other,
            }
        }
        Err(StoreError::NotFound(*digest))
    }

    /// Copy a pinned disk entry into the general memory pool.
    ///
    /// Best effort: returns `false` without side effects when the digest is
    /// contended, memory cannot make room, or the entry moved meanwhile.
    pub fn promote(&self, digest: &ContentDigest, from: &Handle, data: &Bytes) -> bool {
        if from.location != Location::Disk {
            return false;
        }
        let Some(guard) = self.locks.try_lock(digest) else {
            Counters::bump(&self.counters.contended_skips);
            debug!(%digest, "promotion skipped, digest contended");
            return false;
        };

        let size = data.len() as u64;
        let general = self.memory.pool(MemoryPool::General);
        if size > general.capacity_bytes() {
            return false;
        }
        let short = size.saturating_sub(general.available_bytes());
        if short > 0 {
            self.make_room(Tier::Memory, short, Some(guard.index()));
        }

        let to = match general.put(digest, data.clone()) {
            Ok(handle) => handle,
            Err(e) => {
                debug!(%digest, error = %e, "promotion skipped");
                return false;
            }
        };
        if !self.table.repoint(digest, from, to) {
            if let Err(e) = general.remove(&to) {
                debug!(%digest, error = %e, "abandoned promotion copy already gone");
            }
            return false;
        }
        if let Err(e) = self.disk.remove(from) {
            warn!(%digest, error = %e, "disk copy left behind after promotion");
        }
        Counters::bump(&self.counters.promotions);
        info!(%digest, size, "promoted to memory");
        true
    }

    // -----------------------------------------------------------------------
    // Eviction
    // -----------------------------------------------------------------------

    /// Run one eviction pass on `tier` aiming to free `bytes_needed`.
    pub fn make_room(&self, tier: Tier, bytes_needed: u64, held: Option<usize>) -> EvictionReport {
        self.run_pass(tier, bytes_needed, held, self.pressure_level())
    }

    /// Reclaim every expired, unreferenced entry in both tiers.
    pub fn evict_expired(&self) -> usize {
        [Tier::Memory, Tier::Disk]
            .into_iter()
            .map(|tier| {
                self.run_pass(tier, 0, None, PressureLevel::Normal)
                    .expired
                    .len()
            })
            .sum()
    }

    /// One proactive memory pass sized to restore the headroom threshold.
    ///
    /// Returns `None` when the pressure source reports no pressure.
    pub fn relieve_pressure(&self) -> Option<EvictionReport> {
        let headroom = self.pressure.headroom_fraction();
        let level = PressureLevel::from_headroom(headroom, self.pressure_threshold);
        if !level.is_active() {
            return None;
        }
        let capacity = self.memory.budget().capacity();
        let bytes = PressureLevel::bytes_below_threshold(capacity, headroom, self.pressure_threshold);
        debug!(source = self.pressure.name(), headroom, %level, bytes, "relieving memory pressure");
        Some(self.run_pass(Tier::Memory, bytes.max(1), None, level))
    }

    /// Reclaim a single entry now, typically one flagged for
    /// eviction-on-release whose last reference just went away.
    pub fn evict_entry(&self, digest: &ContentDigest) -> bool {
        let Some(reference) = self.table.lookup(digest) else {
            return false;
        };
        let expired = reference.is_expired(self.clock.now_ms());
        !matches!(
            self.evict(digest, reference.tier, None, expired),
            Outcome::Skipped
        )
    }

    /// Demote every idle memory entry to disk, durable or not.
    ///
    /// Used before shutdown so the disk tier holds everything resident.
    pub fn spill_to_disk(&self) -> usize {
        let mut moved = 0;
        for candidate in self.table.candidates(Tier::Memory) {
            if candidate.in_use() {
                continue;
            }
            let digest = candidate.digest;
            let Some(guard) = self.locks.try_lock(&digest) else {
                Counters::bump(&self.counters.contended_skips);
                continue;
            };
            let Some(handle) = self.table.handle_of(&digest) else {
                continue;
            };
            if handle.tier() != Tier::Memory {
                continue;
            }
            if let Outcome::Demoted(_) = self.demote(&digest, handle, guard.index()) {
                moved += 1;
            }
        }
        if moved > 0 {
            info!(moved, "spilled memory tier to disk");
        }
        moved
    }

    fn run_pass(
        &self,
        tier: Tier,
        bytes_needed: u64,
        held: Option<usize>,
        level: PressureLevel,
    ) -> EvictionReport {
        let now_ms = self.clock.now_ms();
        Counters::bump(&self.counters.eviction_passes);

        // Skipped victims are replaced by the next-ranked candidates until the
        // target is met or every candidate has been tried once.
        let mut report = EvictionReport::new(tier, level, bytes_needed);
        let mut tried: HashSet<ContentDigest> = HashSet::new();
        let mut round = 0;
        loop {
            let target = if round == 0 {
                bytes_needed
            } else {
                report.bytes_requested.saturating_sub(report.bytes_freed)
            };
            let candidates: Vec<_> = self
                .table
                .candidates(tier)
                .into_iter()
                .filter(|c| !tried.contains(&c.digest))
                .collect();
            let plan = self.policy.select(&candidates, target, now_ms, level);
            if round == 0 {
                report.bytes_requested = plan.bytes_requested;
            }
            round += 1;

            for digest in &plan.deferred {
                tried.insert(*digest);
                if self.table.mark_evict_on_release(digest) {
                    report.deferred += 1;
                }
            }
            if plan.is_empty() {
                break;
            }

            let skipped_before = report.skipped;
            let ordered = plan
                .expired
                .iter()
                .map(|d| (d, true))
                .chain(plan.victims.iter().map(|d| (d, false)));
            for (digest, expired) in ordered {
                tried.insert(*digest);
                match self.evict(digest, tier, held, expired) {
                    Outcome::Expired(freed) => {
                        report.bytes_freed += freed;
                        report.expired.push(*digest);
                    }
                    Outcome::Discarded(freed) => {
                        report.bytes_freed += freed;
                        report.discarded.push(*digest);
                    }
                    Outcome::Demoted(freed) => {
                        report.bytes_freed += freed;
                        report.demoted.push(*digest);
                    }
                    Outcome::Skipped => report.skipped += 1,
                }
            }
            if report.satisfied() || report.skipped == skipped_before {
                break;
            }
        }

        if report.satisfied() {
            debug!(
                %tier,
                requested = report.bytes_requested,
                freed = report.bytes_freed,
                reclaimed = report.reclaimed(),
                "eviction pass"
            );
        } else if level.is_active() {
            Counters::bump(&self.counters.degraded_events);
            warn!(
                %tier,
                %level,
                requested = report.bytes_requested,
                freed = report.bytes_freed,
                deferred = report.deferred,
                skipped = report.skipped,
                "eviction fell short under memory pressure"
            );
        } else {
            debug!(
                %tier,
                requested = report.bytes_requested,
                freed = report.bytes_freed,
                "eviction fell short"
            );
        }
        report
    }

    fn evict(
        &self,
        digest: &ContentDigest,
        tier: Tier,
        held: Option<usize>,
        expired: bool,
    ) -> Outcome {
        let stripe = self.locks.stripe_of(digest);
        let _guard = if held == Some(stripe) {
            None
        } else {
            match self.locks.try_lock(digest) {
                Some(guard) => Some(guard),
                None => {
                    Counters::bump(&self.counters.contended_skips);
                    debug!(%digest, "victim contended, skipped");
                    return Outcome::Skipped;
                }
            }
        };

        let Some(reference) = self.table.lookup(digest) else {
            return Outcome::Skipped;
        };
        if reference.tier != tier {
            return Outcome::Skipped;
        }
        if reference.ref_count > 0 {
            self.table.mark_evict_on_release(digest);
            return Outcome::Skipped;
        }

        let handle = reference.handle;
        if !expired && tier == Tier::Memory && reference.metadata.durable {
            return self.demote(digest, handle, stripe);
        }

        if self.table.remove_if_idle(digest, &handle).is_none() {
            return Outcome::Skipped;
        }
        let freed = match self.backend(handle.location).remove(&handle) {
            Ok(freed) => freed,
            Err(e) => {
                warn!(%digest, error = %e, "payload removal failed after unlinking");
                0
            }
        };
        if expired {
            Counters::bump(&self.counters.expired_evictions);
            debug!(%digest, %tier, freed, "expired entry evicted");
            Outcome::Expired(freed)
        } else {
            Counters::bump(&self.counters.evictions);
            debug!(%digest, %tier, freed, "entry evicted");
            Outcome::Discarded(freed)
        }
    }

    fn demote(&self, digest: &ContentDigest, from: Handle, held: usize) -> Outcome {
        let source = self.backend(from.location);
        let data = match source.get(&from) {
            Ok(data) => data,
            Err(e) => return self.demotion_failed(digest, e),
        };

        let to = match self.disk.put(digest, data.clone()) {
            Ok(handle) => handle,
            Err(StoreError::CapacityExceeded {
                requested,
                available,
                ..
            }) if requested <= self.disk.capacity_bytes() => {
                self.make_room(Tier::Disk, requested.saturating_sub(available), Some(held));
                match self.disk.put(digest, data) {
                    Ok(handle) => handle,
                    Err(e) => return self.demotion_failed(digest, e),
                }
            }
            Err(e) => return self.demotion_failed(digest, e),
        };

        if !self.table.repoint_if_idle(digest, &from, to) {
            // A reader pinned it mid-move; the memory copy stays authoritative.
            if let Err(e) = self.disk.remove(&to) {
                debug!(%digest, error = %e, "abandoned demotion copy already gone");
            }
            return Outcome::Skipped;
        }
        let freed = match source.remove(&from) {
            Ok(freed) => freed,
            Err(e) => {
                warn!(%digest, error = %e, "memory copy missing after demotion");
                0
            }
        };
        Counters::bump(&self.counters.demotions);
        debug!(%digest, freed, "demoted to disk");
        Outcome::Demoted(freed)
    }

    fn demotion_failed(&self, digest: &ContentDigest, error: StoreError) -> Outcome {
        Counters::bump(&self.counters.degraded_events);
        warn!(%digest, %error, "demotion failed, entry kept in memory");
        Outcome::Skipped
    }
}

impl std::fmt::Debug for TierManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TierManager")
            .field("memory_bytes", &self.memory.bytes_used())
            .field("disk_bytes", &self.disk.current_bytes_used())
            .field("entries", &self.table.len())
            .field("pressure_source", &self.pressure.name())
            .finish()
    }
}
