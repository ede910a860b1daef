use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use crs_crypto::ContentHasher;
use crs_eviction::{PressureLevel, PressureSource, SystemMemoryPressure};
use crs_store::{DiskBackend, MemoryTier, StoreError, TierBackend};
use crs_tier::{EvictionReport, ReferenceTable, StripedLocks, TableError, TierManager};
use crs_types::{
    Clock, ContentDigest, ContentKind, ContextMetadata, ContextReference, Handle, Location,
    MemoryPool, SystemClock, Tier,
};
use tracing::{debug, info, warn};

use crate::config::{PressureSourceKind, StoreConfig};
use crate::error::{CrsError, CrsResult};
use crate::hints::StoreHints;
use crate::monitor::{self, MonitorHandle};
use crate::runtime::StoreRuntime;
use crate::stats::StoreStats;

#[derive(Debug, Default)]
struct Counters {
    stores: AtomicU64,
    dedup_hits: AtomicU64,
    retrieves: AtomicU64,
}

struct Inner {
    config: StoreConfig,
    hasher: ContentHasher,
    table: Arc<ReferenceTable>,
    locks: Arc<StripedLocks>,
    tiers: TierManager,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

/// Background machinery shared by every clone. Kept outside [`Inner`] so
/// the runtime is never dropped from one of its own threads.
struct Background {
    monitor: Option<MonitorHandle>,
    runtime: StoreRuntime,
}

/// Content-addressed, tiered context store.
///
/// Cloning is cheap and every clone shares the same table and backends, so
/// pass a clone to each collaborator instead of reaching for a global.
///
/// ```text
/// store:    hash ▸ lock digest ▸ dedup? ▸ place ▸ insert ▸ retain
/// retrieve: pin ▸ fetch (redirect on move) ▸ maybe promote ▸ unpin
/// release:  unreference ▸ evict now if flagged
/// ```
///
/// Each store owns a small tokio runtime for its pressure monitor and timed
/// disk reads. The blocking methods must not be called from inside an async
/// context; wrap them in `spawn_blocking` there.
#[derive(Clone)]
pub struct ContextReferenceStore {
    inner: Arc<Inner>,
    background: Arc<Background>,
}

/// Builder for a [`ContextReferenceStore`] with non-default collaborators.
pub struct StoreBuilder {
    config: StoreConfig,
    clock: Option<Arc<dyn Clock>>,
    pressure: Option<Arc<dyn PressureSource>>,
}

impl StoreBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Replace the pressure source named by `pressure_source` in the config.
    pub fn pressure_source(mut self, source: Arc<dyn PressureSource>) -> Self {
        self.pressure = Some(source);
        self
    }

    pub fn open(self) -> CrsResult<ContextReferenceStore> {
        let config = self.config;
        config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let table = Arc::new(ReferenceTable::new());
        let locks = Arc::new(StripedLocks::default());
        let memory = MemoryTier::new(config.memory_capacity_bytes);
        let disk = DiskBackend::open(&config.disk_root, config.disk_capacity_bytes)?;

        let mut tiers = TierManager::new(
            config.tier_config(),
            memory,
            disk,
            Arc::clone(&table),
            Arc::clone(&locks),
            Arc::clone(&clock),
        );
        let pressure = self.pressure.or_else(|| match config.pressure_source {
            PressureSourceKind::Budget => None,
            PressureSourceKind::System => {
                Some(Arc::new(SystemMemoryPressure::new()) as Arc<dyn PressureSource>)
            }
        });
        if let Some(source) = pressure {
            tiers = tiers.with_pressure_source(source);
        }

        let runtime = StoreRuntime::new(config.blocking_threads)?;
        let inner = Arc::new(Inner {
            config,
            hasher: ContentHasher::CONTEXT,
            table,
            locks,
            tiers,
            clock,
            counters: Counters::default(),
        });
        if inner.config.adopt_disk_payloads {
            adopt_disk_payloads(&inner);
        }
        let monitor = inner
            .config
            .pressure_poll_interval()
            .map(|period| spawn_monitor(&runtime, Arc::downgrade(&inner), period));

        info!(
            root = %inner.config.disk_root.display(),
            entries = inner.table.len(),
            pressure_source = inner.tiers.pressure_source().name(),
            monitor_period_ms = inner.config.pressure_poll_interval_ms,
            "context store opened"
        );
        Ok(ContextReferenceStore {
            inner,
            background: Arc::new(Background { monitor, runtime }),
        })
    }
}

impl ContextReferenceStore {
    pub fn open(config: StoreConfig) -> CrsResult<Self> {
        Self::builder(config).open()
    }

    pub fn builder(config: StoreConfig) -> StoreBuilder {
        StoreBuilder {
            config,
            clock: None,
            pressure: None,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    // -----------------------------------------------------------------------
    // Ingestion
    // -----------------------------------------------------------------------

    /// Store content and return a reference to it.
    ///
    /// Identical content (after canonicalization) yields the existing
    /// reference with its count raised; no bytes are written twice.
    pub fn store(
        &self,
        content: &[u8],
        kind: ContentKind,
        hints: StoreHints,
    ) -> CrsResult<ContextReference> {
        let inner = &self.inner;
        let (digest, canonical) = inner.hasher.digest(kind, content)?;

        if inner.tiers.pressure_level().is_active() {
            inner.tiers.relieve_pressure();
        }

        let guard = inner.locks.lock(&digest);
        let now = inner.clock.now_ms();
        if let Ok(existing) = inner.table.retain(&digest, now) {
            inner.counters.dedup_hits.fetch_add(1, Ordering::Relaxed);
            debug!(%digest, ref_count = existing.ref_count, "deduplicated");
            return Ok(existing);
        }

        let data = Bytes::from(canonical);
        let size = data.len() as u64;
        let handle = inner.tiers.place(&digest, data, kind, Some(guard.index()))?;

        let mut metadata = ContextMetadata::new(kind, size, now)
            .with_format(hints.format.unwrap_or_else(|| kind.default_format()))
            .with_durable(hints.durable.unwrap_or_else(|| inner.config.is_durable(kind)));
        if let Some(units) = hints.unit_count {
            metadata = metadata.with_unit_count(units);
        }
        let expires_at_ms = hints
            .ttl
            .or_else(|| inner.config.default_ttl())
            .map(|ttl| now.saturating_add(ttl.as_millis() as u64));

        match inner.table.insert(digest, metadata, handle, expires_at_ms) {
            Ok(_) | Err(TableError::AlreadyExists(_)) => {}
            Err(TableError::NotFound(d)) => return Err(CrsError::NotFound(d)),
        }
        let reference = inner
            .table
            .retain(&digest, now)
            .map_err(|_| CrsError::NotFound(digest))?;
        inner.counters.stores.fetch_add(1, Ordering::Relaxed);
        debug!(%digest, %kind, size, location = %handle.location, "stored");
        Ok(reference)
    }

    // -----------------------------------------------------------------------
    // Retrieval and lifecycle
    // -----------------------------------------------------------------------

    /// Read the payload behind `reference`.
    ///
    /// The bytes are the stored canonical form: identical to the input for
    /// text and binary, but compact key-sorted JSON for structured content.
    ///
    /// The entry is pinned for the duration of the read, so it cannot be
    /// evicted underneath it. With a `timeout`, disk reads run on the store's
    /// blocking pool; on expiry the pin is dropped and `Timeout` returned.
    pub fn retrieve(
        &self,
        reference: &ContextReference,
        timeout: Option<Duration>,
    ) -> CrsResult<Bytes> {
        let inner = &self.inner;
        let digest = reference.digest;
        let promotion = *inner.tiers.promotion();
        let pin = inner
            .table
            .pin(
                &digest,
                inner.clock.now_ms(),
                promotion.window_ms,
                promotion.access_count as usize,
            )
            .map_err(|_| CrsError::NotFound(digest))?;
        inner.counters.retrieves.fetch_add(1, Ordering::Relaxed);

        let handle = pin.reference.handle;
        let result = match timeout {
            Some(limit) if handle.tier() == Tier::Disk => self.fetch_with_timeout(digest, handle, limit),
            _ => inner.tiers.fetch(&digest, handle).map_err(CrsError::from),
        };

        if let Ok(data) = &result {
            if handle.tier() == Tier::Disk && promotion.is_due(pin.reads_in_window) {
                inner.tiers.promote(&digest, &handle, data);
            }
        }
        self.unpin(&digest);
        result
    }

    /// Drop one reference. At zero the entry becomes eviction-eligible; it
    /// is reclaimed right away only if eviction already chose it.
    pub fn release(&self, reference: &ContextReference) -> CrsResult<()> {
        let digest = reference.digest;
        let released = self
            .inner
            .table
            .release(&digest)
            .map_err(|_| CrsError::NotFound(digest))?;
        if released.evict_now {
            self.inner.tiers.evict_entry(&digest);
        }
        Ok(())
    }

    /// Current view of an entry, without counting as an access.
    pub fn reference(&self, digest: &ContentDigest) -> Option<ContextReference> {
        self.inner.table.lookup(digest)
    }

    pub fn contains(&self, digest: &ContentDigest) -> bool {
        self.inner.table.contains(digest)
    }

    /// Every resident reference, ordered by digest.
    pub fn references(&self) -> Vec<ContextReference> {
        self.inner.table.references()
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Reclaim every expired, unreferenced entry. Returns how many went.
    pub fn evict_expired(&self) -> usize {
        self.inner.tiers.evict_expired()
    }

    /// Run one proactive eviction pass if memory pressure is active.
    pub fn relieve_pressure(&self) -> Option<EvictionReport> {
        self.inner.tiers.relieve_pressure()
    }

    /// Move every idle memory entry to the disk tier, e.g. before exit.
    pub fn spill_to_disk(&self) -> usize {
        self.inner.tiers.spill_to_disk()
    }

    pub fn pressure_level(&self) -> PressureLevel {
        self.inner.tiers.pressure_level()
    }

    /// Start an extra pressure monitor polling every `interval`, relieving
    /// pressure and sweeping expired entries.
    ///
    /// `open` already starts one when `pressure_poll_interval_ms` is
    /// non-zero. The task holds only a weak reference and exits once the
    /// last store handle is dropped, or when the returned handle is stopped
    /// or dropped.
    pub fn start_pressure_monitor(&self, interval: Duration) -> MonitorHandle {
        spawn_monitor(&self.background.runtime, Arc::downgrade(&self.inner), interval)
    }

    /// True while the monitor started by `open` is running.
    pub fn is_monitoring(&self) -> bool {
        self.background
            .monitor
            .as_ref()
            .is_some_and(MonitorHandle::is_running)
    }

    pub fn stats(&self) -> StoreStats {
        let inner = &self.inner;
        let tiers = &inner.tiers;
        let (memory_entries, disk_entries) = inner.table.count_by_tier();
        let counters = tiers.counters();
        StoreStats {
            entries: memory_entries + disk_entries,
            memory_entries,
            disk_entries,
            memory_bytes_used: tiers.memory().bytes_used(),
            general_pool_bytes_used: tiers.memory().pool(MemoryPool::General).current_bytes_used(),
            small_binary_pool_bytes_used: tiers
                .memory()
                .pool(MemoryPool::SmallBinary)
                .current_bytes_used(),
            memory_capacity_bytes: tiers.memory().budget().capacity(),
            disk_bytes_used: tiers.disk().current_bytes_used(),
            disk_capacity_bytes: tiers.disk().capacity_bytes(),
            stores: inner.counters.stores.load(Ordering::Relaxed),
            dedup_hits: inner.counters.dedup_hits.load(Ordering::Relaxed),
            retrieves: inner.counters.retrieves.load(Ordering::Relaxed),
            evictions: counters.evictions,
            expired_evictions: counters.expired_evictions,
            demotions: counters.demotions,
            promotions: counters.promotions,
            eviction_passes: counters.eviction_passes,
            degraded_events: counters.degraded_events,
            contended_skips: counters.contended_skips,
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn unpin(&self, digest: &ContentDigest) {
        match self.inner.table.release(digest) {
            Ok(released) if released.evict_now => {
                self.inner.tiers.evict_entry(digest);
            }
            Ok(_) => {}
            Err(e) => debug!(%digest, error = %e, "entry gone before unpin"),
        }
    }

    fn fetch_with_timeout(
        &self,
        digest: ContentDigest,
        handle: Handle,
        limit: Duration,
    ) -> CrsResult<Bytes> {
        if StoreRuntime::in_async_context() {
            return Err(CrsError::Io(std::io::Error::other(
                "timed retrieve called from an async context; run it under spawn_blocking",
            )));
        }

        // Reads still queued when the caller gives up are skipped.
        let abandoned = Arc::new(AtomicBool::new(false));
        let read = {
            let inner = Arc::clone(&self.inner);
            let abandoned = Arc::clone(&abandoned);
            move || {
                if abandoned.load(Ordering::Acquire) {
                    return Err(StoreError::NotFound(digest));
                }
                inner.tiers.fetch(&digest, handle)
            }
        };

        let runtime = self.background.runtime.handle();
        let outcome = runtime.block_on(async {
            tokio::time::timeout(limit, tokio::task::spawn_blocking(read)).await
        });
        match outcome {
            Ok(Ok(result)) => result.map_err(CrsError::from),
            Ok(Err(e)) => Err(CrsError::Io(std::io::Error::other(format!(
                "disk read task failed: {e}"
            )))),
            Err(_elapsed) => {
                abandoned.store(true, Ordering::Release);
                warn!(%digest, ?limit, "disk read timed out");
                Err(CrsError::Timeout {
                    digest,
                    after: limit,
                })
            }
        }
    }
}

/// Poll pressure and expiry through a weak reference to the store.
fn spawn_monitor(runtime: &StoreRuntime, weak: Weak<Inner>, period: Duration) -> MonitorHandle {
    monitor::spawn(runtime, period, move || {
        let Some(inner) = weak.upgrade() else {
            return false;
        };
        inner.tiers.relieve_pressure();
        inner.tiers.evict_expired();
        true
    })
}

/// Register payloads already on disk so deduplication survives restarts.
fn adopt_disk_payloads(inner: &Inner) -> usize {
    let disk = inner.tiers.disk();
    let now = inner.clock.now_ms();
    let durable = inner.config.is_durable(ContentKind::Binary);
    let mut adopted = 0;

    for (digest, size) in disk.entries() {
        if let Err(e) = disk.verify(&digest) {
            warn!(%digest, error = %e, "skipping disk payload that failed verification");
            continue;
        }
        let metadata = ContextMetadata::new(ContentKind::Binary, size, now).with_durable(durable);
        match inner
            .table
            .insert(digest, metadata, Handle::new(Location::Disk, digest), None)
        {
            Ok(_) => adopted += 1,
            Err(e) => debug!(%digest, error = %e, "disk payload already registered"),
        }
    }
    if adopted > 0 {
        info!(adopted, "adopted existing disk payloads");
    }
    adopted
}

impl std::fmt::Debug for ContextReferenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextReferenceStore")
            .field("disk_root", &self.inner.config.disk_root)
            .field("tiers", &self.inner.tiers)
            .finish()
    }
}
