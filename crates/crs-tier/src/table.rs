use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use crs_eviction::EvictionCandidate;
use crs_types::{ContentDigest, ContextMetadata, ContextReference, Handle, Tier};
use tracing::warn;

use crate::error::{TableError, TableResult};

const SHARDS: usize = 16;

#[derive(Debug, Clone)]
struct Entry {
    metadata: ContextMetadata,
    handle: Handle,
    ref_count: u64,
    last_access_ms: u64,
    access_count: u64,
    expires_at_ms: Option<u64>,
    evict_on_release: bool,
    recent_reads: VecDeque<u64>,
}

impl Entry {
    fn view(&self, digest: ContentDigest) -> ContextReference {
        ContextReference {
            digest,
            metadata: self.metadata.clone(),
            tier: self.handle.tier(),
            handle: self.handle,
            ref_count: self.ref_count,
            last_access_ms: self.last_access_ms,
            access_count: self.access_count,
            expires_at_ms: self.expires_at_ms,
        }
    }

    fn touch(&mut self, now_ms: u64) {
        self.last_access_ms = self.last_access_ms.max(now_ms);
        self.access_count = self.access_count.saturating_add(1);
    }

    fn candidate(&self, digest: ContentDigest) -> EvictionCandidate {
        EvictionCandidate {
            digest,
            size_bytes: self.metadata.size_bytes,
            created_at_ms: self.metadata.created_at_ms,
            last_access_ms: self.last_access_ms,
            access_count: self.access_count,
            expires_at_ms: self.expires_at_ms,
            ref_count: self.ref_count,
        }
    }
}

/// A read in progress: the entry is pinned until released.
#[derive(Debug, Clone)]
pub struct Pin {
    pub reference: ContextReference,
    /// Reads of this entry inside the rolling window, this one included.
    pub reads_in_window: u32,
}

/// Outcome of dropping one reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Released {
    pub ref_count: u64,
    /// The count reached zero on an entry flagged for eviction-on-release.
    pub evict_now: bool,
}

/// Digest to reference mapping; the deduplication ledger.
///
/// Sharded by digest so lookups of unrelated content do not contend. Every
/// mutation of one entry happens under its shard's write lock, which makes
/// reference counting and re-pointing atomic with respect to each other.
pub struct ReferenceTable {
    shards: Vec<RwLock<HashMap<ContentDigest, Entry>>>,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARDS).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, digest: &ContentDigest) -> &RwLock<HashMap<ContentDigest, Entry>> {
        &self.shards[digest.fan_out() as usize % SHARDS]
    }

    fn with_entry<T>(
        &self,
        digest: &ContentDigest,
        f: impl FnOnce(&mut Entry) -> T,
    ) -> TableResult<T> {
        let mut shard = self.shard(digest).write().expect("lock poisoned");
        shard
            .get_mut(digest)
            .map(f)
            .ok_or(TableError::NotFound(*digest))
    }

    pub fn lookup(&self, digest: &ContentDigest) -> Option<ContextReference> {
        let shard = self.shard(digest).read().expect("lock poisoned");
        shard.get(digest).map(|e| e.view(*digest))
    }

    pub fn contains(&self, digest: &ContentDigest) -> bool {
        self.shard(digest)
            .read()
            .expect("lock poisoned")
            .contains_key(digest)
    }

    /// The handle currently backing `digest`.
    pub fn handle_of(&self, digest: &ContentDigest) -> Option<Handle> {
        let shard = self.shard(digest).read().expect("lock poisoned");
        shard.get(digest).map(|e| e.handle)
    }

    /// Insert a new, unreferenced entry. Not idempotent.
    pub fn insert(
        &self,
        digest: ContentDigest,
        metadata: ContextMetadata,
        handle: Handle,
        expires_at_ms: Option<u64>,
    ) -> TableResult<ContextReference> {
        let mut shard = self.shard(&digest).write().expect("lock poisoned");
        if shard.contains_key(&digest) {
            return Err(TableError::AlreadyExists(digest));
        }
        let entry = Entry {
            last_access_ms: metadata.created_at_ms,
            metadata,
            handle,
            ref_count: 0,
            access_count: 0,
            expires_at_ms,
            evict_on_release: false,
            recent_reads: VecDeque::new(),
        };
        let view = entry.view(digest);
        shard.insert(digest, entry);
        Ok(view)
    }

    /// Record an access: bump the timestamp and frequency counter.
    pub fn touch(&self, digest: &ContentDigest, now_ms: u64) -> TableResult<ContextReference> {
        self.with_entry(digest, |e| {
            e.touch(now_ms);
            e.view(*digest)
        })
    }

    pub fn remove(&self, digest: &ContentDigest) -> TableResult<ContextReference> {
        let mut shard = self.shard(digest).write().expect("lock poisoned");
        shard
            .remove(digest)
            .map(|e| e.view(*digest))
            .ok_or(TableError::NotFound(*digest))
    }

    /// Take a reference on behalf of a caller and record the access.
    pub fn retain(&self, digest: &ContentDigest, now_ms: u64) -> TableResult<ContextReference> {
        self.with_entry(digest, |e| {
            e.ref_count += 1;
            e.touch(now_ms);
            e.view(*digest)
        })
    }

    /// Pin for a read, recording it in the rolling window of `window_ms`.
    ///
    /// At most `max_tracked` read timestamps are kept, so the reported count
    /// saturates there.
    pub fn pin(
        &self,
        digest: &ContentDigest,
        now_ms: u64,
        window_ms: u64,
        max_tracked: usize,
    ) -> TableResult<Pin> {
        self.with_entry(digest, |e| {
            e.ref_count += 1;
            e.touch(now_ms);
            e.recent_reads.push_back(now_ms);
            let horizon = now_ms.saturating_sub(window_ms);
            while e.recent_reads.front().is_some_and(|&t| t < horizon)
                || e.recent_reads.len() > max_tracked
            {
                e.recent_reads.pop_front();
            }
            Pin {
                reference: e.view(*digest),
                reads_in_window: e.recent_reads.len().min(u32::MAX as usize) as u32,
            }
        })
    }

    /// Drop one reference (a caller's or a finished read's pin).
    pub fn release(&self, digest: &ContentDigest) -> TableResult<Released> {
        self.with_entry(digest, |e| {
            if e.ref_count == 0 {
                warn!(%digest, "release of an unreferenced entry");
            }
            e.ref_count = e.ref_count.saturating_sub(1);
            Released {
                ref_count: e.ref_count,
                evict_now: e.ref_count == 0 && e.evict_on_release,
            }
        })
    }

    /// Flag an in-use entry so it is reclaimed once its count drops to zero.
    pub fn mark_evict_on_release(&self, digest: &ContentDigest) -> bool {
        self.with_entry(digest, |e| e.evict_on_release = true).is_ok()
    }

    /// Move the entry to `new` if it still points at `expected`.
    pub fn repoint(&self, digest: &ContentDigest, expected: &Handle, new: Handle) -> bool {
        self.with_entry(digest, |e| {
            if e.handle != *expected {
                return false;
            }
            e.handle = new;
            true
        })
        .unwrap_or(false)
    }

    /// Like [`repoint`](Self::repoint), but only while nobody holds the entry.
    pub fn repoint_if_idle(&self, digest: &ContentDigest, expected: &Handle, new: Handle) -> bool {
        self.with_entry(digest, |e| {
            if e.handle != *expected || e.ref_count > 0 {
                return false;
            }
            e.handle = new;
            e.evict_on_release = false;
            true
        })
        .unwrap_or(false)
    }

    /// Remove the entry if it still points at `expected` and is unreferenced.
    pub fn remove_if_idle(
        &self,
        digest: &ContentDigest,
        expected: &Handle,
    ) -> Option<ContextReference> {
        let mut shard = self.shard(digest).write().expect("lock poisoned");
        let removable = shard
            .get(digest)
            .is_some_and(|e| e.handle == *expected && e.ref_count == 0);
        if !removable {
            return None;
        }
        shard.remove(digest).map(|e| e.view(*digest))
    }

    /// Scoring snapshot of every entry resident in `tier`.
    pub fn candidates(&self, tier: Tier) -> Vec<EvictionCandidate> {
        let mut out = Vec::new();
        for shard in &self.shards {
            let shard = shard.read().expect("lock poisoned");
            out.extend(
                shard
                    .iter()
                    .filter(|(_, e)| e.handle.tier() == tier)
                    .map(|(d, e)| e.candidate(*d)),
            );
        }
        out
    }

    /// All references, ordered by digest.
    pub fn references(&self) -> Vec<ContextReference> {
        let mut out = Vec::new();
        for shard in &self.shards {
            let shard = shard.read().expect("lock poisoned");
            out.extend(shard.iter().map(|(d, e)| e.view(*d)));
        }
        out.sort_by(|a, b| a.digest.cmp(&b.digest));
        out
    }

    /// Entry counts as `(memory, disk)`.
    pub fn count_by_tier(&self) -> (usize, usize) {
        let mut memory = 0;
        let mut disk = 0;
        for shard in &self.shards {
            for entry in shard.read().expect("lock poisoned").values() {
                match entry.handle.tier() {
                    Tier::Memory => memory += 1,
                    Tier::Disk => disk += 1,
                }
            }
        }
        (memory, disk)
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().expect("lock poisoned").len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ReferenceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReferenceTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceTable")
            .field("entries", &self.len())
            .finish()
    }
}
