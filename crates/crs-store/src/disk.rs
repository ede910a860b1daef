use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use bytes::Bytes;
use crs_crypto::ContentHasher;
use crs_types::{ContentDigest, Handle, Location};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::budget::CapacityBudget;
use crate::error::{StoreError, StoreResult};
use crate::traits::TierBackend;

/// Disk-backed payload store.
///
/// One file per digest, laid out like a git object directory:
///
/// ```text
/// <root>/ab/cdef0123...   (first byte as directory, remaining 62 hex chars as file)
/// ```
///
/// Files are written to a temporary file in `<root>` and renamed into place,
/// so a reader never observes a half-written payload. Every `get` re-hashes
/// the bytes and fails with [`StoreError::Corrupt`] on mismatch.
pub struct DiskBackend {
    root: PathBuf,
    budget: CapacityBudget,
    index: RwLock<HashMap<ContentDigest, u64>>,
}

impl DiskBackend {
    /// Open (or create) a disk store rooted at `root` with a soft byte cap.
    ///
    /// Payload files already present under `root` are indexed and counted
    /// against the cap. Anything that does not look like a payload file is
    /// skipped.
    pub fn open(root: &Path, capacity_bytes: u64) -> StoreResult<Self> {
        fs::create_dir_all(root)?;
        let budget = CapacityBudget::new(capacity_bytes);
        let mut index = HashMap::new();

        for entry in WalkDir::new(root).min_depth(2).max_depth(2) {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(digest) = digest_from_path(entry.path()) else {
                warn!(path = ?entry.path(), "skipping unrecognized file in disk tier");
                continue;
            };
            let size = entry.metadata().map_err(io::Error::from)?.len();
            if budget.try_reserve(size).is_err() {
                warn!(%digest, size, "existing payloads exceed disk soft cap");
                budget.charge(size);
            }
            index.insert(digest, size);
        }

        debug!(root = ?root, payloads = index.len(), "opened disk tier");
        Ok(Self {
            root: root.to_path_buf(),
            budget,
            index: RwLock::new(index),
        })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path where the payload for `digest` lives.
    pub fn path_for(&self, digest: &ContentDigest) -> PathBuf {
        let hex = digest.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..])
    }

    /// Number of indexed payloads.
    pub fn len(&self) -> usize {
        self.index.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().expect("lock poisoned").is_empty()
    }

    /// All indexed payloads with their sizes, sorted by digest.
    pub fn entries(&self) -> Vec<(ContentDigest, u64)> {
        let map = self.index.read().expect("lock poisoned");
        let mut entries: Vec<(ContentDigest, u64)> =
            map.iter().map(|(d, s)| (*d, *s)).collect();
        entries.sort();
        entries
    }

    /// Re-read a payload and check it against its digest.
    pub fn verify(&self, digest: &ContentDigest) -> StoreResult<()> {
        self.get(&Handle::new(Location::Disk, *digest)).map(|_| ())
    }

    fn write_payload(&self, digest: &ContentDigest, data: &[u8]) -> io::Result<()> {
        let target = self.path_for(digest);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        tmp.write_all(data)?;
        tmp.flush()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    }
}

impl TierBackend for DiskBackend {
    fn location(&self) -> Location {
        Location::Disk
    }

    fn put(&self, digest: &ContentDigest, data: Bytes) -> StoreResult<Handle> {
        let handle = Handle::new(Location::Disk, *digest);
        if self.index.read().expect("lock poisoned").contains_key(digest) {
            return Ok(handle);
        }

        let size = data.len() as u64;
        self.budget
            .try_reserve(size)
            .map_err(|available| StoreError::CapacityExceeded {
                location: Location::Disk,
                requested: size,
                available,
            })?;

        if let Err(e) = self.write_payload(digest, &data) {
            self.budget.release(size);
            return Err(e.into());
        }

        let mut index = self.index.write().expect("lock poisoned");
        if index.insert(*digest, size).is_some() {
            // Lost a race with an identical write; the file content is the same.
            self.budget.release(size);
        }
        debug!(%digest, size, "payload written to disk");
        Ok(handle)
    }

    fn get(&self, handle: &Handle) -> StoreResult<Bytes> {
        let digest = handle.digest;
        if handle.location != Location::Disk
            || !self.index.read().expect("lock poisoned").contains_key(&digest)
        {
            return Err(StoreError::NotFound(digest));
        }

        let data = match fs::read(self.path_for(&digest)) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(digest));
            }
            Err(e) => return Err(e.into()),
        };

        let computed = ContentHasher::CONTEXT.hash(&data);
        if computed != digest {
            warn!(%digest, %computed, "disk payload failed verification");
            return Err(StoreError::Corrupt { digest, computed });
        }
        Ok(Bytes::from(data))
    }

    fn remove(&self, handle: &Handle) -> StoreResult<u64> {
        let digest = handle.digest;
        if handle.location != Location::Disk {
            return Err(StoreError::NotFound(digest));
        }
        let size = self
            .index
            .write()
            .expect("lock poisoned")
            .remove(&digest)
            .ok_or(StoreError::NotFound(digest))?;
        self.budget.release(size);

        match fs::remove_file(self.path_for(&digest)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(%digest, "payload file already gone during remove");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(size)
    }

    fn contains(&self, handle: &Handle) -> bool {
        handle.location == Location::Disk
            && self
                .index
                .read()
                .expect("lock poisoned")
                .contains_key(&handle.digest)
    }

    fn current_bytes_used(&self) -> u64 {
        self.budget.used()
    }

    fn capacity_bytes(&self) -> u64 {
        self.budget.capacity()
    }
}

impl std::fmt::Debug for DiskBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskBackend")
            .field("root", &self.root)
            .field("payload_count", &self.len())
            .field("bytes_used", &self.current_bytes_used())
            .finish()
    }
}

/// Recover a digest from `<root>/ab/cdef...`.
fn digest_from_path(path: &Path) -> Option<ContentDigest> {
    let file = path.file_name()?.to_str()?;
    let dir = path.parent()?.file_name()?.to_str()?;
    if dir.len() != 2 || file.len() != 62 {
        return None;
    }
    ContentDigest::from_hex(&format!("{dir}{file}")).ok()
}
