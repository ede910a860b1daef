use std::time::Duration;

use bytes::Bytes;
use crs_types::{ContentDigest, ContentKind, ContextReference};
use tracing::warn;

use crate::error::{CrsError, CrsResult};
use crate::hints::StoreHints;
use crate::store::ContextReferenceStore;

/// The narrow surface collaborators are given: no handles, no table.
pub trait ContextStoreApi {
    fn store(
        &self,
        content: &[u8],
        kind: ContentKind,
        hints: StoreHints,
    ) -> CrsResult<ContextReference>;

    fn retrieve(&self, reference: &ContextReference, timeout: Option<Duration>)
        -> CrsResult<Bytes>;

    fn release(&self, reference: &ContextReference) -> CrsResult<()>;
}

impl ContextStoreApi for ContextReferenceStore {
    fn store(
        &self,
        content: &[u8],
        kind: ContentKind,
        hints: StoreHints,
    ) -> CrsResult<ContextReference> {
        ContextReferenceStore::store(self, content, kind, hints)
    }

    fn retrieve(
        &self,
        reference: &ContextReference,
        timeout: Option<Duration>,
    ) -> CrsResult<Bytes> {
        ContextReferenceStore::retrieve(self, reference, timeout)
    }

    fn release(&self, reference: &ContextReference) -> CrsResult<()> {
        ContextReferenceStore::release(self, reference)
    }
}

/// State that holds references to large context instead of the content.
///
/// Every `attach` takes one reference; `detach` and drop give them back.
pub struct ContextSession<S: ContextStoreApi> {
    store: S,
    held: Vec<ContextReference>,
}

impl<S: ContextStoreApi> ContextSession<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            held: Vec::new(),
        }
    }

    /// Store content and keep a reference to it.
    pub fn attach(
        &mut self,
        content: &[u8],
        kind: ContentKind,
        hints: StoreHints,
    ) -> CrsResult<ContextReference> {
        let reference = self.store.store(content, kind, hints)?;
        self.held.push(reference.clone());
        Ok(reference)
    }

    /// Read held content by digest.
    pub fn read(&self, digest: &ContentDigest, timeout: Option<Duration>) -> CrsResult<Bytes> {
        let reference = self
            .held
            .iter()
            .find(|r| r.digest == *digest)
            .ok_or(CrsError::NotFound(*digest))?;
        self.store.retrieve(reference, timeout)
    }

    /// Give back one reference to `digest`.
    pub fn detach(&mut self, digest: &ContentDigest) -> CrsResult<()> {
        let pos = self
            .held
            .iter()
            .position(|r| r.digest == *digest)
            .ok_or(CrsError::NotFound(*digest))?;
        let reference = self.held.remove(pos);
        self.store.release(&reference)
    }

    pub fn references(&self) -> &[ContextReference] {
        &self.held
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Release everything, reporting the first failure.
    pub fn close(mut self) -> CrsResult<()> {
        let mut first = None;
        for reference in std::mem::take(&mut self.held) {
            if let Err(e) = self.store.release(&reference) {
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

impl<S: ContextStoreApi> Drop for ContextSession<S> {
    fn drop(&mut self) {
        for reference in self.held.drain(..) {
            if let Err(e) = self.store.release(&reference) {
                warn!(digest = %reference.digest, error = %e, "session release failed");
            }
        }
    }
}
