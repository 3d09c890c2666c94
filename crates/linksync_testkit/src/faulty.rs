//! Fault injection for store calls.
//!
//! [`FaultyStore`] wraps any [`DocumentStore`] and fails writes aimed at
//! chosen documents with [`StoreError::Unavailable`], leaving every other call
//! untouched. Used to drive the engine into partial propagation.

use async_trait::async_trait;
use linksync_store::{
    Document, DocumentStore, Filter, Key, Projection, StoreError, StoreResult, UpdateExpression,
};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A store wrapper that fails writes to selected documents.
pub struct FaultyStore<S> {
    inner: S,
    failing: RwLock<HashSet<(String, Key)>>,
    injected: AtomicUsize,
}

impl<S: DocumentStore> FaultyStore<S> {
    /// Wraps `inner` with no faults armed.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing: RwLock::new(HashSet::new()),
            injected: AtomicUsize::new(0),
        }
    }

    /// Makes every write to `collection/key` fail until [`Self::heal`].
    pub fn fail_writes_to(&self, collection: &str, key: &Key) {
        self.failing
            .write()
            .insert((collection.to_string(), key.clone()));
    }

    /// Disarms every fault.
    pub fn heal(&self) {
        self.failing.write().clear();
    }

    /// Returns how many calls were failed so far.
    pub fn injected_failures(&self) -> usize {
        self.injected.load(Ordering::SeqCst)
    }

    fn check(&self, collection: &str, key: &Key) -> StoreResult<()> {
        if self
            .failing
            .read()
            .contains(&(collection.to_string(), key.clone()))
        {
            self.injected.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::unavailable(format!(
                "injected fault on {collection}/{key}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: DocumentStore> DocumentStore for FaultyStore<S> {
    async fn read_one(&self, collection: &str, key: &Key) -> StoreResult<Option<Document>> {
        self.inner.read_one(collection, key).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<Document> {
        self.check(collection, document.key())?;
        self.inner.insert_one(collection, document).await
    }

    async fn write_one(
        &self,
        collection: &str,
        key: &Key,
        update: &UpdateExpression,
    ) -> StoreResult<Option<Document>> {
        self.check(collection, key)?;
        self.inner.write_one(collection, key, update).await
    }

    async fn delete_one(&self, collection: &str, key: &Key) -> StoreResult<bool> {
        self.check(collection, key)?;
        self.inner.delete_one(collection, key).await
    }

    async fn query(
        &self,
        collection: &str,
        filter: &Filter,
        projection: &Projection,
    ) -> StoreResult<Vec<Document>> {
        self.inner.query(collection, filter, projection).await
    }
}
