//! In-memory document store.

use crate::document::{Document, Key};
use crate::error::{StoreError, StoreResult};
use crate::query::{Filter, Projection};
use crate::store::DocumentStore;
use crate::update::UpdateExpression;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::trace;

type Collection = BTreeMap<Key, Document>;

/// An in-memory document store.
///
/// This store keeps every collection in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Offline consistency checks over a loaded dataset
///
/// Every operation yields to the scheduler once before touching data, so
/// concurrently issued writes interleave the way they would against a real
/// store. The lock is never held across that yield.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces documents without going through the async API.
    ///
    /// Useful for loading fixtures and datasets.
    pub fn load(&self, collection: &str, documents: impl IntoIterator<Item = Document>) {
        let mut collections = self.collections.write();
        let target = collections.entry(collection.to_string()).or_default();
        for document in documents {
            target.insert(document.key().clone(), document);
        }
    }

    /// Returns a copy of every document in a collection, ordered by key.
    #[must_use]
    pub fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the number of documents in a collection.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections.read().get(collection).map_or(0, BTreeMap::len)
    }

    /// Returns the names of all non-empty collections.
    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .collections
            .read()
            .iter()
            .filter(|(_, docs)| !docs.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn read_one(&self, collection: &str, key: &Key) -> StoreResult<Option<Document>> {
        tokio::task::yield_now().await;
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(key))
            .cloned())
    }

    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<Document> {
        tokio::task::yield_now().await;
        let mut collections = self.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.contains_key(document.key()) {
            return Err(StoreError::DuplicateKey {
                collection: collection.to_string(),
                key: document.key().to_string(),
            });
        }
        docs.insert(document.key().clone(), document.clone());
        trace!(collection, key = %document.key(), "inserted");
        Ok(document)
    }

    async fn write_one(
        &self,
        collection: &str,
        key: &Key,
        update: &UpdateExpression,
    ) -> StoreResult<Option<Document>> {
        tokio::task::yield_now().await;
        let mut collections = self.collections.write();
        let Some(document) = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(key))
        else {
            trace!(collection, %key, "write to missing document");
            return Ok(None);
        };
        update.apply(document.fields_mut())?;
        trace!(collection, %key, fields = update.len(), "updated");
        Ok(Some(document.clone()))
    }

    async fn delete_one(&self, collection: &str, key: &Key) -> StoreResult<bool> {
        tokio::task::yield_now().await;
        let removed = self
            .collections
            .write()
            .get_mut(collection)
            .and_then(|docs| docs.remove(key))
            .is_some();
        trace!(collection, %key, removed, "delete");
        Ok(removed)
    }

    async fn query(
        &self,
        collection: &str,
        filter: &Filter,
        projection: &Projection,
    ) -> StoreResult<Vec<Document>> {
        tokio::task::yield_now().await;
        let collections = self.collections.read();
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let matching = docs.values().filter(|doc| filter.matches(doc)).cloned();
        let limited: Vec<Document> = match filter.max_results() {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        };
        Ok(limited
            .into_iter()
            .map(|doc| projection.apply(doc))
            .collect())
    }
}
