//! Document store trait definition.

use crate::document::{Document, Key};
use crate::error::StoreResult;
use crate::query::{Filter, Projection};
use crate::update::UpdateExpression;
use async_trait::async_trait;
use std::sync::Arc;

/// An asynchronous document store.
///
/// Stores hold schema-less documents grouped into named collections. The link
/// engine issues every read and write through this trait, so these calls are
/// the only suspension points of a mutation.
///
/// # Invariants
///
/// - `write_one` applies the whole expression to a single document atomically
/// - No operation spans more than one document atomically
/// - Concurrent writes to the same document are serialized; the last one wins
/// - Implementations must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::MemoryStore`] - For tests and ephemeral data
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads one document by primary key.
    ///
    /// Returns `Ok(None)` if no such document exists.
    async fn read_one(&self, collection: &str, key: &Key) -> StoreResult<Option<Document>>;

    /// Inserts a new document.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::DuplicateKey`] if the key is taken.
    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<Document>;

    /// Applies `update` to one document and returns the updated document.
    ///
    /// Returns `Ok(None)` if no such document exists; nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::InvalidUpdate`] if an operator does not fit
    /// the stored value. The document is then left unchanged.
    async fn write_one(
        &self,
        collection: &str,
        key: &Key,
        update: &UpdateExpression,
    ) -> StoreResult<Option<Document>>;

    /// Deletes one document.
    ///
    /// Returns `true` if a document was removed.
    async fn delete_one(&self, collection: &str, key: &Key) -> StoreResult<bool>;

    /// Returns the documents matching `filter`, ordered by key, with
    /// `projection` applied.
    async fn query(
        &self,
        collection: &str,
        filter: &Filter,
        projection: &Projection,
    ) -> StoreResult<Vec<Document>>;
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for Arc<S> {
    async fn read_one(&self, collection: &str, key: &Key) -> StoreResult<Option<Document>> {
        (**self).read_one(collection, key).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> StoreResult<Document> {
        (**self).insert_one(collection, document).await
    }

    async fn write_one(
        &self,
        collection: &str,
        key: &Key,
        update: &UpdateExpression,
    ) -> StoreResult<Option<Document>> {
        (**self).write_one(collection, key, update).await
    }

    async fn delete_one(&self, collection: &str, key: &Key) -> StoreResult<bool> {
        (**self).delete_one(collection, key).await
    }

    async fn query(
        &self,
        collection: &str,
        filter: &Filter,
        projection: &Projection,
    ) -> StoreResult<Vec<Document>> {
        (**self).query(collection, filter, projection).await
    }
}
