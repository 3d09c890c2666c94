//! Mutation orchestrator.
//!
//! Creates move through these states:
//!
//! ```text
//! received → primary-written → diff-computed → propagating → done | failed
//! ```
//!
//! Updates compute their diffs against the stored document before writing it,
//! so a malformed stored reference rejects the update with nothing written:
//!
//! ```text
//! received → diff-computed → primary-written → propagating → done | failed
//! ```
//!
//! Deletes run the diff and the propagation first and remove the primary
//! document last, so a failed propagation leaves the document in place and the
//! delete can simply be retried:
//!
//! ```text
//! received → diff-computed → propagating → primary-deleted → done | failed
//! ```
//!
//! There is no rollback. A primary write that fails aborts the mutation before
//! any inverse write; inverse writes that fail after a committed primary write
//! are reported through [`LinkError::Propagation`].

use crate::config::Config;
use crate::diff::{self, reference_ids, LinkDiff};
use crate::error::{from_parse_error, LinkError, LinkResult};
use crate::links::LinkedDocument;
use crate::propagate::{plan, PropagationReport, Propagator};
use crate::schema::{Cardinality, EntityDef, ReferenceDef, Schema};
use linksync_store::{
    Document, DocumentStore, Filter, Key, Projection, UpdateExpression, UpdateOp,
};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, debug_span, info, warn, Instrument};

/// Lifecycle state of one mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    /// Request accepted, nothing written.
    Received,
    /// The primary document write is committed.
    PrimaryWritten,
    /// Link diffs are computed.
    DiffComputed,
    /// Inverse writes are in flight.
    Propagating,
    /// The primary document is removed. Deletes only.
    PrimaryDeleted,
    /// Everything applied.
    Done,
    /// The mutation stopped with an error.
    Failed,
}

impl MutationState {
    /// Returns true once the mutation can no longer change state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, MutationState::Done | MutationState::Failed)
    }
}

impl fmt::Display for MutationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MutationState::Received => "received",
            MutationState::PrimaryWritten => "primary-written",
            MutationState::DiffComputed => "diff-computed",
            MutationState::Propagating => "propagating",
            MutationState::PrimaryDeleted => "primary-deleted",
            MutationState::Done => "done",
            MutationState::Failed => "failed",
        })
    }
}

/// Counters describing the engine's work so far.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Mutations that reached `done`.
    pub mutations_completed: u64,
    /// Mutations that reached `failed`.
    pub mutations_failed: u64,
    /// Inverse writes applied.
    pub inverse_writes_applied: u64,
    /// Inverse writes skipped because the target was missing.
    pub inverse_writes_skipped: u64,
    /// Inverse writes that failed.
    pub inverse_writes_failed: u64,
    /// Last error message.
    pub last_error: Option<String>,
}

struct Mutation {
    kind: &'static str,
    state: MutationState,
}

impl Mutation {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            state: MutationState::Received,
        }
    }

    fn advance(&mut self, next: MutationState) {
        debug!(mutation = self.kind, from = %self.state, to = %next, "mutation state");
        self.state = next;
    }
}

/// Keeps inverse references consistent across create, update, and delete.
///
/// # Example
///
/// ```rust
/// use linksync_core::{EntityType, LinkEngine, ReferenceField, Schema};
/// use linksync_store::{Key, MemoryStore, UpdateExpression};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let mut builder = Schema::builder();
/// builder.define(
///     EntityType::new("person")
///         .key_field("email")
///         .reference(ReferenceField::many("lovers", "person").inverse("lovers")),
/// )?;
/// let engine = LinkEngine::new(Arc::new(builder.build()?), Arc::new(MemoryStore::new()));
///
/// for email in ["a@example.com", "b@example.com"] {
///     let attrs = json!({ "email": email }).as_object().cloned().unwrap();
///     engine.create("person", attrs).await?;
/// }
///
/// let update = UpdateExpression::new().push("lovers", json!("b@example.com"));
/// engine.update("person", &Key::new("a@example.com"), &update).await?;
///
/// let b = engine.find("person", &Key::new("b@example.com"), &Default::default()).await?;
/// assert_eq!(b.linked_ids("lovers"), [Key::new("a@example.com")]);
/// # Ok::<(), linksync_core::LinkError>(())
/// # }).unwrap();
/// ```
pub struct LinkEngine<S: ?Sized> {
    schema: Arc<Schema>,
    config: Config,
    stats: RwLock<EngineStats>,
    store: Arc<S>,
}

impl<S: DocumentStore + ?Sized> LinkEngine<S> {
    /// Creates an engine with the default configuration.
    pub fn new(schema: Arc<Schema>, store: Arc<S>) -> Self {
        Self::with_config(schema, store, Config::default())
    }

    /// Creates an engine with an explicit configuration.
    pub fn with_config(schema: Arc<Schema>, store: Arc<S>, config: Config) -> Self {
        Self {
            schema,
            config,
            stats: RwLock::new(EngineStats::default()),
            store,
        }
    }

    /// Returns the schema registry.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns a copy of the current stats.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        self.stats.read().clone()
    }

    /// Creates a document and links it to everything it references.
    ///
    /// The key is read from the business key field or generated. Reference
    /// fields present in `attributes` are diffed against an empty previous
    /// state and propagated.
    pub async fn create(
        &self,
        entity_name: &str,
        attributes: Map<String, Value>,
    ) -> LinkResult<LinkedDocument> {
        let mut mutation = Mutation::new("create");
        let span = debug_span!("create", entity = entity_name);
        let result = self
            .create_inner(&mut mutation, entity_name, attributes)
            .instrument(span)
            .await;
        self.finish(mutation, entity_name, result)
    }

    /// Like [`Self::create`], taking a JSON object.
    pub async fn create_json(&self, entity_name: &str, value: &Value) -> LinkResult<LinkedDocument> {
        let attributes = value
            .as_object()
            .cloned()
            .ok_or_else(|| LinkError::invalid_input("document must be a JSON object"))?;
        self.create(entity_name, attributes).await
    }

    /// Applies an update expression and propagates reference changes.
    pub async fn update(
        &self,
        entity_name: &str,
        key: &Key,
        update: &UpdateExpression,
    ) -> LinkResult<LinkedDocument> {
        let mut mutation = Mutation::new("update");
        let span = debug_span!("update", entity = entity_name, key = %key);
        let result = self
            .update_inner(&mut mutation, entity_name, key, update)
            .instrument(span)
            .await;
        self.finish(mutation, entity_name, result)
    }

    /// Like [`Self::update`], taking a MongoDB-style JSON update document.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::UnsupportedOperation`] for operators outside
    /// `$set`, `$unset`, `$push`, `$pushAll`, `$pull`, `$pullAll`.
    pub async fn update_json(
        &self,
        entity_name: &str,
        key: &Key,
        update: &Value,
    ) -> LinkResult<LinkedDocument> {
        let update = UpdateExpression::from_json(update)
            .map_err(|err| from_parse_error(entity_name, err))?;
        self.update(entity_name, key, &update).await
    }

    /// Unlinks a document from everything it references, then deletes it.
    ///
    /// Returns the document as it was before deletion. If propagation fails
    /// the document is not deleted.
    pub async fn delete(&self, entity_name: &str, key: &Key) -> LinkResult<LinkedDocument> {
        let mut mutation = Mutation::new("delete");
        let span = debug_span!("delete", entity = entity_name, key = %key);
        let result = self
            .delete_inner(&mut mutation, entity_name, key)
            .instrument(span)
            .await;
        self.finish(mutation, entity_name, result)
    }

    /// Reads one document.
    pub async fn find(
        &self,
        entity_name: &str,
        key: &Key,
        projection: &Projection,
    ) -> LinkResult<LinkedDocument> {
        let entity = self.schema.entity(entity_name)?;
        let mut found = self
            .store
            .query(
                entity_name,
                &Filter::keys([key.clone()]),
                &Self::store_projection(entity, projection),
            )
            .await?;
        let document = found
            .pop()
            .ok_or_else(|| LinkError::not_found(entity_name, key.clone()))?;
        LinkedDocument::project(entity, document, projection)
    }

    /// Reads every document matching `filter`.
    pub async fn find_many(
        &self,
        entity_name: &str,
        filter: &Filter,
        projection: &Projection,
    ) -> LinkResult<Vec<LinkedDocument>> {
        let entity = self.schema.entity(entity_name)?;
        let documents = self
            .store
            .query(entity_name, filter, &Self::store_projection(entity, projection))
            .await?;
        documents
            .into_iter()
            .map(|document| LinkedDocument::project(entity, document, projection))
            .collect()
    }

    async fn create_inner(
        &self,
        mutation: &mut Mutation,
        entity_name: &str,
        mut fields: Map<String, Value>,
    ) -> LinkResult<LinkedDocument> {
        let entity = self.schema.entity(entity_name)?;
        reject_reserved(fields.keys())?;

        let key = match entity.key_field() {
            Some(key_field) => fields
                .get(key_field)
                .and_then(Key::from_value)
                .ok_or_else(|| {
                    LinkError::invalid_input(format!(
                        "{entity_name}.{key_field} must be a key string"
                    ))
                })?,
            None => Key::generate(),
        };

        for field in entity.references() {
            let Some(value) = fields.remove(&field.name) else {
                continue;
            };
            diff::check_op(entity_name, field, &UpdateOp::Set(value.clone()))?;
            let ids = reference_ids(entity_name, field, Some(&value))?;
            if let Some(stored) = stored_value(field, &ids) {
                fields.insert(field.name.clone(), stored);
            }
        }

        let document = self
            .store
            .insert_one(entity_name, Document::new(key.clone(), fields))
            .await?;
        mutation.advance(MutationState::PrimaryWritten);

        let diffs = entity
            .references()
            .iter()
            .map(|field| diff::diff_values(entity_name, field, None, document.get(&field.name)))
            .collect::<LinkResult<Vec<_>>>()?;
        mutation.advance(MutationState::DiffComputed);

        self.propagate(mutation, entity_name, &key, &diffs).await?;
        LinkedDocument::project(entity, document, &Projection::all())
    }

    async fn update_inner(
        &self,
        mutation: &mut Mutation,
        entity_name: &str,
        key: &Key,
        update: &UpdateExpression,
    ) -> LinkResult<LinkedDocument> {
        let entity = self.schema.entity(entity_name)?;
        let update = self.validate_update(entity, update)?;

        let previous = self
            .store
            .read_one(entity_name, key)
            .await?
            .ok_or_else(|| LinkError::not_found(entity_name, key.clone()))?;

        let mut diffs = Vec::new();
        for change in &update {
            if let Some(field) = entity.reference(&change.field) {
                diffs.push(diff::diff(
                    entity_name,
                    field,
                    previous.get(&field.name),
                    &change.op,
                )?);
            }
        }
        mutation.advance(MutationState::DiffComputed);

        let written = self
            .store
            .write_one(entity_name, key, &update)
            .await?
            .ok_or_else(|| LinkError::not_found(entity_name, key.clone()))?;
        mutation.advance(MutationState::PrimaryWritten);

        self.propagate(mutation, entity_name, key, &diffs).await?;
        LinkedDocument::project(entity, written, &Projection::all())
    }

    async fn delete_inner(
        &self,
        mutation: &mut Mutation,
        entity_name: &str,
        key: &Key,
    ) -> LinkResult<LinkedDocument> {
        let entity = self.schema.entity(entity_name)?;
        let previous = self
            .store
            .read_one(entity_name, key)
            .await?
            .ok_or_else(|| LinkError::not_found(entity_name, key.clone()))?;

        let diffs = entity
            .references()
            .iter()
            .map(|field| diff::diff_values(entity_name, field, previous.get(&field.name), None))
            .collect::<LinkResult<Vec<_>>>()?;
        mutation.advance(MutationState::DiffComputed);

        self.propagate(mutation, entity_name, key, &diffs).await?;

        if !self.store.delete_one(entity_name, key).await? {
            return Err(LinkError::not_found(entity_name, key.clone()));
        }
        mutation.advance(MutationState::PrimaryDeleted);

        LinkedDocument::project(entity, previous, &Projection::all())
    }

    // Rejects bad field updates before anything is written and dedupes
    // whole-array sets on multi-valued references.
    fn validate_update(
        &self,
        entity: &EntityDef,
        update: &UpdateExpression,
    ) -> LinkResult<UpdateExpression> {
        if let Some(field) = update.conflicting_field() {
            return Err(LinkError::invalid_input(format!(
                "{}.{field} is targeted by more than one operator",
                entity.name()
            )));
        }
        reject_reserved(update.iter().map(|change| &change.field))?;

        let mut normalized = UpdateExpression::new();
        for change in update {
            if entity.key_field() == Some(change.field.as_str()) {
                return Err(LinkError::invalid_input(format!(
                    "{}.{} is the primary key and cannot be updated",
                    entity.name(),
                    change.field
                )));
            }
            let op = match entity.reference(&change.field) {
                Some(field) => {
                    diff::check_op(entity.name(), field, &change.op)?;
                    match &change.op {
                        UpdateOp::Set(value) => {
                            let ids = reference_ids(entity.name(), field, Some(value))?;
                            stored_value(field, &ids).map_or(UpdateOp::Unset, UpdateOp::Set)
                        }
                        other => other.clone(),
                    }
                }
                None => change.op.clone(),
            };
            normalized.add(change.field.clone(), op);
        }
        Ok(normalized)
    }

    async fn propagate(
        &self,
        mutation: &mut Mutation,
        entity_name: &str,
        key: &Key,
        diffs: &[LinkDiff],
    ) -> LinkResult<PropagationReport> {
        let writes = plan(&self.schema, entity_name, key, diffs)?;
        mutation.advance(MutationState::Propagating);
        debug!(writes = writes.len(), "propagating inverse writes");

        let result = Propagator::new(self.store.as_ref(), &self.config)
            .propagate(entity_name, key, writes)
            .await;

        let mut stats = self.stats.write();
        match result {
            Ok(report) => {
                stats.inverse_writes_applied += report.applied.len() as u64;
                stats.inverse_writes_skipped += report.skipped.len() as u64;
                Ok(report)
            }
            Err(err) => {
                stats.inverse_writes_applied += err.applied.len() as u64;
                stats.inverse_writes_failed += err.failures.len() as u64;
                Err(err.into())
            }
        }
    }

    fn finish<T>(
        &self,
        mut mutation: Mutation,
        entity_name: &str,
        result: LinkResult<T>,
    ) -> LinkResult<T> {
        let mut stats = self.stats.write();
        match &result {
            Ok(_) => {
                mutation.advance(MutationState::Done);
                stats.mutations_completed += 1;
                info!(mutation = mutation.kind, entity = entity_name, "mutation done");
            }
            Err(err) => {
                let reached = mutation.state;
                mutation.advance(MutationState::Failed);
                stats.mutations_failed += 1;
                stats.last_error = Some(err.to_string());
                warn!(
                    mutation = mutation.kind,
                    entity = entity_name,
                    reached = %reached,
                    error = %err,
                    "mutation failed"
                );
            }
        }
        result
    }

    // Reference fields are always read so links stay complete under any
    // attribute selection.
    fn store_projection(entity: &EntityDef, projection: &Projection) -> Projection {
        projection.widened(entity.reference_names())
    }
}

fn reject_reserved<'a>(mut fields: impl Iterator<Item = &'a String>) -> LinkResult<()> {
    match fields.find(|field| matches!(field.as_str(), "id" | "links")) {
        Some(field) => Err(LinkError::invalid_input(format!(
            "{field} is reserved and cannot be written"
        ))),
        None => Ok(()),
    }
}

// Canonical stored form of a reference: a key string, or an array of
// distinct key strings. `None` means the field is absent.
fn stored_value(field: &ReferenceDef, ids: &[Key]) -> Option<Value> {
    match field.cardinality {
        Cardinality::One => ids.first().map(Key::to_value),
        Cardinality::Many => Some(Value::Array(ids.iter().map(Key::to_value).collect())),
    }
}
