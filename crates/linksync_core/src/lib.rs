//! # linksync core
//!
//! Relationship synchronization for document stores.
//!
//! Document stores hold references as plain key values: a `person` document
//! lists the houses it owns, and each `house` lists its owners. Nothing in the
//! store keeps the two sides in agreement. This crate does.
//!
//! This crate provides:
//! - Schema registry with relation validation
//! - Link diff engine (old vs new reference values per update operator)
//! - Inverse propagator (bounded-concurrency back-reference writes)
//! - Mutation orchestrator for create, update, and delete
//! - Links projection on reads
//! - Consistency checking and repair
//!
//! ## Architecture
//!
//! Every mutation follows the same path:
//! 1. Validate the request against the [`Schema`]
//! 2. Write the primary document
//! 3. Diff each touched reference field ([`diff()`])
//! 4. Plan and apply inverse writes ([`plan`], [`Propagator`])
//!
//! Deletes propagate before removing the primary document.
//!
//! ## Key Invariants
//!
//! - Inverse writes only follow a committed primary write
//! - External references never cause inverse writes
//! - A document is never written as its own inverse target
//! - Single-valued inverses are only cleared if they still point at the source
//! - Partial propagation is always reported, never swallowed

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod check;
mod config;
mod diff;
mod engine;
mod error;
mod links;
mod propagate;
mod schema;

pub use check::{check_consistency, repair, ConsistencyReport, MissingSide, OneSidedLink};
pub use config::Config;
pub use diff::{check_op, diff, diff_values, reference_ids, LinkDiff};
pub use engine::{EngineStats, LinkEngine, MutationState};
pub use error::{LinkError, LinkResult, PropagationError, PropagationFailure};
pub use links::{Link, LinkedDocument};
pub use propagate::{plan, InverseWrite, PropagationReport, Propagator};
pub use schema::{
    Cardinality, EntityDef, EntityType, InverseDef, KeyType, ReferenceDef, ReferenceField, Schema,
    SchemaBuilder,
};

pub use linksync_store::{
    Document, DocumentStore, Filter, Key, MemoryStore, Projection, StoreError, UpdateExpression,
    UpdateOp,
};
