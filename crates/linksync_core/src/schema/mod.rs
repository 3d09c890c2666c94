//! Entity type declarations and the validated schema registry.
//!
//! Entity types are declared with [`EntityType`] and [`ReferenceField`], then
//! registered on a [`SchemaBuilder`]. [`SchemaBuilder::build`] validates every
//! reference eagerly (targets exist or are external, inverses exist and are
//! reciprocal, key types agree) and produces an immutable [`Schema`].

mod registry;
mod types;

pub use registry::{EntityDef, InverseDef, ReferenceDef, Schema, SchemaBuilder};
pub use types::{Cardinality, EntityType, KeyType, ReferenceField};
