//! # linksync store
//!
//! The document store collaborator consumed by the link synchronization engine.
//!
//! Stores are **schema-agnostic**: they keep JSON documents keyed by primary key
//! inside named collections and apply update expressions atomically per document.
//! They know nothing about references, inverses, or entity types.
//!
//! ## Design Principles
//!
//! - Every operation is asynchronous; suspension happens only at store calls
//! - A single [`UpdateExpression`] is applied atomically against one document
//! - No multi-document transactions
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Stores
//!
//! - [`MemoryStore`] - In-process store for tests and ephemeral data
//!
//! ## Example
//!
//! ```rust
//! use linksync_store::{DocumentStore, Document, Key, MemoryStore, UpdateExpression};
//! use serde_json::json;
//!
//! # tokio_test_block(async {
//! let store = MemoryStore::new();
//! let key = Key::new("h1");
//! store.insert_one("house", Document::new(key.clone(), Default::default())).await.unwrap();
//!
//! let update = UpdateExpression::new().push("owners", json!("ann@example.com"));
//! let doc = store.write_one("house", &key, &update).await.unwrap().unwrap();
//! assert_eq!(doc.get("owners"), Some(&json!(["ann@example.com"])));
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod error;
mod memory;
mod query;
mod store;
mod update;

pub use document::{Document, Key};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use query::{Filter, Projection};
pub use store::DocumentStore;
pub use update::{FieldUpdate, ParseError, UpdateExpression, UpdateOp};
