//! # linksync testkit
//!
//! Test utilities for linksync.
//!
//! This crate provides:
//! - A fixture schema (people, pets, cars, houses) and fixture data
//! - A [`TestLinks`] harness bundling a store, an engine, and fixture keys
//! - A fault-injecting store wrapper for partial propagation scenarios
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use linksync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn test_with_fixtures() {
//!     let links = TestLinks::memory().await;
//!     let person = &links.ids.person[0];
//!     // ... mutations through links.engine
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faulty;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faulty::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use faulty::*;
pub use fixtures::*;
pub use generators::*;
