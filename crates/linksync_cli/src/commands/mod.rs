//! CLI command implementations.

pub mod apply;
pub mod check;
pub mod data;
pub mod inspect;
