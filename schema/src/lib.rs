//! Reverse-engineers a live PostgreSQL schema into a
//! [`model::schema_types::SchemaGraph`]: table/column/constraint
//! introspection, partition exclusion, and FK-graph wiring.
//!
//! This crate is the only place a `model::SchemaGraph` is *mutated*; once
//! [`introspect`] returns, the orchestrator treats it as read-only.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing))]
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]
#![allow(clippy::module_name_repetitions)]

/// Fatal introspection failures.
pub mod error;
/// `prepare_structure()`.
pub mod introspector;

pub use error::IntrospectionError;
pub use introspector::{introspect, IntrospectionOptions};
