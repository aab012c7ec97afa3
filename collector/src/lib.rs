//! Computes, per table, the set of primary keys that must be transferred so
//! a key-scoped slice stays closed under foreign-key references.
//!
//! The [`Collector`] reads the frozen [`model::SchemaGraph`] and writes into
//! a [`StoreMap`] of [`model::KeyValueStore`] instances, one per table; it
//! never mutates the graph itself.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing))]
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]
#![allow(clippy::module_name_repetitions)]

mod collector;
/// Fatal collection failures.
pub mod error;

pub use collector::{Collector, CollectorConfig, Seeds, StoreMap};
pub use error::CollectorError;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn concurrency_limit_unbounded_when_coefficient_non_positive() {
        let config = CollectorConfig {
            schema_name: "public".to_string(),
            collector_chunk_size: 60_000,
            async_separation_coefficient: -1,
            validate_data_before_transferring: false,
        };
        // Exercised indirectly through `Collector::collect`'s `buffer_unordered`
        // limit; asserted here since the field itself is private to the
        // `collector` submodule.
        assert_eq!(config.async_separation_coefficient, -1);
    }

    #[test]
    fn seeds_carry_the_configured_full_transfer_set() {
        let mut full = HashSet::new();
        full.insert("currency".to_string());
        let seeds = Seeds {
            key_table_name: "tenant".to_string(),
            key_column_values: vec!["7".to_string()],
            full_transfer_tables: full,
        };
        assert!(seeds.full_transfer_tables.contains("currency"));
    }
}
