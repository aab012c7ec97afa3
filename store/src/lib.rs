//! The two [`model::KeyValueStore`] implementations and the factory that
//! hands them out: an in-memory set, and a scratch table spilled to the
//! destination database for slices too large to hold in process memory.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing))]
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]
#![allow(clippy::module_name_repetitions)]

/// Owns the scratch-table group-id counter and builds stores.
pub mod factory;
/// The unbounded, process-local implementation.
pub mod in_memory;
/// Converts an arbitrarily-typed result column to text.
pub mod pg_value;
/// The destination-resident, spill-capable implementation.
pub mod scratch_table;

pub use factory::StoreFactory;
pub use in_memory::InMemoryStore;
pub use pg_value::{column_as_text, PgValueError};
pub use scratch_table::ScratchTableStore;
