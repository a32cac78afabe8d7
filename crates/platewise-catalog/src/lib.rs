//! `platewise-catalog` – the food catalog and its filter engine.
//!
//! # Modules
//!
//! - [`catalog`] – [`Catalog`][catalog::Catalog]: loads the tabular dish
//!   dataset from CSV into a read-only, stable-ordered collection.
//! - [`filter`] – [`apply`][filter::apply]: narrows a catalog snapshot with a
//!   list of declarative [`Constraint`][platewise_types::Constraint]s (logical
//!   AND, inclusive ranges, case-insensitive set membership).
//! - [`seed`] – the built-in 20-dish dataset, written to disk on first run
//!   when no catalog file exists yet.

pub mod catalog;
pub mod filter;
pub mod seed;

pub use catalog::{Catalog, CatalogStats};
pub use filter::{apply, partition_valid, validate};
pub use seed::{default_catalog, ensure_catalog_file, DEFAULT_CATALOG_CSV};
