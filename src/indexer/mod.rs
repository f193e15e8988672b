//! Data tile indexing.
//!
//! Serves filter updates for a set of grouped aggregate queries from
//! pre-aggregated "tile" tables: each client query is materialized once,
//! grouped additionally by the binned value of the active filter, and every
//! later filter value is answered by re-aggregating the matching bins.
//!
//! # Module structure
//!
//! - [`types`] - query shapes, re-aggregation, index entries, error type
//! - [`bin`] - scale-aware binning of continuous values
//! - [`shape`] - which client queries can be re-aggregated
//! - [`active`] - bin/value columns of the active clause
//! - [`build`] - generation queries, subquery pushdown, table naming, DDL
//! - [`engine`] - the [`DataTileIndexer`] state machine

pub mod active;
pub mod bin;
pub mod build;
pub mod engine;
pub mod shape;
pub mod types;

// Re-export the most commonly used items at the crate::indexer level.
pub use active::{ActiveKind, ActiveView};
pub use bin::{Binner, ScaleTransform, bin};
pub use engine::{DataTileIndexer, IndexState};
pub use shape::analyze;
pub use types::{
    AggregateKind, BaseTable, COUNT_COLUMN, IndexEntry, IndexerError, IndexerResult, Presentation,
    QueryShape, Reaggregate, TABLE_PREFIX,
};
