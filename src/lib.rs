//! Tile indexing for interactive cross-filtered aggregate views.
//!
//! A [`DataTileIndexer`] watches a [`Selection`] on behalf of a [`ClientSet`]
//! and, when every client runs a re-aggregable grouped query over one base
//! table, materializes per-client tile tables keyed by the binned value of
//! the active clause. Subsequent filter updates become small re-aggregation
//! queries against those tables.

pub mod client;
pub mod config;
pub mod indexer;
pub mod selection;
pub mod sql;

pub use client::{Client, ClientId, ClientSet, Coordinator, ExecError};
pub use config::{ConfigError, IndexerConfig};
pub use indexer::{DataTileIndexer, IndexState, IndexerError, IndexerResult};
pub use selection::{Clause, ClauseSchema, Scale, Selection, SourceId};
