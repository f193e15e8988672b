//! Minimal SQL query model.
//!
//! Covers the query shapes the tile indexer inspects and rewrites: grouped
//! selects with aggregates, subqueries in `FROM`, and set operations.
//! `Display` produces the canonical SQL text sent to the coordinator.
//!
//! # Module structure
//!
//! - [`expr`] - expressions, literals, operators
//! - [`query`] - select blocks, `FROM` items, set operations

pub mod expr;
pub mod query;

pub use expr::{BinaryOp, Expr, Literal, quote_ident};
pub use query::{
    FromItem, OrderBy, Query, SelectItem, SelectQuery, SetOperation, SetOperator, quote_table,
};
