//! Shared types for the tile indexer.

use thiserror::Error;

use crate::client::{ClientId, ExecError};
use crate::sql::{BinaryOp, Expr, OrderBy, SelectItem};

/// Name of the row-count column synthesized for weighted averages.
pub const COUNT_COLUMN: &str = "_count_";

/// Prefix of every materialized tile index table.
pub const TABLE_PREFIX: &str = "tile_index_";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Failures surfaced by [`DataTileIndexer::update`](super::DataTileIndexer::update).
///
/// Incompatibility is never an error; it shows up as `index()` returning
/// `false`.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("refresh of {client} failed: {source}")]
    Refresh {
        client: ClientId,
        #[source]
        source: ExecError,
    },
}

/// Convenience alias.
pub type IndexerResult<T> = std::result::Result<T, IndexerError>;

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

/// Aggregate functions whose per-bin partials can be combined again.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AggregateKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateKind {
    /// Recognize an aggregate function name, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "COUNT" => Some(Self::Count),
            "SUM" => Some(Self::Sum),
            "AVG" => Some(Self::Avg),
            "MIN" => Some(Self::Min),
            "MAX" => Some(Self::Max),
            _ => None,
        }
    }

    pub fn reaggregate(self) -> Reaggregate {
        match self {
            Self::Count | Self::Sum => Reaggregate::Sum,
            Self::Avg => Reaggregate::WeightedAvg,
            Self::Min => Reaggregate::Min,
            Self::Max => Reaggregate::Max,
        }
    }
}

/// How a materialized partial column is folded back into the final value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reaggregate {
    /// `SUM(col)::DOUBLE`
    Sum,
    /// `(SUM(col * _count_) / SUM(_count_))::DOUBLE`
    WeightedAvg,
    Min,
    Max,
}

impl Reaggregate {
    /// The follow-up expression over the materialized column `column`.
    pub fn expr(self, column: &str) -> Expr {
        let col = Expr::column(column);
        match self {
            Self::Sum => Expr::aggregate("SUM", vec![col]).cast("DOUBLE"),
            Self::WeightedAvg => {
                let weighted = Expr::aggregate(
                    "SUM",
                    vec![Expr::binary(
                        BinaryOp::Mul,
                        col,
                        Expr::column(COUNT_COLUMN),
                    )],
                );
                let total = Expr::aggregate("SUM", vec![Expr::column(COUNT_COLUMN)]);
                Expr::binary(BinaryOp::Div, weighted, total).cast("DOUBLE")
            }
            Self::Min => Expr::aggregate("MIN", vec![col]),
            Self::Max => Expr::aggregate("MAX", vec![col]),
        }
    }
}

// ---------------------------------------------------------------------------
// QueryShape
// ---------------------------------------------------------------------------

/// Base-table identity of a query tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BaseTable {
    Table(String),
    /// Sibling branches read from different tables.
    Mixed,
}

/// The re-aggregable shape of one client's query.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryShape {
    pub base_table: String,
    /// Grouping columns, in select-list order.
    pub dimensions: Vec<String>,
    /// Output column → how to re-aggregate it, in select-list order.
    pub aggregates: Vec<(String, Reaggregate)>,
    /// Present iff an AVG aggregate needs a row count.
    pub count_column: Option<String>,
}

impl QueryShape {
    /// Extra select item the generation query must carry, if any.
    pub fn auxiliary(&self) -> Option<SelectItem> {
        self.count_column
            .as_ref()
            .map(|name| SelectItem::new(name.clone(), Expr::count_star()))
    }
}

// ---------------------------------------------------------------------------
// IndexEntry
// ---------------------------------------------------------------------------

/// Output clauses of a client query that only make sense on the final,
/// re-aggregated rows. They are stripped from the generation query and
/// re-applied to every follow-up query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Presentation {
    pub order: Vec<OrderBy>,
    pub limit: Option<u64>,
}

/// One client's materialized tile index.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexEntry {
    pub table: String,
    pub dimensions: Vec<String>,
    pub aggregates: Vec<(String, Reaggregate)>,
    pub count_column: Option<String>,
    pub presentation: Presentation,
}

impl IndexEntry {
    pub fn new(table: String, shape: &QueryShape, presentation: Presentation) -> Self {
        Self {
            table,
            dimensions: shape.dimensions.clone(),
            aggregates: shape.aggregates.clone(),
            count_column: shape.count_column.clone(),
            presentation,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
