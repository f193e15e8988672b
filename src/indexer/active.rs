//! Active-view resolution.
//!
//! Turns the active selection clause into the extra grouping columns a tile
//! index is built over, plus the mapping from a later clause value to a
//! filter over those columns.

use tracing::warn;

use super::bin::Binner;
use crate::selection::{Clause, ClauseSchema, SourceId};
use crate::sql::Expr;

/// Prefix of the synthetic bin columns (`active0`, `active1`, ...).
pub const ACTIVE_PREFIX: &str = "active";

#[derive(Clone, Debug, PartialEq)]
pub enum ActiveKind {
    /// One binner per scale, in `active{i}` order.
    Interval { bins: Vec<Binner> },
    /// Clause predicates apply verbatim.
    Point,
}

/// The resolved bin/value columns of an active clause.
#[derive(Clone, Debug, PartialEq)]
pub struct ActiveView {
    source: SourceId,
    columns: Vec<(String, Expr)>,
    kind: ActiveKind,
}

impl ActiveView {
    /// Resolve a clause; `None` if it cannot back an index.
    pub fn resolve(clause: &Clause) -> Option<Self> {
        let source = clause.source?;
        let schema = clause.schema.as_ref()?;
        let predicate = clause.predicate.as_ref()?;
        if predicate.columns().is_empty() {
            return None;
        }

        match schema {
            ClauseSchema::Interval { scales, pixel_size } => {
                if scales.is_empty() {
                    return None;
                }
                let fields = interval_parts(predicate)?;
                if fields.len() != scales.len() {
                    return None;
                }
                let bins = scales
                    .iter()
                    .map(|s| Binner::new(s, *pixel_size))
                    .collect::<Option<Vec<_>>>()?;
                let columns = fields
                    .into_iter()
                    .zip(&bins)
                    .enumerate()
                    .map(|(i, ((field, _, _), bin))| {
                        (format!("{ACTIVE_PREFIX}{i}"), bin.bin_sql(field.clone()))
                    })
                    .collect();
                Some(Self {
                    source,
                    columns,
                    kind: ActiveKind::Interval { bins },
                })
            }
            ClauseSchema::Point => {
                let columns = predicate
                    .columns()
                    .into_iter()
                    .map(|c| (c.to_string(), Expr::column(c)))
                    .collect();
                Some(Self {
                    source,
                    columns,
                    kind: ActiveKind::Point,
                })
            }
            ClauseSchema::Unsupported => None,
        }
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn kind(&self) -> &ActiveKind {
        &self.kind
    }

    /// Column name → SQL computing it over the base table.
    pub fn columns(&self) -> &[(String, Expr)] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Base-table columns the active columns are computed from; these must
    /// be visible in every subquery the generation query reads through.
    pub fn source_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter_map(|(_, expr)| expr.columns().first().map(|c| (*c).to_string()))
            .collect()
    }

    /// Filter over the materialized table for a clause value (the clause's
    /// predicate). `None` means no active value and yields no terms.
    pub fn predicate(&self, value: Option<&Expr>) -> Vec<Expr> {
        let Some(value) = value else {
            return Vec::new();
        };
        match &self.kind {
            ActiveKind::Point => vec![value.clone()],
            ActiveKind::Interval { bins } => {
                let Some(parts) = interval_parts(value) else {
                    warn!(source = %self.source, "active value is not an interval; not filtering");
                    return Vec::new();
                };
                if parts.len() != bins.len() {
                    warn!(
                        source = %self.source,
                        expected = bins.len(),
                        got = parts.len(),
                        "active value has the wrong number of ranges; not filtering"
                    );
                    return Vec::new();
                }
                parts
                    .iter()
                    .zip(bins)
                    .enumerate()
                    .map(|(i, ((_, low, high), bin))| {
                        range_term(i, bin.bin_expr(low), bin.bin_expr(high))
                    })
                    .collect()
            }
        }
    }

    /// Filter for explicit numeric ranges, one per scale. Point views have
    /// no ranges and yield no terms.
    pub fn predicate_for_ranges(&self, ranges: &[(f64, f64)]) -> Vec<Expr> {
        let ActiveKind::Interval { bins } = &self.kind else {
            return Vec::new();
        };
        ranges
            .iter()
            .zip(bins)
            .enumerate()
            .map(|(i, (&(lo, hi), bin))| {
                range_term(i, bin.bin_expr(&Expr::float(lo)), bin.bin_expr(&Expr::float(hi)))
            })
            .collect()
    }
}

/// `"active{i}" BETWEEN low AND high`, with folded bounds put in order.
fn range_term(i: usize, low: Expr, high: Expr) -> Expr {
    let (low, high) = match (&low, &high) {
        (Expr::Literal(_), Expr::Literal(_)) if low.as_f64() > high.as_f64() => (high, low),
        _ => (low, high),
    };
    Expr::between(Expr::column(format!("{ACTIVE_PREFIX}{i}")), low, high)
}

/// Split an interval predicate into `(field, low, high)` per dimension:
/// a single `BETWEEN`, or a conjunction of them.
fn interval_parts(predicate: &Expr) -> Option<Vec<(&Expr, &Expr, &Expr)>> {
    match predicate {
        Expr::Between { expr, low, high } => Some(vec![(expr.as_ref(), low.as_ref(), high.as_ref())]),
        Expr::And(children) if !children.is_empty() => children
            .iter()
            .map(|c| match c {
                Expr::Between { expr, low, high } => Some((expr.as_ref(), low.as_ref(), high.as_ref())),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
