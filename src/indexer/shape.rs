//! Query shape analysis.
//!
//! Decides whether a client query can be served from a tile index: it must
//! be a grouped select over a single base table whose outputs are either
//! grouping columns or re-aggregable aggregates.

use rustc_hash::FxHashSet;

use super::types::{AggregateKind, BaseTable, COUNT_COLUMN, QueryShape, Reaggregate};
use crate::sql::{Expr, FromItem, Query};

/// Analyze a client query; `None` if it is not re-aggregable.
pub fn analyze(query: &Query) -> Option<QueryShape> {
    let base_table = match base_table(query)? {
        BaseTable::Table(name) => name,
        BaseTable::Mixed => return None,
    };
    let select = query.as_select()?;
    if select.groupby.is_empty() {
        return None;
    }
    let groups: FxHashSet<&str> = select.groupby_columns().into_iter().collect();

    let mut dimensions = Vec::new();
    let mut aggregates = Vec::new();
    let mut count_column = None;

    for item in &select.select {
        match &item.expr {
            Expr::Aggregate { name, distinct, .. } => {
                // Distinct partials cannot be combined across bins.
                if *distinct {
                    return None;
                }
                let kind = AggregateKind::parse(name)?;
                let reagg = kind.reaggregate();
                if reagg == Reaggregate::WeightedAvg {
                    count_column = Some(COUNT_COLUMN.to_string());
                }
                aggregates.push((item.alias.clone(), reagg));
            }
            _ if groups.contains(item.alias.as_str()) => dimensions.push(item.alias.clone()),
            _ => return None,
        }
    }

    Some(QueryShape {
        base_table,
        dimensions,
        aggregates,
        count_column,
    })
}

/// Resolve the single base table a query tree reads from.
///
/// Returns `None` when no table can be identified and
/// [`BaseTable::Mixed`] when sibling branches disagree.
pub fn base_table(query: &Query) -> Option<BaseTable> {
    let subqueries = query.subqueries();

    if let Query::Select(select) = query {
        if select.from.is_empty() {
            return None;
        }
        if subqueries.is_empty() {
            return select.from.iter().find_map(|item| match item {
                FromItem::Table { name, .. } => Some(BaseTable::Table(name.clone())),
                FromItem::Subquery { .. } => None,
            });
        }
    }

    let (first, rest) = subqueries.split_first()?;
    let base = base_table(first);
    for sub in rest {
        match base_table(sub) {
            None => continue,
            other if other != base => return Some(BaseTable::Mixed),
            _ => {}
        }
    }
    base
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::SelectQuery;

    fn grouped(table: &str) -> SelectQuery {
        SelectQuery::from_table(table)
            .select_column("category")
            .groupby([Expr::column("category")])
    }

    #[test]
    fn recognizes_all_reaggregable_kinds() {
        let q: Query = grouped("sales")
            .select("n", Expr::count_star())
            .select("total", Expr::aggregate("sum", vec![Expr::column("amount")]))
            .select("avg_price", Expr::aggregate("AVG", vec![Expr::column("price")]))
            .select("lo", Expr::aggregate("Min", vec![Expr::column("price")]))
            .select("hi", Expr::aggregate("MAX", vec![Expr::column("price")]))
            .into();
        let shape = analyze(&q).expect("indexable");
        assert_eq!(shape.base_table, "sales");
        assert_eq!(shape.dimensions, vec!["category"]);
        assert_eq!(
            shape.aggregates,
            vec![
                ("n".to_string(), Reaggregate::Sum),
                ("total".to_string(), Reaggregate::Sum),
                ("avg_price".to_string(), Reaggregate::WeightedAvg),
                ("lo".to_string(), Reaggregate::Min),
                ("hi".to_string(), Reaggregate::Max),
            ]
        );
        assert_eq!(shape.count_column.as_deref(), Some(COUNT_COLUMN));
    }

    #[test]
    fn count_column_only_with_avg() {
        let q: Query = grouped("sales")
            .select("total", Expr::aggregate("SUM", vec![Expr::column("amount")]))
            .into();
        let shape = analyze(&q).unwrap();
        assert_eq!(shape.aggregates.len(), 1);
        assert!(shape.count_column.is_none());
        assert!(shape.auxiliary().is_none());
    }

    #[test]
    fn ungrouped_plain_column_is_rejected() {
        let q: Query = grouped("sales")
            .select_column("region")
            .select("total", Expr::aggregate("SUM", vec![Expr::column("amount")]))
            .into();
        assert!(analyze(&q).is_none());
    }

    #[test]
    fn unknown_aggregate_is_rejected() {
        let q: Query = grouped("sales")
            .select("mid", Expr::aggregate("MEDIAN", vec![Expr::column("amount")]))
            .into();
        assert!(analyze(&q).is_none());

        // Even when aliased like a grouping column.
        let q: Query = SelectQuery::from_table("sales")
            .select("category", Expr::aggregate("MODE", vec![Expr::column("category")]))
            .groupby([Expr::column("category")])
            .into();
        assert!(analyze(&q).is_none());
    }

    #[test]
    fn distinct_aggregate_is_rejected() {
        let q: Query = grouped("sales")
            .select("n", Expr::aggregate_distinct("COUNT", vec![Expr::column("id")]))
            .into();
        assert!(analyze(&q).is_none());
    }

    #[test]
    fn query_without_groupby_is_rejected() {
        let q: Query = SelectQuery::from_table("sales")
            .select("n", Expr::count_star())
            .into();
        assert!(analyze(&q).is_none());
    }

    #[test]
    fn base_table_of_plain_select() {
        let q: Query = SelectQuery::from_table("sales").into();
        assert_eq!(base_table(&q), Some(BaseTable::Table("sales".into())));
        let empty: Query = SelectQuery::default().into();
        assert_eq!(base_table(&empty), None);
    }

    #[test]
    fn base_table_flows_through_union_of_same_table() {
        let union = Query::union(vec![
            SelectQuery::from_table("sales").into(),
            SelectQuery::from_table("sales").into(),
        ]);
        assert_eq!(base_table(&union), Some(BaseTable::Table("sales".into())));

        let wrapped: Query = SelectQuery::from_subquery(union, "u").into();
        assert_eq!(base_table(&wrapped), Some(BaseTable::Table("sales".into())));
    }

    #[test]
    fn union_over_different_tables_is_mixed() {
        let union = Query::union(vec![
            SelectQuery::from_table("sales").into(),
            SelectQuery::from_table("returns").into(),
        ]);
        assert_eq!(base_table(&union), Some(BaseTable::Mixed));

        let wrapped: Query = SelectQuery::from_subquery(union, "u")
            .select_column("category")
            .select("n", Expr::count_star())
            .groupby([Expr::column("category")])
            .into();
        assert_eq!(base_table(&wrapped), Some(BaseTable::Mixed));
        assert!(analyze(&wrapped).is_none());
    }

    #[test]
    fn branches_without_a_table_are_ignored() {
        let union = Query::union(vec![
            SelectQuery::from_table("sales").into(),
            SelectQuery::default().into(),
        ]);
        assert_eq!(base_table(&union), Some(BaseTable::Table("sales".into())));
    }

    #[test]
    fn grouped_query_over_subquery_is_indexable() {
        let inner = SelectQuery::from_table("sales")
            .select_column("category")
            .select_column("amount");
        let q: Query = SelectQuery::from_subquery(inner, "s")
            .select_column("category")
            .select("total", Expr::aggregate("SUM", vec![Expr::column("amount")]))
            .groupby([Expr::column("category")])
            .into();
        assert_eq!(analyze(&q).unwrap().base_table, "sales");
    }
}
