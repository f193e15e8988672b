//! Tile index construction and follow-up queries.
//!
//! The generation query is the client's own query (already filtered by the
//! rest of the selection) extended with the active bin columns and grouped by
//! them as well. Its canonical SQL text is fingerprinted to name the
//! materialized table, so identical generation queries share one table.

use super::active::ActiveView;
use super::types::{IndexEntry, Presentation, QueryShape, TABLE_PREFIX};
use crate::config::IndexerConfig;
use crate::sql::{Expr, Query, SelectItem, SelectQuery, quote_ident, quote_table};

/// Build the generation query for one client.
///
/// Returns the query and the ordering and limit stripped from it. `None` if
/// the filtered client query is no longer a select.
pub fn generation_query(
    mut query: Query,
    view: &ActiveView,
    shape: &QueryShape,
) -> Option<(Query, Presentation)> {
    let presentation = Presentation {
        order: query.take_orderby(),
        limit: query.take_limit(),
    };
    let select = query.as_select_mut()?;
    for (name, expr) in view.columns() {
        select.set_select(SelectItem::new(name.clone(), expr.clone()));
    }
    if let Some(aux) = shape.auxiliary() {
        select.set_select(aux);
    }
    select
        .groupby
        .extend(view.column_names().map(Expr::column));

    if let Some(first) = query.subqueries_mut().into_iter().next() {
        pushdown(first, &view.source_columns());
    }
    Some((query, presentation))
}

/// Make `columns` visible through every select below `query`.
///
/// Items are only added when absent, so pushing the same columns twice is a
/// no-op. Selects with an empty list render as `SELECT *` and already expose
/// every column.
pub fn pushdown(query: &mut Query, columns: &[String]) {
    if let Some(select) = query.as_select_mut() {
        if !select.from.is_empty() && !select.select.is_empty() {
            for column in columns {
                select.select_if_absent(SelectItem::column(column.clone()));
            }
        }
    }
    for sub in query.subqueries_mut() {
        pushdown(sub, columns);
    }
}

/// 32-bit fingerprint of canonical SQL text.
pub fn fingerprint(sql: &str) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(sql.as_bytes());
    hasher.finalize()
}

/// Materialized table name for a generation query, schema-qualified when the
/// config names a schema.
pub fn table_name(sql: &str, config: &IndexerConfig) -> String {
    let table = format!("{TABLE_PREFIX}{:x}", fingerprint(sql));
    match &config.schema {
        Some(schema) => format!("{schema}.{table}"),
        None => table,
    }
}

/// `CREATE [TEMP] TABLE IF NOT EXISTS <table> AS <sql>`
pub fn create_table_sql(table: &str, sql: &str, config: &IndexerConfig) -> String {
    let temp = if config.temp && config.schema.is_none() {
        "TEMP "
    } else {
        ""
    };
    format!(
        "CREATE {temp}TABLE IF NOT EXISTS {} AS {sql}",
        quote_table(table)
    )
}

/// `CREATE SCHEMA IF NOT EXISTS <schema>`
pub fn create_schema_sql(schema: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema))
}

/// Query the materialized table for one filter: re-aggregate across the
/// matching bins, grouped by the client's dimensions.
pub fn follow_up_query(entry: &IndexEntry, filter: Vec<Expr>) -> Query {
    let mut select = SelectQuery::from_table(entry.table.clone());
    for dim in &entry.dimensions {
        select.set_select(SelectItem::column(dim.clone()));
    }
    for (name, reagg) in &entry.aggregates {
        select.set_select(SelectItem::new(name.clone(), reagg.expr(name)));
    }
    select.limit = entry.presentation.limit;
    select
        .filter(filter)
        .groupby(entry.dimensions.iter().map(|d| Expr::column(d.clone())))
        .orderby(entry.presentation.order.iter().cloned())
        .into()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
