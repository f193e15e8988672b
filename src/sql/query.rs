//! SELECT queries and set operations.
//!
//! Subqueries are owned (`Box<Query>`), so the query graph is always a tree:
//! a subquery cannot be reached through two different parents.

use std::fmt;

use super::expr::{Expr, quote_ident};

// ---------------------------------------------------------------------------
// Building blocks
// ---------------------------------------------------------------------------

/// One `expr AS "alias"` entry of a select list.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub alias: String,
    pub expr: Expr,
}

impl SelectItem {
    pub fn new(alias: impl Into<String>, expr: Expr) -> Self {
        Self {
            alias: alias.into(),
            expr,
        }
    }

    /// Select a column under its own name.
    pub fn column(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            expr: Expr::Column(name.clone()),
            alias: name,
        }
    }
}

impl fmt::Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.expr {
            Expr::Column(name) if *name == self.alias => write!(f, "{}", self.expr),
            expr => write!(f, "{expr} AS {}", quote_ident(&self.alias)),
        }
    }
}

/// An entry of the `FROM` clause.
#[derive(Debug, Clone, PartialEq)]
pub enum FromItem {
    /// A named table; dotted names are treated as schema-qualified.
    Table { name: String, alias: Option<String> },
    Subquery {
        query: Box<Query>,
        alias: Option<String>,
    },
}

impl FromItem {
    pub fn table(name: impl Into<String>) -> Self {
        Self::Table {
            name: name.into(),
            alias: None,
        }
    }

    pub fn subquery(query: impl Into<Query>, alias: impl Into<String>) -> Self {
        Self::Subquery {
            query: Box::new(query.into()),
            alias: Some(alias.into()),
        }
    }
}

/// Quote a possibly schema-qualified table name part by part.
pub fn quote_table(name: &str) -> String {
    name.split('.').map(quote_ident).collect::<Vec<_>>().join(".")
}

impl fmt::Display for FromItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let alias = match self {
            Self::Table { name, alias } => {
                f.write_str(&quote_table(name))?;
                alias
            }
            Self::Subquery { query, alias } => {
                write!(f, "({query})")?;
                alias
            }
        };
        match alias {
            Some(a) => write!(f, " AS {}", quote_ident(a)),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expr,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            descending: false,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            descending: true,
        }
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.descending {
            write!(f, "{} DESC", self.expr)
        } else {
            write!(f, "{}", self.expr)
        }
    }
}

fn write_joined<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// SelectQuery
// ---------------------------------------------------------------------------

/// A single `SELECT ... FROM ... WHERE ... GROUP BY ... ORDER BY` block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectQuery {
    pub distinct: bool,
    pub select: Vec<SelectItem>,
    pub from: Vec<FromItem>,
    /// Conjunctive `WHERE` terms.
    pub filter: Vec<Expr>,
    pub groupby: Vec<Expr>,
    pub orderby: Vec<OrderBy>,
    pub limit: Option<u64>,
}

impl SelectQuery {
    pub fn from_table(name: impl Into<String>) -> Self {
        Self {
            from: vec![FromItem::table(name)],
            ..Default::default()
        }
    }

    pub fn from_subquery(query: impl Into<Query>, alias: impl Into<String>) -> Self {
        Self {
            from: vec![FromItem::subquery(query, alias)],
            ..Default::default()
        }
    }

    /// Add a select item, replacing any existing item with the same alias.
    pub fn select(mut self, alias: impl Into<String>, expr: Expr) -> Self {
        self.set_select(SelectItem::new(alias, expr));
        self
    }

    pub fn select_column(mut self, name: impl Into<String>) -> Self {
        self.set_select(SelectItem::column(name));
        self
    }

    pub fn set_select(&mut self, item: SelectItem) {
        match self.select.iter_mut().find(|s| s.alias == item.alias) {
            Some(existing) => *existing = item,
            None => self.select.push(item),
        }
    }

    /// Add a select item only if no item with that alias exists yet.
    ///
    /// Returns whether an item was added.
    pub fn select_if_absent(&mut self, item: SelectItem) -> bool {
        if self.select.iter().any(|s| s.alias == item.alias) {
            return false;
        }
        self.select.push(item);
        true
    }

    pub fn filter(mut self, terms: impl IntoIterator<Item = Expr>) -> Self {
        self.filter.extend(terms);
        self
    }

    pub fn groupby(mut self, exprs: impl IntoIterator<Item = Expr>) -> Self {
        self.groupby.extend(exprs);
        self
    }

    pub fn orderby(mut self, items: impl IntoIterator<Item = OrderBy>) -> Self {
        self.orderby.extend(items);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Names of plain columns in the `GROUP BY` clause.
    pub fn groupby_columns(&self) -> Vec<&str> {
        self.groupby
            .iter()
            .filter_map(|e| match e {
                Expr::Column(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Display for SelectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        if self.distinct {
            f.write_str("DISTINCT ")?;
        }
        if self.select.is_empty() {
            f.write_str("*")?;
        } else {
            write_joined(f, &self.select)?;
        }
        if !self.from.is_empty() {
            f.write_str(" FROM ")?;
            write_joined(f, &self.from)?;
        }
        if !self.filter.is_empty() {
            write!(f, " WHERE {}", Expr::And(self.filter.clone()))?;
        }
        if !self.groupby.is_empty() {
            f.write_str(" GROUP BY ")?;
            write_joined(f, &self.groupby)?;
        }
        if !self.orderby.is_empty() {
            f.write_str(" ORDER BY ")?;
            write_joined(f, &self.orderby)?;
        }
        if let Some(n) = self.limit {
            write!(f, " LIMIT {n}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Set operations
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SetOperator {
    Union,
    UnionAll,
    Intersect,
    Except,
}

impl fmt::Display for SetOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Union => write!(f, "UNION"),
            Self::UnionAll => write!(f, "UNION ALL"),
            Self::Intersect => write!(f, "INTERSECT"),
            Self::Except => write!(f, "EXCEPT"),
        }
    }
}

/// `(q1) UNION (q2) ...`
#[derive(Debug, Clone, PartialEq)]
pub struct SetOperation {
    pub op: SetOperator,
    pub queries: Vec<Query>,
    pub orderby: Vec<OrderBy>,
}

impl fmt::Display for SetOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, q) in self.queries.iter().enumerate() {
            if i > 0 {
                write!(f, " {} ", self.op)?;
            }
            write!(f, "({q})")?;
        }
        if !self.orderby.is_empty() {
            f.write_str(" ORDER BY ")?;
            write_joined(f, &self.orderby)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Select(SelectQuery),
    Set(SetOperation),
}

impl Query {
    pub fn union(queries: Vec<Query>) -> Self {
        Self::Set(SetOperation {
            op: SetOperator::Union,
            queries,
            orderby: Vec::new(),
        })
    }

    pub fn union_all(queries: Vec<Query>) -> Self {
        Self::Set(SetOperation {
            op: SetOperator::UnionAll,
            queries,
            orderby: Vec::new(),
        })
    }

    pub fn as_select(&self) -> Option<&SelectQuery> {
        match self {
            Self::Select(s) => Some(s),
            Self::Set(_) => None,
        }
    }

    pub fn as_select_mut(&mut self) -> Option<&mut SelectQuery> {
        match self {
            Self::Select(s) => Some(s),
            Self::Set(_) => None,
        }
    }

    /// Direct child queries: subqueries in `FROM` for a select, branches for a
    /// set operation.
    pub fn subqueries(&self) -> Vec<&Query> {
        match self {
            Self::Select(s) => s
                .from
                .iter()
                .filter_map(|item| match item {
                    FromItem::Subquery { query, .. } => Some(query.as_ref()),
                    FromItem::Table { .. } => None,
                })
                .collect(),
            Self::Set(op) => op.queries.iter().collect(),
        }
    }

    pub fn subqueries_mut(&mut self) -> Vec<&mut Query> {
        match self {
            Self::Select(s) => s
                .from
                .iter_mut()
                .filter_map(|item| match item {
                    FromItem::Subquery { query, .. } => Some(query.as_mut()),
                    FromItem::Table { .. } => None,
                })
                .collect(),
            Self::Set(op) => op.queries.iter_mut().collect(),
        }
    }

    /// Take the `ORDER BY` list, leaving the query unordered.
    pub fn take_orderby(&mut self) -> Vec<OrderBy> {
        match self {
            Self::Select(s) => std::mem::take(&mut s.orderby),
            Self::Set(op) => std::mem::take(&mut op.orderby),
        }
    }

    /// Take the `LIMIT`, leaving the query unlimited.
    pub fn take_limit(&mut self) -> Option<u64> {
        match self {
            Self::Select(s) => s.limit.take(),
            Self::Set(_) => None,
        }
    }
}

impl From<SelectQuery> for Query {
    fn from(q: SelectQuery) -> Self {
        Self::Select(q)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select(s) => write!(f, "{s}"),
            Self::Set(op) => write!(f, "{op}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
