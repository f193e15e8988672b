//! Scalar and aggregate SQL expressions.
//!
//! Expressions render to canonical text via `Display`. Rendering is fully
//! deterministic: equal trees always produce byte-identical SQL, which is what
//! table fingerprinting relies on.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

// ---------------------------------------------------------------------------
// Literals
// ---------------------------------------------------------------------------

/// A constant value embedded in a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Rendered as a `TIMESTAMP` literal; binds as epoch milliseconds.
    Timestamp(DateTime<Utc>),
}

impl Literal {
    /// Numeric value of the literal, if it has one.
    ///
    /// Timestamps map to epoch milliseconds so temporal scales can bin them.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Timestamp(ts) => Some(ts.timestamp_millis() as f64),
            Self::Null | Self::Bool(_) | Self::Text(_) => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(true) => write!(f, "TRUE"),
            Self::Bool(false) => write!(f, "FALSE"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) if v.is_finite() => write!(f, "{v}"),
            Self::Float(v) => write!(f, "'{v}'::DOUBLE"),
            Self::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Self::Timestamp(ts) => write!(
                f,
                "'{}'::TIMESTAMP",
                ts.to_rfc3339_opts(SecondsFormat::Millis, true)
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
        };
        f.write_str(op)
    }
}

// ---------------------------------------------------------------------------
// Expr
// ---------------------------------------------------------------------------

/// A SQL expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference, rendered double-quoted.
    Column(String),
    Literal(Literal),
    /// `*`, only meaningful as an aggregate argument.
    Star,
    /// Scalar function call such as `FLOOR(x)`.
    Function { name: String, args: Vec<Expr> },
    /// Aggregate function call such as `SUM(x)` or `COUNT(DISTINCT x)`.
    Aggregate {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `expr::TYPE`
    Cast { expr: Box<Expr>, ty: String },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    In { expr: Box<Expr>, list: Vec<Expr> },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Self {
        Self::Column(name.into())
    }

    pub fn int(value: i64) -> Self {
        Self::Literal(Literal::Int(value))
    }

    pub fn float(value: f64) -> Self {
        Self::Literal(Literal::Float(value))
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Literal(Literal::Text(value.into()))
    }

    pub fn timestamp(value: DateTime<Utc>) -> Self {
        Self::Literal(Literal::Timestamp(value))
    }

    pub fn function(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Function {
            name: name.into(),
            args,
        }
    }

    pub fn aggregate(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Aggregate {
            name: name.into(),
            args,
            distinct: false,
        }
    }

    pub fn aggregate_distinct(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Aggregate {
            name: name.into(),
            args,
            distinct: true,
        }
    }

    /// `COUNT(*)`
    pub fn count_star() -> Self {
        Self::aggregate("COUNT", vec![Self::Star])
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn cast(self, ty: impl Into<String>) -> Self {
        Self::Cast {
            expr: Box::new(self),
            ty: ty.into(),
        }
    }

    pub fn between(expr: Expr, low: Expr, high: Expr) -> Self {
        Self::Between {
            expr: Box::new(expr),
            low: Box::new(low),
            high: Box::new(high),
        }
    }

    pub fn equals(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Eq, left, right)
    }

    pub fn is_in(expr: Expr, list: Vec<Expr>) -> Self {
        Self::In {
            expr: Box::new(expr),
            list,
        }
    }

    /// Column names referenced anywhere in the expression, in first-seen
    /// order and without duplicates.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Column(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Self::Literal(_) | Self::Star => {}
            Self::Function { args, .. } | Self::Aggregate { args, .. } => {
                args.iter().for_each(|a| a.collect_columns(out));
            }
            Self::Binary { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Self::Cast { expr, .. } | Self::Not(expr) => expr.collect_columns(out),
            Self::Between { expr, low, high } => {
                expr.collect_columns(out);
                low.collect_columns(out);
                high.collect_columns(out);
            }
            Self::In { expr, list } => {
                expr.collect_columns(out);
                list.iter().for_each(|e| e.collect_columns(out));
            }
            Self::And(children) | Self::Or(children) => {
                children.iter().for_each(|c| c.collect_columns(out));
            }
        }
    }

    /// Numeric value of a literal expression (see [`Literal::as_f64`]).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Literal(lit) => lit.as_f64(),
            _ => None,
        }
    }

    /// Whether the expression needs parentheses when used as an operand.
    fn is_compound(&self) -> bool {
        match self {
            Self::Binary { .. }
            | Self::Between { .. }
            | Self::In { .. }
            | Self::Or(_)
            | Self::Not(_) => true,
            Self::And(children) => children.len() > 1,
            _ => false,
        }
    }
}

/// Renders an expression, parenthesized if it is compound.
struct Operand<'a>(&'a Expr);

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_compound() {
            write!(f, "({})", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Double-quote an identifier, escaping embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn write_junction(f: &mut fmt::Formatter<'_>, children: &[Expr], sep: &str) -> fmt::Result {
    match children {
        [] => Ok(()),
        [only] => write!(f, "{only}"),
        _ => {
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "{}", Operand(child))?;
            }
            Ok(())
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(name) => f.write_str(&quote_ident(name)),
            Self::Literal(lit) => write!(f, "{lit}"),
            Self::Star => f.write_str("*"),
            Self::Function { name, args } => {
                write!(f, "{name}(")?;
                write_list(f, args, ", ")?;
                f.write_str(")")
            }
            Self::Aggregate {
                name,
                args,
                distinct,
            } => {
                write!(f, "{name}(")?;
                if *distinct {
                    f.write_str("DISTINCT ")?;
                }
                write_list(f, args, ", ")?;
                f.write_str(")")
            }
            Self::Binary { op, left, right } => {
                write!(f, "{} {op} {}", Operand(left), Operand(right))
            }
            Self::Cast { expr, ty } => write!(f, "{}::{ty}", Operand(expr)),
            Self::Between { expr, low, high } => write!(
                f,
                "{} BETWEEN {} AND {}",
                Operand(expr),
                Operand(low),
                Operand(high)
            ),
            Self::In { expr, list } => {
                write!(f, "{} IN (", Operand(expr))?;
                write_list(f, list, ", ")?;
                f.write_str(")")
            }
            Self::And(children) if children.is_empty() => f.write_str("TRUE"),
            Self::Or(children) if children.is_empty() => f.write_str("FALSE"),
            Self::And(children) => write_junction(f, children, " AND "),
            Self::Or(children) => write_junction(f, children, " OR "),
            Self::Not(expr) => write!(f, "NOT {}", Operand(expr)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
