//! Selections and their clauses.
//!
//! A selection collects filter clauses contributed by interactive sources
//! (brushes, legends, ...). Each clause carries the predicate it contributes,
//! the clients that produced it, and a schema describing the value space it
//! ranges over. The most recently activated clause is the *active* clause.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::client::ClientId;
use crate::sql::Expr;

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

static NEXT_SOURCE: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of the interactor that produces clause values.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(u64);

impl SourceId {
    /// Allocate a process-unique source id.
    pub fn next() -> Self {
        Self(NEXT_SOURCE.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// A value scale as configured on the front-end: a data domain mapped onto a
/// pixel range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    /// Scale kind, e.g. `linear`, `log`, `symlog`, `sqrt`, `time`, `utc`.
    #[serde(rename = "type")]
    pub kind: String,
    pub domain: [f64; 2],
    pub range: [f64; 2],
}

impl Scale {
    pub fn new(kind: impl Into<String>, domain: [f64; 2], range: [f64; 2]) -> Self {
        Self {
            kind: kind.into(),
            domain,
            range,
        }
    }
}

fn default_pixel_size() -> u32 {
    1
}

/// Describes the value space a clause ranges over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClauseSchema {
    /// Continuous ranges, one per scale.
    Interval {
        #[serde(default)]
        scales: Vec<Scale>,
        #[serde(default = "default_pixel_size", rename = "pixelSize")]
        pixel_size: u32,
    },
    /// Discrete equality over the predicate's columns.
    Point,
    #[serde(other)]
    Unsupported,
}

impl ClauseSchema {
    pub fn interval(scales: Vec<Scale>) -> Self {
        Self::Interval {
            scales,
            pixel_size: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Clause
// ---------------------------------------------------------------------------

/// One source's contribution to a selection.
#[derive(Debug, Clone, Default)]
pub struct Clause {
    pub source: Option<SourceId>,
    /// Clients that produced this clause; cross-filtering exempts them.
    pub clients: FxHashSet<ClientId>,
    /// `None` when the source currently has no value.
    pub predicate: Option<Expr>,
    pub schema: Option<ClauseSchema>,
}

impl Clause {
    pub fn new(source: SourceId) -> Self {
        Self {
            source: Some(source),
            ..Default::default()
        }
    }

    pub fn with_predicate(mut self, predicate: Expr) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn with_schema(mut self, schema: ClauseSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_client(mut self, client: ClientId) -> Self {
        self.clients.insert(client);
        self
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// How clause predicates combine.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Resolution {
    /// All clause predicates must hold.
    #[default]
    Intersect,
    /// Any clause predicate may hold.
    Union,
    /// Only the most recent clause is kept.
    Single,
}

#[derive(Debug, Clone, Default)]
pub struct Selection {
    resolution: Resolution,
    cross: bool,
    clauses: Vec<Clause>,
    active: Option<Clause>,
}

impl Selection {
    pub fn intersect() -> Self {
        Self::default()
    }

    pub fn union() -> Self {
        Self {
            resolution: Resolution::Union,
            ..Default::default()
        }
    }

    pub fn single() -> Self {
        Self {
            resolution: Resolution::Single,
            ..Default::default()
        }
    }

    /// Intersecting selection where a clause never filters its own clients.
    pub fn crossfilter() -> Self {
        Self {
            cross: true,
            ..Default::default()
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn is_cross(&self) -> bool {
        self.cross
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn active(&self) -> Option<&Clause> {
        self.active.as_ref()
    }

    /// Mark a clause as active without committing it.
    pub fn activate(&mut self, clause: Clause) {
        self.active = Some(clause);
    }

    /// Commit a clause, replacing any earlier clause from the same source.
    /// A clause without a predicate removes its source's clause.
    pub fn update(&mut self, clause: Clause) {
        match self.resolution {
            Resolution::Single => self.clauses.clear(),
            Resolution::Intersect | Resolution::Union => {
                self.clauses.retain(|c| c.source != clause.source);
            }
        }
        if clause.predicate.is_some() {
            self.clauses.push(clause.clone());
        }
        self.active = Some(clause);
    }

    /// A copy of this selection without the clause of `source`.
    pub fn remove(&self, source: SourceId) -> Self {
        let mut copy = self.clone();
        copy.clauses.retain(|c| c.source != Some(source));
        copy
    }

    /// Whether `clause` must not filter `client`.
    pub fn skip(&self, client: ClientId, clause: &Clause) -> bool {
        self.cross && clause.clients.contains(&client)
    }

    /// Conjunctive filter terms that apply to `client`.
    pub fn predicate(&self, client: ClientId) -> Vec<Expr> {
        let terms: Vec<Expr> = self
            .clauses
            .iter()
            .filter(|c| !self.skip(client, c))
            .filter_map(|c| c.predicate.clone())
            .collect();
        match self.resolution {
            Resolution::Union if terms.len() > 1 => vec![Expr::Or(terms)],
            _ => terms,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
