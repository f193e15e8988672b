//! Clients and the coordinator they are served through.
//!
//! A client owns a query over some base table and renders results; the
//! coordinator executes statements and hands result sets back to clients.
//! Both live outside this crate; these traits are the boundary the indexer
//! works against.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::sql::{Expr, Query};

/// Stable identity of a client.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

/// A consumer of query results (a chart, a table view, ...).
pub trait Client: Send + Sync {
    fn id(&self) -> ClientId;

    /// The client's query with the given conjunctive filter applied.
    fn query(&self, filter: &[Expr]) -> Query;
}

/// The set of clients an indexer serves.
///
/// Set identity is pointer identity of the surrounding `Arc`: passing the
/// same `Arc<ClientSet>` again means "same set", a freshly built set means
/// "changed", even if it holds the same clients.
pub struct ClientSet {
    clients: Vec<Arc<dyn Client>>,
}

impl ClientSet {
    pub fn new(clients: Vec<Arc<dyn Client>>) -> Arc<Self> {
        Arc::new(Self { clients })
    }

    pub fn clients(&self) -> &[Arc<dyn Client>] {
        &self.clients
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Client>> {
        self.clients.iter()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl fmt::Debug for ClientSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.clients.iter().map(|c| c.id()))
            .finish()
    }
}

/// Errors reported by a [`Coordinator`].
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("coordinator unavailable: {0}")]
    Unavailable(String),

    #[error("statement failed: {message}")]
    Statement { sql: String, message: String },
}

/// Executes statements and routes query results to clients.
pub trait Coordinator: Send + Sync {
    /// Execute a statement for its side effect (e.g. table creation).
    fn exec(&self, sql: &str) -> Result<(), ExecError>;

    /// Run `query` and deliver its result set to `client`.
    fn update_client(&self, client: &dyn Client, query: &Query) -> Result<(), ExecError>;
}
