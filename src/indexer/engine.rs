//! The data tile indexer state machine.
//!
//! One [`DataTileIndexer`] serves one (coordinator, selection) pair. Callers
//! drive it with two entry points:
//!
//! - [`DataTileIndexer::index`] decides whether the current client set and
//!   active clause can be served from tile indices, and (re)builds them when
//!   the active source changes.
//! - [`DataTileIndexer::update`] answers the selection's current value from
//!   the materialized tables.
//!
//! `index` must not run concurrently with itself or with `update`.

use std::sync::Arc;

use parking_lot::RwLock;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use super::active::ActiveView;
use super::build::{create_schema_sql, create_table_sql, follow_up_query, generation_query, table_name};
use super::shape::analyze;
use super::types::{IndexEntry, IndexerError, IndexerResult, QueryShape};
use crate::client::{Client, ClientId, ClientSet, Coordinator};
use crate::config::IndexerConfig;
use crate::selection::{Clause, Selection};
use crate::sql::Expr;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Where the indexer stands for the last-seen client set.
#[derive(Debug, Default)]
pub enum IndexState {
    /// Nothing analyzed yet.
    #[default]
    Uninitialized,
    /// At least one client query cannot be re-aggregated, or the clients read
    /// from different base tables.
    Incompatible { clients: Arc<ClientSet> },
    /// Every client is re-aggregable; no tile index is built.
    Compatible {
        clients: Arc<ClientSet>,
        shapes: FxHashMap<ClientId, QueryShape>,
    },
    /// Tile indices exist for the active view.
    Built {
        clients: Arc<ClientSet>,
        shapes: FxHashMap<ClientId, QueryShape>,
        view: ActiveView,
        indices: FxHashMap<ClientId, IndexEntry>,
    },
}

impl IndexState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Incompatible { .. } => "analyzed-incompatible",
            Self::Compatible { .. } => "analyzed-compatible-unresolved",
            Self::Built { .. } => "resolved-built",
        }
    }

    /// The client set this state was derived from.
    pub fn clients(&self) -> Option<&Arc<ClientSet>> {
        match self {
            Self::Uninitialized => None,
            Self::Incompatible { clients }
            | Self::Compatible { clients, .. }
            | Self::Built { clients, .. } => Some(clients),
        }
    }
}

// ---------------------------------------------------------------------------
// DataTileIndexer
// ---------------------------------------------------------------------------

pub struct DataTileIndexer {
    coordinator: Arc<dyn Coordinator>,
    selection: Arc<RwLock<Selection>>,
    config: IndexerConfig,
    state: IndexState,
}

impl DataTileIndexer {
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        selection: Arc<RwLock<Selection>>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            coordinator,
            selection,
            config,
            state: IndexState::Uninitialized,
        }
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn selection(&self) -> &Arc<RwLock<Selection>> {
        &self.selection
    }

    pub fn state(&self) -> &IndexState {
        &self.state
    }

    /// Whether the last-seen client set is indexable.
    pub fn is_enabled(&self) -> bool {
        matches!(
            self.state,
            IndexState::Compatible { .. } | IndexState::Built { .. }
        )
    }

    pub fn active_view(&self) -> Option<&ActiveView> {
        match &self.state {
            IndexState::Built { view, .. } => Some(view),
            _ => None,
        }
    }

    pub fn entry(&self, client: ClientId) -> Option<&IndexEntry> {
        match &self.state {
            IndexState::Built { indices, .. } => indices.get(&client),
            _ => None,
        }
    }

    /// Forget all analysis and built indices. Materialized tables are left
    /// in place; rebuilding the same generation query reuses them.
    pub fn reset(&mut self) {
        self.state = IndexState::Uninitialized;
    }

    /// Prepare tile indices for `clients` under the active clause (`active`,
    /// or the selection's own active clause).
    ///
    /// Returns `true` when updates can be served from tile indices. Table
    /// creation failures are logged and leave that client without an index.
    pub fn index(&mut self, clients: &Arc<ClientSet>, active: Option<&Clause>) -> bool {
        if !self.config.enabled {
            return false;
        }

        let same_set = self
            .state
            .clients()
            .is_some_and(|seen| Arc::ptr_eq(seen, clients));
        if !same_set {
            self.state = analyze_clients(clients);
        }
        if !self.is_enabled() {
            return false;
        }

        let clause = match active {
            Some(clause) => clause.clone(),
            None => match self.selection.read().active() {
                Some(clause) => clause.clone(),
                None => return false,
            },
        };
        let Some(source) = clause.source else {
            return false;
        };

        if let Some(view) = self.active_view() {
            if view.source() == source {
                debug!(%source, "tile index already built for active source");
                return true;
            }
        }

        let (clients, shapes) = match std::mem::take(&mut self.state) {
            IndexState::Compatible { clients, shapes } | IndexState::Built { clients, shapes, .. } => {
                (clients, shapes)
            }
            other => {
                self.state = other;
                return false;
            }
        };

        let Some(view) = ActiveView::resolve(&clause) else {
            debug!(%source, "active clause cannot back a tile index");
            self.state = IndexState::Compatible { clients, shapes };
            return false;
        };

        warn!(%source, clients = clients.len(), "building data tile index");

        if let Some(schema) = &self.config.schema {
            if let Err(e) = self.coordinator.exec(&create_schema_sql(schema)) {
                warn!(schema = %schema, error = %e, "failed to create tile index schema");
            }
        }

        let filtered = self.selection.read().remove(source);
        let coordinator = self.coordinator.as_ref();
        let config = &self.config;
        let indices: FxHashMap<ClientId, IndexEntry> = clients
            .clients()
            .par_iter()
            .filter(|client| !filtered.skip(client.id(), &clause))
            .filter_map(|client| {
                let shape = shapes.get(&client.id())?;
                let entry = build_entry(coordinator, config, client.as_ref(), &filtered, &view, shape)?;
                Some((client.id(), entry))
            })
            .collect();

        debug!(%source, built = indices.len(), "tile index build finished");
        self.state = IndexState::Built {
            clients,
            shapes,
            view,
            indices,
        };
        true
    }

    /// Refresh every client from its tile index using the selection's
    /// current active value. Every refresh runs to completion; the first
    /// failure (in client order) is returned afterwards.
    pub fn update(&self) -> IndexerResult<()> {
        let IndexState::Built { clients, view, .. } = &self.state else {
            return Ok(());
        };
        let filter = self.active_filter(view);
        let results: Vec<IndexerResult<()>> = clients
            .clients()
            .par_iter()
            .map(|client| self.update_client(client.as_ref(), Some(filter.as_slice())))
            .collect();
        results.into_iter().collect()
    }

    /// Refresh one client from its tile index. `filter` defaults to the
    /// filter derived from the selection's active value. A client without an
    /// index is left alone.
    pub fn update_client(&self, client: &dyn Client, filter: Option<&[Expr]>) -> IndexerResult<()> {
        let IndexState::Built { view, indices, .. } = &self.state else {
            return Ok(());
        };
        let Some(entry) = indices.get(&client.id()) else {
            return Ok(());
        };
        let filter = match filter {
            Some(filter) => filter.to_vec(),
            None => self.active_filter(view),
        };
        let query = follow_up_query(entry, filter);
        self.coordinator
            .update_client(client, &query)
            .map_err(|source| IndexerError::Refresh {
                client: client.id(),
                source,
            })
    }

    fn active_filter(&self, view: &ActiveView) -> Vec<Expr> {
        let selection = self.selection.read();
        view.predicate(selection.active().and_then(|c| c.predicate.as_ref()))
    }
}

fn analyze_clients(clients: &Arc<ClientSet>) -> IndexState {
    let incompatible = || IndexState::Incompatible {
        clients: Arc::clone(clients),
    };
    let mut shapes = FxHashMap::default();
    let mut base: Option<String> = None;

    for client in clients.iter() {
        let id = client.id();
        let Some(shape) = analyze(&client.query(&[])) else {
            debug!(client = %id, "client query is not re-aggregable");
            return incompatible();
        };
        match &base {
            Some(table) if *table != shape.base_table => {
                debug!(
                    client = %id,
                    expected = %table,
                    found = %shape.base_table,
                    "clients read from different base tables"
                );
                return incompatible();
            }
            Some(_) => {}
            None => base = Some(shape.base_table.clone()),
        }
        shapes.insert(id, shape);
    }

    debug!(clients = clients.len(), "client set is indexable");
    IndexState::Compatible {
        clients: Arc::clone(clients),
        shapes,
    }
}

fn build_entry(
    coordinator: &dyn Coordinator,
    config: &IndexerConfig,
    client: &dyn Client,
    filtered: &Selection,
    view: &ActiveView,
    shape: &QueryShape,
) -> Option<IndexEntry> {
    let id = client.id();
    let query = client.query(&filtered.predicate(id));
    let Some((generated, presentation)) = generation_query(query, view, shape) else {
        debug!(client = %id, "filtered client query is not a select");
        return None;
    };
    let sql = generated.to_string();
    let table = table_name(&sql, config);
    match coordinator.exec(&create_table_sql(&table, &sql, config)) {
        Ok(()) => Some(IndexEntry::new(table, shape, presentation)),
        Err(e) => {
            warn!(client = %id, table = %table, error = %e, "failed to create tile index table");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
