use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tile_indexer::client::{Client, ClientId, ClientSet, Coordinator, ExecError};
use tile_indexer::selection::{Clause, ClauseSchema, Scale, SourceId};
use tile_indexer::sql::{Expr, OrderBy, Query, SelectQuery};

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: Arc<std::sync::Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(make_writer)
            .finish()
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        tracing::subscriber::set_default(self.subscriber())
    }

    /// A rayon pool whose worker threads log into this capture. The default
    /// set by `install` is thread-local and does not reach rayon workers.
    pub fn pool(&self, threads: usize) -> rayon::ThreadPool {
        let dispatch = tracing::Dispatch::new(self.subscriber());
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .spawn_handler(move |thread| {
                let dispatch = dispatch.clone();
                std::thread::Builder::new().spawn(move || {
                    tracing::dispatcher::with_default(&dispatch, || thread.run())
                })?;
                Ok(())
            })
            .build()
            .expect("build traced rayon pool")
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Assert that the captured log output contains the provided substring.
    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

struct TestWriter(Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.0.lock().unwrap();
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Records every statement and client refresh; failures can be injected.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingCoordinator {
    statements: Mutex<Vec<String>>,
    refreshes: Mutex<Vec<(ClientId, String)>>,
    fail_creates_matching: Mutex<Option<String>>,
    fail_refresh: AtomicBool,
    fail_refresh_for: Mutex<Option<ClientId>>,
}

#[allow(dead_code)]
impl RecordingCoordinator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }

    pub fn creates(&self) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|s| s.starts_with("CREATE") && s.contains(" TABLE "))
            .collect()
    }

    /// Refreshes sorted by client id; parallel refreshes arrive unordered.
    pub fn refreshes(&self) -> Vec<(ClientId, String)> {
        let mut out = self.refreshes.lock().clone();
        out.sort_by_key(|(id, _)| *id);
        out
    }

    pub fn clear(&self) {
        self.statements.lock().clear();
        self.refreshes.lock().clear();
    }

    /// Fail any CREATE statement whose text contains `needle`.
    pub fn fail_creates_matching(&self, needle: impl Into<String>) {
        *self.fail_creates_matching.lock() = Some(needle.into());
    }

    pub fn fail_refreshes(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::SeqCst);
    }

    /// Fail refreshes of one client only.
    pub fn fail_refreshes_for(&self, client: ClientId) {
        *self.fail_refresh_for.lock() = Some(client);
    }
}

impl Coordinator for RecordingCoordinator {
    fn exec(&self, sql: &str) -> Result<(), ExecError> {
        let failing = self
            .fail_creates_matching
            .lock()
            .as_ref()
            .is_some_and(|needle| sql.contains(needle.as_str()));
        if failing {
            return Err(ExecError::Statement {
                sql: sql.to_string(),
                message: "Catalog Error: injected failure".into(),
            });
        }
        self.statements.lock().push(sql.to_string());
        Ok(())
    }

    fn update_client(&self, client: &dyn Client, query: &Query) -> Result<(), ExecError> {
        if self.fail_refresh.load(Ordering::SeqCst)
            || *self.fail_refresh_for.lock() == Some(client.id())
        {
            return Err(ExecError::Unavailable("connection closed".into()));
        }
        self.refreshes.lock().push((client.id(), query.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Clients
// ---------------------------------------------------------------------------

/// A grouped aggregate client over a fixed table.
#[allow(dead_code)]
pub struct FixtureClient {
    pub id: ClientId,
    pub table: String,
    pub group: String,
    pub aggregates: Vec<(String, Expr)>,
    pub order: Vec<OrderBy>,
    pub limit: Option<u64>,
}

#[allow(dead_code)]
impl FixtureClient {
    pub fn new(id: u64, table: &str, group: &str) -> Self {
        Self {
            id: ClientId(id),
            table: table.to_string(),
            group: group.to_string(),
            aggregates: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    pub fn aggregate(mut self, alias: &str, expr: Expr) -> Self {
        self.aggregates.push((alias.to_string(), expr));
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order.push(order);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn shared(self) -> Arc<dyn Client> {
        Arc::new(self)
    }
}

impl Client for FixtureClient {
    fn id(&self) -> ClientId {
        self.id
    }

    fn query(&self, filter: &[Expr]) -> Query {
        let mut select = SelectQuery::from_table(self.table.clone()).select_column(self.group.clone());
        for (alias, expr) in &self.aggregates {
            select = select.select(alias.clone(), expr.clone());
        }
        select.limit = self.limit;
        select
            .filter(filter.iter().cloned())
            .groupby([Expr::column(self.group.clone())])
            .orderby(self.order.iter().cloned())
            .into()
    }
}

/// The three sales clients used across scenarios: SUM, COUNT and AVG by
/// category.
#[allow(dead_code)]
pub fn sales_clients() -> Arc<ClientSet> {
    ClientSet::new(vec![
        FixtureClient::new(1, "sales", "category")
            .aggregate("total", Expr::aggregate("SUM", vec![Expr::column("amount")]))
            .shared(),
        FixtureClient::new(2, "sales", "category")
            .aggregate("n", Expr::count_star())
            .shared(),
        FixtureClient::new(3, "sales", "category")
            .aggregate("avg_price", Expr::aggregate("AVG", vec![Expr::column("price")]))
            .shared(),
    ])
}

// ---------------------------------------------------------------------------
// Clauses
// ---------------------------------------------------------------------------

#[allow(dead_code)]
pub fn date_between(lo: i64, hi: i64) -> Expr {
    Expr::between(Expr::column("date"), Expr::int(lo), Expr::int(hi))
}

/// Interval clause over `date` with a single scale of the given kind.
#[allow(dead_code)]
pub fn date_brush(source: SourceId, kind: &str, lo: i64, hi: i64) -> Clause {
    Clause::new(source)
        .with_predicate(date_between(lo, hi))
        .with_schema(ClauseSchema::interval(vec![Scale::new(
            kind,
            [0.0, 100.0],
            [0.0, 10.0],
        )]))
}
