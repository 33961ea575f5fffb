//! In-memory scripted pool used by unit tests.
//!
//! Records every statement, counts pool traffic, rejects a repeated first
//! INSERT parameter per table as a unique-key violation, and serves queued
//! outcomes (row sets with optionally chunked large objects) to other
//! statements.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use super::{ConnectionPool, ExecOutcome, LobReader, RawValue, ResultSet, TargetConnection};
use crate::core::value::SqlValue;
use crate::error::{BridgeError, Result};

/// Counts closes of the large objects it is attached to.
#[derive(Clone, Default)]
pub(crate) struct LobTracker(Arc<AtomicUsize>);

impl LobTracker {
    pub(crate) fn closes(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub(crate) struct MockLob {
    chunks: VecDeque<Bytes>,
    fail_at: Option<usize>,
    calls: usize,
    tracker: LobTracker,
}

impl MockLob {
    /// Split `data` into `size`-byte chunks; `fail_at` makes that call error.
    pub(crate) fn chunked(data: &[u8], size: usize, fail_at: Option<usize>, tracker: LobTracker) -> Self {
        Self {
            chunks: data
                .chunks(size.max(1))
                .map(Bytes::copy_from_slice)
                .collect(),
            fail_at,
            calls: 0,
            tracker,
        }
    }
}

#[async_trait]
impl LobReader for MockLob {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        let call = self.calls;
        self.calls += 1;
        if self.fail_at == Some(call) {
            return Err(BridgeError::Stream("connection reset while reading lob".into()));
        }
        tokio::task::yield_now().await;
        Ok(self.chunks.pop_front())
    }

    async fn close(&mut self) {
        self.tracker.0.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) enum MockCell {
    Scalar(SqlValue),
    Lob(MockLob),
}

impl MockCell {
    pub(crate) fn lob(text: &str, size: usize, tracker: &LobTracker) -> Self {
        MockCell::Lob(MockLob::chunked(text.as_bytes(), size, None, tracker.clone()))
    }

    pub(crate) fn failing_lob(text: &str, size: usize, fail_at: usize, tracker: &LobTracker) -> Self {
        MockCell::Lob(MockLob::chunked(
            text.as_bytes(),
            size,
            Some(fail_at),
            tracker.clone(),
        ))
    }
}

pub(crate) type MockRows = Vec<Vec<(String, MockCell)>>;

/// Counts fetches and closes of result sets.
#[derive(Clone, Default)]
pub(crate) struct RsTracker {
    fetches: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl RsTracker {
    pub(crate) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

pub(crate) struct MockResultSet {
    rows: VecDeque<Vec<(String, MockCell)>>,
    reported: Option<u64>,
    tracker: RsTracker,
}

impl MockResultSet {
    pub(crate) fn new(rows: MockRows) -> (Self, RsTracker) {
        let tracker = RsTracker::default();
        (Self::with_tracker(rows, tracker.clone()), tracker)
    }

    fn with_tracker(rows: MockRows, tracker: RsTracker) -> Self {
        Self {
            reported: Some(rows.len() as u64),
            rows: rows.into(),
            tracker,
        }
    }

    /// Override the row count reported up front.
    pub(crate) fn reporting(mut self, count: Option<u64>) -> Self {
        self.reported = count;
        self
    }
}

#[async_trait]
impl ResultSet for MockResultSet {
    fn row_count(&self) -> Option<u64> {
        self.reported
    }

    async fn next_row(&mut self) -> Result<Option<Vec<(String, RawValue)>>> {
        self.tracker.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.pop_front().map(|cells| {
            cells
                .into_iter()
                .map(|(name, cell)| {
                    let value = match cell {
                        MockCell::Scalar(v) => RawValue::Scalar(v),
                        MockCell::Lob(lob) => RawValue::StreamableBlob(Box::new(lob)),
                    };
                    (name, value)
                })
                .collect()
        }))
    }

    async fn close(&mut self) {
        self.tracker.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) enum MockOutcome {
    Affected(u64),
    Rows(MockRows),
}

#[derive(Default)]
struct PoolState {
    open: AtomicBool,
    opens: AtomicUsize,
    open_failures: AtomicUsize,
    acquired: AtomicUsize,
    released: AtomicUsize,
    discarded: AtomicUsize,
    commits: AtomicUsize,
    statements: Mutex<Vec<(String, Vec<SqlValue>)>>,
    outcomes: Mutex<VecDeque<MockOutcome>>,
    failures: Mutex<Vec<(String, String)>>,
    unique_keys: Mutex<HashSet<String>>,
    result_sets: RsTracker,
}

#[derive(Clone, Default)]
pub(crate) struct MockPool {
    state: Arc<PoolState>,
}

impl MockPool {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` open attempts with an init error.
    pub(crate) fn fail_open_times(&self, times: usize) {
        self.state.open_failures.store(times, Ordering::SeqCst);
    }

    /// Fail every statement (or commit, with `"COMMIT"`) containing `pattern`.
    pub(crate) fn fail_on(&self, pattern: &str, message: &str) {
        lock(&self.state.failures).push((pattern.to_string(), message.to_string()));
    }

    pub(crate) fn push_rows(&self, rows: MockRows) {
        lock(&self.state.outcomes).push_back(MockOutcome::Rows(rows));
    }

    pub(crate) fn push_affected(&self, count: u64) {
        lock(&self.state.outcomes).push_back(MockOutcome::Affected(count));
    }

    pub(crate) fn statements(&self) -> Vec<String> {
        lock(&self.state.statements)
            .iter()
            .map(|(sql, _)| sql.clone())
            .collect()
    }

    pub(crate) fn statement_log(&self) -> Vec<(String, Vec<SqlValue>)> {
        lock(&self.state.statements).clone()
    }

    pub(crate) fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn acquired(&self) -> usize {
        self.state.acquired.load(Ordering::SeqCst)
    }

    pub(crate) fn released(&self) -> usize {
        self.state.released.load(Ordering::SeqCst)
    }

    pub(crate) fn discarded(&self) -> usize {
        self.state.discarded.load(Ordering::SeqCst)
    }

    pub(crate) fn commits(&self) -> usize {
        self.state.commits.load(Ordering::SeqCst)
    }

    pub(crate) fn result_sets(&self) -> RsTracker {
        self.state.result_sets.clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) struct MockConnection {
    state: Arc<PoolState>,
}

impl MockConnection {
    fn scripted_failure(&self, sql: &str) -> Option<BridgeError> {
        lock(&self.state.failures)
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, message)| BridgeError::Driver(message.clone()))
    }
}

#[async_trait]
impl TargetConnection for MockConnection {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<ExecOutcome> {
        lock(&self.state.statements).push((sql.to_string(), params.to_vec()));
        tokio::task::yield_now().await;

        if let Some(err) = self.scripted_failure(sql) {
            return Err(err);
        }

        if sql.starts_with("INSERT") {
            let table = sql.split(" (").next().unwrap_or(sql);
            let key = format!("{}|{:?}", table, params.first());
            if !lock(&self.state.unique_keys).insert(key) {
                return Err(BridgeError::Driver(format!(
                    "unique constraint violated: {:?}",
                    params.first()
                )));
            }
            return Ok(ExecOutcome::Affected(1));
        }
        if sql.starts_with("SET") {
            return Ok(ExecOutcome::Affected(0));
        }

        let outcome = lock(&self.state.outcomes).pop_front();
        Ok(match outcome {
            Some(MockOutcome::Affected(n)) => ExecOutcome::Affected(n),
            Some(MockOutcome::Rows(rows)) => ExecOutcome::Rows(Box::new(
                MockResultSet::with_tracker(rows, self.state.result_sets.clone()),
            )),
            None if sql.starts_with("SELECT") => ExecOutcome::Rows(Box::new(
                MockResultSet::with_tracker(Vec::new(), self.state.result_sets.clone()),
            )),
            None => ExecOutcome::Affected(0),
        })
    }

    async fn commit(&self) -> Result<()> {
        if let Some(err) = self.scripted_failure("COMMIT") {
            return Err(err);
        }
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ConnectionPool for MockPool {
    type Connection = MockConnection;

    async fn open(&self) -> Result<()> {
        if self.state.open.load(Ordering::SeqCst) {
            return Ok(());
        }
        let pending = self.state.open_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.state.open_failures.store(pending - 1, Ordering::SeqCst);
            return Err(BridgeError::Init("connection refused".into()));
        }
        self.state.open.store(true, Ordering::SeqCst);
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn acquire(&self) -> Result<MockConnection> {
        self.open().await?;
        self.state.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection {
            state: Arc::clone(&self.state),
        })
    }

    fn release(&self, _conn: MockConnection) {
        self.state.released.fetch_add(1, Ordering::SeqCst);
    }

    fn discard(&self, _conn: MockConnection) {
        self.state.discarded.fetch_add(1, Ordering::SeqCst);
    }

    async fn close(&self) {
        self.state.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.state.open.load(Ordering::SeqCst)
    }
}
