//! Caller-facing adapter over a DM connection pool.

use serde::Serialize;
use tracing::debug;

use crate::config::TargetConfig;
use crate::core::criteria::Criteria;
use crate::core::value::{Row, SqlValue};
use crate::error::{BridgeError, Result, Stage};
use crate::exec::{collect_rows, ConnectionPool, ExecOutcome, TargetConnection};
use crate::query::{CompiledStatement, SqlCompiler, COUNT_ALIAS};

/// Per-adapter settings.
#[derive(Debug, Clone)]
pub struct AdapterOptions {
    pub tablespace: String,
    pub case_sensitive: bool,
    /// Log generated SQL and bound values.
    pub debug: bool,
}

impl From<&TargetConfig> for AdapterOptions {
    fn from(target: &TargetConfig) -> Self {
        Self {
            tablespace: target.tablespace.clone(),
            case_sensitive: target.case_sensitive,
            debug: target.debug,
        }
    }
}

/// Rows of a find together with the count over the same filter.
#[derive(Debug, Clone, Serialize)]
pub struct FindResult {
    pub items: Vec<Row>,
    pub total: u64,
}

/// Outcome of a native statement.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeResult {
    Affected(u64),
    Rows(Vec<Row>),
}

/// Adapter exposing create/find/count/update/delete over a connection pool.
///
/// Every operation acquires its own connection and releases it before
/// returning, on success and failure alike. Statements are compiled before
/// a connection is acquired.
pub struct DmAdapter<P: ConnectionPool> {
    pub(crate) pool: P,
    pub(crate) compiler: SqlCompiler,
    debug: bool,
}

impl<P: ConnectionPool> DmAdapter<P> {
    pub fn new(pool: P, options: AdapterOptions) -> Self {
        Self {
            pool,
            compiler: SqlCompiler::new(options.tablespace, options.case_sensitive),
            debug: options.debug,
        }
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn compiler(&self) -> &SqlCompiler {
        &self.compiler
    }

    /// Open the underlying pool ahead of the first operation.
    pub async fn open(&self) -> Result<()> {
        self.pool.open().await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub(crate) fn trace_statement(&self, sql: &str, values: &[SqlValue]) {
        if self.debug {
            debug!(sql = %sql, "debug info sql");
            if !values.is_empty() {
                debug!(values = ?values, "debug info values");
            }
        }
    }

    /// Insert one row. Returns the affected row count.
    pub async fn create(&self, table: &str, row: &Row) -> Result<u64> {
        let stmt = self.compiler.create(table, row)?;
        self.mutate(Stage::Insert, &stmt).await
    }

    /// Fetch rows matching the criteria.
    pub async fn find(&self, table: &str, criteria: &Criteria) -> Result<Vec<Row>> {
        let stmt = self.compiler.find(table, criteria)?;
        self.query(Stage::Select, &stmt).await
    }

    /// Count rows matching the criteria with `COUNT(*)`.
    pub async fn count(&self, table: &str, criteria: &Criteria) -> Result<u64> {
        self.count_with(table, criteria, None).await
    }

    /// Count rows with a caller-supplied aggregate such as `COUNT(DISTINCT X)`.
    ///
    /// A query that yields no row counts as zero.
    pub async fn count_with(
        &self,
        table: &str,
        criteria: &Criteria,
        expr: Option<&str>,
    ) -> Result<u64> {
        let stmt = self.compiler.count(table, criteria, expr)?;
        let rows = self.query(Stage::Count, &stmt).await?;
        let Some(first) = rows.first() else {
            return Ok(0);
        };
        let value = first
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(COUNT_ALIAS))
            .or_else(|| first.iter().next())
            .map(|(_, v)| v);
        match value {
            Some(SqlValue::Null) | None => Ok(0),
            Some(v) => v
                .as_i64()
                .and_then(|n| u64::try_from(n).ok())
                .ok_or_else(|| {
                    BridgeError::execution(Stage::Count, format!("unexpected total {:?}", v))
                }),
        }
    }

    /// Find the rows, then count every row matching the same filter and joins.
    ///
    /// Unlike a count built from the full criteria, the count query drops
    /// `limit`, `offset` and `sort`, so `total` is the size of the whole match
    /// set even for a page past the first. `criteria` is not modified.
    pub async fn find_all_and_count(&self, table: &str, criteria: &Criteria) -> Result<FindResult> {
        let items = self.find(table, criteria).await?;
        let unpaged = Criteria {
            limit: None,
            offset: None,
            sort: Vec::new(),
            ..criteria.clone()
        };
        let total = self.count(table, &unpaged).await?;
        Ok(FindResult { items, total })
    }

    /// Update rows matching the criteria. Returns the affected row count.
    pub async fn update(&self, table: &str, criteria: &Criteria, row: &Row) -> Result<u64> {
        let stmt = self.compiler.update(table, criteria, row)?;
        self.mutate(Stage::Update, &stmt).await
    }

    /// Delete rows matching the criteria. Returns the affected row count.
    pub async fn delete(&self, table: &str, criteria: &Criteria) -> Result<u64> {
        let stmt = self.compiler.delete(table, criteria)?;
        self.mutate(Stage::Delete, &stmt).await
    }

    /// Run caller-written SQL with positional parameters.
    ///
    /// Statements that report affected rows are committed.
    pub async fn send_native_query(&self, sql: &str, values: &[SqlValue]) -> Result<NativeResult> {
        let conn = self.pool.acquire().await?;
        let result: Result<NativeResult> = async {
            self.trace_statement(sql, values);
            match conn.execute(sql, values).await? {
                ExecOutcome::Affected(n) => {
                    conn.commit().await?;
                    Ok(NativeResult::Affected(n))
                }
                ExecOutcome::Rows(rs) => Ok(NativeResult::Rows(collect_rows(rs).await?)),
            }
        }
        .await;
        self.pool.release(conn);
        result.map_err(|e| e.at_stage(Stage::Native))
    }

    /// Execute a mutating statement and commit it.
    async fn mutate(&self, stage: Stage, stmt: &CompiledStatement) -> Result<u64> {
        let conn = self.pool.acquire().await?;
        let result: Result<u64> = async {
            self.trace_statement(&stmt.sql, &stmt.values);
            let affected = match conn.execute(&stmt.sql, &stmt.values).await? {
                ExecOutcome::Affected(n) => n,
                ExecOutcome::Rows(mut rs) => {
                    rs.close().await;
                    0
                }
            };
            conn.commit().await?;
            Ok(affected)
        }
        .await;
        self.pool.release(conn);
        result.map_err(|e| e.at_stage(stage))
    }

    /// Execute a read and normalize its rows.
    async fn query(&self, stage: Stage, stmt: &CompiledStatement) -> Result<Vec<Row>> {
        let conn = self.pool.acquire().await?;
        let result: Result<Vec<Row>> = async {
            self.trace_statement(&stmt.sql, &stmt.values);
            match conn.execute(&stmt.sql, &stmt.values).await? {
                ExecOutcome::Rows(rs) => collect_rows(rs).await,
                ExecOutcome::Affected(_) => Ok(Vec::new()),
            }
        }
        .await;
        self.pool.release(conn);
        result.map_err(|e| e.at_stage(stage))
    }
}
