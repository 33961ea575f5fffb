//! DM target over ODBC.
//!
//! **Requirements:**
//! - The `odbc` feature must be enabled
//! - An ODBC driver manager (unixODBC on Linux/macOS) and the DM8 ODBC driver
//!   registered under the name given in `target.driver`
//!
//! Connections run with autocommit off and are pooled with bb8. ODBC calls
//! are blocking, so every call runs on tokio's blocking thread pool. Each
//! connection serializes its calls behind its own mutex, so the concurrent
//! inserts of a bulk batch take turns on the shared connection.
//!
//! A cursor borrows its statement, which borrows the connection, so result
//! sets are fetched completely while the connection is locked. Long
//! character and binary columns are read whole at that point and handed to
//! callers as chunked [`LobReader`]s.

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection, RunError};
use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use odbc_api::parameter::InputParameter;
use odbc_api::{
    Bit, Connection, ConnectionOptions, Cursor, DataType, Environment, IntoParameter,
    ResultSetMetadata,
};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::core::value::SqlValue;
use crate::error::{BridgeError, Result};
use crate::exec::{ConnectionPool, ExecOutcome, LobReader, RawValue, ResultSet, TargetConnection};

/// Chunk size used when handing out long column values.
const LOB_CHUNK_SIZE: usize = 64 * 1024;

/// Statement used to validate connections.
pub const HEALTH_CHECK_SQL: &str = "SELECT 1 FROM DUAL;";

static ODBC_ENV: OnceLock<Environment> = OnceLock::new();

/// Process-wide ODBC environment, created on first use.
fn environment() -> Result<&'static Environment> {
    if let Some(env) = ODBC_ENV.get() {
        return Ok(env);
    }
    let env = Environment::new().map_err(|e| {
        BridgeError::Init(format!(
            "Failed to create ODBC environment: {}. Install an ODBC driver manager and the DM8 ODBC driver.",
            e
        ))
    })?;
    Ok(ODBC_ENV.get_or_init(|| env))
}

fn driver_error(e: odbc_api::Error) -> BridgeError {
    BridgeError::Driver(e.to_string())
}

/// Run a blocking ODBC call on the blocking thread pool.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BridgeError::Driver(format!("ODBC worker failed: {}", e)))?
}

/// One DM connection in manual-commit mode.
pub struct DmConnection {
    inner: StdMutex<Connection<'static>>,
    broken: AtomicBool,
}

impl DmConnection {
    fn connect(connection_string: &str) -> Result<Self> {
        let conn = environment()?
            .connect_with_connection_string(connection_string, ConnectionOptions::default())
            .map_err(|e| BridgeError::Init(format!("Failed to connect to DM via ODBC: {}", e)))?;
        conn.set_autocommit(false)
            .map_err(|e| BridgeError::Init(format!("Failed to disable autocommit: {}", e)))?;
        Ok(Self {
            inner: StdMutex::new(conn),
            broken: AtomicBool::new(false),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection<'static>>> {
        self.inner.lock().map_err(|_| {
            self.broken.store(true, Ordering::SeqCst);
            BridgeError::Driver("ODBC connection lock poisoned".into())
        })
    }

    /// Execute one statement, fetching any result set completely.
    fn run(&self, sql: &str, values: &[SqlValue]) -> Result<ExecOutcome> {
        let guard = self.lock()?;
        let params = to_parameters(values);
        let mut stmt = guard.preallocate().map_err(driver_error)?;

        let fetched = match stmt.execute(sql, params.as_slice()).map_err(driver_error)? {
            Some(mut cursor) => Some(fetch_all(&mut cursor)?),
            None => None,
        };

        match fetched {
            Some(rows) => Ok(ExecOutcome::Rows(Box::new(BufferedResultSet::new(rows)))),
            None => {
                let affected = stmt.row_count().map_err(driver_error)?.unwrap_or(0);
                Ok(ExecOutcome::Affected(affected as u64))
            }
        }
    }

    fn commit(&self) -> Result<()> {
        self.lock()?.commit().map_err(driver_error)
    }

    fn mark_broken(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }
}

/// Bind values as ODBC input parameters.
///
/// Integers, floats, booleans and binary data bind natively; everything else
/// binds as text and is converted by the driver.
fn to_parameters(values: &[SqlValue]) -> Vec<Box<dyn InputParameter>> {
    values
        .iter()
        .map(|value| -> Box<dyn InputParameter> {
            match value {
                SqlValue::Null => Box::new(None::<String>.into_parameter()),
                SqlValue::Bool(b) => Box::new(Bit::from_bool(*b)),
                SqlValue::I32(n) => Box::new(*n),
                SqlValue::I64(n) => Box::new(*n),
                SqlValue::F64(n) => Box::new(*n),
                SqlValue::Bytes(b) => Box::new(b.clone().into_parameter()),
                other => Box::new(other.to_text().into_parameter()),
            }
        })
        .collect()
}

enum Cell {
    Value(SqlValue),
    Lob(Vec<u8>),
}

type FetchedRow = Vec<(String, Cell)>;

fn is_long(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::LongVarchar { .. } | DataType::LongVarbinary { .. }
    )
}

fn is_binary(data_type: &DataType) -> bool {
    matches!(data_type, DataType::Binary { .. } | DataType::Varbinary { .. })
}

fn fetch_all(cursor: &mut impl Cursor) -> Result<Vec<FetchedRow>> {
    let num_cols = cursor.num_result_cols().map_err(driver_error)?;
    let mut columns = Vec::with_capacity(num_cols.max(0) as usize);
    for i in 1..=num_cols.max(0) as u16 {
        let name = cursor.col_name(i).map_err(driver_error)?;
        let data_type = cursor.col_data_type(i).map_err(driver_error)?;
        columns.push((name, data_type));
    }

    let mut rows = Vec::new();
    let mut buf = Vec::new();
    while let Some(mut row) = cursor.next_row().map_err(driver_error)? {
        let mut cells = Vec::with_capacity(columns.len());
        for (i, (name, data_type)) in columns.iter().enumerate() {
            let col = (i + 1) as u16;
            buf.clear();
            let cell = if is_long(data_type) {
                // character LOBs come back as text, binary ones as raw bytes
                let present = if matches!(data_type, DataType::LongVarbinary { .. }) {
                    row.get_binary(col, &mut buf)
                } else {
                    row.get_text(col, &mut buf)
                };
                if present.map_err(driver_error)? {
                    Cell::Lob(std::mem::take(&mut buf))
                } else {
                    Cell::Value(SqlValue::Null)
                }
            } else if is_binary(data_type) {
                if row.get_binary(col, &mut buf).map_err(driver_error)? {
                    Cell::Value(SqlValue::Bytes(buf.clone()))
                } else {
                    Cell::Value(SqlValue::Null)
                }
            } else if row.get_text(col, &mut buf).map_err(driver_error)? {
                Cell::Value(parse_text(data_type, &String::from_utf8_lossy(&buf)))
            } else {
                Cell::Value(SqlValue::Null)
            };
            cells.push((name.clone(), cell));
        }
        rows.push(cells);
    }
    Ok(rows)
}

/// Convert the driver's text rendering of a column into a typed value.
fn parse_text(data_type: &DataType, text: &str) -> SqlValue {
    let parsed = match data_type {
        DataType::TinyInt | DataType::SmallInt | DataType::Integer => {
            text.trim().parse().ok().map(SqlValue::I32)
        }
        DataType::BigInt => text.trim().parse().ok().map(SqlValue::I64),
        DataType::Bit => match text.trim() {
            "1" => Some(SqlValue::Bool(true)),
            "0" => Some(SqlValue::Bool(false)),
            _ => None,
        },
        DataType::Real | DataType::Float { .. } | DataType::Double => {
            text.trim().parse().ok().map(SqlValue::F64)
        }
        DataType::Decimal { .. } | DataType::Numeric { .. } => {
            Decimal::from_str(text.trim()).ok().map(SqlValue::Decimal)
        }
        DataType::Date => NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
            .ok()
            .map(SqlValue::Date),
        DataType::Time { .. } => NaiveTime::parse_from_str(text.trim(), "%H:%M:%S%.f")
            .ok()
            .map(SqlValue::Time),
        DataType::Timestamp { .. } => {
            NaiveDateTime::parse_from_str(text.trim(), "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(SqlValue::DateTime)
        }
        _ => None,
    };
    parsed.unwrap_or_else(|| SqlValue::String(text.to_string()))
}

/// A long column value already fetched, handed out in fixed-size chunks.
struct BufferedLob {
    data: Bytes,
}

#[async_trait]
impl LobReader for BufferedLob {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.data.is_empty() {
            return Ok(None);
        }
        let n = self.data.len().min(LOB_CHUNK_SIZE);
        Ok(Some(self.data.split_to(n)))
    }

    async fn close(&mut self) {
        self.data.clear();
    }
}

/// Rows fetched while the connection was locked.
struct BufferedResultSet {
    rows: VecDeque<FetchedRow>,
    total: u64,
}

impl BufferedResultSet {
    fn new(rows: Vec<FetchedRow>) -> Self {
        Self {
            total: rows.len() as u64,
            rows: rows.into(),
        }
    }
}

#[async_trait]
impl ResultSet for BufferedResultSet {
    fn row_count(&self) -> Option<u64> {
        Some(self.total)
    }

    async fn next_row(&mut self) -> Result<Option<Vec<(String, RawValue)>>> {
        Ok(self.rows.pop_front().map(|cells| {
            cells
                .into_iter()
                .map(|(name, cell)| {
                    let value = match cell {
                        Cell::Value(v) => RawValue::Scalar(v),
                        Cell::Lob(data) => RawValue::StreamableBlob(Box::new(BufferedLob {
                            data: Bytes::from(data),
                        })),
                    };
                    (name, value)
                })
                .collect()
        }))
    }

    async fn close(&mut self) {
        self.rows.clear();
    }
}

/// Connection manager for bb8 pool with ODBC.
#[derive(Clone)]
pub struct DmConnectionManager {
    connection_string: String,
}

#[async_trait]
impl bb8::ManageConnection for DmConnectionManager {
    type Connection = Arc<DmConnection>;
    type Error = BridgeError;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let connection_string = self.connection_string.clone();
        blocking(move || DmConnection::connect(&connection_string))
            .await
            .map(Arc::new)
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        let conn = Arc::clone(conn);
        blocking(move || conn.run(HEALTH_CHECK_SQL, &[]).map(|_| ())).await
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.broken.load(Ordering::SeqCst)
    }
}

/// A pooled DM connection.
pub struct OdbcConnection {
    conn: PooledConnection<'static, DmConnectionManager>,
}

#[async_trait]
impl TargetConnection for OdbcConnection {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<ExecOutcome> {
        let conn = Arc::clone(&*self.conn);
        let sql = sql.to_string();
        let params = params.to_vec();
        blocking(move || conn.run(&sql, &params)).await
    }

    async fn commit(&self) -> Result<()> {
        let conn = Arc::clone(&*self.conn);
        blocking(move || conn.commit()).await
    }
}

/// bb8 pool of DM ODBC connections, opened lazily.
pub struct OdbcPool {
    manager: DmConnectionManager,
    max_size: u32,
    min_idle: u32,
    connect_timeout: Duration,
    pool: Mutex<Option<Pool<DmConnectionManager>>>,
    open: AtomicBool,
    server: String,
}

impl OdbcPool {
    /// Create a pool for the configured target. No connection is made yet.
    pub fn new(config: &TargetConfig) -> Self {
        Self {
            manager: DmConnectionManager {
                connection_string: config.connection_string(),
            },
            max_size: config.pool.max_size,
            min_idle: config.pool.min_idle,
            connect_timeout: Duration::from_secs(config.pool.connect_timeout_secs),
            pool: Mutex::new(None),
            open: AtomicBool::new(false),
            server: format!("{}:{}", config.host, config.port),
        }
    }

    async fn current(&self) -> Result<Pool<DmConnectionManager>> {
        let mut slot = self.pool.lock().await;
        if let Some(pool) = slot.as_ref() {
            return Ok(pool.clone());
        }

        debug!(
            "Opening DM pool for {} (max {}, min idle {})",
            self.server, self.max_size, self.min_idle
        );
        let pool = Pool::builder()
            .max_size(self.max_size)
            .min_idle(Some(self.min_idle))
            .connection_timeout(self.connect_timeout)
            .test_on_check_out(false)
            .build(self.manager.clone())
            .await?;

        // Test connection
        {
            let pooled = pool.get().await.map_err(init_error)?;
            let conn = Arc::clone(&*pooled);
            blocking(move || conn.run(HEALTH_CHECK_SQL, &[]))
                .await
                .map_err(|e| BridgeError::Init(e.to_string()))?;
        }

        info!("Connected to DM target via ODBC: {}", self.server);
        *slot = Some(pool.clone());
        self.open.store(true, Ordering::SeqCst);
        Ok(pool)
    }
}

fn init_error(e: RunError<BridgeError>) -> BridgeError {
    match e {
        RunError::User(BridgeError::Init(message)) => BridgeError::Init(message),
        RunError::User(other) => BridgeError::Init(other.to_string()),
        RunError::TimedOut => BridgeError::Init("timed out waiting for a connection".into()),
    }
}

#[async_trait]
impl ConnectionPool for OdbcPool {
    type Connection = OdbcConnection;

    async fn open(&self) -> Result<()> {
        self.current().await.map(|_| ())
    }

    async fn acquire(&self) -> Result<OdbcConnection> {
        let pool = self.current().await?;
        let conn = pool.get_owned().await.map_err(init_error)?;
        Ok(OdbcConnection { conn })
    }

    fn release(&self, conn: OdbcConnection) {
        drop(conn);
    }

    fn discard(&self, conn: OdbcConnection) {
        warn!("Discarding DM connection instead of returning it to the pool");
        conn.conn.mark_broken();
        drop(conn);
    }

    async fn close(&self) {
        if self.pool.lock().await.take().is_some() {
            info!("Closed DM pool for {}", self.server);
        }
        self.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
