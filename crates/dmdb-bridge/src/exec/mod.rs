//! Execution layer: the seams between the adapter and a concrete driver.
//!
//! - [`ConnectionPool`]: explicit pool lifecycle plus acquire/release
//! - [`TargetConnection`]: execute a statement, commit
//! - [`ResultSet`] and [`LobReader`]: driver-native read shapes, normalized
//!   into [`Row`](crate::core::Row)s by [`normalize::collect_rows`]

pub mod lob;
pub mod normalize;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use bytes::Bytes;

use crate::core::value::SqlValue;
use crate::error::Result;

pub use lob::read_lob;
pub use normalize::collect_rows;

/// Streaming handle for a large-object column value.
#[async_trait]
pub trait LobReader: Send {
    /// Next chunk of data, `None` once the value is exhausted.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;

    /// Release the underlying resource.
    async fn close(&mut self);
}

/// A column value as delivered by the driver.
pub enum RawValue {
    Scalar(SqlValue),
    StreamableBlob(Box<dyn LobReader>),
}

impl std::fmt::Debug for RawValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawValue::Scalar(v) => f.debug_tuple("Scalar").field(v).finish(),
            RawValue::StreamableBlob(_) => f.write_str("StreamableBlob(..)"),
        }
    }
}

/// Rows returned by a query, fetched one at a time.
#[async_trait]
pub trait ResultSet: Send {
    /// Row count reported up front, if the driver knows it.
    fn row_count(&self) -> Option<u64>;

    /// Fetch the next row as column/value pairs.
    async fn next_row(&mut self) -> Result<Option<Vec<(String, RawValue)>>>;

    /// Release the cursor.
    async fn close(&mut self);
}

/// Result of executing one statement.
pub enum ExecOutcome {
    Affected(u64),
    Rows(Box<dyn ResultSet>),
}

/// A connection to the target engine, in manual-commit mode.
///
/// Methods take `&self` so the bulk loader can issue concurrent inserts on a
/// single connection; implementations serialize access internally.
#[async_trait]
pub trait TargetConnection: Send + Sync {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<ExecOutcome>;

    async fn commit(&self) -> Result<()>;
}

/// Pool of target connections with an explicit lifecycle.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    type Connection: TargetConnection;

    /// Establish the pool. Idempotent; a failure leaves the pool closed so
    /// a later call can retry.
    async fn open(&self) -> Result<()>;

    /// Check out a connection, opening the pool first if needed.
    async fn acquire(&self) -> Result<Self::Connection>;

    /// Return a connection to the pool.
    fn release(&self, conn: Self::Connection);

    /// Drop a connection instead of returning it to the pool.
    fn discard(&self, conn: Self::Connection);

    /// Tear the pool down. A later `acquire` reopens it.
    async fn close(&self);

    fn is_open(&self) -> bool;
}
