//! # dmdb-bridge
//!
//! Data-access adapter for DM (Dameng) databases.
//!
//! The library turns structured query criteria into parameterized DM SQL and
//! runs it through a pluggable connection pool:
//!
//! - **Criteria compiler** covering projection, joins, filters, paging and
//!   sorting, with case-sensitive or folded identifiers
//! - **CRUD and native queries** that always return their connection to the
//!   pool and normalize streamed large-object columns to text
//! - **Bulk loading** with identity insert and per-row failure capture
//! - **Table migration** from MySQL, page by page
//!
//! ## Example
//!
//! ```rust,ignore
//! use dmdb_bridge::{AdapterOptions, Config, Criteria, DmAdapter, OdbcPool};
//!
//! #[tokio::main]
//! async fn main() -> dmdb_bridge::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let dm = DmAdapter::new(
//!         OdbcPool::new(&config.target),
//!         AdapterOptions::from(&config.target),
//!     );
//!     let page = dm
//!         .find_all_and_count("users", &Criteria::new().filter("status", "active").limit(20))
//!         .await?;
//!     println!("{} of {} users", page.items.len(), page.total);
//!     dm.close().await;
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod bulk;
pub mod config;
pub mod core;
#[cfg(feature = "odbc")]
pub mod drivers;
pub mod error;
pub mod exec;
pub mod migrate;
pub mod query;

// Re-exports for convenient access
pub use adapter::{AdapterOptions, DmAdapter, FindResult, NativeResult};
pub use bulk::{BulkOptions, BulkResult, RowFailure};
pub use config::{Config, MigrationConfig, PoolConfig, SourceConfig, TargetConfig};
pub use crate::core::{Criteria, Filter, JoinKind, JoinSpec, Projection, Row, SortDirection, SqlValue};
pub use error::{BridgeError, Result, Stage};
pub use exec::{ConnectionPool, ExecOutcome, LobReader, RawValue, ResultSet, TargetConnection};
pub use migrate::{MigrationOptions, MigrationSummary, RowSource};
pub use query::{CompiledStatement, SqlCompiler};

#[cfg(feature = "odbc")]
pub use drivers::{OdbcPool, HEALTH_CHECK_SQL};
#[cfg(feature = "mysql")]
pub use migrate::MysqlSource;
