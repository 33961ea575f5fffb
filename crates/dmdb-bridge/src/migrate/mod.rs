//! Paginated table migration from a source database into DM.
//!
//! Pages are read from a [`RowSource`] with a fixed limit and an advancing
//! offset, and each page goes through the bulk loader. The loop ends at the
//! first empty page, so the source size need not be known in advance.

#[cfg(feature = "mysql")]
mod mysql;

#[cfg(feature = "mysql")]
pub use mysql::MysqlSource;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::adapter::DmAdapter;
use crate::bulk::{BulkOptions, RowFailure};
use crate::config::MigrationConfig;
use crate::core::value::{Row, SqlValue};
use crate::error::{BridgeError, Result};
use crate::exec::ConnectionPool;

/// Read-side collaborator: pages of rows from a source table.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Rows of `table` matching every `(column, value)` equality, starting
    /// at `offset`, at most `limit` of them. An exhausted table yields an
    /// empty page.
    async fn select(
        &self,
        table: &str,
        filter: &[(String, SqlValue)],
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Row>>;
}

/// Migration settings.
#[derive(Debug, Clone, Copy)]
pub struct MigrationOptions {
    pub page_limit: u64,
    pub bulk: BulkOptions,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        MigrationOptions::from(&MigrationConfig::default())
    }
}

impl From<&MigrationConfig> for MigrationOptions {
    fn from(config: &MigrationConfig) -> Self {
        Self {
            page_limit: config.page_limit,
            bulk: BulkOptions {
                identity_insert: config.identity_insert,
            },
        }
    }
}

/// Totals for one migrated table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationSummary {
    pub source_rows_read: u64,
    pub target_rows_written: u64,
    /// Non-empty pages read from the source.
    pub pages_read: u64,
    pub failures: Vec<RowFailure>,
}

impl<P: ConnectionPool> DmAdapter<P> {
    /// Copy every row of `source_table` into `target_table`.
    ///
    /// Row failures are collected into the summary. Source read errors and
    /// whole-batch bulk errors abort the migration.
    pub async fn migrate_table<S>(
        &self,
        source: &S,
        source_table: &str,
        target_table: &str,
        options: MigrationOptions,
    ) -> Result<MigrationSummary>
    where
        S: RowSource + ?Sized,
    {
        if options.page_limit == 0 {
            return Err(BridgeError::Config(
                "migration page limit must be at least 1".into(),
            ));
        }

        let mut summary = MigrationSummary::default();
        let mut offset = 0u64;

        loop {
            let page = source
                .select(source_table, &[], options.page_limit, offset)
                .await
                .map_err(|e| match e {
                    BridgeError::Source(_) => e,
                    other => BridgeError::Source(other.to_string()),
                })?;
            if page.is_empty() {
                break;
            }

            let page_len = page.len() as u64;
            let result = self
                .bulk_create_with(target_table, page, options.bulk)
                .await?;
            let failed = result.failures.len() as u64;

            summary.pages_read += 1;
            summary.source_rows_read += page_len;
            summary.target_rows_written += result.attempted() - failed;
            summary.failures.extend(result.failures);
            offset += options.page_limit;

            info!(
                "Migrated page {} of {} -> {}: {} rows read, {} failed",
                summary.pages_read, source_table, target_table, page_len, failed
            );
        }

        info!(
            "Migration {} -> {} complete: {} rows read, {} written, {} failed",
            source_table,
            target_table,
            summary.source_rows_read,
            summary.target_rows_written,
            summary.failures.len()
        );
        Ok(summary)
    }
}

#[cfg(feature = "mysql")]
impl<P: ConnectionPool> DmAdapter<P> {
    /// Connect to a MySQL source, migrate one table, then disconnect.
    pub async fn migrate_from_mysql(
        &self,
        source: &crate::config::SourceConfig,
        source_table: &str,
        target_table: &str,
        options: MigrationOptions,
    ) -> Result<MigrationSummary> {
        let mysql = MysqlSource::connect(source, 1).await?;
        let result = self
            .migrate_table(&mysql, source_table, target_table, options)
            .await;
        mysql.close().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdapterOptions;
    use crate::exec::mock::MockPool;
    use std::sync::Mutex;

    /// In-memory source that records each requested page.
    struct VecSource {
        rows: Vec<Row>,
        calls: Mutex<Vec<(u64, u64, usize)>>,
        fail_at_offset: Option<u64>,
    }

    impl VecSource {
        fn new(rows: Vec<Row>) -> Self {
            Self {
                rows,
                calls: Mutex::new(Vec::new()),
                fail_at_offset: None,
            }
        }

        fn generated(total: i64) -> Self {
            Self::new(
                (1..=total)
                    .map(|i| Row::new().with("id", i).with("name", format!("row {i}")))
                    .collect(),
            )
        }

        fn calls(&self) -> Vec<(u64, u64, usize)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RowSource for VecSource {
        async fn select(
            &self,
            _table: &str,
            filter: &[(String, SqlValue)],
            limit: u64,
            offset: u64,
        ) -> Result<Vec<Row>> {
            assert!(filter.is_empty());
            if self.fail_at_offset == Some(offset) {
                return Err(BridgeError::Driver("lost connection to MySQL".into()));
            }
            let page: Vec<Row> = self
                .rows
                .iter()
                .skip(offset as usize)
                .take(limit as usize)
                .cloned()
                .collect();
            self.calls.lock().unwrap().push((limit, offset, page.len()));
            Ok(page)
        }
    }

    fn adapter(pool: &MockPool) -> DmAdapter<MockPool> {
        DmAdapter::new(
            pool.clone(),
            AdapterOptions {
                tablespace: "APP".into(),
                case_sensitive: true,
                debug: false,
            },
        )
    }

    #[tokio::test]
    async fn test_pages_until_empty() {
        let pool = MockPool::new();
        let dm = adapter(&pool);
        let source = VecSource::generated(250);

        let summary = dm
            .migrate_table(&source, "users", "USERS", MigrationOptions::default())
            .await
            .unwrap();

        assert_eq!(
            source.calls(),
            vec![(100, 0, 100), (100, 100, 100), (100, 200, 50), (100, 300, 0)]
        );
        assert_eq!(summary.pages_read, 3);
        assert_eq!(summary.source_rows_read, 250);
        assert_eq!(summary.target_rows_written, 250);
        assert!(summary.failures.is_empty());
        // one connection per non-empty page
        assert_eq!(pool.acquired(), 3);
        assert_eq!(pool.released(), 3);
    }

    #[tokio::test]
    async fn test_exact_multiple_needs_confirming_read() {
        let pool = MockPool::new();
        let dm = adapter(&pool);
        let source = VecSource::generated(200);

        let summary = dm
            .migrate_table(&source, "users", "USERS", MigrationOptions::default())
            .await
            .unwrap();

        assert_eq!(source.calls().len(), 3);
        assert_eq!(summary.pages_read, 2);
        assert_eq!(summary.source_rows_read, 200);
    }

    #[tokio::test]
    async fn test_failures_aggregate_across_pages() {
        let pool = MockPool::new();
        let dm = adapter(&pool);
        let mut rows: Vec<Row> = (1..=5).map(|i| Row::new().with("id", i as i64)).collect();
        // duplicates of ids 2 and 4 land on later pages
        rows.push(Row::new().with("id", 2i64));
        rows.push(Row::new().with("id", 4i64));
        let source = VecSource::new(rows);

        let summary = dm
            .migrate_table(
                &source,
                "legacy_users",
                "USERS",
                MigrationOptions {
                    page_limit: 3,
                    bulk: BulkOptions::default(),
                },
            )
            .await
            .unwrap();

        assert_eq!(summary.pages_read, 3);
        assert_eq!(summary.source_rows_read, 7);
        assert_eq!(summary.target_rows_written, 5);
        assert_eq!(summary.failures.len(), 2);
        assert_eq!(summary.failures[0].row.get("id"), Some(&SqlValue::I64(2)));
        assert_eq!(summary.failures[1].row.get("id"), Some(&SqlValue::I64(4)));
    }

    #[tokio::test]
    async fn test_source_error_aborts() {
        let pool = MockPool::new();
        let dm = adapter(&pool);
        let mut source = VecSource::generated(150);
        source.fail_at_offset = Some(100);

        let err = dm
            .migrate_table(&source, "users", "USERS", MigrationOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::Source(_)));
        assert_eq!(err.exit_code(), 4);
        assert_eq!(pool.acquired(), 1);
    }

    #[tokio::test]
    async fn test_zero_page_limit_rejected() {
        let pool = MockPool::new();
        let dm = adapter(&pool);
        let source = VecSource::generated(1);
        let options = MigrationOptions {
            page_limit: 0,
            bulk: BulkOptions::default(),
        };
        assert!(dm.migrate_table(&source, "a", "b", options).await.is_err());
        assert!(source.calls().is_empty());
    }
}
