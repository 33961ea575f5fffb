//! Bulk loading with per-row failure capture.

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::adapter::DmAdapter;
use crate::core::value::Row;
use crate::error::{Result, Stage};
use crate::exec::{ConnectionPool, ExecOutcome, TargetConnection};

/// Options for [`DmAdapter::bulk_create_with`].
#[derive(Debug, Clone, Copy)]
pub struct BulkOptions {
    /// Allow explicit values for identity columns for the duration of the batch.
    pub identity_insert: bool,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            identity_insert: true,
        }
    }
}

/// A row whose insert failed, with the engine's message.
#[derive(Debug, Clone, Serialize)]
pub struct RowFailure {
    pub error: String,
    pub row: Row,
}

/// Outcome of a bulk insert.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkResult {
    /// Rows inserted without error.
    pub success_count: u64,
    /// Failed rows, in input order.
    pub failures: Vec<RowFailure>,
}

impl BulkResult {
    /// Number of rows attempted.
    pub fn attempted(&self) -> u64 {
        self.success_count + self.failures.len() as u64
    }
}

impl<P: ConnectionPool> DmAdapter<P> {
    /// Insert rows with identity insert enabled.
    pub async fn bulk_create(&self, table: &str, rows: Vec<Row>) -> Result<BulkResult> {
        self.bulk_create_with(table, rows, BulkOptions::default()).await
    }

    /// Insert every row on one shared connection, continuing past failures.
    ///
    /// Row attempts run concurrently and are awaited jointly. Only
    /// whole-batch problems (acquiring the connection, toggling identity
    /// insert, the final commit) are returned as errors. A row whose insert
    /// cannot even be compiled is recorded as a failure like any other.
    pub async fn bulk_create_with(
        &self,
        table: &str,
        rows: Vec<Row>,
        options: BulkOptions,
    ) -> Result<BulkResult> {
        let toggles = if options.identity_insert {
            Some((
                self.compiler.identity_insert(table, true)?,
                self.compiler.identity_insert(table, false)?,
            ))
        } else {
            None
        };

        let conn = self.pool.acquire().await?;

        if let Some((enable, _)) = &toggles {
            if let Err(e) = self.run_and_commit(&conn, enable).await {
                self.pool.release(conn);
                return Err(e.at_stage(Stage::Bulk));
            }
        }

        let loaded = self.insert_all(&conn, table, rows).await;

        if let Some((_, disable)) = &toggles {
            if let Err(e) = self.run_and_commit(&conn, disable).await {
                warn!(
                    "Failed to reset identity insert on {}: {}; discarding connection",
                    table, e
                );
                self.pool.discard(conn);
                return loaded;
            }
        }
        self.pool.release(conn);

        if let Ok(result) = &loaded {
            info!(
                "Bulk insert into {}: {} inserted, {} failed",
                table,
                result.success_count,
                result.failures.len()
            );
        }
        loaded
    }

    async fn run_and_commit(&self, conn: &P::Connection, sql: &str) -> Result<()> {
        self.trace_statement(sql, &[]);
        if let ExecOutcome::Rows(mut rs) = conn.execute(sql, &[]).await? {
            rs.close().await;
        }
        conn.commit().await
    }

    async fn insert_all(
        &self,
        conn: &P::Connection,
        table: &str,
        rows: Vec<Row>,
    ) -> Result<BulkResult> {
        let attempts = rows.into_iter().map(|row| async move {
            let outcome = self.insert_row(conn, table, &row).await;
            (row, outcome)
        });

        let mut result = BulkResult::default();
        for (row, outcome) in join_all(attempts).await {
            match outcome {
                Ok(()) => result.success_count += 1,
                Err(e) => result.failures.push(RowFailure {
                    error: e.to_string(),
                    row,
                }),
            }
        }

        conn.commit()
            .await
            .map_err(|e| e.at_stage(Stage::Bulk))?;
        Ok(result)
    }

    async fn insert_row(&self, conn: &P::Connection, table: &str, row: &Row) -> Result<()> {
        let stmt = self.compiler.create(table, row)?;
        self.trace_statement(&stmt.sql, &stmt.values);
        match conn.execute(&stmt.sql, &stmt.values).await {
            Ok(ExecOutcome::Rows(mut rs)) => {
                rs.close().await;
                Ok(())
            }
            Ok(ExecOutcome::Affected(_)) => Ok(()),
            Err(e) => Err(e.at_stage(Stage::Insert)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdapterOptions;
    use crate::core::value::SqlValue;
    use crate::exec::mock::MockPool;

    fn adapter(pool: &MockPool, case_sensitive: bool) -> DmAdapter<MockPool> {
        DmAdapter::new(
            pool.clone(),
            AdapterOptions {
                tablespace: "APP".into(),
                case_sensitive,
                debug: false,
            },
        )
    }

    fn user(id: i64, name: &str) -> Row {
        Row::new().with("id", id).with("name", name)
    }

    #[tokio::test]
    async fn test_duplicate_key_in_either_order() {
        for rows in [
            vec![user(1, "a"), user(1, "b")],
            vec![user(1, "b"), user(1, "a")],
        ] {
            let pool = MockPool::new();
            let dm = adapter(&pool, true);
            let input = rows.clone();

            let result = dm.bulk_create("users", rows).await.unwrap();

            assert_eq!(result.success_count, 1);
            assert_eq!(result.failures.len(), 1);
            let failed = &result.failures[0];
            assert!(input.contains(&failed.row));
            assert_eq!(failed.row.get("id"), Some(&SqlValue::I64(1)));
            assert!(failed.error.starts_with("insert data error:"));
            assert_eq!(result.attempted(), 2);
        }
    }

    #[tokio::test]
    async fn test_single_connection_and_identity_toggle() {
        let pool = MockPool::new();
        let dm = adapter(&pool, false);

        let rows = (1..=5).map(|i| user(i, "n")).collect();
        let result = dm.bulk_create("users", rows).await.unwrap();

        assert_eq!(result.success_count, 5);
        assert!(result.failures.is_empty());
        assert_eq!(pool.acquired(), 1);
        assert_eq!(pool.released(), 1);
        // enable, rows, disable
        assert_eq!(pool.commits(), 3);

        let statements = pool.statements();
        assert_eq!(statements.first().map(String::as_str), Some("SET IDENTITY_INSERT APP.USERS ON;"));
        assert_eq!(statements.last().map(String::as_str), Some("SET IDENTITY_INSERT APP.USERS OFF;"));
        assert_eq!(statements.iter().filter(|s| s.starts_with("INSERT")).count(), 5);
    }

    #[tokio::test]
    async fn test_identity_insert_disabled() {
        let pool = MockPool::new();
        let dm = adapter(&pool, true);

        dm.bulk_create_with("users", vec![user(1, "a")], BulkOptions { identity_insert: false })
            .await
            .unwrap();

        assert!(pool.statements().iter().all(|s| !s.contains("IDENTITY_INSERT")));
        assert_eq!(pool.commits(), 1);
    }

    #[tokio::test]
    async fn test_enable_failure_is_batch_error() {
        let pool = MockPool::new();
        pool.fail_on("IDENTITY_INSERT", "no privilege");
        let dm = adapter(&pool, true);

        let err = dm.bulk_create("users", vec![user(1, "a")]).await.unwrap_err();

        assert_eq!(err.to_string(), "bulk create data error: no privilege");
        assert_eq!(pool.released(), 1);
        assert!(pool.statements().iter().all(|s| !s.starts_with("INSERT")));
    }

    #[tokio::test]
    async fn test_reset_failure_discards_connection() {
        let pool = MockPool::new();
        pool.fail_on("\" OFF", "session lost");
        let dm = adapter(&pool, true);

        let result = dm
            .bulk_create("users", vec![user(1, "a"), user(2, "b")])
            .await
            .unwrap();

        assert_eq!(result.success_count, 2);
        assert_eq!(pool.discarded(), 1);
        assert_eq!(pool.released(), 0);
    }

    #[tokio::test]
    async fn test_uncompilable_row_is_recorded() {
        let pool = MockPool::new();
        let dm = adapter(&pool, false);

        let result = dm
            .bulk_create_with(
                "users",
                vec![user(1, "a"), Row::new().with("bad name", 1), user(2, "b")],
                BulkOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(result.success_count, 2);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].row.get("bad name"), Some(&SqlValue::I32(1)));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let pool = MockPool::new();
        let dm = adapter(&pool, true);
        let result = dm.bulk_create("users", Vec::new()).await.unwrap();
        assert_eq!(result.success_count, 0);
        assert!(result.failures.is_empty());
        assert_eq!(pool.released(), 1);
    }
}
