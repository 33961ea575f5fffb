//! MySQL row source built on sqlx.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tracing::info;

use super::RowSource;
use crate::config::SourceConfig;
use crate::core::identifier::validate_identifier;
use crate::core::value::{Row, SqlValue};
use crate::error::{BridgeError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Reads pages of rows from a MySQL database.
pub struct MysqlSource {
    pool: MySqlPool,
}

impl MysqlSource {
    /// Connect to the configured MySQL database and test the connection.
    pub async fn connect(config: &SourceConfig, max_conns: u32) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password);

        let pool = MySqlPoolOptions::new()
            .max_connections(max_conns.max(1))
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| BridgeError::Source(format!("creating MySQL source pool: {}", e)))?;

        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| BridgeError::Source(format!("testing MySQL source connection: {}", e)))?;

        info!(
            "Connected to MySQL source: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// Paged SELECT with backtick-quoted identifiers; NULL filters become `IS NULL`.
fn select_sql(table: &str, filter: &[(String, SqlValue)]) -> Result<String> {
    let mut sql = format!("SELECT * FROM {}", quote_mysql(table)?);
    if !filter.is_empty() {
        let predicates = filter
            .iter()
            .map(|(column, value)| {
                let column = quote_mysql(column)?;
                Ok(if value.is_null() {
                    format!("{} IS NULL", column)
                } else {
                    format!("{} = ?", column)
                })
            })
            .collect::<Result<Vec<_>>>()?;
        sql.push_str(" WHERE ");
        sql.push_str(&predicates.join(" AND "));
    }
    sql.push_str(" LIMIT ? OFFSET ?");
    Ok(sql)
}

fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &SqlValue,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::I32(v) => query.bind(*v),
        SqlValue::I64(v) => query.bind(*v),
        SqlValue::F64(v) => query.bind(*v),
        SqlValue::String(s) => query.bind(s.clone()),
        SqlValue::Bytes(b) => query.bind(b.clone()),
        SqlValue::Decimal(d) => query.bind(*d),
        SqlValue::DateTime(dt) => query.bind(*dt),
        SqlValue::Date(d) => query.bind(*d),
        SqlValue::Time(t) => query.bind(*t),
        SqlValue::Uuid(u) => query.bind(u.to_string()),
    }
}

/// Convert a MySQL row to a [`Row`], dispatching on each column's type name.
///
/// A value that cannot be decoded fails the whole row; nothing is written
/// as NULL in its place.
fn row_to_values(row: &MySqlRow) -> Result<Row> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| {
            let is_null = row
                .try_get_raw(i)
                .map(|r| r.is_null())
                .map_err(|e| decode_error(col.name(), e))?;
            if is_null {
                return Ok((col.name().to_string(), SqlValue::Null));
            }
            let value = decode_column(row, i, &col.type_info().name().to_lowercase())
                .map_err(|e| decode_error(col.name(), e))?;
            Ok((col.name().to_string(), value))
        })
        .collect()
}

fn decode_error(column: &str, e: sqlx::Error) -> BridgeError {
    BridgeError::Source(format!("decoding column {}: {}", column, e))
}

fn unsigned(v: u64) -> SqlValue {
    match i64::try_from(v) {
        Ok(n) => SqlValue::I64(n),
        Err(_) => SqlValue::Decimal(v.into()),
    }
}

fn decode_column(row: &MySqlRow, i: usize, data_type: &str) -> std::result::Result<SqlValue, sqlx::Error> {
    Ok(match data_type {
        "tinyint" | "smallint" | "mediumint" | "int" | "bigint" => {
            SqlValue::I64(row.try_get::<i64, _>(i)?)
        }
        "tinyint unsigned" | "smallint unsigned" | "mediumint unsigned" | "int unsigned"
        | "bigint unsigned" | "bit" => unsigned(row.try_get::<u64, _>(i)?),
        "year" => SqlValue::I32(i32::from(row.try_get::<u16, _>(i)?)),
        "float" => SqlValue::F64(row.try_get::<f32, _>(i)?.into()),
        "double" => SqlValue::F64(row.try_get::<f64, _>(i)?),
        "decimal" => SqlValue::Decimal(row.try_get::<rust_decimal::Decimal, _>(i)?),
        "boolean" => SqlValue::Bool(row.try_get::<bool, _>(i)?),
        "binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob" => {
            SqlValue::Bytes(row.try_get::<Vec<u8>, _>(i)?)
        }
        "date" => SqlValue::Date(row.try_get::<chrono::NaiveDate, _>(i)?),
        "time" => SqlValue::Time(row.try_get::<chrono::NaiveTime, _>(i)?),
        "datetime" | "timestamp" => {
            SqlValue::DateTime(row.try_get::<chrono::NaiveDateTime, _>(i)?)
        }
        // char, varchar, text family, enum, set, json and anything else
        _ => match row.try_get::<String, _>(i) {
            Ok(s) => SqlValue::String(s),
            Err(_) => {
                let raw = row.try_get_unchecked::<Vec<u8>, _>(i)?;
                SqlValue::String(String::from_utf8_lossy(&raw).into_owned())
            }
        },
    })
}

#[async_trait]
impl RowSource for MysqlSource {
    async fn select(
        &self,
        table: &str,
        filter: &[(String, SqlValue)],
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Row>> {
        let sql = select_sql(table, filter)?;
        let mut query = sqlx::query(&sql);
        for (_, value) in filter.iter().filter(|(_, v)| !v.is_null()) {
            query = bind_value(query, value);
        }
        let rows = query
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BridgeError::Source(format!("reading {}: {}", table, e)))?;

        rows.iter().map(row_to_values).collect()
    }
}
