//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target database configuration (DM).
    pub target: TargetConfig,

    /// Source database configuration (MySQL), only needed for migration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceConfig>,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Target database (DM) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5236).
    #[serde(default = "default_dm_port")]
    pub port: u16,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Tablespace (schema) qualifying every table name.
    pub tablespace: String,

    /// ODBC driver name as registered with the driver manager.
    #[serde(default = "default_dm_driver")]
    pub driver: String,

    /// Quote identifiers verbatim instead of folding them to upper case.
    #[serde(default = "default_true")]
    pub case_sensitive: bool,

    /// Log generated SQL and bound values at debug level.
    #[serde(default = "default_true")]
    pub debug: bool,

    /// Connection pool settings.
    #[serde(default)]
    pub pool: PoolConfig,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("tablespace", &self.tablespace)
            .field("driver", &self.driver)
            .field("case_sensitive", &self.case_sensitive)
            .field("debug", &self.debug)
            .field("pool", &self.pool)
            .finish()
    }
}

/// Connection pool settings for the target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum open connections (default: 20).
    #[serde(default = "default_pool_max")]
    pub max_size: u32,

    /// Idle connections kept warm (default: 1).
    #[serde(default = "default_pool_min")]
    pub min_idle: u32,

    /// Seconds to wait for a connection (default: 30).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: default_pool_max(),
            min_idle: default_pool_min(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Source database (MySQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default, skip_serializing)]
    pub password: String,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows read from the source per page (default: 100).
    #[serde(default = "default_page_limit")]
    pub page_limit: u64,

    /// Enable identity insert on the target table while loading (default: true).
    #[serde(default = "default_true")]
    pub identity_insert: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            page_limit: default_page_limit(),
            identity_insert: true,
        }
    }
}

fn default_dm_port() -> u16 {
    5236
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_dm_driver() -> String {
    "DM8 ODBC DRIVER".to_string()
}

fn default_true() -> bool {
    true
}

fn default_pool_max() -> u32 {
    20
}

fn default_pool_min() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_page_limit() -> u64 {
    100
}
