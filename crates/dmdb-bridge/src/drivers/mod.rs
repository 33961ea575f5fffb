//! Concrete target drivers.

pub mod odbc;

pub use odbc::{OdbcConnection, OdbcPool, HEALTH_CHECK_SQL};
