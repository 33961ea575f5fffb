//! Core types: values, rows, criteria and identifier handling.

pub mod criteria;
pub mod identifier;
pub mod value;

pub use criteria::{Criteria, Filter, JoinKind, JoinSpec, Projection, SortDirection};
pub use value::{Row, SqlValue};
