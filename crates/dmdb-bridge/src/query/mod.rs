//! Criteria-to-SQL compilation.

pub mod builder;
pub mod statement;

pub use statement::{CompiledStatement, SqlCompiler, COUNT_ALIAS, DEFAULT_COUNT_EXPR};
