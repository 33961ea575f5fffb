//! Statement compilation for the five operation kinds.

use serde::Serialize;

use super::builder::{
    assemble, from_clause, join_clause, limit_clause, offset_clause, select_clause, set_clause,
    sort_clause, where_clause, PLACEHOLDER,
};
use crate::core::criteria::{Criteria, Projection};
use crate::core::identifier::{normalize_ident, table_name};
use crate::core::value::{Row, SqlValue};
use crate::error::{BridgeError, Result};

/// Default aggregate used by count queries.
pub const DEFAULT_COUNT_EXPR: &str = "COUNT(*)";

/// Column alias the count aggregate is read back from.
pub const COUNT_ALIAS: &str = "total";

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledStatement {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// Compiles criteria into DM SQL for one tablespace and identifier convention.
///
/// All methods are pure; nothing here touches a connection.
#[derive(Debug, Clone)]
pub struct SqlCompiler {
    tablespace: String,
    case_sensitive: bool,
}

impl SqlCompiler {
    pub fn new(tablespace: impl Into<String>, case_sensitive: bool) -> Self {
        Self {
            tablespace: tablespace.into(),
            case_sensitive,
        }
    }

    pub fn tablespace(&self) -> &str {
        &self.tablespace
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Fully qualified table name.
    pub fn table(&self, table: &str) -> Result<String> {
        table_name(&self.tablespace, table, self.case_sensitive)
    }

    /// `INSERT INTO <table> (<cols>) VALUES (?, ...);`
    pub fn create(&self, table: &str, row: &Row) -> Result<CompiledStatement> {
        if row.is_empty() {
            return Err(BridgeError::Compile(format!(
                "insert into {:?} has no columns",
                table
            )));
        }
        let columns = row
            .column_names()
            .map(|c| normalize_ident(c, self.case_sensitive))
            .collect::<Result<Vec<_>>>()?;
        let placeholders = vec![PLACEHOLDER; columns.len()].join(", ");
        let sql = assemble([
            format!("INSERT INTO {}", self.table(table)?),
            format!("({})", columns.join(", ")),
            format!("VALUES ({})", placeholders),
        ]);
        Ok(CompiledStatement {
            sql,
            values: row.iter().map(|(_, v)| v.clone()).collect(),
        })
    }

    /// SELECT with the criteria's own projection.
    pub fn find(&self, table: &str, criteria: &Criteria) -> Result<CompiledStatement> {
        self.select_with(table, criteria, &criteria.select)
    }

    /// SELECT of a count aggregate aliased [`COUNT_ALIAS`].
    ///
    /// `expr` defaults to [`DEFAULT_COUNT_EXPR`]. The criteria's projection is
    /// ignored; sort, limit and offset still apply.
    pub fn count(
        &self,
        table: &str,
        criteria: &Criteria,
        expr: Option<&str>,
    ) -> Result<CompiledStatement> {
        let projection = Projection::Expression(format!(
            "{} AS {}",
            expr.unwrap_or(DEFAULT_COUNT_EXPR),
            normalize_ident(COUNT_ALIAS, self.case_sensitive)?
        ));
        self.select_with(table, criteria, &projection)
    }

    fn select_with(
        &self,
        table: &str,
        criteria: &Criteria,
        projection: &Projection,
    ) -> Result<CompiledStatement> {
        let case = self.case_sensitive;
        let scope = qualifiers(table, criteria);
        let mut values = Vec::new();
        let sql = assemble([
            select_clause(projection, &scope, case)?,
            from_clause(&self.tablespace, table, case)?,
            join_clause(&self.tablespace, &criteria.join, &scope, case)?,
            where_clause(&criteria.filter, &scope, case, &mut values)?,
            limit_clause(criteria.limit),
            offset_clause(criteria.offset),
            sort_clause(&criteria.sort, &scope, case)?,
        ]);
        Ok(CompiledStatement { sql, values })
    }

    /// `UPDATE <table> SET <col> = ?, ... [WHERE ...];`
    ///
    /// SET values come first in the parameter list, then WHERE operands.
    pub fn update(&self, table: &str, criteria: &Criteria, row: &Row) -> Result<CompiledStatement> {
        if row.is_empty() {
            return Err(BridgeError::Compile(format!(
                "update of {:?} sets no columns",
                table
            )));
        }
        let mut values: Vec<SqlValue> = row.iter().map(|(_, v)| v.clone()).collect();
        let sql = assemble([
            format!("UPDATE {}", self.table(table)?),
            set_clause(row.column_names(), self.case_sensitive)?,
            where_clause(&criteria.filter, &[table], self.case_sensitive, &mut values)?,
        ]);
        Ok(CompiledStatement { sql, values })
    }

    /// `DELETE FROM <table> [WHERE ...];`
    pub fn delete(&self, table: &str, criteria: &Criteria) -> Result<CompiledStatement> {
        let mut values = Vec::new();
        let sql = assemble([
            "DELETE".to_string(),
            from_clause(&self.tablespace, table, self.case_sensitive)?,
            where_clause(&criteria.filter, &[table], self.case_sensitive, &mut values)?,
        ]);
        Ok(CompiledStatement { sql, values })
    }

    /// `SET IDENTITY_INSERT <table> ON|OFF;`
    pub fn identity_insert(&self, table: &str, enabled: bool) -> Result<String> {
        Ok(assemble([
            "SET IDENTITY_INSERT".to_string(),
            self.table(table)?,
            if enabled { "ON" } else { "OFF" }.to_string(),
        ]))
    }
}

/// Names that may qualify a column: the table itself, each joined table and
/// each join alias.
fn qualifiers<'a>(table: &'a str, criteria: &'a Criteria) -> Vec<&'a str> {
    let mut names = vec![table];
    for join in &criteria.join {
        names.push(join.table.as_str());
        if let Some(alias) = join.alias.as_deref() {
            names.push(alias);
        }
    }
    names
}
