//! Independent clause builders.
//!
//! Each builder returns the clause text, or an empty string when the clause
//! has no content. [`assemble`] drops empty segments, joins the rest with
//! single spaces and terminates the statement.

use crate::core::criteria::{Filter, JoinSpec, Projection, SortDirection};
use crate::core::identifier::{column_ref, normalize_ident, table_name};
use crate::core::value::SqlValue;
use crate::error::{BridgeError, Result};

/// Bind placeholder understood by the DM ODBC driver.
pub const PLACEHOLDER: &str = "?";

pub fn select_clause(
    projection: &Projection,
    scope: &[&str],
    case_sensitive: bool,
) -> Result<String> {
    let list = match projection {
        Projection::All => "*".to_string(),
        Projection::Columns(columns) if columns.is_empty() => "*".to_string(),
        Projection::Columns(columns) => columns
            .iter()
            .map(|c| column_ref(c, scope, case_sensitive))
            .collect::<Result<Vec<_>>>()?
            .join(", "),
        Projection::Expression(expr) => expr.clone(),
    };
    Ok(format!("SELECT {}", list))
}

pub fn from_clause(tablespace: &str, table: &str, case_sensitive: bool) -> Result<String> {
    Ok(format!("FROM {}", table_name(tablespace, table, case_sensitive)?))
}

pub fn join_clause(
    tablespace: &str,
    joins: &[JoinSpec],
    scope: &[&str],
    case_sensitive: bool,
) -> Result<String> {
    let mut parts = Vec::with_capacity(joins.len());
    for join in joins {
        if join.on.is_empty() {
            return Err(BridgeError::Compile(format!(
                "join on {:?} has no ON condition",
                join.table
            )));
        }
        let mut target = table_name(tablespace, &join.table, case_sensitive)?;
        if let Some(alias) = join.alias.as_deref().filter(|a| !a.is_empty()) {
            target.push(' ');
            target.push_str(&normalize_ident(alias, case_sensitive)?);
        }
        let conditions = join
            .on
            .iter()
            .map(|(left, right)| {
                Ok(format!(
                    "{} = {}",
                    column_ref(left, scope, case_sensitive)?,
                    column_ref(right, scope, case_sensitive)?
                ))
            })
            .collect::<Result<Vec<_>>>()?
            .join(" AND ");
        parts.push(format!("{} {} ON {}", join.kind.keyword(), target, conditions));
    }
    Ok(parts.join(" "))
}

/// Render a single filter predicate, pushing its operand onto `values`.
fn predicate(
    column: &str,
    filter: &Filter,
    scope: &[&str],
    case_sensitive: bool,
    values: &mut Vec<SqlValue>,
) -> Result<String> {
    let column = column_ref(column, scope, case_sensitive)?;
    let (op, operand) = match filter {
        Filter::IsNull | Filter::Eq(SqlValue::Null) => {
            return Ok(format!("{} IS NULL", column));
        }
        Filter::IsNotNull | Filter::Ne(SqlValue::Null) => {
            return Ok(format!("{} IS NOT NULL", column));
        }
        Filter::Eq(v) => ("=", v),
        Filter::Ne(v) => ("<>", v),
        Filter::Gt(v) => (">", v),
        Filter::Gte(v) => (">=", v),
        Filter::Lt(v) => ("<", v),
        Filter::Lte(v) => ("<=", v),
        Filter::Like(v) => ("LIKE", v),
    };
    values.push(operand.clone());
    Ok(format!("{} {} {}", column, op, PLACEHOLDER))
}

/// Build the WHERE clause; operands are appended to `values` in order.
pub fn where_clause(
    filter: &[(String, Filter)],
    scope: &[&str],
    case_sensitive: bool,
    values: &mut Vec<SqlValue>,
) -> Result<String> {
    if filter.is_empty() {
        return Ok(String::new());
    }
    let predicates = filter
        .iter()
        .map(|(column, f)| predicate(column, f, scope, case_sensitive, values))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("WHERE {}", predicates.join(" AND ")))
}

pub fn limit_clause(limit: Option<u64>) -> String {
    limit.map(|n| format!("LIMIT {}", n)).unwrap_or_default()
}

pub fn offset_clause(offset: Option<u64>) -> String {
    offset.map(|n| format!("OFFSET {}", n)).unwrap_or_default()
}

pub fn sort_clause(
    sort: &[(String, SortDirection)],
    scope: &[&str],
    case_sensitive: bool,
) -> Result<String> {
    if sort.is_empty() {
        return Ok(String::new());
    }
    let keys = sort
        .iter()
        .map(|(column, dir)| Ok(format!("{} {}", column_ref(column, scope, case_sensitive)?, dir.keyword())))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("ORDER BY {}", keys.join(", ")))
}

/// `A = ?, B = ?` for UPDATE.
pub fn set_clause<'a>(
    columns: impl Iterator<Item = &'a str>,
    case_sensitive: bool,
) -> Result<String> {
    let assignments = columns
        .map(|c| Ok(format!("{} = {}", normalize_ident(c, case_sensitive)?, PLACEHOLDER)))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("SET {}", assignments.join(", ")))
}

/// Join non-empty segments with single spaces and terminate with `;`.
pub fn assemble<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut sql = segments
        .into_iter()
        .filter(|s| !s.as_ref().is_empty())
        .fold(String::new(), |mut acc, s| {
            if !acc.is_empty() {
                acc.push(' ');
            }
            acc.push_str(s.as_ref());
            acc
        });
    sql.push(';');
    sql
}
