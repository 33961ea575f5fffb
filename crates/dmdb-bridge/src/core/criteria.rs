//! Query criteria: projection, filters, joins, sort and pagination.
//!
//! A [`Criteria`] is a flat description of a query. Filters are AND-combined;
//! there is no nesting or OR.

use super::value::SqlValue;

/// Output projection of a SELECT.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Projection {
    /// `*`
    #[default]
    All,
    /// Column references, each normalized as an identifier.
    Columns(Vec<String>),
    /// Raw SQL expression, emitted verbatim. Never build this from user input.
    Expression(String),
}

impl Projection {
    /// Projection of the given column references.
    pub fn columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection::Columns(columns.into_iter().map(Into::into).collect())
    }
}

/// Comparison applied to a single column.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(SqlValue),
    Ne(SqlValue),
    Gt(SqlValue),
    Gte(SqlValue),
    Lt(SqlValue),
    Lte(SqlValue),
    Like(SqlValue),
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

impl JoinKind {
    pub fn keyword(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL JOIN",
        }
    }
}

/// A join against another table in the same tablespace.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    pub kind: JoinKind,
    pub table: String,
    pub alias: Option<String>,
    /// Column pairs compared with `=` and AND-combined.
    pub on: Vec<(String, String)>,
}

impl JoinSpec {
    pub fn new(kind: JoinKind, table: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            alias: None,
            on: Vec::new(),
        }
    }

    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Add an `left = right` condition.
    #[must_use]
    pub fn on(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.on.push((left.into(), right.into()));
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn keyword(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Flat request descriptor for find, count, update and delete.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    pub select: Projection,
    pub filter: Vec<(String, Filter)>,
    pub join: Vec<JoinSpec>,
    pub sort: Vec<(String, SortDirection)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn select(mut self, projection: Projection) -> Self {
        self.select = projection;
        self
    }

    /// Add an equality filter.
    #[must_use]
    pub fn filter(self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.filter_with(column, Filter::Eq(value.into()))
    }

    /// Add a filter with an explicit comparison.
    #[must_use]
    pub fn filter_with(mut self, column: impl Into<String>, filter: Filter) -> Self {
        self.filter.push((column.into(), filter));
        self
    }

    #[must_use]
    pub fn join(mut self, join: JoinSpec) -> Self {
        self.join.push(join);
        self
    }

    #[must_use]
    pub fn sort(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push((column.into(), direction));
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}
