//! Statements, compiled plans and result rows.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::identifier::{qualify_cql, quote_cql};
use super::origin::Origin;
use super::schema::TableKeys;
use super::value::KeyValue;
use crate::error::Result;

/// Shape of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// Key columns of rows whose partition token is in `(?, ?]`, `LIMIT ?`.
    RangeScan,
    /// Key columns of the row whose primary key equals the bound values.
    PointLookup,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementKind::RangeScan => f.write_str("range scan"),
            StatementKind::PointLookup => f.write_str("point lookup"),
        }
    }
}

/// A parameterized query against one origin, before preparation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    kind: StatementKind,
    origin: Origin,
    keys: TableKeys,
}

impl Statement {
    pub fn range_scan(origin: Origin, keys: TableKeys) -> Self {
        Self {
            kind: StatementKind::RangeScan,
            origin,
            keys,
        }
    }

    pub fn point_lookup(origin: Origin, keys: TableKeys) -> Self {
        Self {
            kind: StatementKind::PointLookup,
            origin,
            keys,
        }
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn keys(&self) -> &TableKeys {
        &self.keys
    }

    /// Render the CQL text with `?` bind markers.
    pub fn to_cql(&self) -> Result<String> {
        let columns = self
            .keys
            .primary_key()
            .iter()
            .map(|c| quote_cql(&c.name))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let table = qualify_cql(self.origin.keyspace(), self.origin.table())?;

        let predicate = match self.kind {
            StatementKind::RangeScan => {
                let partition = self
                    .keys
                    .partition_key()
                    .map(|c| quote_cql(&c.name))
                    .collect::<Result<Vec<_>>>()?
                    .join(", ");
                format!(
                    "token({p}) > ? AND token({p}) <= ? LIMIT ?",
                    p = partition
                )
            }
            StatementKind::PointLookup => self
                .keys
                .primary_key()
                .iter()
                .map(|c| Ok(format!("{} = ?", quote_cql(&c.name)?)))
                .collect::<Result<Vec<_>>>()?
                .join(" AND "),
        };

        Ok(format!("SELECT {} FROM {} WHERE {}", columns, table, predicate))
    }

    /// CQL types of the bind markers, in order.
    pub fn bind_types(&self) -> Vec<&str> {
        match self.kind {
            StatementKind::RangeScan => vec!["bigint", "bigint", "int"],
            StatementKind::PointLookup => self
                .keys
                .primary_key()
                .iter()
                .map(|c| c.cql_type.as_str())
                .collect(),
        }
    }
}

/// A prepared statement: the statement plus the driver's compiled handle.
///
/// Cloning is cheap; clones share the handle.
#[derive(Clone)]
pub struct QueryPlan {
    statement: Arc<Statement>,
    handle: Arc<dyn Any + Send + Sync>,
}

impl QueryPlan {
    pub fn new<H: Any + Send + Sync>(statement: Statement, handle: H) -> Self {
        Self {
            statement: Arc::new(statement),
            handle: Arc::new(handle),
        }
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    /// The driver handle, if it is of type `H`.
    pub fn handle<H: Any>(&self) -> Option<&H> {
        self.handle.downcast_ref::<H>()
    }

    /// Whether two plans share one compiled handle.
    pub fn same_handle(&self, other: &QueryPlan) -> bool {
        Arc::ptr_eq(&self.handle, &other.handle)
    }
}

impl fmt::Debug for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryPlan")
            .field("kind", &self.statement.kind)
            .field("origin", &self.statement.origin)
            .finish_non_exhaustive()
    }
}

/// One result row: column name and value pairs in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, KeyValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<KeyValue>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<KeyValue>) {
        self.columns.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&KeyValue> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &KeyValue)> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl IntoIterator for Row {
    type Item = (String, KeyValue);
    type IntoIter = std::vec::IntoIter<(String, KeyValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

impl FromIterator<(String, KeyValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, KeyValue)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::KeyColumn;

    fn keys(origin: &Origin) -> TableKeys {
        TableKeys::new(
            origin,
            vec![
                KeyColumn::partition("tenant", "text"),
                KeyColumn::partition("bucket", "int"),
                KeyColumn::clustering("seq", "bigint"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_range_scan_cql() {
        let origin = Origin::new("metrics", "Events");
        let stmt = Statement::range_scan(origin.clone(), keys(&origin));
        assert_eq!(
            stmt.to_cql().unwrap(),
            "SELECT \"tenant\", \"bucket\", \"seq\" FROM \"metrics\".\"Events\" \
             WHERE token(\"tenant\", \"bucket\") > ? AND token(\"tenant\", \"bucket\") <= ? LIMIT ?"
        );
        assert_eq!(stmt.bind_types(), ["bigint", "bigint", "int"]);
    }

    #[test]
    fn test_point_lookup_cql() {
        let origin = Origin::new("metrics", "events");
        let stmt = Statement::point_lookup(origin.clone(), keys(&origin));
        assert_eq!(
            stmt.to_cql().unwrap(),
            "SELECT \"tenant\", \"bucket\", \"seq\" FROM \"metrics\".\"events\" \
             WHERE \"tenant\" = ? AND \"bucket\" = ? AND \"seq\" = ?"
        );
        assert_eq!(stmt.bind_types(), ["text", "int", "bigint"]);
    }

    #[test]
    fn test_plan_handle_downcast() {
        let origin = Origin::new("ks", "t");
        let plan = QueryPlan::new(Statement::point_lookup(origin.clone(), keys(&origin)), 17u32);
        assert_eq!(plan.handle::<u32>(), Some(&17));
        assert!(plan.handle::<String>().is_none());
        assert!(plan.same_handle(&plan.clone()));
    }

    #[test]
    fn test_row_lookup() {
        let row = Row::new().with("a", 1i64).with("b", "x");
        assert_eq!(row.get("b"), Some(&KeyValue::from("x")));
        assert_eq!(row.len(), 2);
        assert!(row.get("c").is_none());
    }
}
