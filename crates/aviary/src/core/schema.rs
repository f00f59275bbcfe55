//! Schema-derived key metadata.

use serde::{Deserialize, Serialize};

use super::origin::Origin;
use crate::error::{AviaryError, Result};

/// Role of a key column within the primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    Partition,
    Clustering,
}

/// A primary-key column and its declared CQL type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyColumn {
    pub name: String,
    pub cql_type: String,
    pub kind: KeyKind,
}

impl KeyColumn {
    pub fn partition(name: impl Into<String>, cql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cql_type: cql_type.into(),
            kind: KeyKind::Partition,
        }
    }

    pub fn clustering(name: impl Into<String>, cql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cql_type: cql_type.into(),
            kind: KeyKind::Clustering,
        }
    }

    pub fn is_partition(&self) -> bool {
        self.kind == KeyKind::Partition
    }
}

/// Ordered primary key of one table: partition columns first, then
/// clustering columns, each group in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableKeys {
    columns: Vec<KeyColumn>,
}

impl TableKeys {
    /// Build key metadata, reordering so partition columns lead.
    ///
    /// Fails with a schema error when no partition column is present or a
    /// column name repeats.
    pub fn new(origin: &Origin, columns: Vec<KeyColumn>) -> Result<Self> {
        let (mut ordered, clustering): (Vec<_>, Vec<_>) =
            columns.into_iter().partition(KeyColumn::is_partition);
        if ordered.is_empty() {
            return Err(AviaryError::Schema(format!(
                "{} has no partition key columns",
                origin
            )));
        }
        ordered.extend(clustering);

        for (i, col) in ordered.iter().enumerate() {
            if ordered[..i].iter().any(|c| c.name == col.name) {
                return Err(AviaryError::Schema(format!(
                    "{} declares key column {:?} twice",
                    origin, col.name
                )));
            }
        }

        Ok(Self { columns: ordered })
    }

    /// All primary-key columns in binding order.
    pub fn primary_key(&self) -> &[KeyColumn] {
        &self.columns
    }

    pub fn partition_key(&self) -> impl Iterator<Item = &KeyColumn> {
        self.columns.iter().filter(|c| c.is_partition())
    }

    pub fn column(&self, name: &str) -> Option<&KeyColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
