//! Canary records and the per-row builder that produces them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::origin::Origin;
use super::schema::TableKeys;
use super::statement::Row;
use super::value::KeyValue;
use crate::error::{AviaryError, Result};

/// The full primary key of one sampled row, tagged with its table.
///
/// A canary exists only if its identifier holds exactly the declared
/// primary-key fields of its origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Canary {
    origin: Origin,
    identifier: BTreeMap<String, KeyValue>,
}

impl Canary {
    /// Start a builder scoped to one row of `origin`.
    pub fn builder<'k>(origin: &Origin, keys: &'k TableKeys) -> CanaryBuilder<'k> {
        CanaryBuilder {
            origin: origin.clone(),
            keys,
            values: BTreeMap::new(),
        }
    }

    /// Convert a result row, keeping only primary-key columns.
    pub fn from_row(origin: &Origin, keys: &TableKeys, row: Row) -> Result<Canary> {
        row.into_iter()
            .fold(Canary::builder(origin, keys), |b, (name, value)| {
                b.field(name, value)
            })
            .build()
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn identifier(&self) -> &BTreeMap<String, KeyValue> {
        &self.identifier
    }

    pub fn get(&self, field: &str) -> Option<&KeyValue> {
        self.identifier.get(field)
    }

    /// Identifier values in the binding order of `keys`.
    pub fn key_values(&self, keys: &TableKeys) -> Result<Vec<KeyValue>> {
        let mut values = Vec::with_capacity(keys.len());
        let mut missing = Vec::new();
        for col in keys.primary_key() {
            match self.identifier.get(&col.name) {
                Some(v) => values.push(v.clone()),
                None => missing.push(col.name.clone()),
            }
        }
        if missing.is_empty() {
            Ok(values)
        } else {
            Err(AviaryError::incomplete(&self.origin, missing))
        }
    }
}

impl fmt::Display for Canary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.origin)?;
        for (i, (name, value)) in self.identifier.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        f.write_str("]")
    }
}

/// Accumulates primary-key fields for a single row.
///
/// Fields not in the declared primary key are ignored. Later values for the
/// same field replace earlier ones.
#[derive(Debug)]
pub struct CanaryBuilder<'k> {
    origin: Origin,
    keys: &'k TableKeys,
    values: BTreeMap<String, KeyValue>,
}

impl CanaryBuilder<'_> {
    pub fn field(mut self, name: impl Into<String>, value: impl Into<KeyValue>) -> Self {
        let name = name.into();
        if self.keys.contains(&name) {
            self.values.insert(name, value.into());
        }
        self
    }

    pub fn build(self) -> Result<Canary> {
        if self.values.len() != self.keys.len() {
            let missing = self
                .keys
                .primary_key()
                .iter()
                .filter(|c| !self.values.contains_key(&c.name))
                .map(|c| c.name.clone())
                .collect();
            return Err(AviaryError::incomplete(&self.origin, missing));
        }
        Ok(Canary {
            origin: self.origin,
            identifier: self.values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::KeyColumn;

    fn orders() -> (Origin, TableKeys) {
        let origin = Origin::new("shop", "orders");
        let keys = TableKeys::new(
            &origin,
            vec![
                KeyColumn::partition("customer", "text"),
                KeyColumn::clustering("id", "bigint"),
            ],
        )
        .unwrap();
        (origin, keys)
    }

    #[test]
    fn test_builder_ignores_non_key_fields() {
        let (origin, keys) = orders();
        let canary = Canary::builder(&origin, &keys)
            .field("customer", "ada")
            .field("total", 12.5)
            .field("id", 7i64)
            .build()
            .unwrap();

        assert_eq!(canary.identifier().len(), 2);
        assert!(canary.get("total").is_none());
        assert_eq!(canary.get("id"), Some(&KeyValue::Int(7)));
    }

    #[test]
    fn test_builder_rejects_missing_key_field() {
        let (origin, keys) = orders();
        let err = Canary::builder(&origin, &keys)
            .field("customer", "ada")
            .field("note", "x")
            .build()
            .unwrap_err();

        match err {
            AviaryError::IncompletePrimaryKey { origin, missing } => {
                assert_eq!(origin, "shop.orders");
                assert_eq!(missing, vec!["id".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_from_row() {
        let (origin, keys) = orders();
        let row = Row::new()
            .with("id", 3i64)
            .with("customer", "bob")
            .with("status", "shipped");
        let canary = Canary::from_row(&origin, &keys, row).unwrap();
        assert_eq!(canary.to_string(), "shop.orders[customer='bob', id=3]");
    }

    #[test]
    fn test_key_values_follow_binding_order() {
        let (origin, keys) = orders();
        let canary = Canary::builder(&origin, &keys)
            .field("id", 1i64)
            .field("customer", "c")
            .build()
            .unwrap();
        assert_eq!(
            canary.key_values(&keys).unwrap(),
            vec![KeyValue::from("c"), KeyValue::Int(1)]
        );
    }

    #[test]
    fn test_wire_format() {
        let (origin, keys) = orders();
        let canary = Canary::builder(&origin, &keys)
            .field("customer", "ada")
            .field("id", 1i64)
            .build()
            .unwrap();
        let json = serde_json::to_string(&canary).unwrap();
        assert_eq!(
            json,
            r#"{"origin":{"keyspace":"shop","table":"orders"},"identifier":{"customer":"ada","id":1}}"#
        );
    }
}
