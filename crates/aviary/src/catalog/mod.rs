//! Discovery of the tables to sample or verify.

mod filter;

pub use filter::{OriginFilter, OriginPredicate};

use std::sync::Arc;
use tracing::{debug, info};

use crate::core::{Origin, SchemaProvider};
use crate::error::Result;

/// Keyspaces owned by the cluster itself.
pub const SYSTEM_KEYSPACES: &[&str] = &[
    "system",
    "system_schema",
    "system_auth",
    "system_distributed",
    "system_traces",
    "system_views",
    "system_virtual_schema",
];

/// Whether a keyspace is internal to the cluster and never audited.
pub fn is_system_keyspace(keyspace: &str) -> bool {
    SYSTEM_KEYSPACES.contains(&keyspace) || keyspace.starts_with("system_")
}

/// One discovery round trip over the cluster schema.
pub struct OriginCatalog {
    schema: Arc<dyn SchemaProvider>,
    predicate: OriginPredicate,
}

impl OriginCatalog {
    pub fn new(schema: Arc<dyn SchemaProvider>, predicate: OriginPredicate) -> Self {
        Self { schema, predicate }
    }

    /// Enumerate accepted user tables. Consumes the catalog.
    pub async fn discover(self) -> Result<Origins> {
        let mut all = self.schema.list_origins().await?;
        all.sort();
        all.dedup();

        let listed = all.len();
        let mut system = 0;
        let mut rejected = 0;
        let mut accepted = Vec::with_capacity(listed);
        for origin in all {
            if is_system_keyspace(origin.keyspace()) {
                system += 1;
            } else if !self.predicate.accepts(&origin) {
                debug!("Filtered out {}", origin);
                rejected += 1;
            } else {
                accepted.push(origin);
            }
        }

        info!(
            "Discovered {} tables ({} accepted, {} system, {} filtered)",
            listed,
            accepted.len(),
            system,
            rejected
        );

        Ok(Origins {
            inner: accepted.into_iter(),
            rejected,
        })
    }
}

/// Finite sequence of accepted origins.
#[derive(Debug)]
pub struct Origins {
    inner: std::vec::IntoIter<Origin>,
    rejected: usize,
}

impl Origins {
    /// User tables dropped by the predicate.
    pub fn rejected(&self) -> usize {
        self.rejected
    }
}

impl Iterator for Origins {
    type Item = Origin;

    fn next(&mut self) -> Option<Origin> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Origins {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{KeyColumn, TableKeys};
    use crate::drivers::MemoryCluster;

    fn cluster() -> Arc<MemoryCluster> {
        let cluster = MemoryCluster::new();
        for (ks, t) in [
            ("system", "local"),
            ("system_schema", "tables"),
            ("system_custom", "x"),
            ("shop", "orders"),
            ("shop", "carts"),
            ("billing", "invoices"),
        ] {
            let origin = Origin::new(ks, t);
            let keys = TableKeys::new(&origin, vec![KeyColumn::partition("id", "int")]).unwrap();
            cluster.create_table(origin, keys);
        }
        Arc::new(cluster)
    }

    #[test]
    fn test_system_keyspaces() {
        assert!(is_system_keyspace("system"));
        assert!(is_system_keyspace("system_auth"));
        assert!(is_system_keyspace("system_anything"));
        assert!(!is_system_keyspace("systems"));
        assert!(!is_system_keyspace("shop"));
    }

    #[tokio::test]
    async fn test_discover_excludes_system_keyspaces() {
        let origins: Vec<_> = OriginCatalog::new(cluster(), OriginPredicate::accept_all())
            .discover()
            .await
            .unwrap()
            .collect();
        assert_eq!(
            origins,
            vec![
                Origin::new("billing", "invoices"),
                Origin::new("shop", "carts"),
                Origin::new("shop", "orders"),
            ]
        );
    }

    #[tokio::test]
    async fn test_discover_applies_predicate() {
        let predicate = OriginPredicate::parse(["shop"]).unwrap();
        let origins = OriginCatalog::new(cluster(), predicate).discover().await.unwrap();
        assert_eq!(origins.rejected(), 1);
        assert_eq!(origins.len(), 2);
    }
}
