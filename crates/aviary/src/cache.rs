//! Lazy, single-flight cache of prepared query plans.
//!
//! Each key owns a [`OnceCell`]; the map lock is held only long enough to
//! find or insert that cell, so preparation of one origin never blocks
//! lookups for another. Concurrent first callers for the same key wait on
//! the same cell and exactly one of them runs the preparer. A failed
//! preparation leaves the cell empty and the next caller tries again.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::core::{ClusterSession, Origin, QueryPlan, SchemaProvider, Statement, StatementKind};
use crate::error::Result;

/// Compiles the plan for one cache key.
#[async_trait]
pub trait Preparer<K, P>: Send + Sync {
    async fn prepare(&self, key: &K) -> Result<P>;
}

/// Get-or-create cache; entries are never evicted.
pub struct StatementCache<K, P = QueryPlan> {
    purpose: &'static str,
    preparer: Arc<dyn Preparer<K, P>>,
    entries: Mutex<HashMap<K, Arc<OnceCell<P>>>>,
}

impl<K, P> StatementCache<K, P>
where
    K: Eq + Hash + Clone + Display + Send + Sync,
    P: Clone + Send + Sync,
{
    pub fn new(purpose: &'static str, preparer: Arc<dyn Preparer<K, P>>) -> Self {
        Self {
            purpose,
            preparer,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the plan for `key`, preparing it on first use.
    pub async fn get_or_create(&self, key: &K) -> Result<P> {
        let cell = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.entry(key.clone()).or_default().clone()
        };

        let plan = cell
            .get_or_try_init(|| async {
                debug!("Preparing {} statement for {}", self.purpose, key);
                self.preparer.prepare(key).await
            })
            .await?;
        Ok(plan.clone())
    }

    /// Number of prepared plans held.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn purpose(&self) -> &'static str {
        self.purpose
    }
}

/// Prepares one statement shape per origin from live key metadata.
pub struct OriginPreparer {
    kind: StatementKind,
    schema: Arc<dyn SchemaProvider>,
    session: Arc<dyn ClusterSession>,
}

impl OriginPreparer {
    pub fn new(
        kind: StatementKind,
        schema: Arc<dyn SchemaProvider>,
        session: Arc<dyn ClusterSession>,
    ) -> Self {
        Self {
            kind,
            schema,
            session,
        }
    }
}

#[async_trait]
impl Preparer<Origin, QueryPlan> for OriginPreparer {
    async fn prepare(&self, origin: &Origin) -> Result<QueryPlan> {
        let keys = self.schema.table_keys(origin).await?;
        let statement = match self.kind {
            StatementKind::RangeScan => Statement::range_scan(origin.clone(), keys),
            StatementKind::PointLookup => Statement::point_lookup(origin.clone(), keys),
        };
        self.session.prepare(statement).await
    }
}

/// Cache of plans of one statement shape, keyed by origin.
pub fn origin_cache(
    kind: StatementKind,
    schema: Arc<dyn SchemaProvider>,
    session: Arc<dyn ClusterSession>,
) -> StatementCache<Origin> {
    let purpose = match kind {
        StatementKind::RangeScan => "range scan",
        StatementKind::PointLookup => "point lookup",
    };
    StatementCache::new(purpose, Arc::new(OriginPreparer::new(kind, schema, session)))
}
