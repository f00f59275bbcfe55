//! In-memory cluster.
//!
//! Holds tables, rows and a token ring in process and answers the two
//! statement shapes the engine prepares. A row's token is derived from its
//! partition-key values, so sampling and verification behave as they would
//! against a real ring. Failures can be injected per table.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use tracing::debug;

use crate::core::{
    ClusterSession, KeyValue, Origin, QueryPlan, Row, SchemaProvider, Statement, StatementKind,
    TableKeys, Token, TokenRange, TokenRing,
};
use crate::error::{AviaryError, Result};

/// Token of a partition: first 8 bytes of SHA-256 over the JSON of its
/// partition-key values, big-endian.
pub fn partition_token(values: &[KeyValue]) -> Token {
    let encoded = serde_json::to_vec(values).unwrap_or_default();
    let digest = Sha256::digest(&encoded);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    Token::from_be_bytes(bytes).max(Token::MIN + 1)
}

struct MemoryTable {
    keys: TableKeys,
    rows: Vec<(Token, Row)>,
}

#[derive(Default)]
struct ClusterState {
    tables: BTreeMap<Origin, MemoryTable>,
    ring: Vec<Token>,
    failing_queries: HashSet<Origin>,
    failing_preparation: HashSet<Origin>,
}

#[derive(Default)]
pub struct MemoryCluster {
    state: RwLock<ClusterState>,
    scans: Mutex<Vec<(Origin, TokenRange)>>,
    prepares: AtomicU64,
    executions: AtomicU64,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ring(self, tokens: impl IntoIterator<Item = Token>) -> Self {
        self.set_ring(tokens);
        self
    }

    pub fn set_ring(&self, tokens: impl IntoIterator<Item = Token>) {
        self.write_state().ring = tokens.into_iter().collect();
    }

    pub fn create_table(&self, origin: Origin, keys: TableKeys) {
        self.write_state().tables.insert(
            origin,
            MemoryTable {
                keys,
                rows: Vec::new(),
            },
        );
    }

    pub fn drop_table(&self, origin: &Origin) -> bool {
        self.write_state().tables.remove(origin).is_some()
    }

    /// Store a row, returning its token.
    ///
    /// Every partition-key column must be present; clustering columns may be
    /// left out to model rows that cannot become canaries.
    pub fn insert(&self, origin: &Origin, row: Row) -> Result<Token> {
        let mut state = self.write_state();
        let table = state
            .tables
            .get_mut(origin)
            .ok_or_else(|| AviaryError::Schema(format!("table {} does not exist", origin)))?;

        let partition = table
            .keys
            .partition_key()
            .map(|col| {
                row.get(&col.name).cloned().ok_or_else(|| {
                    AviaryError::query(origin, format!("missing partition key column {}", col.name))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let token = partition_token(&partition);
        table.rows.push((token, row));
        Ok(token)
    }

    /// Remove rows whose columns match every column of `key`.
    pub fn delete(&self, origin: &Origin, key: &Row) -> usize {
        let mut state = self.write_state();
        let Some(table) = state.tables.get_mut(origin) else {
            return 0;
        };
        let before = table.rows.len();
        table
            .rows
            .retain(|(_, row)| !key.iter().all(|(name, value)| row.get(name) == Some(value)));
        before - table.rows.len()
    }

    pub fn row_count(&self, origin: &Origin) -> usize {
        self.read_state()
            .tables
            .get(origin)
            .map_or(0, |t| t.rows.len())
    }

    /// Make every execution against `origin` fail.
    pub fn fail_queries(&self, origin: &Origin) {
        self.write_state().failing_queries.insert(origin.clone());
    }

    /// Make preparation of any statement for `origin` fail.
    pub fn fail_preparation(&self, origin: &Origin) {
        self.write_state().failing_preparation.insert(origin.clone());
    }

    /// Clear injected failures for `origin`.
    pub fn heal(&self, origin: &Origin) {
        let mut state = self.write_state();
        state.failing_queries.remove(origin);
        state.failing_preparation.remove(origin);
    }

    pub fn prepare_count(&self) -> u64 {
        self.prepares.load(Ordering::Relaxed)
    }

    pub fn execute_count(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    /// Every range scan executed so far, in execution order.
    pub fn range_scans(&self) -> Vec<(Origin, TokenRange)> {
        self.scans.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, ClusterState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, ClusterState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn scan(&self, table: &MemoryTable, statement: &Statement, values: &[KeyValue]) -> Result<Vec<Row>> {
        let bound = |i: usize| {
            values[i]
                .as_i64()
                .ok_or_else(|| AviaryError::conversion(statement.origin(), format!("bind marker {} must be an integer", i)))
        };
        let (start, end, limit) = (bound(0)?, bound(1)?, bound(2)?);
        if start >= end || limit < 1 {
            return Err(AviaryError::query(
                statement.origin(),
                format!("invalid range scan ({}, {}] limit {}", start, end, limit),
            ));
        }
        let range = TokenRange::new(start, end);
        self.scans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((statement.origin().clone(), range));

        Ok(table
            .rows
            .iter()
            .filter(|(token, _)| range.contains(*token))
            .take(limit as usize)
            .map(|(_, row)| project(&table.keys, row))
            .collect())
    }

    fn lookup(&self, table: &MemoryTable, values: &[KeyValue]) -> Vec<Row> {
        table
            .rows
            .iter()
            .filter(|(_, row)| {
                table
                    .keys
                    .primary_key()
                    .iter()
                    .zip(values)
                    .all(|(col, value)| row.get(&col.name) == Some(value))
            })
            .map(|(_, row)| project(&table.keys, row))
            .collect()
    }
}

/// Key columns of `row` in primary-key order; absent columns are omitted.
fn project(keys: &TableKeys, row: &Row) -> Row {
    keys.primary_key()
        .iter()
        .filter_map(|col| row.get(&col.name).map(|v| (col.name.clone(), v.clone())))
        .collect()
}

#[async_trait]
impl SchemaProvider for MemoryCluster {
    async fn list_origins(&self) -> Result<Vec<Origin>> {
        Ok(self.read_state().tables.keys().cloned().collect())
    }

    async fn table_keys(&self, origin: &Origin) -> Result<TableKeys> {
        self.read_state()
            .tables
            .get(origin)
            .map(|t| t.keys.clone())
            .ok_or_else(|| AviaryError::Schema(format!("table {} does not exist", origin)))
    }

    async fn token_ring(&self) -> Result<TokenRing> {
        Ok(TokenRing::new(self.read_state().ring.iter().copied()))
    }
}

#[async_trait]
impl ClusterSession for MemoryCluster {
    fn cluster_type(&self) -> &str {
        "memory"
    }

    async fn prepare(&self, statement: Statement) -> Result<QueryPlan> {
        self.prepares.fetch_add(1, Ordering::Relaxed);
        tokio::task::yield_now().await;

        let origin = statement.origin().clone();
        let cql = statement
            .to_cql()
            .map_err(|e| AviaryError::preparation(&origin, e))?;
        {
            let state = self.read_state();
            if state.failing_preparation.contains(&origin) {
                return Err(AviaryError::preparation(&origin, "injected preparation failure"));
            }
            if !state.tables.contains_key(&origin) {
                return Err(AviaryError::preparation(&origin, format!("unconfigured table {}", origin)));
            }
        }
        debug!("Prepared {}", cql);
        Ok(QueryPlan::new(statement, cql))
    }

    async fn execute(&self, plan: &QueryPlan, values: &[KeyValue]) -> Result<Vec<Row>> {
        self.executions.fetch_add(1, Ordering::Relaxed);
        tokio::task::yield_now().await;

        let statement = plan.statement();
        let origin = statement.origin();
        let expected = statement.bind_types().len();
        if values.len() != expected {
            return Err(AviaryError::conversion(
                origin,
                format!("expected {} bound values, got {}", expected, values.len()),
            ));
        }

        let state = self.read_state();
        if state.failing_queries.contains(origin) {
            return Err(AviaryError::query(origin, "injected query failure"));
        }
        let table = state
            .tables
            .get(origin)
            .ok_or_else(|| AviaryError::query(origin, format!("unconfigured table {}", origin)))?;

        match statement.kind() {
            StatementKind::RangeScan => self.scan(table, statement, values),
            StatementKind::PointLookup => Ok(self.lookup(table, values)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::KeyColumn;

    fn users() -> (MemoryCluster, Origin, TableKeys) {
        let origin = Origin::new("app", "users");
        let keys = TableKeys::new(
            &origin,
            vec![KeyColumn::partition("id", "int"), KeyColumn::clustering("ver", "int")],
        )
        .unwrap();
        let cluster = MemoryCluster::new();
        cluster.create_table(origin.clone(), keys.clone());
        (cluster, origin, keys)
    }

    #[test]
    fn test_partition_token_is_stable() {
        let a = partition_token(&[KeyValue::Int(1)]);
        assert_eq!(a, partition_token(&[KeyValue::Int(1)]));
        assert_ne!(a, partition_token(&[KeyValue::Int(2)]));
    }

    #[tokio::test]
    async fn test_range_scan_respects_range_and_limit() {
        let (cluster, origin, keys) = users();
        let token = cluster
            .insert(&origin, Row::new().with("id", 1).with("ver", 1).with("name", "ada"))
            .unwrap();
        cluster
            .insert(&origin, Row::new().with("id", 1).with("ver", 2))
            .unwrap();

        let plan = cluster
            .prepare(Statement::range_scan(origin.clone(), keys))
            .await
            .unwrap();
        let hit = |start: Token, end: Token, limit: i64| {
            vec![KeyValue::Int(start), KeyValue::Int(end), KeyValue::Int(limit)]
        };

        let rows = cluster.execute(&plan, &hit(token - 1, token, 10)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].get("name").is_none());

        let rows = cluster.execute(&plan, &hit(token - 1, token, 1)).await.unwrap();
        assert_eq!(rows.len(), 1);

        if token < Token::MAX {
            let rows = cluster.execute(&plan, &hit(token, Token::MAX, 10)).await.unwrap();
            assert!(rows.is_empty());
        }
        assert!(cluster.range_scans().len() >= 2);
    }

    #[tokio::test]
    async fn test_point_lookup_and_delete() {
        let (cluster, origin, keys) = users();
        cluster
            .insert(&origin, Row::new().with("id", 7).with("ver", 1))
            .unwrap();
        let plan = cluster
            .prepare(Statement::point_lookup(origin.clone(), keys))
            .await
            .unwrap();
        let key = [KeyValue::Int(7), KeyValue::Int(1)];

        assert_eq!(cluster.execute(&plan, &key).await.unwrap().len(), 1);
        assert_eq!(cluster.delete(&origin, &Row::new().with("id", 7).with("ver", 1)), 1);
        assert!(cluster.execute(&plan, &key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let (cluster, origin, keys) = users();
        cluster.fail_preparation(&origin);
        let err = cluster
            .prepare(Statement::point_lookup(origin.clone(), keys.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, AviaryError::Preparation { .. }));

        cluster.heal(&origin);
        let plan = cluster
            .prepare(Statement::point_lookup(origin.clone(), keys))
            .await
            .unwrap();
        cluster.fail_queries(&origin);
        let err = cluster
            .execute(&plan, &[KeyValue::Int(1), KeyValue::Int(1)])
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(cluster.prepare_count(), 2);

        cluster.heal(&origin);
        let err = cluster.execute(&plan, &[KeyValue::Int(1)]).await.unwrap_err();
        assert!(matches!(err, AviaryError::Conversion { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_missing_table_is_schema_error() {
        let cluster = MemoryCluster::new();
        let err = cluster.table_keys(&Origin::new("ks", "nope")).await.unwrap_err();
        assert!(matches!(err, AviaryError::Schema(_)));
    }
}
