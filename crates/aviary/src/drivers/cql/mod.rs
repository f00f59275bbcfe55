//! CQL cluster driver for Apache Cassandra and ScyllaDB.
//!
//! # Feature Flag
//!
//! Only available with the `scylla` feature:
//!
//! ```toml
//! [dependencies]
//! aviary = { version = "0.3", features = ["scylla"] }
//! ```
//!
//! Schema is read from `system_schema.tables` and `system_schema.columns`;
//! the ring from the `tokens` columns of `system.local` and `system.peers`.
//! Only the Murmur3 partitioner is supported.

mod convert;

use async_trait::async_trait;
use scylla::frame::response::result::{CqlValue, Row as CqlRow};
use scylla::prepared_statement::PreparedStatement;
use scylla::transport::load_balancing::DefaultPolicy;
use scylla::transport::ExecutionProfile;
use scylla::{Session, SessionBuilder};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ClusterConfig;
use crate::core::{
    ClusterSession, KeyColumn, KeyValue, Origin, QueryPlan, Row, SchemaProvider, Statement,
    TableKeys, Token, TokenRing,
};
use crate::error::{AviaryError, Result};

const MURMUR3_PARTITIONER: &str = "org.apache.cassandra.dht.Murmur3Partitioner";

/// A connected CQL session.
pub struct CqlCluster {
    session: Session,
}

impl CqlCluster {
    /// Connect using contact points, credentials and datacenter preference.
    pub async fn connect(config: &ClusterConfig) -> Result<Self> {
        let nodes = config.known_nodes();
        info!("Connecting to {}", nodes.join(", "));

        let mut builder = SessionBuilder::new()
            .known_nodes(&nodes)
            .connection_timeout(Duration::from_secs(config.connect_timeout_secs));
        if let Some(user) = &config.username {
            builder = builder.user(user.as_str(), config.password.as_deref().unwrap_or_default());
        }
        if let Some(dc) = &config.local_dc {
            let policy = DefaultPolicy::builder()
                .prefer_datacenter(dc.clone())
                .token_aware(true)
                .build();
            let profile = ExecutionProfile::builder()
                .load_balancing_policy(policy)
                .build();
            builder = builder.default_execution_profile_handle(profile.into_handle());
        }

        let session = builder
            .build()
            .await
            .map_err(|e| AviaryError::Connection(e.to_string()))?;
        Ok(Self { session })
    }

    async fn system_rows(&self, cql: &str, values: Vec<CqlValue>) -> Result<Vec<CqlRow>> {
        let result = self
            .session
            .query_unpaged(cql, values)
            .await
            .map_err(|e| AviaryError::Schema(format!("{}: {}", cql, e)))?;
        Ok(result.rows.unwrap_or_default())
    }

    async fn check_partitioner(&self) -> Result<()> {
        let rows = self
            .system_rows("SELECT partitioner FROM system.local", Vec::new())
            .await?;
        let partitioner = rows
            .into_iter()
            .next()
            .map(|r| text_column(&r, 0))
            .transpose()?
            .unwrap_or_default();
        if partitioner != MURMUR3_PARTITIONER {
            return Err(AviaryError::Schema(format!(
                "unsupported partitioner {:?}; only Murmur3Partitioner is supported",
                partitioner
            )));
        }
        Ok(())
    }
}

fn column(row: &CqlRow, index: usize) -> Option<&CqlValue> {
    row.columns.get(index).and_then(Option::as_ref)
}

fn text_column(row: &CqlRow, index: usize) -> Result<String> {
    match column(row, index) {
        Some(CqlValue::Text(s)) | Some(CqlValue::Ascii(s)) => Ok(s.clone()),
        other => Err(AviaryError::Schema(format!(
            "expected text in column {}, got {:?}",
            index, other
        ))),
    }
}

fn tokens_column(row: &CqlRow, index: usize) -> Result<Vec<Token>> {
    let Some(CqlValue::Set(items)) = column(row, index) else {
        return Ok(Vec::new());
    };
    items
        .iter()
        .map(|item| match item {
            CqlValue::Text(s) | CqlValue::Ascii(s) => s
                .parse::<Token>()
                .map_err(|_| AviaryError::Schema(format!("token {:?} is not a Murmur3 token", s))),
            other => Err(AviaryError::Schema(format!("unexpected token value {:?}", other))),
        })
        .collect()
}

#[async_trait]
impl SchemaProvider for CqlCluster {
    async fn list_origins(&self) -> Result<Vec<Origin>> {
        let rows = self
            .system_rows(
                "SELECT keyspace_name, table_name FROM system_schema.tables",
                Vec::new(),
            )
            .await?;
        rows.iter()
            .map(|r| Ok(Origin::new(text_column(r, 0)?, text_column(r, 1)?)))
            .collect()
    }

    async fn table_keys(&self, origin: &Origin) -> Result<TableKeys> {
        let rows = self
            .system_rows(
                "SELECT column_name, kind, position, type FROM system_schema.columns \
                 WHERE keyspace_name = ? AND table_name = ?",
                vec![
                    CqlValue::Text(origin.keyspace().to_string()),
                    CqlValue::Text(origin.table().to_string()),
                ],
            )
            .await?;

        let mut columns = Vec::new();
        for row in &rows {
            let name = text_column(row, 0)?;
            let kind = text_column(row, 1)?;
            let position = match column(row, 2) {
                Some(CqlValue::Int(p)) => *p,
                _ => -1,
            };
            let cql_type = text_column(row, 3)?;
            let key = match kind.as_str() {
                "partition_key" => KeyColumn::partition(name, cql_type),
                "clustering" => KeyColumn::clustering(name, cql_type),
                _ => continue,
            };
            columns.push((position, key));
        }
        if rows.is_empty() {
            return Err(AviaryError::Schema(format!("table {} does not exist", origin)));
        }

        columns.sort_by_key(|(position, _)| *position);
        TableKeys::new(origin, columns.into_iter().map(|(_, c)| c).collect())
    }

    async fn token_ring(&self) -> Result<TokenRing> {
        self.check_partitioner().await?;
        let mut tokens = Vec::new();
        for cql in [
            "SELECT tokens FROM system.local",
            "SELECT tokens FROM system.peers",
        ] {
            for row in self.system_rows(cql, Vec::new()).await? {
                tokens.extend(tokens_column(&row, 0)?);
            }
        }
        debug!("Ring has {} tokens", tokens.len());
        Ok(TokenRing::new(tokens))
    }
}

#[async_trait]
impl ClusterSession for CqlCluster {
    fn cluster_type(&self) -> &str {
        "cql"
    }

    async fn prepare(&self, statement: Statement) -> Result<QueryPlan> {
        let cql = statement
            .to_cql()
            .map_err(|e| AviaryError::preparation(statement.origin(), e))?;
        let prepared: PreparedStatement = self
            .session
            .prepare(cql.as_str())
            .await
            .map_err(|e| AviaryError::preparation(statement.origin(), e))?;
        debug!("Prepared {}", cql);
        Ok(QueryPlan::new(statement, prepared))
    }

    async fn execute(&self, plan: &QueryPlan, values: &[KeyValue]) -> Result<Vec<Row>> {
        let statement = plan.statement();
        let prepared = plan.handle::<PreparedStatement>().ok_or_else(|| {
            AviaryError::query(statement.origin(), "plan was not prepared by this driver")
        })?;

        let bind_types = statement.bind_types();
        if bind_types.len() != values.len() {
            return Err(AviaryError::conversion(
                statement.origin(),
                format!("expected {} bound values, got {}", bind_types.len(), values.len()),
            ));
        }
        let bound = values
            .iter()
            .zip(bind_types)
            .map(|(value, cql_type)| convert::to_cql(value, cql_type))
            .collect::<Result<Vec<_>>>()?;

        let result = self
            .session
            .execute_unpaged(prepared, bound)
            .await
            .map_err(|e| AviaryError::query(statement.origin(), e))?;

        // Unreadable values are left out, so the row reads as an incomplete key.
        let names = statement.keys().primary_key();
        let rows = result
            .rows
            .unwrap_or_default()
            .into_iter()
            .map(|row| {
                let mut out = Row::new();
                for (col, value) in names.iter().zip(row.columns) {
                    match value.map(convert::from_cql) {
                        Some(Ok(value)) => out.push(col.name.clone(), value),
                        Some(Err(e)) => warn!("Dropping {}.{}: {}", statement.origin(), col.name, e),
                        None => {}
                    }
                }
                out
            })
            .collect();
        Ok(rows)
    }
}
