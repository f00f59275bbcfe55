//! Collaborator contracts for the sampling and verification engine.
//!
//! - [`SchemaProvider`]: table enumeration, key metadata and the token ring
//! - [`ClusterSession`]: statement preparation and execution
//! - [`CanarySink`]: where sampled canaries are persisted
//! - [`CanarySource`]: where persisted canaries are replayed from
//!
//! Drivers in [`crate::drivers`] implement the first two; the aviary file in
//! [`crate::store`] implements the last two.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

use super::canary::Canary;
use super::origin::Origin;
use super::schema::TableKeys;
use super::statement::{QueryPlan, Row, Statement};
use super::token::TokenRing;
use super::value::KeyValue;

/// Schema metadata of a live cluster.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// Every keyspace/table pair, system keyspaces included.
    async fn list_origins(&self) -> Result<Vec<Origin>>;

    /// Primary-key metadata of one table.
    async fn table_keys(&self, origin: &Origin) -> Result<TableKeys>;

    /// Node tokens of the cluster.
    async fn token_ring(&self) -> Result<TokenRing>;
}

/// A session able to compile and run statements.
#[async_trait]
pub trait ClusterSession: Send + Sync {
    /// Short driver name for logs and reports.
    fn cluster_type(&self) -> &str;

    /// Compile a statement. Failures are `AviaryError::Preparation`.
    async fn prepare(&self, statement: Statement) -> Result<QueryPlan>;

    /// Run a compiled plan with bound values, returning every result row.
    async fn execute(&self, plan: &QueryPlan, values: &[KeyValue]) -> Result<Vec<Row>>;
}

/// Destination for sampled canaries. Safe to call from many tasks at once.
pub trait CanarySink: Send + Sync {
    fn write(&self, canary: &Canary) -> Result<()>;
}

/// Lazy sequence of persisted canaries, restartable only by reopening.
pub trait CanarySource: Send + Sync {
    /// Open a fresh pass over the stored canaries.
    ///
    /// Malformed records arrive as `Err` items; the channel closes at the end.
    fn open(&self) -> Result<mpsc::Receiver<Result<Canary>>>;
}
