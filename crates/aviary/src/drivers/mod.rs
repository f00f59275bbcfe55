//! Cluster driver implementations.
//!
//! Each driver implements [`SchemaProvider`](crate::core::SchemaProvider) and
//! [`ClusterSession`](crate::core::ClusterSession):
//!
//! - [`memory`]: in-process cluster, always available
//! - [`cql`]: Cassandra/ScyllaDB over the native protocol (feature `scylla`)

pub mod memory;

#[cfg(feature = "scylla")]
pub mod cql;

pub use memory::{partition_token, MemoryCluster};

#[cfg(feature = "scylla")]
pub use cql::CqlCluster;
