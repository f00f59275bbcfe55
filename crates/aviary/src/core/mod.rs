//! Core model shared by the sampler and the verifier.
//!
//! - [`origin`]: table identity
//! - [`value`]: primary-key values as they travel through the aviary file
//! - [`schema`]: key metadata discovered from the cluster
//! - [`canary`]: the sampled primary key of one row and its builder
//! - [`token`]: token ring and range partitioning
//! - [`statement`]: statements, prepared plans and result rows
//! - [`traits`]: contracts implemented by drivers and stores

pub mod canary;
pub mod identifier;
pub mod origin;
pub mod schema;
pub mod statement;
pub mod token;
pub mod traits;
pub mod value;

pub use canary::{Canary, CanaryBuilder};
pub use origin::Origin;
pub use schema::{KeyColumn, KeyKind, TableKeys};
pub use statement::{QueryPlan, Row, Statement, StatementKind};
pub use token::{Token, TokenRange, TokenRing};
pub use traits::{CanarySink, CanarySource, ClusterSession, SchemaProvider};
pub use value::KeyValue;
