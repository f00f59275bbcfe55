//! # aviary
//!
//! Canary-based durability auditing for Cassandra-compatible clusters.
//!
//! An audit runs in two phases:
//!
//! - **Sampling** probes every table once per token range and records the
//!   primary keys of the rows it finds ("canaries") in an aviary file
//! - **Verification** later replays the aviary file and looks every canary
//!   up again, reporting per table how many are still present
//!
//! Work is split into short units that run concurrently under a bounded
//! [`tasks::TaskOrchestrator`]; one failing unit never aborts a phase.
//!
//! ## Example
//!
//! ```rust,no_run
//! use aviary::{Config, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn audit() -> aviary::Result<()> {
//! let config = Config::load("aviary.yaml")?;
//! let orchestrator = Orchestrator::connect(config).await?;
//! let report = orchestrator.verify(CancellationToken::new()).await?;
//! for line in report.phase.lines() {
//!     println!("{}", line);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod context;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod report;
pub mod sampler;
pub mod store;
pub mod tasks;
pub mod verify;

// Re-exports for convenient access
pub use cache::StatementCache;
pub use catalog::{OriginCatalog, OriginFilter, OriginPredicate};
pub use config::{ClusterConfig, Config, SamplingConfig, TaskConfig, VerificationConfig};
pub use context::PhaseContext;
pub use crate::core::{Canary, KeyValue, Origin, TableKeys, TokenRange, TokenRing};
pub use drivers::MemoryCluster;
pub use error::{AviaryError, Result};
pub use orchestrator::Orchestrator;
pub use registry::{SamplerKind, VerifierKind};
pub use report::{OriginReport, Phase, PhaseReport, RunReport};
pub use sampler::{CanarySampler, RangeSelector};
pub use store::{AviaryReader, AviaryWriter};
pub use tasks::{TaskOrchestrator, TaskPolicy, TaskStats};
pub use verify::{CanaryVerifier, SimpleVerifier};
