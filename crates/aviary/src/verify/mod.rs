//! Canary verification strategies.
//!
//! A verifier consumes a stream of previously sampled canaries and checks
//! that each one still resolves to a row in the cluster.

mod simple;

pub use simple::SimpleVerifier;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::Canary;
use crate::error::Result;
use crate::report::PhaseReport;

#[async_trait]
pub trait CanaryVerifier: Send + Sync {
    /// Strategy name as used in configuration.
    fn name(&self) -> &'static str;

    /// Check every canary received until the channel closes.
    ///
    /// `Err` items are counted as unreadable and skipped.
    async fn verify_canaries(
        &self,
        canaries: mpsc::Receiver<Result<Canary>>,
    ) -> Result<PhaseReport>;
}
