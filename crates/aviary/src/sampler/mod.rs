//! Canary sampling strategies.

mod range;

pub use range::{RangeSelector, DEFAULT_SAMPLE_LIMIT};

use async_trait::async_trait;

use crate::error::Result;
use crate::report::PhaseReport;

/// Selects canaries from the cluster and hands them to a sink.
#[async_trait]
pub trait CanarySampler: Send + Sync {
    /// Strategy name as used in configuration.
    fn name(&self) -> &'static str;

    /// Sample every accepted table, returning once every unit has finished.
    async fn select_canaries(&self) -> Result<PhaseReport>;
}
