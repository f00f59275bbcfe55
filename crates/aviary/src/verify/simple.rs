//! Point-lookup verification.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{error, info, info_span, warn, Instrument, Span};

use super::CanaryVerifier;
use crate::cache::{origin_cache, StatementCache};
use crate::context::PhaseContext;
use crate::core::{Canary, ClusterSession, Origin, StatementKind};
use crate::error::Result;
use crate::report::{Phase, PhaseReport};
use crate::tasks::{Aggregator, TaskOrchestrator, VerificationCounters};

/// Looks every canary up by its full primary key.
///
/// A canary is present when the lookup returns at least one row. Lookup plans
/// are prepared once per table, on first use, from whichever unit gets there
/// first. Once a table's plan fails to prepare, its remaining canaries are
/// counted as failed without another attempt.
pub struct SimpleVerifier {
    ctx: PhaseContext,
    statements: Arc<StatementCache<Origin>>,
    span: Span,
}

impl SimpleVerifier {
    pub const NAME: &'static str = "simple";

    pub fn new(ctx: PhaseContext) -> Self {
        let statements = Arc::new(origin_cache(
            StatementKind::PointLookup,
            ctx.schema.clone(),
            ctx.session.clone(),
        ));
        Self {
            ctx,
            statements,
            span: info_span!("verifier", strategy = Self::NAME),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Lookup plans prepared so far.
    pub fn prepared_plans(&self) -> usize {
        self.statements.len()
    }

    async fn run(&self, mut canaries: mpsc::Receiver<Result<Canary>>) -> Result<PhaseReport> {
        let aggregator = Aggregator::<VerificationCounters>::new();
        let rejected: Mutex<HashSet<Origin>> = Mutex::new(HashSet::new());
        let mut filtered_out = 0u64;
        let mut unreadable = 0u64;

        let mut tasks = TaskOrchestrator::new(
            self.ctx.policy.clone(),
            self.ctx.cancel.clone(),
            self.span.clone(),
        );
        let mut reconcile = |canary: Canary, result: Result<bool>| {
            let counters = aggregator.touch(canary.origin());
            match result {
                Ok(true) => counters.present(),
                Ok(false) => {
                    warn!("Canary {} is missing", canary);
                    counters.missing();
                }
                Err(e) => {
                    counters.failed();
                    if e.rejects_origin() {
                        let newly = rejected
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .insert(canary.origin().clone());
                        if newly {
                            error!("No longer verifying {}: {}", canary.origin(), e);
                        }
                    }
                }
            }
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = self.ctx.cancel.cancelled() => None,
                item = canaries.recv() => item,
            };
            let Some(item) = next else { break };

            let canary = match item {
                Ok(canary) => canary,
                Err(e) => {
                    error!("Skipping unreadable canary: {}", e);
                    unreadable += 1;
                    continue;
                }
            };
            if !self.ctx.predicate.accepts(canary.origin()) {
                filtered_out += 1;
                continue;
            }

            let counters = aggregator.touch(canary.origin());
            let is_rejected = rejected
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(canary.origin());
            if is_rejected {
                counters.checked();
                counters.failed();
                continue;
            }

            let session = self.ctx.session.clone();
            let statements = self.statements.clone();
            let target = canary.clone();
            let work = move || verify_one(session.clone(), statements.clone(), target.clone());
            if !tasks.dispatch(canary, work, &mut reconcile).await {
                break;
            }
            counters.checked();
        }
        if self.ctx.cancel.is_cancelled() {
            warn!("Verification cancelled, remaining canaries are not checked");
        }

        let stats = tasks.join(&mut reconcile).await;
        let mut report = PhaseReport::new(Phase::Verification, Self::NAME, aggregator.report(), stats);
        report.filtered_out = filtered_out;
        report.unreadable = unreadable;

        let (present, checked) = report.totals();
        info!(
            "Verification finished: {} of {} canaries present ({} unreadable, {} filtered out)",
            present, checked, unreadable, filtered_out
        );
        Ok(report)
    }
}

#[async_trait]
impl CanaryVerifier for SimpleVerifier {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn verify_canaries(
        &self,
        canaries: mpsc::Receiver<Result<Canary>>,
    ) -> Result<PhaseReport> {
        self.run(canaries).instrument(self.span.clone()).await
    }
}

async fn verify_one(
    session: Arc<dyn ClusterSession>,
    statements: Arc<StatementCache<Origin>>,
    canary: Canary,
) -> Result<bool> {
    let plan = statements.get_or_create(canary.origin()).await?;
    let values = canary.key_values(plan.statement().keys())?;
    let rows = session.execute(&plan, &values).await?;
    Ok(!rows.is_empty())
}
