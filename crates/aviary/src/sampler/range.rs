//! Token-range sampling.
//!
//! Every accepted table is probed once per token range of the ring with a
//! range-scan plan prepared once per table. Rows come back as canaries and
//! are written to the sink as soon as they are built.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use super::CanarySampler;
use crate::cache::{origin_cache, StatementCache};
use crate::catalog::OriginCatalog;
use crate::context::PhaseContext;
use crate::core::{
    Canary, CanarySink, ClusterSession, KeyValue, Origin, QueryPlan, StatementKind, TokenRange,
};
use crate::error::Result;
use crate::report::{Phase, PhaseReport};
use crate::tasks::{Aggregator, RangeTally, SamplingCounters, TaskOrchestrator};

/// Rows requested per token range unless configured otherwise.
pub const DEFAULT_SAMPLE_LIMIT: u32 = 1;

/// One (table, range) unit of work.
#[derive(Debug, Clone)]
struct RangeUnit {
    origin: Origin,
    range: TokenRange,
}

impl fmt::Display for RangeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.origin, self.range)
    }
}

pub struct RangeSelector {
    ctx: PhaseContext,
    sink: Arc<dyn CanarySink>,
    limit: u32,
    statements: StatementCache<Origin>,
    span: Span,
}

impl RangeSelector {
    pub const NAME: &'static str = "range";

    pub fn new(ctx: PhaseContext, sink: Arc<dyn CanarySink>) -> Self {
        let statements = origin_cache(
            StatementKind::RangeScan,
            ctx.schema.clone(),
            ctx.session.clone(),
        );
        Self {
            ctx,
            sink,
            limit: DEFAULT_SAMPLE_LIMIT,
            statements,
            span: info_span!("sampler", strategy = Self::NAME),
        }
    }

    /// Rows requested per range; at least one.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Range-scan plans prepared so far.
    pub fn prepared_plans(&self) -> usize {
        self.statements.len()
    }

    async fn run(&self) -> Result<PhaseReport> {
        let origins = OriginCatalog::new(self.ctx.schema.clone(), self.ctx.predicate.clone())
            .discover()
            .await?;
        let filtered_out = origins.rejected() as u64;
        let ranges = self.ctx.schema.token_ring().await?.ranges();
        info!(
            "Sampling {} tables across {} token ranges (limit {} per range)",
            origins.len(),
            ranges.len(),
            self.limit
        );

        let aggregator = Aggregator::<SamplingCounters>::new();
        let mut tasks = TaskOrchestrator::new(
            self.ctx.policy.clone(),
            self.ctx.cancel.clone(),
            self.span.clone(),
        );
        let mut reconcile = |unit: RangeUnit, result: Result<RangeTally>| {
            let counters = aggregator.touch(&unit.origin);
            match result {
                Ok(tally) => counters.range_sampled(&tally),
                Err(_) => counters.range_failed(),
            }
        };

        'origins: for origin in origins {
            let counters = aggregator.touch(&origin);
            let plan = match self.statements.get_or_create(&origin).await {
                Ok(plan) => plan,
                Err(e) => {
                    error!("Skipping {}: {}", origin, e);
                    for _ in &ranges {
                        counters.range_scheduled();
                        counters.range_failed();
                    }
                    continue;
                }
            };

            for &range in &ranges {
                let unit = RangeUnit {
                    origin: origin.clone(),
                    range,
                };
                let session = self.ctx.session.clone();
                let sink = self.sink.clone();
                let plan = plan.clone();
                let limit = self.limit;
                let work = move || sample_range(session.clone(), sink.clone(), plan.clone(), range, limit);

                if !tasks.dispatch(unit, work, &mut reconcile).await {
                    warn!("Sampling cancelled while dispatching {}", origin);
                    break 'origins;
                }
                counters.range_scheduled();
            }
            debug!("Dispatched {} ranges for {}", ranges.len(), origin);
        }

        let stats = tasks.join(&mut reconcile).await;
        let mut report = PhaseReport::new(Phase::Sampling, Self::NAME, aggregator.report(), stats);
        report.filtered_out = filtered_out;

        let (written, scheduled) = report.totals();
        info!(
            "Sampling finished: {} canaries from {} ranges ({} failed units)",
            written, scheduled, stats.failed
        );
        Ok(report)
    }
}

#[async_trait]
impl CanarySampler for RangeSelector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn select_canaries(&self) -> Result<PhaseReport> {
        self.run().instrument(self.span.clone()).await
    }
}

async fn sample_range(
    session: Arc<dyn ClusterSession>,
    sink: Arc<dyn CanarySink>,
    plan: QueryPlan,
    range: TokenRange,
    limit: u32,
) -> Result<RangeTally> {
    let statement = plan.statement();
    let bound = [
        KeyValue::Int(range.start()),
        KeyValue::Int(range.end()),
        KeyValue::Int(i64::from(limit)),
    ];
    let rows = session.execute(&plan, &bound).await?;

    let mut tally = RangeTally {
        rows: rows.len() as u64,
        ..Default::default()
    };
    for row in rows {
        match Canary::from_row(statement.origin(), statement.keys(), row) {
            Ok(canary) => match sink.write(&canary) {
                Ok(()) => tally.written += 1,
                Err(e) => {
                    error!("Failed to persist {}: {}", canary, e);
                    tally.write_failures += 1;
                }
            },
            Err(e) => {
                warn!("Skipping row in {}: {}", range, e);
                tally.incomplete += 1;
            }
        }
    }
    Ok(tally)
}
