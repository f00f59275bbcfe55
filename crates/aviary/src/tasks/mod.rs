//! Concurrent execution of short-lived work units.
//!
//! [`TaskOrchestrator`] spawns units onto a [`JoinSet`] and reconciles them
//! as they finish: completions already waiting are harvested on every
//! dispatch, and [`TaskOrchestrator::join`] blocks on the completion queue
//! until every dispatched unit has reported. A unit's failure is logged and
//! handed to the reconcile callback; it never stops other units.
//!
//! The [`TaskPolicy`] bounds the number of units in flight with a semaphore
//! permit taken before each spawn, and optionally applies a per-attempt
//! timeout and exponential-backoff retries for transient errors.

mod aggregate;

pub use aggregate::{Aggregator, PhaseCounters, RangeTally, SamplingCounters, VerificationCounters};

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, error, warn, Instrument, Span};

use crate::error::{AviaryError, Result};

/// Upper bound for a single retry delay.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Execution limits applied to every unit.
#[derive(Debug, Clone)]
pub struct TaskPolicy {
    /// Maximum units running at once.
    pub max_in_flight: usize,

    /// Time allowed for one attempt of a unit.
    pub timeout: Option<Duration>,

    /// Retries after a transient failure.
    pub max_retries: u32,

    /// Delay before the first retry; doubles on each further retry.
    pub retry_backoff: Duration,
}

impl Default for TaskPolicy {
    fn default() -> Self {
        Self {
            max_in_flight: 256,
            timeout: None,
            max_retries: 0,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

impl TaskPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_in_flight(mut self, count: usize) -> Self {
        self.max_in_flight = count.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = backoff;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.retry_backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

/// Outcome counts of one orchestrated phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    pub dispatched: u64,
    pub succeeded: u64,
    /// Every unit that completed with an error, timeouts and panics included.
    pub failed: u64,
    pub timed_out: u64,
    pub panicked: u64,
    /// Units stopped by cancellation before they completed.
    pub aborted: u64,
    pub retries: u64,
    pub cancelled: bool,
}

impl TaskStats {
    pub fn completed(&self) -> u64 {
        self.succeeded + self.failed
    }
}

struct Finished<K, T> {
    key: K,
    /// `Err` carries the panic message.
    outcome: std::result::Result<Result<T>, String>,
    retries: u32,
}

enum Step<K, T> {
    Permit(OwnedSemaphorePermit),
    Joined(std::result::Result<Finished<K, T>, JoinError>),
    Cancelled,
    Drained,
}

/// Dispatches units keyed by `K` that produce a `T`.
pub struct TaskOrchestrator<K, T> {
    tasks: JoinSet<Finished<K, T>>,
    permits: Arc<Semaphore>,
    policy: TaskPolicy,
    cancel: CancellationToken,
    span: Span,
    stats: TaskStats,
}

impl<K, T> TaskOrchestrator<K, T>
where
    K: Display + Send + 'static,
    T: Send + 'static,
{
    pub fn new(policy: TaskPolicy, cancel: CancellationToken, span: Span) -> Self {
        Self {
            tasks: JoinSet::new(),
            permits: Arc::new(Semaphore::new(policy.max_in_flight.max(1))),
            policy,
            cancel,
            span,
            stats: TaskStats::default(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Units spawned and not yet reconciled.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    pub fn stats(&self) -> TaskStats {
        self.stats
    }

    /// Spawn one unit once a permit is free.
    ///
    /// Finished units are reconciled while waiting. Returns `false` without
    /// spawning when the run has been cancelled.
    pub async fn dispatch<F, Fut, R>(&mut self, key: K, unit: F, reconcile: &mut R) -> bool
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        R: FnMut(K, Result<T>),
    {
        if self.cancel.is_cancelled() {
            return false;
        }

        while let Some(joined) = self.tasks.try_join_next() {
            self.settle(joined, reconcile);
        }

        let permit = loop {
            let pending = !self.tasks.is_empty();
            let step = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Step::Cancelled,
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => Step::Permit(permit),
                    Err(_) => Step::Cancelled,
                },
                Some(joined) = self.tasks.join_next(), if pending => Step::Joined(joined),
            };
            match step {
                Step::Permit(permit) => break permit,
                Step::Joined(joined) => self.settle(joined, reconcile),
                Step::Cancelled | Step::Drained => {
                    debug!("Dispatch stopped by cancellation before {}", key);
                    return false;
                }
            }
        };

        let span = debug_span!(parent: &self.span, "unit", unit = %key);
        let policy = self.policy.clone();
        self.tasks.spawn(
            async move {
                let _permit = permit;
                let (outcome, retries) =
                    match AssertUnwindSafe(run_with_policy(&unit, &policy)).catch_unwind().await {
                        Ok((result, retries)) => (Ok(result), retries),
                        Err(payload) => (Err(panic_message(payload)), 0),
                    };
                Finished {
                    key,
                    outcome,
                    retries,
                }
            }
            .instrument(span),
        );
        self.stats.dispatched += 1;
        true
    }

    /// Wait for every dispatched unit and return the phase's task counts.
    ///
    /// On cancellation the outstanding units are aborted and counted as such.
    pub async fn join<R>(mut self, reconcile: &mut R) -> TaskStats
    where
        R: FnMut(K, Result<T>),
    {
        let mut aborting = false;
        loop {
            let step = tokio::select! {
                biased;
                _ = self.cancel.cancelled(), if !aborting => Step::Cancelled,
                joined = self.tasks.join_next() => match joined {
                    Some(joined) => Step::Joined(joined),
                    None => Step::Drained,
                },
            };
            match step {
                Step::Joined(joined) => self.settle(joined, reconcile),
                Step::Cancelled => {
                    warn!(
                        "Cancellation requested, aborting {} outstanding units",
                        self.tasks.len()
                    );
                    self.tasks.abort_all();
                    aborting = true;
                }
                Step::Drained => break,
                Step::Permit(_) => {}
            }
        }

        self.stats.cancelled = self.cancel.is_cancelled();
        debug!(
            "Joined {} units ({} succeeded, {} failed, {} aborted)",
            self.stats.dispatched, self.stats.succeeded, self.stats.failed, self.stats.aborted
        );
        self.stats
    }

    fn settle<R>(
        &mut self,
        joined: std::result::Result<Finished<K, T>, JoinError>,
        reconcile: &mut R,
    ) where
        R: FnMut(K, Result<T>),
    {
        match joined {
            Ok(Finished {
                key,
                outcome,
                retries,
            }) => {
                self.stats.retries += u64::from(retries);
                let result = outcome.unwrap_or_else(|message| {
                    self.stats.panicked += 1;
                    Err(AviaryError::TaskPanicked(message))
                });
                match &result {
                    Ok(_) => self.stats.succeeded += 1,
                    Err(e) => {
                        self.stats.failed += 1;
                        if matches!(e, AviaryError::Timeout(_)) {
                            self.stats.timed_out += 1;
                        }
                        error!("{} failed: {}", key, e);
                    }
                }
                reconcile(key, result);
            }
            Err(e) if e.is_cancelled() => self.stats.aborted += 1,
            Err(e) => {
                self.stats.panicked += 1;
                error!("Unit could not be joined: {}", e);
            }
        }
    }
}

async fn run_with_policy<F, Fut, T>(unit: &F, policy: &TaskPolicy) -> (Result<T>, u32)
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        let result = match policy.timeout {
            Some(limit) => tokio::time::timeout(limit, unit())
                .await
                .unwrap_or_else(|_| Err(AviaryError::Timeout(limit))),
            None => unit().await,
        };
        match result {
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.backoff(attempt);
                warn!("Attempt {} failed: {}; retrying in {:?}", attempt, e, delay);
                tokio::time::sleep(delay).await;
            }
            result => return (result, attempt),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
