//! Collaborators handed to a sampler or verifier at construction.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::catalog::OriginPredicate;
use crate::core::{ClusterSession, SchemaProvider};
use crate::tasks::TaskPolicy;

#[derive(Clone)]
pub struct PhaseContext {
    pub schema: Arc<dyn SchemaProvider>,
    pub session: Arc<dyn ClusterSession>,
    pub predicate: OriginPredicate,
    pub policy: TaskPolicy,
    pub cancel: CancellationToken,
}

impl PhaseContext {
    /// Context with an accept-all predicate, default policy and a fresh
    /// cancellation token.
    pub fn new(schema: Arc<dyn SchemaProvider>, session: Arc<dyn ClusterSession>) -> Self {
        Self {
            schema,
            session,
            predicate: OriginPredicate::accept_all(),
            policy: TaskPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_predicate(mut self, predicate: OriginPredicate) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn with_policy(mut self, policy: TaskPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}
