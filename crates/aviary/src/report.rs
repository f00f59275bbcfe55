//! Phase and run reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::core::Origin;
use crate::error::Result;
use crate::tasks::TaskStats;

/// The two phases of an audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Sampling,
    Verification,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Sampling => f.write_str("sampling"),
            Phase::Verification => f.write_str("verification"),
        }
    }
}

/// Final counters of one origin.
///
/// For sampling `success/total` is canaries written over ranges scheduled; for
/// verification it is canaries present over canaries checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginReport {
    pub origin: Origin,
    pub success: u64,
    pub total: u64,
    #[serde(default)]
    pub details: BTreeMap<String, u64>,
}

impl fmt::Display for OriginReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}/{}", self.origin, self.success, self.total)
    }
}

/// Outcome of one sampler or verifier run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub strategy: String,
    pub origins: Vec<OriginReport>,
    pub tasks: TaskStats,
    /// Origins or records dropped by the origin predicate.
    #[serde(default)]
    pub filtered_out: u64,
    /// Records that could not be decoded.
    #[serde(default)]
    pub unreadable: u64,
}

impl PhaseReport {
    pub fn new(phase: Phase, strategy: impl Into<String>, origins: Vec<OriginReport>, tasks: TaskStats) -> Self {
        Self {
            phase,
            strategy: strategy.into(),
            origins,
            tasks,
            filtered_out: 0,
            unreadable: 0,
        }
    }

    pub fn origin(&self, origin: &Origin) -> Option<&OriginReport> {
        self.origins.iter().find(|r| &r.origin == origin)
    }

    /// Summed `(success, total)` over all origins.
    pub fn totals(&self) -> (u64, u64) {
        self.origins
            .iter()
            .fold((0, 0), |(s, t), r| (s + r.success, t + r.total))
    }

    pub fn cancelled(&self) -> bool {
        self.tasks.cancelled
    }

    /// `"ks.table: success/total"` per origin.
    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.origins.iter().map(ToString::to_string)
    }
}

/// A phase report with run metadata, as printed by `--output-json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub cluster: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub config_hash: String,
    #[serde(flatten)]
    pub phase: PhaseReport,
}

impl RunReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
