//! Per-origin counters folded from completed units.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::core::Origin;
use crate::report::OriginReport;

/// Counters of one phase for one origin.
pub trait PhaseCounters: Default + Send + Sync + 'static {
    /// Numerator of the report line.
    fn success(&self) -> u64;

    /// Denominator of the report line.
    fn total(&self) -> u64;

    /// Every counter by name, for the JSON report.
    fn details(&self) -> BTreeMap<String, u64>;
}

/// What one sampled range produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeTally {
    pub rows: u64,
    pub written: u64,
    pub incomplete: u64,
    pub write_failures: u64,
}

#[derive(Debug, Default)]
pub struct SamplingCounters {
    ranges_scheduled: AtomicU64,
    ranges_found: AtomicU64,
    ranges_failed: AtomicU64,
    rows_sampled: AtomicU64,
    canaries_written: AtomicU64,
    incomplete_rows: AtomicU64,
    write_failures: AtomicU64,
}

impl SamplingCounters {
    pub fn range_scheduled(&self) {
        self.ranges_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn range_sampled(&self, tally: &RangeTally) {
        if tally.written > 0 {
            self.ranges_found.fetch_add(1, Ordering::Relaxed);
        }
        self.rows_sampled.fetch_add(tally.rows, Ordering::Relaxed);
        self.canaries_written.fetch_add(tally.written, Ordering::Relaxed);
        self.incomplete_rows.fetch_add(tally.incomplete, Ordering::Relaxed);
        self.write_failures.fetch_add(tally.write_failures, Ordering::Relaxed);
    }

    pub fn range_failed(&self) {
        self.ranges_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ranges_scheduled(&self) -> u64 {
        self.ranges_scheduled.load(Ordering::Relaxed)
    }

    pub fn ranges_found(&self) -> u64 {
        self.ranges_found.load(Ordering::Relaxed)
    }

    pub fn ranges_failed(&self) -> u64 {
        self.ranges_failed.load(Ordering::Relaxed)
    }

    pub fn canaries_written(&self) -> u64 {
        self.canaries_written.load(Ordering::Relaxed)
    }

    pub fn incomplete_rows(&self) -> u64 {
        self.incomplete_rows.load(Ordering::Relaxed)
    }
}

impl PhaseCounters for SamplingCounters {
    fn success(&self) -> u64 {
        self.canaries_written()
    }

    fn total(&self) -> u64 {
        self.ranges_scheduled()
    }

    fn details(&self) -> BTreeMap<String, u64> {
        BTreeMap::from([
            ("ranges_scheduled".to_string(), self.ranges_scheduled()),
            ("ranges_found".to_string(), self.ranges_found()),
            ("ranges_failed".to_string(), self.ranges_failed()),
            ("rows_sampled".to_string(), self.rows_sampled.load(Ordering::Relaxed)),
            ("canaries_written".to_string(), self.canaries_written()),
            ("incomplete_rows".to_string(), self.incomplete_rows()),
            ("write_failures".to_string(), self.write_failures.load(Ordering::Relaxed)),
        ])
    }
}

#[derive(Debug, Default)]
pub struct VerificationCounters {
    total_checked: AtomicU64,
    verified_present: AtomicU64,
    missing: AtomicU64,
    lookups_failed: AtomicU64,
}

impl VerificationCounters {
    /// A canary was scheduled for lookup.
    pub fn checked(&self) {
        self.total_checked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn present(&self) {
        self.verified_present.fetch_add(1, Ordering::Relaxed);
    }

    pub fn missing(&self) {
        self.missing.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failed(&self) {
        self.lookups_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_checked(&self) -> u64 {
        self.total_checked.load(Ordering::Relaxed)
    }

    pub fn verified_present(&self) -> u64 {
        self.verified_present.load(Ordering::Relaxed)
    }

    pub fn lookups_failed(&self) -> u64 {
        self.lookups_failed.load(Ordering::Relaxed)
    }
}

impl PhaseCounters for VerificationCounters {
    fn success(&self) -> u64 {
        self.verified_present()
    }

    fn total(&self) -> u64 {
        self.total_checked()
    }

    fn details(&self) -> BTreeMap<String, u64> {
        BTreeMap::from([
            ("total_checked".to_string(), self.total_checked()),
            ("verified_present".to_string(), self.verified_present()),
            ("missing".to_string(), self.missing.load(Ordering::Relaxed)),
            ("lookups_failed".to_string(), self.lookups_failed()),
        ])
    }
}

/// Origin to counters map; counters are created zeroed on first touch.
#[derive(Debug)]
pub struct Aggregator<C> {
    counters: Mutex<HashMap<Origin, Arc<C>>>,
}

impl<C: PhaseCounters> Default for Aggregator<C> {
    fn default() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
        }
    }
}

impl<C: PhaseCounters> Aggregator<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch(&self, origin: &Origin) -> Arc<C> {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters.entry(origin.clone()).or_default().clone()
    }

    pub fn get(&self, origin: &Origin) -> Option<Arc<C>> {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(origin)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One line per touched origin, ordered by origin.
    pub fn report(&self) -> Vec<OriginReport> {
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let mut lines: Vec<OriginReport> = counters
            .iter()
            .map(|(origin, c)| OriginReport {
                origin: origin.clone(),
                success: c.success(),
                total: c.total(),
                details: c.details(),
            })
            .collect();
        lines.sort_by(|a, b| a.origin.cmp(&b.origin));
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_touch_creates_zeroed_counters() {
        let aggregator = Aggregator::<VerificationCounters>::new();
        let origin = Origin::new("ks", "t");
        assert!(aggregator.get(&origin).is_none());

        let counters = aggregator.touch(&origin);
        assert_eq!(counters.total(), 0);
        assert_eq!(aggregator.len(), 1);
        assert!(Arc::ptr_eq(&counters, &aggregator.touch(&origin)));
    }

    #[test]
    fn test_sampling_counts_canaries_over_ranges() {
        let counters = SamplingCounters::default();
        for _ in 0..3 {
            counters.range_scheduled();
        }
        counters.range_sampled(&RangeTally { rows: 3, written: 3, ..Default::default() });
        counters.range_sampled(&RangeTally::default());
        counters.range_failed();

        assert_eq!(counters.success(), 3);
        assert_eq!(counters.total(), 3);
        assert_eq!(counters.ranges_found(), 1);
        assert_eq!(counters.details()["ranges_found"], 1);
        assert_eq!(counters.details()["ranges_failed"], 1);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let aggregator = Arc::new(Aggregator::<VerificationCounters>::new());
        let origin = Origin::new("ks", "t");
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let aggregator = aggregator.clone();
                let origin = origin.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let c = aggregator.touch(&origin);
                        c.checked();
                        c.present();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let report = aggregator.report();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].to_string(), "ks.t: 8000/8000");
    }
}
