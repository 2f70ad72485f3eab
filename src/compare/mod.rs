//! Comparison layer: evaluate experimental records against simulations.
//!
//! ```text
//!   ExperimentalRecord ──► SimulationRequest ──► Simulator::invoke
//!                                                      │
//!                          ┌───────────────────────────┘
//!                          ▼
//!   fold ──► ComparisonRun { results, skipped } ──► StatisticsSummary
//! ```

pub mod continuous;
pub mod initial;
pub mod stats;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::data::model::ExperimentalRecord;
use crate::error::ComparisonError;
use crate::sim::{SimulationOutcome, SimulationRequest, Simulator};

pub use stats::{ErrorStatistics, StatisticsSummary};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// One evaluated condition.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonResult {
    pub record: ExperimentalRecord,
    pub k_s_simulated: f64,
    /// `k_s_simulated - k_s_experimental` (signed).
    pub absolute_error: f64,
    /// `100 * absolute_error / k_s_experimental`.
    pub relative_error_pct: f64,
}

impl ComparisonResult {
    pub fn new(record: ExperimentalRecord, k_s_simulated: f64) -> Self {
        let absolute_error = k_s_simulated - record.k_s;
        let relative_error_pct = 100.0 * absolute_error / record.k_s;
        Self {
            record,
            k_s_simulated,
            absolute_error,
            relative_error_pct,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    SimulationFailed(String),
    MissingDoseRate,
    /// Not scheduled because the run was cancelled.
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::SimulationFailed(reason) => write!(f, "simulation failed: {reason}"),
            SkipReason::MissingDoseRate => f.write_str("no dose rate"),
            SkipReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// A record that produced no result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRecord {
    pub row: usize,
    pub energy_mev: f64,
    pub dose_rate_gy_min: Option<f64>,
    pub reason: SkipReason,
}

impl SkippedRecord {
    fn new(record: &ExperimentalRecord, reason: SkipReason) -> Self {
        Self {
            row: record.row,
            energy_mev: record.energy_mev,
            dose_rate_gy_min: record.dose_rate_gy_min,
            reason,
        }
    }
}

/// Output of one comparator: successes in order, plus what was skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRun {
    pub comparator: &'static str,
    pub results: Vec<ComparisonResult>,
    pub skipped: Vec<SkippedRecord>,
    /// Units of work the comparator was asked to evaluate.
    pub count_total: usize,
}

impl ComparisonRun {
    fn new(comparator: &'static str, count_total: usize) -> Self {
        Self {
            comparator,
            results: Vec::new(),
            skipped: Vec::new(),
            count_total,
        }
    }

    pub fn count_success(&self) -> usize {
        self.results.len()
    }

    /// Units that were attempted (or unattemptable) and produced no result.
    pub fn count_failed(&self) -> usize {
        self.skipped
            .iter()
            .filter(|s| s.reason != SkipReason::Cancelled)
            .count()
    }

    pub fn count_cancelled(&self) -> usize {
        self.skipped
            .iter()
            .filter(|s| s.reason == SkipReason::Cancelled)
            .count()
    }

    pub fn summary(&self) -> StatisticsSummary {
        StatisticsSummary::from_run(self)
    }
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cooperative abort signal. Checked between invocations, never inside one.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Shared evaluation loop
// ---------------------------------------------------------------------------

/// One simulator call and the record it will be compared against.
pub(crate) struct WorkUnit {
    pub record: ExperimentalRecord,
    pub request: SimulationRequest,
}

/// Evaluate `units` in parallel on the current rayon pool and fold the
/// outcomes into a [`ComparisonRun`].
///
/// `pre_skipped` are records rejected before any simulation. Fails only when
/// nothing succeeded.
pub(crate) fn evaluate(
    comparator: &'static str,
    units: Vec<WorkUnit>,
    pre_skipped: Vec<SkippedRecord>,
    simulator: &dyn Simulator,
    cancel: &CancelToken,
) -> Result<ComparisonRun, ComparisonError> {
    let total = units.len() + pre_skipped.len();
    let n_units = units.len();
    let step = (n_units / 10).max(1);
    let done = AtomicUsize::new(0);

    let evaluated: Vec<(ExperimentalRecord, Option<SimulationOutcome>)> = units
        .into_par_iter()
        .map(|unit| {
            if cancel.is_cancelled() {
                return (unit.record, None);
            }
            let outcome = simulator.invoke(&unit.request);
            let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
            if finished % step == 0 || finished == n_units {
                info!(
                    "{comparator}: {finished}/{n_units} ({:.1}%)",
                    100.0 * finished as f64 / n_units as f64
                );
            }
            (unit.record, Some(outcome))
        })
        .collect();

    let mut run = ComparisonRun::new(comparator, total);
    run.skipped = pre_skipped;
    let mut run = evaluated
        .into_iter()
        .fold(run, |mut run, (record, outcome)| {
            match outcome {
                Some(SimulationOutcome::Success(k_s)) => {
                    run.results.push(ComparisonResult::new(record, k_s));
                }
                Some(SimulationOutcome::Failure(reason)) => {
                    warn!(
                        "{comparator}: row {} ({} MeV) failed: {reason}",
                        record.row, record.energy_mev
                    );
                    run.skipped
                        .push(SkippedRecord::new(&record, SkipReason::SimulationFailed(reason)));
                }
                None => run.skipped.push(SkippedRecord::new(&record, SkipReason::Cancelled)),
            }
            run
        });

    run.results.sort_by_key(|r| r.record.row);
    run.skipped.sort_by_key(|s| s.row);

    if run.results.is_empty() {
        if run.count_cancelled() > 0 {
            return Err(ComparisonError::Cancelled { comparator });
        }
        return Err(ComparisonError::NoResults {
            comparator,
            total,
            failed: run.count_failed(),
        });
    }

    info!(
        "{comparator}: {}/{} successful calculations",
        run.count_success(),
        total
    );
    Ok(run)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;

    use super::*;

    pub(crate) fn record(row: usize, energy_mev: f64, dose_rate_gy_s: f64, k_s: f64) -> ExperimentalRecord {
        ExperimentalRecord {
            row,
            energy_mev,
            dose_rate_gy_min: Some(dose_rate_gy_s * 60.0),
            k_s,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn relative_error_formula() {
        let result = ComparisonResult::new(record(0, 150.0, 1.0, 1.0025), 1.0050);
        assert!((result.absolute_error - 0.0025).abs() < 1e-12);
        let expected = 100.0 * (1.0050 - 1.0025) / 1.0025;
        assert!((result.relative_error_pct - expected).abs() < 1e-12);
        assert!((result.relative_error_pct - 0.2494).abs() < 1e-4);
    }

    #[test]
    fn negative_error_when_simulation_underestimates() {
        let result = ComparisonResult::new(record(0, 150.0, 1.0, 1.02), 1.01);
        assert!(result.absolute_error < 0.0);
        assert!(result.relative_error_pct < 0.0);
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
