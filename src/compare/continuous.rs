use log::info;

use super::{CancelToken, ComparisonRun, SkipReason, SkippedRecord, WorkUnit, evaluate};
use crate::data::model::ExperimentalRecord;
use crate::error::ComparisonError;
use crate::sim::{RequestTemplate, Simulator};

pub const NAME: &str = "continuous beam";

/// Simulate every record at its own `(energy, dose rate)`.
///
/// Per-record failures are skipped and counted. Results come back in input
/// row order regardless of completion order. Fails with
/// [`ComparisonError::NoResults`] when not a single record succeeds.
pub fn compare_continuous(
    records: &[ExperimentalRecord],
    template: &RequestTemplate,
    simulator: &dyn Simulator,
    cancel: &CancelToken,
) -> Result<ComparisonRun, ComparisonError> {
    info!("{NAME}: {} simulations to run", records.len());

    let mut units = Vec::with_capacity(records.len());
    let mut pre_skipped = Vec::new();
    for record in records {
        match record.dose_rate_gy_min {
            Some(dose_rate) => units.push(WorkUnit {
                request: template.continuous_beam(record.energy_mev, dose_rate),
                record: record.clone(),
            }),
            None => pre_skipped.push(SkippedRecord::new(record, SkipReason::MissingDoseRate)),
        }
    }

    evaluate(NAME, units, pre_skipped, simulator, cancel)
}
