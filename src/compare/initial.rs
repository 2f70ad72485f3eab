use std::collections::HashMap;

use log::info;

use super::{CancelToken, ComparisonRun, WorkUnit, evaluate};
use crate::data::model::ExperimentalRecord;
use crate::error::ComparisonError;
use crate::sim::{RequestTemplate, Simulator};

pub const NAME: &str = "initial recombination";

/// Pick one record per distinct energy: the one measured at the lowest dose
/// rate, which best approximates isolated tracks. On ties the first record
/// in input order wins. Returned in ascending energy order.
pub fn select_representatives(records: &[ExperimentalRecord]) -> Vec<&ExperimentalRecord> {
    let mut by_energy: HashMap<u64, usize> = HashMap::new();
    let mut picked: Vec<&ExperimentalRecord> = Vec::new();

    for record in records {
        match by_energy.get(&record.energy_mev.to_bits()) {
            Some(&slot) => {
                if lower_dose_rate(record, picked[slot]) {
                    picked[slot] = record;
                }
            }
            None => {
                by_energy.insert(record.energy_mev.to_bits(), picked.len());
                picked.push(record);
            }
        }
    }

    picked.sort_by(|a, b| a.energy_mev.total_cmp(&b.energy_mev));
    picked
}

/// Strictly lower; a missing dose rate never displaces the current pick.
fn lower_dose_rate(candidate: &ExperimentalRecord, current: &ExperimentalRecord) -> bool {
    match (candidate.dose_rate_gy_min, current.dose_rate_gy_min) {
        (Some(c), Some(r)) => c < r,
        _ => false,
    }
}

/// Compare single-track simulations against the lowest-dose-rate measurement
/// of every energy. Energies whose simulation fails are skipped and counted.
pub fn compare_initial(
    records: &[ExperimentalRecord],
    template: &RequestTemplate,
    simulator: &dyn Simulator,
    cancel: &CancelToken,
) -> Result<ComparisonRun, ComparisonError> {
    let representatives = select_representatives(records);
    info!(
        "{NAME}: {} energies from {} records",
        representatives.len(),
        records.len()
    );

    let units = representatives
        .into_iter()
        .map(|record| WorkUnit {
            request: template.single_track(record.energy_mev),
            record: record.clone(),
        })
        .collect();

    let mut run = evaluate(NAME, units, Vec::new(), simulator, cancel)?;
    run.results
        .sort_by(|a, b| a.record.energy_mev.total_cmp(&b.record.energy_mev));
    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::tests::record;
    use crate::error::SimulationError;
    use crate::sim::tests::template;
    use crate::sim::{SimulationRequest, TrackMode};

    #[test]
    fn minimum_dose_rate_per_energy() {
        let records = vec![
            record(0, 150.0, 3.665, 1.004),
            record(1, 150.0, 1.866, 1.002),
            record(2, 226.0, 5.61, 1.003),
        ];
        let picked = select_representatives(&records);
        let rows: Vec<usize> = picked.iter().map(|r| r.row).collect();
        assert_eq!(rows, vec![1, 2]);
    }

    #[test]
    fn first_minimum_wins_ties() {
        let records = vec![
            record(0, 150.0, 2.0, 1.004),
            record(1, 150.0, 1.0, 1.002),
            record(2, 150.0, 1.0, 1.009),
        ];
        let picked = select_representatives(&records);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].row, 1);
    }

    #[test]
    fn without_dose_rate_first_record_wins() {
        let mut a = record(0, 150.0, 0.0, 1.004);
        let mut b = record(1, 150.0, 0.0, 1.002);
        a.dose_rate_gy_min = None;
        b.dose_rate_gy_min = None;
        let records = [a, b];
        assert_eq!(select_representatives(&records)[0].row, 0);
    }

    #[test]
    fn sorted_by_energy() {
        let records = vec![record(0, 226.0, 1.0, 1.0), record(1, 70.0, 1.0, 1.0)];
        let energies: Vec<f64> = select_representatives(&records)
            .iter()
            .map(|r| r.energy_mev)
            .collect();
        assert_eq!(energies, vec![70.0, 226.0]);
    }

    #[test]
    fn single_track_requests_and_skipped_energies() {
        let records = vec![
            record(0, 150.0, 3.665, 1.004),
            record(1, 150.0, 1.866, 1.0025),
            record(2, 226.0, 5.61, 1.003),
        ];
        let sim = |req: &SimulationRequest| -> Result<f64, SimulationError> {
            assert_eq!(req.mode, TrackMode::SingleTrack);
            if req.energy_mev == 226.0 {
                Err(SimulationError::NonPhysical("out of table".into()))
            } else {
                Ok(1.0050)
            }
        };

        let run = compare_initial(&records, &template(), &sim, &CancelToken::new()).unwrap();
        assert_eq!(run.count_total, 2);
        assert_eq!(run.count_success(), 1);
        assert_eq!(run.count_failed(), 1);
        assert_eq!(run.results[0].record.row, 1);
        assert!((run.results[0].relative_error_pct - 0.2494).abs() < 1e-4);
    }

    #[test]
    fn all_energies_failing_is_no_results() {
        let records = vec![record(0, 150.0, 1.0, 1.0)];
        let sim = |_: &SimulationRequest| -> Result<f64, SimulationError> {
            Err(SimulationError::Unavailable("no GPU".into()))
        };
        let err = compare_initial(&records, &template(), &sim, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, ComparisonError::NoResults { total: 1, failed: 1, .. }));
    }
}
