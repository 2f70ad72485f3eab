use serde::Serialize;

use super::ComparisonRun;

/// Summary statistics of one error sequence. Every field is `None` for an
/// empty sequence; `std_dev` (sample, N-1) also needs at least two values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ErrorStatistics {
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub std_dev: Option<f64>,
}

impl ErrorStatistics {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        let std_dev = (values.len() > 1).then(|| {
            let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (n - 1.0)).sqrt()
        });

        Self {
            mean: Some(mean),
            median: Some(median),
            min: sorted.first().copied(),
            max: sorted.last().copied(),
            std_dev,
        }
    }
}

/// Counts and error statistics of one comparator run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSummary {
    pub count_total: usize,
    pub count_success: usize,
    pub count_failed: usize,
    pub count_cancelled: usize,
    pub relative_error_pct: ErrorStatistics,
    pub absolute_error: ErrorStatistics,
}

impl StatisticsSummary {
    pub fn from_run(run: &ComparisonRun) -> Self {
        let relative: Vec<f64> = run.results.iter().map(|r| r.relative_error_pct).collect();
        let absolute: Vec<f64> = run.results.iter().map(|r| r.absolute_error).collect();
        Self {
            count_total: run.count_total,
            count_success: run.count_success(),
            count_failed: run.count_failed(),
            count_cancelled: run.count_cancelled(),
            relative_error_pct: ErrorStatistics::from_values(&relative),
            absolute_error: ErrorStatistics::from_values(&absolute),
        }
    }
}
