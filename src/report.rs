use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;
use serde::Serialize;

use crate::compare::{ComparisonResult, ComparisonRun, SkippedRecord, StatisticsSummary};
use crate::data::columns::ColumnMapping;
use crate::data::model::{DroppedRow, MetadataValue};
use crate::error::ComparisonError;
use crate::runner::RunReport;

pub const INITIAL_CSV: &str = "comparison_initial.csv";
pub const CONTINUOUS_CSV: &str = "comparison_continuous.csv";
pub const CONTINUOUS_CLEAN_CSV: &str = "comparison_continuous_clean.csv";
pub const SUMMARY_JSON: &str = "summary.json";

const CORE_COLUMNS: &[&str] = &[
    "Energy_MeV",
    "dose_rate_Gy_s",
    "dose_rate_Gy_min",
    "k_s_experimental",
    "k_s_simulated",
    "absolute_error",
    "relative_error_%",
];

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

fn opt(v: Option<f64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

/// Write results as CSV: the core columns, then `metadata_columns` in order.
pub fn write_results_csv<W: Write>(
    writer: W,
    results: &[ComparisonResult],
    metadata_columns: &[String],
) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);

    let header = CORE_COLUMNS
        .iter()
        .copied()
        .chain(metadata_columns.iter().map(String::as_str));
    csv.write_record(header).context("writing CSV header")?;

    for r in results {
        let rec = &r.record;
        let mut row = vec![
            rec.energy_mev.to_string(),
            opt(rec.dose_rate_gy_s()),
            opt(rec.dose_rate_gy_min),
            rec.k_s.to_string(),
            r.k_s_simulated.to_string(),
            r.absolute_error.to_string(),
            r.relative_error_pct.to_string(),
        ];
        row.extend(metadata_columns.iter().map(|col| {
            rec.metadata
                .get(col)
                .unwrap_or(&MetadataValue::Null)
                .to_string()
        }));
        csv.write_record(&row)
            .with_context(|| format!("writing CSV row {}", rec.row))?;
    }
    csv.flush().context("flushing CSV")?;
    Ok(())
}

fn write_csv_file(path: &Path, results: &[ComparisonResult], metadata: &[String]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    write_results_csv(file, results, metadata)?;
    info!("Saved: {}", path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// JSON summary
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ComparatorSummary<'a> {
    enabled: bool,
    error: Option<String>,
    summary: Option<StatisticsSummary>,
    skipped: &'a [SkippedRecord],
}

impl<'a> ComparatorSummary<'a> {
    fn from_outcome(outcome: &'a Option<Result<ComparisonRun, ComparisonError>>) -> Self {
        match outcome {
            None => Self {
                enabled: false,
                error: None,
                summary: None,
                skipped: &[],
            },
            Some(Ok(run)) => Self {
                enabled: true,
                error: None,
                summary: Some(run.summary()),
                skipped: &run.skipped,
            },
            Some(Err(e)) => Self {
                enabled: true,
                error: Some(e.to_string()),
                summary: None,
                skipped: &[],
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct SummaryFile<'a> {
    seed: u64,
    records: usize,
    column_mapping: &'a ColumnMapping,
    dropped_rows: &'a [DroppedRow],
    initial_recombination: ComparatorSummary<'a>,
    continuous_beam: ComparatorSummary<'a>,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Write every available output of `report` into `output_dir`.
/// Returns the paths written.
pub fn save_results(output_dir: &Path, report: &RunReport) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("creating output directory {}", output_dir.display()))?;

    let metadata = &report.dataset.metadata_columns;
    let mut written = Vec::new();

    if let Some(Ok(run)) = &report.initial {
        let path = output_dir.join(INITIAL_CSV);
        write_csv_file(&path, &run.results, metadata)?;
        written.push(path);
    }

    if let Some(Ok(run)) = &report.continuous {
        let path = output_dir.join(CONTINUOUS_CSV);
        write_csv_file(&path, &run.results, metadata)?;
        written.push(path);

        let path = output_dir.join(CONTINUOUS_CLEAN_CSV);
        write_csv_file(&path, &run.results, &[])?;
        written.push(path);
    }

    let summary = SummaryFile {
        seed: report.seed,
        records: report.dataset.len(),
        column_mapping: &report.dataset.mapping,
        dropped_rows: &report.dataset.dropped,
        initial_recombination: ComparatorSummary::from_outcome(&report.initial),
        continuous_beam: ComparatorSummary::from_outcome(&report.continuous),
    };
    let path = output_dir.join(SUMMARY_JSON);
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(file, &summary).context("writing summary JSON")?;
    info!("Saved: {}", path.display());
    written.push(path);

    Ok(written)
}

/// Log a run summary in the same shape as the summary file.
pub fn log_summary(run: &ComparisonRun) {
    let s = run.summary();
    info!(
        "{}: {}/{} successful ({} failed, {} cancelled)",
        run.comparator, s.count_success, s.count_total, s.count_failed, s.count_cancelled
    );
    let fmt = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |x| format!("{x:.3}"));
    let rel = &s.relative_error_pct;
    info!("  Mean relative error: {}%", fmt(rel.mean));
    info!("  Median relative error: {}%", fmt(rel.median));
    info!("  Min / max relative error: {}% / {}%", fmt(rel.min), fmt(rel.max));
    info!("  Standard deviation: {}%", fmt(rel.std_dev));
    info!(
        "  Mean absolute error: {}",
        s.absolute_error
            .mean
            .map_or_else(|| "n/a".to_string(), |x| format!("{x:.6}"))
    );
}
