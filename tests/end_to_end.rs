use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use ks_compare::compare::SkipReason;
use ks_compare::config::{ComparisonConfig, SimulatorConfig, load_config};
use ks_compare::data::columns::{CanonicalField, ColumnOverrides, Medium};
use ks_compare::data::loader::load_experimental_data;
use ks_compare::data::model::MetadataValue;
use ks_compare::report::{CONTINUOUS_CLEAN_CSV, CONTINUOUS_CSV, INITIAL_CSV, SUMMARY_JSON, save_results};
use ks_compare::sim::TrackMode;
use ks_compare::{ComparisonError, ComparisonRunner, DataError, SimulationError, SimulationRequest};

const DCPT_CSV: &str = "\
Energy_MeV,dose_rate_air_Gy_s,dose_rate_water_Gy_s,k_s,chamber
150,3.665,4.16,1.0041,PPC05
150,1.866,2.12,1.0025,PPC05
226,5.61,6.37,1.0048,PPC40
";

fn write(dir: &Path, name: &str, text: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

fn config_for(data: &Path) -> ComparisonConfig {
    let mut config = ComparisonConfig::new(data);
    config.simulation.seed = Some(1234);
    config.workers = Some(2);
    config
}

#[test]
fn full_run_with_closure_simulator() {
    let dir = tempfile::tempdir().unwrap();
    let data = write(dir.path(), "data.csv", DCPT_CSV);
    let config = config_for(&data);

    let dataset = load_experimental_data(&data, &config.column_overrides(), true).unwrap();
    assert_eq!(dataset.mapping.dose_rate.as_ref().unwrap().medium, Some(Medium::Air));
    assert_eq!(dataset.records[1].dose_rate_gy_min, Some(1.866 * 60.0));

    let sim = |req: &SimulationRequest| -> Result<f64, SimulationError> {
        assert_eq!(req.seed, Some(1234));
        match req.mode {
            TrackMode::SingleTrack => Ok(1.0050),
            TrackMode::ContinuousBeam { dose_rate_gy_min } => Ok(1.0 + dose_rate_gy_min / 1e5),
        }
    };

    let runner = ComparisonRunner::new(config);
    let report = runner.run_with(dataset, &sim).unwrap();
    assert!(report.is_success());
    assert_eq!(report.seed, 1234);

    let initial = report.initial.as_ref().unwrap().as_ref().unwrap();
    let rows: Vec<usize> = initial.results.iter().map(|r| r.record.row).collect();
    assert_eq!(rows, vec![1, 2]);
    assert!((initial.results[0].relative_error_pct - 0.2494).abs() < 1e-4);

    let continuous = report.continuous.as_ref().unwrap().as_ref().unwrap();
    assert_eq!(continuous.count_success(), 3);
    let first = &continuous.results[0];
    assert_eq!(
        first.record.metadata.get("chamber"),
        Some(&MetadataValue::String("PPC05".into()))
    );
    // Non-preferred medium is carried through untouched.
    assert_eq!(
        first.record.metadata.get("dose_rate_water_Gy_s"),
        Some(&MetadataValue::Float(4.16))
    );

    let out = dir.path().join("results");
    let written = save_results(&out, &report).unwrap();
    assert_eq!(written.len(), 4);
    for name in [INITIAL_CSV, CONTINUOUS_CSV, CONTINUOUS_CLEAN_CSV, SUMMARY_JSON] {
        assert!(out.join(name).exists(), "{name} missing");
    }

    let full = std::fs::read_to_string(out.join(CONTINUOUS_CSV)).unwrap();
    assert!(full.lines().next().unwrap().ends_with("relative_error_%,dose_rate_water_Gy_s,chamber"));
    assert_eq!(full.lines().count(), 4);
    let clean = std::fs::read_to_string(out.join(CONTINUOUS_CLEAN_CSV)).unwrap();
    assert!(clean.lines().next().unwrap().ends_with("relative_error_%"));

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join(SUMMARY_JSON)).unwrap()).unwrap();
    assert_eq!(summary["continuous_beam"]["summary"]["count_success"], 3);
    assert_eq!(summary["initial_recombination"]["summary"]["count_total"], 2);
}

#[test]
fn missing_energy_column_fails_before_simulating() {
    let dir = tempfile::tempdir().unwrap();
    let data = write(dir.path(), "data.csv", "beam,k_s,dose_rate_air\n150,1.002,1.0\n");

    let err = load_experimental_data(&data, &ColumnOverrides::default(), true).unwrap_err();
    match err.downcast_ref::<DataError>() {
        Some(DataError::ColumnNotFound { field, searched }) => {
            assert_eq!(*field, CanonicalField::Energy);
            assert!(searched.contains(&"E_MeV".to_string()));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // The runner surfaces the same error without building a simulator.
    let mut config = config_for(&data);
    config.simulator = SimulatorConfig::Precomputed {
        path: dir.path().join("does-not-exist.csv"),
    };
    let err = ComparisonRunner::new(config).run().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DataError>(),
        Some(DataError::ColumnNotFound { .. })
    ));
}

#[test]
fn comparators_fail_independently() {
    let dir = tempfile::tempdir().unwrap();
    let data = write(dir.path(), "data.csv", DCPT_CSV);
    let config = config_for(&data);
    let dataset = load_experimental_data(&data, &config.column_overrides(), true).unwrap();

    let sim = |req: &SimulationRequest| -> Result<f64, SimulationError> {
        match req.mode {
            TrackMode::SingleTrack => Ok(1.003),
            TrackMode::ContinuousBeam { .. } => {
                Err(SimulationError::Unavailable("GPU backend missing".into()))
            }
        }
    };
    let report = ComparisonRunner::new(config).run_with(dataset, &sim).unwrap();

    assert!(report.initial.as_ref().unwrap().is_ok());
    assert!(matches!(
        report.continuous,
        Some(Err(ComparisonError::NoResults {
            total: 3,
            failed: 3,
            ..
        }))
    ));
    assert!(!report.is_success());

    let out = dir.path().join("out");
    let written = save_results(&out, &report).unwrap();
    assert_eq!(written.len(), 2);
    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join(SUMMARY_JSON)).unwrap()).unwrap();
    assert!(summary["continuous_beam"]["error"]
        .as_str()
        .unwrap()
        .contains("failed to calculate any results"));
}

#[test]
fn disabled_comparison_is_not_run() {
    let dir = tempfile::tempdir().unwrap();
    // No dose-rate column at all: fine when only initial recombination runs.
    let data = write(dir.path(), "data.csv", "E_MeV,ks\n150,1.002\n150,1.004\n");
    let mut config = config_for(&data);
    config.compare_continuous_beam = false;

    let dataset = load_experimental_data(&data, &config.column_overrides(), false).unwrap();
    assert!(dataset.mapping.dose_rate.is_none());

    let calls = AtomicUsize::new(0);
    let sim = |_: &SimulationRequest| -> Result<f64, SimulationError> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(1.001)
    };
    let report = ComparisonRunner::new(config).run_with(dataset, &sim).unwrap();

    assert!(report.continuous.is_none());
    let initial = report.initial.unwrap().unwrap();
    assert_eq!(initial.results.len(), 1);
    assert_eq!(initial.results[0].record.row, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn yaml_config_with_precomputed_simulator() {
    let dir = tempfile::tempdir().unwrap();
    let data = write(dir.path(), "data.csv", DCPT_CSV);
    // 226 MeV at its dose rate is deliberately missing.
    let sim_table = write(
        dir.path(),
        "sim.csv",
        "E_MeV,dose_rate_Gy_min,k_s\n150,,1.0030\n226,,1.0040\n150,219.9,1.0045\n150,111.96,1.0031\n",
    );
    let out = dir.path().join("results");
    let yaml = format!(
        "experimental_data_path: {}\noutput_dir: {}\nsimulation:\n  seed: 5\nsimulator:\n  kind: precomputed\n  path: {}\n",
        data.display(),
        out.display(),
        sim_table.display()
    );
    let config_path = write(dir.path(), "config.yaml", &yaml);

    let config = load_config(&config_path).unwrap();
    let runner = ComparisonRunner::new(config);
    let report = runner.run().unwrap();

    let continuous = report.continuous.as_ref().unwrap().as_ref().unwrap();
    assert_eq!(continuous.count_success(), 2);
    assert_eq!(continuous.count_failed(), 1);
    assert_eq!(continuous.skipped[0].row, 2);
    assert!(matches!(continuous.skipped[0].reason, SkipReason::SimulationFailed(_)));

    let summary = continuous.summary();
    assert_eq!(summary.count_total, 3);
    assert!(summary.relative_error_pct.std_dev.is_some());

    let initial = report.initial.as_ref().unwrap().as_ref().unwrap();
    assert_eq!(initial.count_success(), 2);

    save_results(&runner.config().output_dir, &report).unwrap();
    assert!(out.join(SUMMARY_JSON).exists());
}

#[test]
fn json_and_parquet_inputs() {
    let dir = tempfile::tempdir().unwrap();

    let json = write(
        dir.path(),
        "data.json",
        r#"[
            {"energy": 150.0, "collection_efficiency": 1.002, "dose_rate_water": 2.1, "note": "a"},
            {"energy": 226, "collection_efficiency": 1.004, "dose_rate_water": 6.4, "note": null}
        ]"#,
    );
    let ds = load_experimental_data(&json, &ColumnOverrides::default(), true).unwrap();
    assert_eq!(ds.len(), 2);
    assert_eq!(ds.mapping.dose_rate.as_ref().unwrap().medium, Some(Medium::Water));
    assert_eq!(ds.records[1].energy_mev, 226.0);
    assert_eq!(ds.records[1].metadata.get("note"), Some(&MetadataValue::Null));

    let schema = Arc::new(Schema::new(vec![
        Field::new("E_MeV", DataType::Float64, false),
        Field::new("k_s", DataType::Float64, true),
        Field::new("doserate_air_Gy_s", DataType::Float64, false),
        Field::new("operator", DataType::Utf8, false),
    ]));
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Float64Array::from(vec![150.0, 226.0])),
        Arc::new(Float64Array::from(vec![Some(1.002), None])),
        Arc::new(Float64Array::from(vec![1.0, 2.0])),
        Arc::new(StringArray::from(vec!["Alice", "Bob"])),
    ];
    let batch = RecordBatch::try_new(schema.clone(), columns).unwrap();
    let parquet_path = dir.path().join("data.parquet");
    let file = std::fs::File::create(&parquet_path).unwrap();
    let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();

    let ds = load_experimental_data(&parquet_path, &ColumnOverrides::default(), true).unwrap();
    // Row 1 has a null k_s and is dropped.
    assert_eq!(ds.len(), 1);
    assert_eq!(ds.dropped.len(), 1);
    assert_eq!(ds.records[0].dose_rate_gy_min, Some(60.0));
    assert_eq!(
        ds.records[0].metadata.get("operator"),
        Some(&MetadataValue::String("Alice".into()))
    );
}

#[test]
fn all_rows_invalid_is_empty_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let data = write(dir.path(), "data.csv", "E_MeV,k_s,dose_rate_air\n-1,1.0,1.0\n150,,1.0\n");
    let err = load_experimental_data(&data, &ColumnOverrides::default(), true).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DataError>(),
        Some(DataError::EmptyDataset { dropped: 2 })
    ));
}
