use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{DataType, Float32Type, Float64Type, Int32Type, Int64Type};
use log::{debug, info, warn};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::columns::{CanonicalField, ColumnMapping, ColumnOverrides, resolve_columns};
use super::model::{DroppedRow, ExperimentalDataset, ExperimentalRecord, MetadataValue, RawTable};
use crate::error::DataError;

/// Seconds per minute. Dose rates arrive in Gy/s and are stored in Gy/min.
pub const SECONDS_PER_MINUTE: f64 = 60.0;

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Read, resolve and validate an experimental dataset in one go.
///
/// Column resolution happens before any row is inspected, so a schema
/// mistake surfaces as [`DataError::ColumnNotFound`] immediately.
pub fn load_experimental_data(
    path: &Path,
    overrides: &ColumnOverrides,
    require_dose_rate: bool,
) -> Result<ExperimentalDataset> {
    if !path.exists() {
        bail!("Experimental data file not found: {}", path.display());
    }
    let table = load_table(path)?;
    let mapping = resolve_columns(&table.columns, overrides, require_dose_rate)?;
    let dataset = build_dataset(&table, mapping)?;

    info!(
        "Loaded {} experimental measurements from {}",
        dataset.len(),
        path.display()
    );
    info!("  Energy column: {}", dataset.mapping.energy);
    info!("  k_s column: {}", dataset.mapping.ks);
    match &dataset.mapping.dose_rate {
        Some(d) => match d.medium {
            Some(medium) => info!("  Dose rate column: {} ({medium}, Gy/s)", d.name),
            None => info!("  Dose rate column: {} (Gy/s)", d.name),
        },
        None => info!("  Dose rate column: <none>"),
    }
    info!("  Energies: {:?} MeV", dataset.energies());

    Ok(dataset)
}

/// Load a raw table from a file. Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row, one measurement per line
/// * `.json`    – `[{ "Energy_MeV": 150, "k_s": 1.002, ... }, ...]`
/// * `.parquet` – flat scalar columns (Pandas / Polars output)
pub fn load_table(path: &Path) -> Result<RawTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "csv" => load_csv(path),
        "json" => load_json(path),
        "parquet" | "pq" => load_parquet(path),
        other => Err(DataError::UnsupportedFormat(other.to_string()).into()),
    }
}

// ---------------------------------------------------------------------------
// Canonicalisation
// ---------------------------------------------------------------------------

/// Turn raw rows into canonical records using a resolved mapping.
///
/// Rows with a missing, non-numeric or out-of-domain required value are
/// dropped and logged. Fails only if no row survives.
pub fn build_dataset(
    table: &RawTable,
    mapping: ColumnMapping,
) -> Result<ExperimentalDataset, DataError> {
    let metadata_columns: Vec<String> = table
        .columns
        .iter()
        .filter(|c| !mapping.is_mapped(c))
        .cloned()
        .collect();

    let mut records = Vec::with_capacity(table.len());
    let mut dropped = Vec::new();

    for (row_no, row) in table.rows.iter().enumerate() {
        match canonical_record(row_no, row, &mapping) {
            Ok(record) => records.push(record),
            Err(reason) => {
                warn!("Skipping row {row_no}: {reason}");
                dropped.push(DroppedRow {
                    row: row_no,
                    reason,
                });
            }
        }
    }

    if records.is_empty() {
        return Err(DataError::EmptyDataset {
            dropped: dropped.len(),
        });
    }
    if !dropped.is_empty() {
        info!(
            "Dropped {} of {} rows during validation",
            dropped.len(),
            table.len()
        );
    }

    Ok(ExperimentalDataset {
        records,
        mapping,
        metadata_columns,
        dropped,
    })
}

fn canonical_record(
    row_no: usize,
    row: &BTreeMap<String, MetadataValue>,
    mapping: &ColumnMapping,
) -> std::result::Result<ExperimentalRecord, String> {
    let number = |field: CanonicalField| -> std::result::Result<Option<f64>, String> {
        let Some(column) = mapping.column(field) else {
            return Ok(None);
        };
        match row.get(column) {
            None | Some(MetadataValue::Null) => Err(format!("missing {field} ('{column}')")),
            Some(value) => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| format!("{field} ('{column}') is not a finite number: '{value}'")),
        }
    };

    let energy_mev = number(CanonicalField::Energy)?.unwrap_or(f64::NAN);
    let k_s = number(CanonicalField::Ks)?.unwrap_or(f64::NAN);
    let dose_rate_gy_s = number(CanonicalField::DoseRate)?;

    if energy_mev.is_nan() || energy_mev <= 0.0 {
        return Err(format!("energy must be positive, got {energy_mev}"));
    }
    if k_s.is_nan() || k_s <= 0.0 {
        return Err(format!("k_s must be positive, got {k_s}"));
    }
    if let Some(d) = dose_rate_gy_s {
        if d < 0.0 {
            return Err(format!("dose rate must be non-negative, got {d}"));
        }
    }

    let metadata = row
        .iter()
        .filter(|(col, _)| !mapping.is_mapped(col))
        .map(|(col, val)| (col.clone(), val.clone()))
        .collect();

    debug!("Row {row_no}: E={energy_mev} MeV, k_s={k_s}, dose rate={dose_rate_gy_s:?} Gy/s");

    Ok(ExperimentalRecord {
        row: row_no,
        energy_mev,
        dose_rate_gy_min: dose_rate_gy_s.map(|d| d * SECONDS_PER_MINUTE),
        k_s,
        metadata,
    })
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names, one measurement per line.
/// Cell types are inferred per cell; empty cells become `Null`.
fn load_csv(path: &Path) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut table = RawTable::new(headers.clone());

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        table.push_row(
            headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.clone(), guess_cell_type(record.get(i).unwrap_or("")))),
        );
    }

    Ok(table)
}

fn guess_cell_type(s: &str) -> MetadataValue {
    if s.is_empty() {
        return MetadataValue::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return MetadataValue::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return MetadataValue::Float(f);
    }
    if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false") {
        return MetadataValue::Bool(s.eq_ignore_ascii_case("true"));
    }
    MetadataValue::String(s.to_string())
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "Energy_MeV": 150.0, "k_s": 1.0025, "dose_rate_air_Gy_s": 1.866 },
///   ...
/// ]
/// ```
fn load_json(path: &Path) -> Result<RawTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root.as_array().context("Expected top-level JSON array")?;

    let mut table = RawTable::default();

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        for key in obj.keys() {
            if !table.columns.contains(key) {
                table.columns.push(key.clone());
            }
        }
        table.push_row(obj.iter().map(|(k, v)| (k.clone(), json_to_cell(v))));
    }

    Ok(table)
}

fn json_to_cell(val: &JsonValue) -> MetadataValue {
    match val {
        JsonValue::String(s) => MetadataValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                MetadataValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                MetadataValue::Float(f)
            } else {
                MetadataValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => MetadataValue::Bool(*b),
        JsonValue::Null => MetadataValue::Null,
        other => MetadataValue::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file with flat scalar columns. Works with files written by
/// both **Pandas** (`df.to_parquet()`) and **Polars** (`df.write_parquet()`).
fn load_parquet(path: &Path) -> Result<RawTable> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let columns: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build().context("building parquet reader")?;

    let mut table = RawTable::new(columns.clone());

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        for row in 0..batch.num_rows() {
            table.push_row(
                columns
                    .iter()
                    .enumerate()
                    .map(|(i, name)| (name.clone(), extract_cell(batch.column(i), row))),
            );
        }
    }

    Ok(table)
}

/// Extract a single scalar from an Arrow column at a given row.
fn extract_cell(col: &ArrayRef, row: usize) -> MetadataValue {
    if col.is_null(row) {
        return MetadataValue::Null;
    }
    match col.data_type() {
        DataType::Utf8 => MetadataValue::String(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => {
            MetadataValue::String(col.as_string::<i64>().value(row).to_string())
        }
        DataType::Int32 => MetadataValue::Integer(col.as_primitive::<Int32Type>().value(row) as i64),
        DataType::Int64 => MetadataValue::Integer(col.as_primitive::<Int64Type>().value(row)),
        DataType::Float32 => {
            MetadataValue::Float(col.as_primitive::<Float32Type>().value(row) as f64)
        }
        DataType::Float64 => MetadataValue::Float(col.as_primitive::<Float64Type>().value(row)),
        DataType::Boolean => MetadataValue::Bool(col.as_boolean().value(row)),
        other => MetadataValue::String(format!("{other:?}")),
    }
}
