use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use clap::Parser;
use parquet::arrow::ArrowWriter;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Water-to-air dose ratio used for the synthetic water column.
const WATER_TO_AIR: f64 = 1.135;

#[derive(Parser, Debug)]
#[command(name = "generate_sample")]
#[command(about = "Write a synthetic experimental k_s dataset")]
struct Args {
    /// Output file; the extension (.csv or .parquet) selects the format
    #[arg(long, default_value = "sample_data.csv")]
    out: PathBuf,

    #[arg(long, default_value = "42")]
    seed: u64,
}

/// One synthetic measurement row.
struct Row {
    energy_mev: f64,
    dose_rate_air_gy_s: f64,
    k_s: f64,
    chamber: &'static str,
    operator: &'static str,
    measurement_id: i64,
}

/// Box-Muller transform for normal distribution
fn gauss(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-15);
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}

fn generate(seed: u64) -> Vec<Row> {
    let mut rng = StdRng::seed_from_u64(seed);

    let energies: [f64; 3] = [70.0, 150.0, 226.0];
    let dose_rates: [f64; 5] = [0.5, 1.866, 3.665, 5.61, 10.0];
    let chambers = ["PPC05", "PPC40"];
    let operators = ["Alice", "Bob"];

    let mut rows = Vec::new();
    let mut id: i64 = 0;
    for &energy in &energies {
        // Initial recombination shrinks with energy (sparser tracks).
        let initial = 0.002 * (150.0 / energy).sqrt();
        for &dose_rate in &dose_rates {
            for (i, &chamber) in chambers.iter().enumerate() {
                let general = 0.0008 * dose_rate * (1.0 + i as f64);
                let k_s = 1.0 + initial + general + gauss(&mut rng, 0.0, 0.0002);
                rows.push(Row {
                    energy_mev: energy,
                    dose_rate_air_gy_s: dose_rate,
                    k_s,
                    chamber,
                    operator: operators[id as usize % operators.len()],
                    measurement_id: id,
                });
                id += 1;
            }
        }
    }
    rows
}

fn write_csv(path: &PathBuf, rows: &[Row]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("creating CSV")?;
    writer.write_record([
        "Energy_MeV",
        "dose_rate_air_Gy_s",
        "dose_rate_water_Gy_s",
        "k_s",
        "chamber",
        "operator",
        "measurement_id",
    ])?;
    for r in rows {
        writer.write_record([
            r.energy_mev.to_string(),
            r.dose_rate_air_gy_s.to_string(),
            (r.dose_rate_air_gy_s * WATER_TO_AIR).to_string(),
            format!("{:.6}", r.k_s),
            r.chamber.to_string(),
            r.operator.to_string(),
            r.measurement_id.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_parquet(path: &PathBuf, rows: &[Row]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("Energy_MeV", DataType::Float64, false),
        Field::new("dose_rate_air_Gy_s", DataType::Float64, false),
        Field::new("dose_rate_water_Gy_s", DataType::Float64, false),
        Field::new("k_s", DataType::Float64, false),
        Field::new("chamber", DataType::Utf8, false),
        Field::new("operator", DataType::Utf8, false),
        Field::new("measurement_id", DataType::Int64, false),
    ]));

    let columns: Vec<ArrayRef> = vec![
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.energy_mev))),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.dose_rate_air_gy_s))),
        Arc::new(Float64Array::from_iter_values(
            rows.iter().map(|r| r.dose_rate_air_gy_s * WATER_TO_AIR),
        )),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.k_s))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.chamber))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.operator))),
        Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.measurement_id))),
    ];
    let batch = RecordBatch::try_new(schema.clone(), columns).context("building record batch")?;

    let file = std::fs::File::create(path).context("creating output file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating writer")?;
    writer.write(&batch).context("writing batch")?;
    writer.close().context("closing writer")?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let rows = generate(args.seed);
    let ext = args
        .out
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "csv" => write_csv(&args.out, &rows)?,
        "parquet" | "pq" => write_parquet(&args.out, &rows)?,
        other => bail!("Unsupported output extension: .{other}"),
    }

    println!("Wrote {} measurements to {}", rows.len(), args.out.display());
    Ok(())
}
