use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use ks_compare::config::{load_config, save_config_template};
use ks_compare::report::{log_summary, save_results};
use ks_compare::runner::ComparisonRunner;

#[derive(Parser, Debug)]
#[command(name = "ks-compare")]
#[command(about = "Compare experimental k_s measurements with track-structure simulations")]
struct Args {
    /// Path to the configuration YAML file
    config: Option<PathBuf>,

    /// Create a template configuration file at the given path and exit
    #[arg(long, value_name = "PATH")]
    create_template: Option<PathBuf>,

    /// Override the output directory from the configuration
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// `Ok(false)` when an enabled comparison produced no results.
fn run(args: Args) -> Result<bool> {
    if let Some(path) = args.create_template {
        save_config_template(&path)?;
        info!("Created template configuration at: {}", path.display());
        return Ok(true);
    }

    let Some(config_path) = args.config else {
        anyhow::bail!("a configuration file is required (or use --create-template)");
    };
    let mut config = load_config(&config_path)
        .with_context(|| format!("loading configuration {}", config_path.display()))?;
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }

    info!("Experimental data: {}", config.experimental_data_path.display());
    info!("Output directory: {}", config.output_dir.display());
    info!("Backend: {:?}", config.simulation.backend);
    info!("Voltage: {} V", config.simulation.voltage_v);
    info!("Electrode gap: {} cm", config.simulation.electrode_gap_cm);
    info!("Particle: {}", config.simulation.particle);

    let output_dir = config.output_dir.clone();
    let runner = ComparisonRunner::new(config);
    let report = runner.run()?;

    for run in [&report.initial, &report.continuous]
        .into_iter()
        .flatten()
        .flat_map(|r| r.as_ref().ok())
    {
        log_summary(run);
    }

    save_results(&output_dir, &report)?;

    if report.is_success() {
        info!("Comparison completed successfully");
    } else {
        error!("Comparison finished with failures; see summary.json");
    }
    Ok(report.is_success())
}
