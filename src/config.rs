use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail, ensure};
use serde::{Deserialize, Serialize};

use crate::data::columns::ColumnOverrides;
use crate::sim::{Backend, PhysicsParams, RddModel, RequestTemplate};

// ---------------------------------------------------------------------------
// Simulation parameters
// ---------------------------------------------------------------------------

/// Physical and numerical parameters handed to the engine with every request.
/// Key names follow the engine's own parameter names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub backend: Backend,
    #[serde(rename = "voltage_V")]
    pub voltage_v: f64,
    pub electrode_gap_cm: f64,
    pub particle: String,
    #[serde(rename = "RDD_model")]
    pub rdd_model: RddModel,
    pub grid_size_um: f64,
    pub a0_nm: f64,
    pub use_beta: bool,
    /// `None` draws a random base seed per run.
    pub seed: Option<u64>,
    pub debug: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Cython,
            voltage_v: 200.0,
            electrode_gap_cm: 0.2,
            particle: "proton".to_string(),
            rdd_model: RddModel::Gauss,
            grid_size_um: 5.0,
            a0_nm: 8.0,
            use_beta: false,
            seed: None,
            debug: false,
        }
    }
}

impl SimulationConfig {
    pub fn physics(&self) -> PhysicsParams {
        PhysicsParams {
            voltage_v: self.voltage_v,
            electrode_gap_cm: self.electrode_gap_cm,
            particle: self.particle.clone(),
            rdd_model: self.rdd_model,
            grid_size_um: self.grid_size_um,
            a0_nm: self.a0_nm,
            use_beta: self.use_beta,
        }
    }

    /// Request template for one run, using `seed` as the run's base seed.
    pub fn request_template(&self, seed: u64) -> RequestTemplate {
        RequestTemplate {
            physics: self.physics(),
            backend: self.backend,
            seed: Some(seed),
            debug: self.debug,
        }
    }
}

// ---------------------------------------------------------------------------
// Simulator selection
// ---------------------------------------------------------------------------

/// Which engine implementation serves the requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SimulatorConfig {
    /// External program speaking JSON over stdin/stdout.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Table of earlier simulation output.
    Precomputed { path: PathBuf },
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig::Command {
            program: "ks-engine".to_string(),
            args: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level configuration
// ---------------------------------------------------------------------------

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonConfig {
    pub experimental_data_path: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,

    #[serde(default = "enabled")]
    pub compare_initial_recombination: bool,
    #[serde(default = "enabled")]
    pub compare_continuous_beam: bool,

    /// Explicit column names; `None` auto-detects.
    #[serde(default)]
    pub dose_rate_column: Option<String>,
    #[serde(default)]
    pub energy_column: Option<String>,
    #[serde(default)]
    pub ks_column: Option<String>,

    /// Worker threads for simulations; `None` uses every available core.
    #[serde(default)]
    pub workers: Option<usize>,
}

impl ComparisonConfig {
    pub fn new(experimental_data_path: impl Into<PathBuf>) -> Self {
        Self {
            experimental_data_path: experimental_data_path.into(),
            output_dir: default_output_dir(),
            simulation: SimulationConfig::default(),
            simulator: SimulatorConfig::default(),
            compare_initial_recombination: true,
            compare_continuous_beam: true,
            dose_rate_column: None,
            energy_column: None,
            ks_column: None,
            workers: None,
        }
    }

    pub fn column_overrides(&self) -> ColumnOverrides {
        ColumnOverrides {
            energy: self.energy_column.clone(),
            ks: self.ks_column.clone(),
            dose_rate: self.dose_rate_column.clone(),
        }
    }

    /// Reject settings no simulation could accept.
    pub fn validate(&self) -> Result<()> {
        let sim = &self.simulation;
        ensure!(sim.voltage_v > 0.0, "voltage_V must be positive, got {}", sim.voltage_v);
        ensure!(
            sim.electrode_gap_cm > 0.0,
            "electrode_gap_cm must be positive, got {}",
            sim.electrode_gap_cm
        );
        ensure!(sim.grid_size_um > 0.0, "grid_size_um must be positive, got {}", sim.grid_size_um);
        ensure!(sim.a0_nm > 0.0, "a0_nm must be positive, got {}", sim.a0_nm);
        ensure!(!sim.particle.trim().is_empty(), "particle must not be empty");
        if self.workers == Some(0) {
            bail!("workers must be at least 1");
        }
        if !self.compare_initial_recombination && !self.compare_continuous_beam {
            bail!("both comparisons are disabled; nothing to do");
        }
        Ok(())
    }
}

/// Load and validate a YAML configuration file.
pub fn load_config(path: &Path) -> Result<ComparisonConfig> {
    if !path.exists() {
        bail!("Configuration file not found: {}", path.display());
    }
    let text = std::fs::read_to_string(path).context("reading configuration")?;
    let config: ComparisonConfig = serde_yaml::from_str(&text)
        .with_context(|| format!("parsing configuration {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Write a template configuration with every option at its default.
pub fn save_config_template(path: &Path) -> Result<()> {
    let template = ComparisonConfig::new("path/to/experimental_data.csv");
    let body = serde_yaml::to_string(&template).context("serializing template")?;
    let text = format!(
        "# k_s comparison configuration\n\
         # simulation.backend: cython | python | numba | cupy | parallel\n\
         # simulation.RDD_model: Gauss | Geiss\n\
         # simulator.kind: command (program + args) | precomputed (path)\n\
         # *_column: null = auto-detect\n\
         {body}"
    );
    std::fs::write(path, text)
        .with_context(|| format!("writing template to {}", path.display()))?;
    Ok(())
}
