use anyhow::{Context, Result};
use log::{info, warn};
use rand::Rng;

use crate::compare::continuous::compare_continuous;
use crate::compare::initial::compare_initial;
use crate::compare::{CancelToken, ComparisonRun};
use crate::config::{ComparisonConfig, SimulatorConfig};
use crate::data::loader::load_experimental_data;
use crate::data::model::ExperimentalDataset;
use crate::error::ComparisonError;
use crate::sim::{CachedSimulator, CommandSimulator, PrecomputedSimulator, Simulator};

/// Everything one comparison run produced.
#[derive(Debug)]
pub struct RunReport {
    pub dataset: ExperimentalDataset,
    /// Base seed handed to every simulation request.
    pub seed: u64,
    /// `None` when the comparison was disabled.
    pub initial: Option<Result<ComparisonRun, ComparisonError>>,
    pub continuous: Option<Result<ComparisonRun, ComparisonError>>,
}

impl RunReport {
    /// Whether every enabled comparator produced results.
    pub fn is_success(&self) -> bool {
        [&self.initial, &self.continuous]
            .into_iter()
            .flatten()
            .all(|r| r.is_ok())
    }
}

/// Build the configured engine, memoized for the run.
pub fn build_simulator(config: &SimulatorConfig) -> Result<Box<dyn Simulator>> {
    let simulator: Box<dyn Simulator> = match config {
        SimulatorConfig::Command { program, args } => {
            Box::new(CachedSimulator::new(CommandSimulator::new(program.clone(), args.clone())))
        }
        SimulatorConfig::Precomputed { path } => {
            Box::new(CachedSimulator::new(PrecomputedSimulator::from_file(path)?))
        }
    };
    info!("Simulator: {}", simulator.name());
    Ok(simulator)
}

/// Runs the enabled comparisons of one configuration.
pub struct ComparisonRunner {
    config: ComparisonConfig,
    cancel: CancelToken,
}

impl ComparisonRunner {
    pub fn new(config: ComparisonConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn config(&self) -> &ComparisonConfig {
        &self.config
    }

    /// Handle to stop scheduling new simulations.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Load the dataset, build the configured simulator and run.
    ///
    /// Schema problems surface here, before any simulation starts.
    pub fn run(&self) -> Result<RunReport> {
        let dataset = load_experimental_data(
            &self.config.experimental_data_path,
            &self.config.column_overrides(),
            self.config.compare_continuous_beam,
        )?;
        let simulator = build_simulator(&self.config.simulator)?;
        self.run_with(dataset, simulator.as_ref())
    }

    /// Run against an already loaded dataset and a given simulator.
    ///
    /// The two comparators run concurrently on one bounded pool; each fails
    /// independently of the other.
    pub fn run_with(
        &self,
        dataset: ExperimentalDataset,
        simulator: &dyn Simulator,
    ) -> Result<RunReport> {
        let seed = self
            .config
            .simulation
            .seed
            .unwrap_or_else(|| rand::thread_rng().gen_range(1..10_000_000));
        info!("Base seed: {seed}");
        let template = self.config.simulation.request_template(seed);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers.unwrap_or(0))
            .thread_name(|i| format!("ks-sim-{i}"))
            .build()
            .context("building simulation worker pool")?;
        info!("Simulation workers: {}", pool.current_num_threads());

        let records = &dataset.records;
        let (initial, continuous) = pool.install(|| {
            rayon::join(
                || {
                    self.config
                        .compare_initial_recombination
                        .then(|| compare_initial(records, &template, simulator, &self.cancel))
                },
                || {
                    self.config
                        .compare_continuous_beam
                        .then(|| compare_continuous(records, &template, simulator, &self.cancel))
                },
            )
        });

        for result in [&initial, &continuous].into_iter().flatten() {
            if let Err(e) = result {
                warn!("{e}");
            }
        }

        Ok(RunReport {
            dataset,
            seed,
            initial,
            continuous,
        })
    }
}
