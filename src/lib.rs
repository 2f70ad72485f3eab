//! Reconcile measured ion-recombination correction factors (k_s) of
//! ionization chambers with track-structure simulations.
//!
//! Pipeline:
//! ```text
//!  experimental table ──► data::loader ──► ExperimentalDataset
//!                                              │
//!                     ┌────────────────────────┴────────────────────────┐
//!                     ▼                                                 ▼
//!      compare::initial (per energy,                  compare::continuous (per record,
//!        single track)                                  exact dose rate)
//!                     │                                                 │
//!                     └──────────► ComparisonRun ──► StatisticsSummary ◄┘
//! ```

pub mod compare;
pub mod config;
pub mod data;
pub mod error;
pub mod report;
pub mod runner;
pub mod sim;

pub use compare::{CancelToken, ComparisonResult, ComparisonRun, StatisticsSummary};
pub use config::{ComparisonConfig, SimulationConfig, SimulatorConfig, load_config};
pub use error::{ComparisonError, DataError, SimulationError};
pub use runner::{ComparisonRunner, RunReport};
pub use sim::{SimulationOutcome, SimulationRequest, Simulator};
