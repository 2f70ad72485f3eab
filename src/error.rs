use thiserror::Error;

use crate::data::columns::CanonicalField;

/// Schema and dataset errors. These fail fast, before any simulation runs.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("could not find {field} column; tried: {searched:?}")]
    ColumnNotFound {
        field: CanonicalField,
        searched: Vec<String>,
    },

    #[error("no valid rows in dataset ({dropped} rows dropped during validation)")]
    EmptyDataset { dropped: usize },

    #[error("unsupported file extension: .{0}")]
    UnsupportedFormat(String),
}

/// A single simulator call failed. Never fatal on its own: the invoker turns
/// it into [`SimulationOutcome::Failure`](crate::sim::SimulationOutcome).
#[derive(Debug, Clone, Error)]
pub enum SimulationError {
    #[error("non-physical parameters: {0}")]
    NonPhysical(String),

    #[error("numerical non-convergence: {0}")]
    NonConvergence(String),

    #[error("simulation backend unavailable: {0}")]
    Unavailable(String),

    #[error("invalid simulator output: {0}")]
    InvalidOutput(String),

    #[error("simulator panicked: {0}")]
    Panicked(String),
}

/// Fatal to one comparator only; the other comparator proceeds independently.
#[derive(Debug, Error)]
pub enum ComparisonError {
    #[error("failed to calculate any results for {comparator} ({failed} of {total} simulations failed)")]
    NoResults {
        comparator: &'static str,
        total: usize,
        failed: usize,
    },

    #[error("{comparator} comparison cancelled before any result was produced")]
    Cancelled { comparator: &'static str },
}
