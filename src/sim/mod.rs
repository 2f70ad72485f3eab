//! Simulator boundary.
//!
//! The comparators only ever see [`Simulator::invoke`], which turns every kind of
//! simulator failure into a [`SimulationOutcome::Failure`]. Concrete engines
//! implement [`Simulator`] and are selected by configuration.

pub mod cache;
pub mod command;
pub mod precomputed;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::SimulationError;

pub use cache::CachedSimulator;
pub use command::CommandSimulator;
pub use precomputed::PrecomputedSimulator;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Execution backend of the external engine. Passed through opaquely; the
/// comparison results must not depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Cython,
    Python,
    Numba,
    Cupy,
    Parallel,
}

/// Radial dose distribution model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RddModel {
    #[default]
    Gauss,
    Geiss,
}

/// Whether tracks overlap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TrackMode {
    /// Isolated track, no dose-rate dependence (initial recombination).
    SingleTrack,
    /// Overlapping tracks at a finite dose rate (general recombination).
    ContinuousBeam { dose_rate_gy_min: f64 },
}

/// Chamber and track-structure parameters shared by every request of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhysicsParams {
    pub voltage_v: f64,
    pub electrode_gap_cm: f64,
    pub particle: String,
    pub rdd_model: RddModel,
    pub grid_size_um: f64,
    /// Track core radius.
    pub a0_nm: f64,
    pub use_beta: bool,
}

/// A fully self-contained simulator call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationRequest {
    pub energy_mev: f64,
    #[serde(flatten)]
    pub mode: TrackMode,
    #[serde(flatten)]
    pub physics: PhysicsParams,
    pub backend: Backend,
    pub seed: Option<u64>,
    pub debug: bool,
}

/// Hashable identity of a request: two requests with equal keys describe the
/// same physical computation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    energy: u64,
    dose_rate: Option<u64>,
    voltage: u64,
    electrode_gap: u64,
    particle: String,
    rdd_model: RddModel,
    grid_size: u64,
    a0: u64,
    use_beta: bool,
    backend: Backend,
    seed: Option<u64>,
}

impl SimulationRequest {
    pub fn key(&self) -> RequestKey {
        let dose_rate = match self.mode {
            TrackMode::SingleTrack => None,
            TrackMode::ContinuousBeam { dose_rate_gy_min } => Some(dose_rate_gy_min.to_bits()),
        };
        RequestKey {
            energy: self.energy_mev.to_bits(),
            dose_rate,
            voltage: self.physics.voltage_v.to_bits(),
            electrode_gap: self.physics.electrode_gap_cm.to_bits(),
            particle: self.physics.particle.clone(),
            rdd_model: self.physics.rdd_model,
            grid_size: self.physics.grid_size_um.to_bits(),
            a0: self.physics.a0_nm.to_bits(),
            use_beta: self.physics.use_beta,
            backend: self.backend,
            seed: self.seed,
        }
    }
}

/// Run-wide settings from which every request of a comparison is stamped.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestTemplate {
    pub physics: PhysicsParams,
    pub backend: Backend,
    /// Base seed of the run, shared by all requests so that replicate
    /// conditions produce identical (and memoizable) requests.
    pub seed: Option<u64>,
    pub debug: bool,
}

impl RequestTemplate {
    pub fn request(&self, energy_mev: f64, mode: TrackMode) -> SimulationRequest {
        SimulationRequest {
            energy_mev,
            mode,
            physics: self.physics.clone(),
            backend: self.backend,
            seed: self.seed,
            debug: self.debug,
        }
    }

    pub fn single_track(&self, energy_mev: f64) -> SimulationRequest {
        self.request(energy_mev, TrackMode::SingleTrack)
    }

    pub fn continuous_beam(&self, energy_mev: f64, dose_rate_gy_min: f64) -> SimulationRequest {
        self.request(energy_mev, TrackMode::ContinuousBeam { dose_rate_gy_min })
    }
}

impl fmt::Display for SimulationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            TrackMode::SingleTrack => write!(f, "{} MeV, single track", self.energy_mev),
            TrackMode::ContinuousBeam { dose_rate_gy_min } => {
                write!(f, "{} MeV, {} Gy/min", self.energy_mev, dose_rate_gy_min)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome and the simulator capability
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SimulationOutcome {
    /// Recombination correction factor.
    Success(f64),
    Failure(String),
}

impl SimulationOutcome {
    pub fn k_s(&self) -> Option<f64> {
        match self {
            SimulationOutcome::Success(k) => Some(*k),
            SimulationOutcome::Failure(_) => None,
        }
    }
}

/// A recombination simulation engine.
///
/// Comparators depend only on [`Simulator::invoke`], never on a concrete
/// engine type.
pub trait Simulator: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str {
        "custom"
    }

    /// Compute k_s for the given conditions.
    fn simulate(&self, request: &SimulationRequest) -> Result<f64, SimulationError>;

    /// Run one request, absorbing every failure mode into the outcome:
    /// returned errors, panics inside the engine, and factors that are not
    /// finite and positive.
    fn invoke(&self, request: &SimulationRequest) -> SimulationOutcome {
        guarded(self.name(), request, || self.simulate(request))
    }
}

impl<F> Simulator for F
where
    F: Fn(&SimulationRequest) -> Result<f64, SimulationError> + Send + Sync,
{
    fn simulate(&self, request: &SimulationRequest) -> Result<f64, SimulationError> {
        self(request)
    }
}

fn guarded<F>(name: &str, request: &SimulationRequest, call: F) -> SimulationOutcome
where
    F: FnOnce() -> Result<f64, SimulationError>,
{
    let result = panic::catch_unwind(AssertUnwindSafe(call))
        .unwrap_or_else(|payload| Err(SimulationError::Panicked(panic_message(payload.as_ref()))));

    let outcome = match result {
        Ok(k_s) if k_s.is_finite() && k_s > 0.0 => SimulationOutcome::Success(k_s),
        Ok(k_s) => SimulationOutcome::Failure(
            SimulationError::InvalidOutput(format!("k_s = {k_s}")).to_string(),
        ),
        Err(e) => SimulationOutcome::Failure(e.to_string()),
    };
    debug!("[{name}] {request} -> {outcome:?}");
    outcome
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn physics() -> PhysicsParams {
        PhysicsParams {
            voltage_v: 200.0,
            electrode_gap_cm: 0.2,
            particle: "proton".into(),
            rdd_model: RddModel::Gauss,
            grid_size_um: 5.0,
            a0_nm: 8.0,
            use_beta: false,
        }
    }

    pub(crate) fn template() -> RequestTemplate {
        RequestTemplate {
            physics: physics(),
            backend: Backend::Cython,
            seed: Some(7),
            debug: false,
        }
    }

    pub(crate) fn request(energy_mev: f64, mode: TrackMode) -> SimulationRequest {
        template().request(energy_mev, mode)
    }

    #[test]
    fn errors_become_failures() {
        let sim = |_: &SimulationRequest| -> Result<f64, SimulationError> {
            Err(SimulationError::NonConvergence("grid too coarse".into()))
        };
        let outcome = sim.invoke(&request(150.0, TrackMode::SingleTrack));
        match outcome {
            SimulationOutcome::Failure(reason) => assert!(reason.contains("grid too coarse")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn panics_become_failures() {
        let sim = |_: &SimulationRequest| -> Result<f64, SimulationError> {
            panic!("backend exploded")
        };
        let outcome = sim.invoke(&request(150.0, TrackMode::SingleTrack));
        assert_eq!(
            outcome,
            SimulationOutcome::Failure("simulator panicked: backend exploded".into())
        );
    }

    #[test]
    fn non_finite_factor_is_not_a_result() {
        let sim = |_: &SimulationRequest| -> Result<f64, SimulationError> { Ok(f64::NAN) };
        let outcome = sim.invoke(&request(150.0, TrackMode::SingleTrack));
        assert_eq!(outcome.k_s(), None);
    }

    #[test]
    fn key_distinguishes_track_mode() {
        let single = request(150.0, TrackMode::SingleTrack);
        let beam = request(150.0, TrackMode::ContinuousBeam { dose_rate_gy_min: 0.0 });
        assert_ne!(single.key(), beam.key());
        assert_eq!(single.key(), single.clone().key());
    }

    #[test]
    fn request_serializes_flat() {
        let req = request(150.0, TrackMode::ContinuousBeam { dose_rate_gy_min: 111.96 });
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["mode"], "continuous_beam");
        assert_eq!(json["dose_rate_gy_min"], 111.96);
        assert_eq!(json["voltage_v"], 200.0);
        assert_eq!(json["backend"], "cython");
    }
}
