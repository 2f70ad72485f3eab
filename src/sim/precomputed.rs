use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use log::info;

use super::{SimulationRequest, Simulator, TrackMode};
use crate::data::columns::{ENERGY_ALIASES, KS_ALIASES, find_column};
use crate::data::loader::load_table;
use crate::error::SimulationError;

/// Dose-rate column of a precomputed table. Empty cells mean single track.
pub const DOSE_RATE_GY_MIN_COLUMN: &str = "dose_rate_Gy_min";

/// Lookup keys are quantized to this many steps per unit, so a table cell
/// written as `111.96` matches a dose rate computed as `1.866 * 60.0`.
const KEY_STEPS_PER_UNIT: f64 = 1e9;

fn lookup_key(value: f64) -> i64 {
    (value * KEY_STEPS_PER_UNIT).round() as i64
}

/// Replays factors from an earlier simulation run instead of calling an
/// engine. Lookups match `(energy, dose rate)` to nine decimal places;
/// anything else fails as unavailable.
#[derive(Debug, Clone, Default)]
pub struct PrecomputedSimulator {
    table: HashMap<(i64, Option<i64>), f64>,
}

impl PrecomputedSimulator {
    /// Read a table with an energy column, a k_s column and an optional
    /// `dose_rate_Gy_min` column.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = load_table(path)
            .with_context(|| format!("reading precomputed table {}", path.display()))?;

        let Some(energy_col) = find_column(&raw.columns, ENERGY_ALIASES) else {
            bail!("precomputed table has no energy column");
        };
        let Some(ks_col) = find_column(&raw.columns, KS_ALIASES) else {
            bail!("precomputed table has no k_s column");
        };
        let dose_col = find_column(&raw.columns, &[DOSE_RATE_GY_MIN_COLUMN]);

        let mut sim = Self::default();
        for (i, row) in raw.rows.iter().enumerate() {
            let energy = row
                .get(energy_col)
                .and_then(|v| v.as_f64())
                .with_context(|| format!("row {i}: invalid energy"))?;
            let k_s = row
                .get(ks_col)
                .and_then(|v| v.as_f64())
                .with_context(|| format!("row {i}: invalid k_s"))?;
            let dose_rate = match dose_col.and_then(|c| row.get(c)) {
                None => None,
                Some(v) if v.is_null() => None,
                Some(v) => Some(
                    v.as_f64()
                        .with_context(|| format!("row {i}: invalid dose rate '{v}'"))?,
                ),
            };
            sim.insert(energy, dose_rate, k_s);
        }

        info!(
            "Loaded {} precomputed k_s values from {}",
            sim.table.len(),
            path.display()
        );
        Ok(sim)
    }

    /// Add one entry. `dose_rate_gy_min = None` is the single-track value.
    pub fn insert(&mut self, energy_mev: f64, dose_rate_gy_min: Option<f64>, k_s: f64) {
        self.table
            .insert((lookup_key(energy_mev), dose_rate_gy_min.map(lookup_key)), k_s);
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Simulator for PrecomputedSimulator {
    fn name(&self) -> &str {
        "precomputed"
    }

    fn simulate(&self, request: &SimulationRequest) -> Result<f64, SimulationError> {
        let dose_rate = match request.mode {
            TrackMode::SingleTrack => None,
            TrackMode::ContinuousBeam { dose_rate_gy_min } => Some(dose_rate_gy_min),
        };
        self.table
            .get(&(lookup_key(request.energy_mev), dose_rate.map(lookup_key)))
            .copied()
            .ok_or_else(|| SimulationError::Unavailable(format!("no precomputed value for {request}")))
    }
}
