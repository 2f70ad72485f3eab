use std::fmt;

use log::{info, warn};
use serde::Serialize;

use crate::error::DataError;

// ---------------------------------------------------------------------------
// Canonical fields and their accepted aliases
// ---------------------------------------------------------------------------

/// Semantic role of a column in an experimental table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum CanonicalField {
    Energy,
    Ks,
    DoseRate,
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CanonicalField::Energy => "energy",
            CanonicalField::Ks => "k_s",
            CanonicalField::DoseRate => "dose rate",
        };
        f.write_str(name)
    }
}

pub const ENERGY_ALIASES: &[&str] = &["Energy_MeV", "energy_MeV", "E_MeV", "energy"];

pub const KS_ALIASES: &[&str] = &["k_s", "ks", "recombination_factor", "collection_efficiency"];

pub const DOSE_RATE_AIR_ALIASES: &[&str] =
    &["dose_rate_air_Gy_s", "dose_rate_air", "doserate_air_Gy_s"];

pub const DOSE_RATE_WATER_ALIASES: &[&str] =
    &["dose_rate_water_Gy_s", "dose_rate_water", "doserate_water_Gy_s"];

/// Medium a dose rate refers to. Air is the reference medium for chamber
/// dosimetry; water dose rates run roughly 13-14% higher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Medium {
    Air,
    Water,
}

impl fmt::Display for Medium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Medium::Air => f.write_str("air"),
            Medium::Water => f.write_str("water"),
        }
    }
}

// ---------------------------------------------------------------------------
// ColumnMapping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoseRateColumn {
    pub name: String,
    /// `None` when the column came from an explicit override.
    pub medium: Option<Medium>,
}

/// Canonical field → concrete column name for one dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnMapping {
    pub energy: String,
    pub ks: String,
    pub dose_rate: Option<DoseRateColumn>,
}

impl ColumnMapping {
    /// Column name mapped to `field`, if any.
    pub fn column(&self, field: CanonicalField) -> Option<&str> {
        match field {
            CanonicalField::Energy => Some(&self.energy),
            CanonicalField::Ks => Some(&self.ks),
            CanonicalField::DoseRate => self.dose_rate.as_ref().map(|d| d.name.as_str()),
        }
    }

    /// Whether `column` is one of the mapped columns.
    pub fn is_mapped(&self, column: &str) -> bool {
        column == self.energy
            || column == self.ks
            || self.dose_rate.as_ref().is_some_and(|d| d.name == column)
    }
}

/// Caller-supplied exact column names. Any `Some` bypasses alias search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnOverrides {
    pub energy: Option<String>,
    pub ks: Option<String>,
    pub dose_rate: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// First alias (in priority order) that matches one of `columns`, ignoring
/// ASCII case. Returns the column name as it appears in the dataset.
pub fn find_column<'a>(columns: &'a [String], aliases: &[&str]) -> Option<&'a str> {
    aliases.iter().find_map(|alias| {
        columns
            .iter()
            .find(|c| c.eq_ignore_ascii_case(alias))
            .map(String::as_str)
    })
}

fn resolve_required(
    columns: &[String],
    field: CanonicalField,
    override_name: Option<&str>,
    aliases: &[&str],
) -> Result<String, DataError> {
    if let Some(name) = override_name {
        return columns
            .iter()
            .find(|c| c.as_str() == name)
            .cloned()
            .ok_or_else(|| DataError::ColumnNotFound {
                field,
                searched: vec![name.to_string()],
            });
    }
    find_column(columns, aliases)
        .map(str::to_string)
        .ok_or_else(|| DataError::ColumnNotFound {
            field,
            searched: aliases.iter().map(|a| a.to_string()).collect(),
        })
}

fn resolve_dose_rate(
    columns: &[String],
    override_name: Option<&str>,
) -> Result<Option<DoseRateColumn>, DataError> {
    if let Some(name) = override_name {
        let name = resolve_required(columns, CanonicalField::DoseRate, Some(name), &[])?;
        return Ok(Some(DoseRateColumn { name, medium: None }));
    }

    let air = find_column(columns, DOSE_RATE_AIR_ALIASES);
    let water = find_column(columns, DOSE_RATE_WATER_ALIASES);

    match (air, water) {
        (Some(air), Some(water)) => {
            info!("Both air ('{air}') and water ('{water}') dose rates present; using air");
            Ok(Some(DoseRateColumn {
                name: air.to_string(),
                medium: Some(Medium::Air),
            }))
        }
        (Some(air), None) => Ok(Some(DoseRateColumn {
            name: air.to_string(),
            medium: Some(Medium::Air),
        })),
        (None, Some(water)) => {
            warn!(
                "Using water dose rate column '{water}': no air dose rate found. \
                 Water dose rates are ~13-14% higher than air; convert to air \
                 if the simulation expects dose to air"
            );
            Ok(Some(DoseRateColumn {
                name: water.to_string(),
                medium: Some(Medium::Water),
            }))
        }
        (None, None) => Ok(None),
    }
}

/// Resolve canonical fields against the columns present in a dataset.
///
/// Energy and k_s are always required. The dose rate is required only when
/// `require_dose_rate` is set; otherwise a missing dose-rate column leaves
/// `dose_rate` as `None`.
pub fn resolve_columns(
    columns: &[String],
    overrides: &ColumnOverrides,
    require_dose_rate: bool,
) -> Result<ColumnMapping, DataError> {
    let energy = resolve_required(
        columns,
        CanonicalField::Energy,
        overrides.energy.as_deref(),
        ENERGY_ALIASES,
    )?;
    let ks = resolve_required(columns, CanonicalField::Ks, overrides.ks.as_deref(), KS_ALIASES)?;

    let dose_rate = resolve_dose_rate(columns, overrides.dose_rate.as_deref())?;
    if dose_rate.is_none() && require_dose_rate {
        let searched = DOSE_RATE_AIR_ALIASES
            .iter()
            .chain(DOSE_RATE_WATER_ALIASES)
            .map(|a| a.to_string())
            .collect();
        return Err(DataError::ColumnNotFound {
            field: CanonicalField::DoseRate,
            searched,
        });
    }

    Ok(ColumnMapping {
        energy,
        ks,
        dose_rate,
    })
}
