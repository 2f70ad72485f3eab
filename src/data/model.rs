use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Serialize, Serializer};

use super::columns::ColumnMapping;

// ---------------------------------------------------------------------------
// MetadataValue – a single cell of the experimental table
// ---------------------------------------------------------------------------

/// A dynamically-typed cell value, inferred from the source file.
/// `Ord` + `Hash` so values can be grouped and deduplicated.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

// -- Manual Eq/Ord so we can put MetadataValue in BTreeSet --

impl Eq for MetadataValue {}

impl PartialOrd for MetadataValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MetadataValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use MetadataValue::*;
        fn discriminant(v: &MetadataValue) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for MetadataValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            MetadataValue::String(s) => s.hash(state),
            MetadataValue::Integer(i) => i.hash(state),
            MetadataValue::Float(f) => f.to_bits().hash(state),
            MetadataValue::Bool(b) => b.hash(state),
            MetadataValue::Null => {}
        }
    }
}

/// Full precision: the value is written back out verbatim.
impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::String(s) => write!(f, "{s}"),
            MetadataValue::Integer(i) => write!(f, "{i}"),
            MetadataValue::Float(v) => write!(f, "{v}"),
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Null => Ok(()),
        }
    }
}

impl Serialize for MetadataValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MetadataValue::String(s) => serializer.serialize_str(s),
            MetadataValue::Integer(i) => serializer.serialize_i64(*i),
            MetadataValue::Float(v) => serializer.serialize_f64(*v),
            MetadataValue::Bool(b) => serializer.serialize_bool(*b),
            MetadataValue::Null => serializer.serialize_none(),
        }
    }
}

impl MetadataValue {
    /// Interpret the cell as a finite number. Text cells holding a number
    /// (e.g. quoted CSV fields) count as numeric.
    pub fn as_f64(&self) -> Option<f64> {
        let v = match self {
            MetadataValue::Float(v) => *v,
            MetadataValue::Integer(i) => *i as f64,
            MetadataValue::String(s) => s.trim().parse::<f64>().ok()?,
            MetadataValue::Bool(_) | MetadataValue::Null => return None,
        };
        v.is_finite().then_some(v)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MetadataValue::Null)
    }
}

// ---------------------------------------------------------------------------
// RawTable – rows of named columns, straight from the file
// ---------------------------------------------------------------------------

/// A table as read from disk, before any schema resolution.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    /// Column names in file order.
    pub columns: Vec<String>,
    /// One map per row: column_name → value.
    pub rows: Vec<BTreeMap<String, MetadataValue>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row given as `(column, value)` pairs.
    pub fn push_row<I, K>(&mut self, cells: I)
    where
        I: IntoIterator<Item = (K, MetadataValue)>,
        K: Into<String>,
    {
        let row = cells.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ExperimentalRecord – one measured condition
// ---------------------------------------------------------------------------

/// One measured condition, normalized to canonical units.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentalRecord {
    /// 0-based row index in the source table.
    pub row: usize,
    /// Beam energy in MeV.
    pub energy_mev: f64,
    /// Dose rate in Gy/min. `None` only when no dose-rate column was resolved.
    pub dose_rate_gy_min: Option<f64>,
    /// Measured recombination correction factor.
    pub k_s: f64,
    /// Every non-mapped column of the source row, untouched.
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl ExperimentalRecord {
    /// Dose rate converted back to Gy/s for reporting.
    pub fn dose_rate_gy_s(&self) -> Option<f64> {
        self.dose_rate_gy_min.map(|d| d / 60.0)
    }
}

/// A row removed during validation, with the reason it was dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedRow {
    pub row: usize,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// ExperimentalDataset – the canonical, validated dataset
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ExperimentalDataset {
    /// Valid records in input order.
    pub records: Vec<ExperimentalRecord>,
    /// How canonical fields were mapped onto the source columns.
    pub mapping: ColumnMapping,
    /// Non-mapped column names in file order.
    pub metadata_columns: Vec<String>,
    /// Rows rejected by validation.
    pub dropped: Vec<DroppedRow>,
}

impl ExperimentalDataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct energies, ascending.
    pub fn energies(&self) -> Vec<f64> {
        let set: BTreeSet<MetadataValue> = self
            .records
            .iter()
            .map(|r| MetadataValue::Float(r.energy_mev))
            .collect();
        set.into_iter().filter_map(|v| v.as_f64()).collect()
    }
}
