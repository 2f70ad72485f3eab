/// Data layer: column resolution, loading, and canonical records.
///
/// Architecture:
/// ```text
///  .csv / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → RawTable
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ columns   │  aliases / overrides → ColumnMapping
///   └──────────┘
///        │
///        ▼
///   ┌────────────────────┐
///   │ ExperimentalDataset │  Vec<ExperimentalRecord>, dose rate in Gy/min
///   └────────────────────┘
/// ```

pub mod columns;
pub mod loader;
pub mod model;
