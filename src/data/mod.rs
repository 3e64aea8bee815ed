/// Data layer: core types, loading, and cleaning.
///
/// Architecture:
/// ```text
///  .csv / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → ListingTable
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │ ListingTable │  column names, rows of CellValue
///   └──────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  clean    │  coerce predictor/outcome → Observations
///   └──────────┘
/// ```

pub mod clean;
pub mod loader;
pub mod model;
