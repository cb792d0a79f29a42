/// Data layer: ingestion and normalization.
///
/// Architecture:
/// ```text
///  .fit / .fits / .vot / .asc / .csv / .txt / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  extension → SpectrumFormat → RawSignal
///   └──────────┘      (fits, votable: format internals)
///        │
///        ▼
///   ┌───────────┐
///   │ normalize  │  min-max → NormalizedSignal in [0, 1]
///   └───────────┘
/// ```

pub mod fits;
pub mod loader;
pub mod model;
pub mod votable;
