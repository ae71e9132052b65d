/// Data layer: event tables, their locations, and the per-row cursor.
///
/// Architecture:
/// ```text
///  merge_<sample>/rqDir/zip1.parquet ...
///        │
///        ▼
///   ┌──────────┐
///   │ location  │  "files:table" template → per-sample paths
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  source   │  resolve, chain samples, activate columns
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │ EventDataset  │  roles × detectors, mode detection, row reads
///   └──────────────┘
/// ```

pub mod dataset;
pub mod loader;
pub mod location;
pub mod model;
pub mod source;
