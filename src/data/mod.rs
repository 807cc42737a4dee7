/// Data layer: table types, column selection, extraction and assembly.
///
/// Architecture:
/// ```text
///  reference file headers          resolved files (catalog order)
///        │                                 │
///        ▼                                 ▼
///   ┌──────────┐  SelectionTable    ┌───────────┐
///   │  filter   │ ───────────────▶  │  extract   │  one TimeTable per record group
///   └──────────┘                    └───────────┘
///                                          │
///                                          ▼
///                                   ┌───────────┐
///                                   │   merge    │  resample → join → resample
///                                   └───────────┘  → fill → clip → prune
///                                          │
///                                          ▼
///                                   TimeTable  ──▶ export (.parquet / .csv)
/// ```
pub mod export;
pub mod extract;
pub mod filter;
pub mod loader;
pub mod merge;
pub mod model;
pub mod resample;
