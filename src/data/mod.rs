// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// This layer handles everything from a feature CSV file all
// the way to tensor batches.
//
// The pipeline flows in this order:
//
//   ml_features_*.csv
//       │
//       ▼
//   CsvFeatureStore   → parses rows, keeps quota'd stations
//       │
//       ▼
//   select_quota      → takes N rows per (station, phase)
//       │
//       ▼
//   split_by_class    → per-class train / validation hold-out
//       │
//       ▼
//   PhaseDataset      → owns both partitions, materializes
//       │               ndarray matrices on demand
//       ▼
//   BatchGenerator    → endless reshuffled full batches
//       │
//       ▼
//   PhaseBatcher      → ndarray batch → Burn tensors
//
// KFold sits to the side: it hands out index folds over a
// materialized matrix for cross-validation.
//
// Everything up to BatchGenerator is framework-neutral; only
// the batcher touches Burn.

/// Reads feature CSV files and applies the station/phase quota
pub mod loader;

/// Per-class train/validation partitioning
pub mod splitter;

/// Partitioned dataset and ndarray materialization
pub mod dataset;

/// Endless shuffled batch stream for generator-driven training
pub mod generator;

/// Shuffled k-fold index splits
pub mod kfold;

/// Converts ndarray batches into Burn tensors
pub mod batcher;
