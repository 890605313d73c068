// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns shared by the use cases:
//
//   checkpoint.rs — derived checkpoint paths, network weights
//                   via Burn's named MessagePack recorder, the
//                   JSON meta sidecar, boosted-tree JSON, and
//                   the best-epoch saving callback
//
//   metrics.rs    — per-epoch metrics, the monitored metric,
//                   CSV epoch log
//
//   report.rs     — accuracy, confusion matrix and the
//                   imbalance-aware classification report
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Training metrics and CSV logger
pub mod metrics;

/// Evaluation reports printed after testing
pub mod report;
