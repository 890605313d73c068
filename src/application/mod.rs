// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Orchestrates the other layers for one action:
//
//   config.rs         — the validated RunConfig
//   train_use_case.rs — single fit, cross-validation, or
//                       boosted-tree grid search
//   test_use_case.rs  — reload a checkpoint and score it on
//                       the test dataset
//
// Rules for this layer:
//   - No ML math or model code here
//   - No printing here; use cases return reports and the
//     CLI layer prints them (the one exception is the model
//     summary shown before a long fit starts)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Run configuration built by the CLI layer
pub mod config;

// The training workflows
pub mod train_use_case;

// The evaluation workflow
pub mod test_use_case;
