// ============================================================
// Layer 5 — ML / Model Layer
// ============================================================
// Every model family and the code that fits them. Burn code
// lives here and in data/batcher.rs only.
//
//   model.rs            — dense and residual feed-forward
//                         networks (Burn), ModelSpec union
//
//   trainer.rs          — Adam / cross-entropy epoch loop,
//                         generator-driven or in-memory,
//                         epoch callbacks, History
//
//   boosting.rs         — multiclass gradient-boosted trees
//                         (exact greedy splits, rayon)
//
//   resample.rs         — SMOTE, edited nearest neighbours,
//                         and the two chained (SMOTE-ENN)
//
//   estimator.rs        — Classifier trait: fit / predict on
//                         a feature matrix, for any family
//
//   cross_validation.rs — k-fold scoring and the boosted-tree
//                         grid search
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

/// Dense and residual networks plus the model specification
pub mod model;

/// Training loop, history and epoch callbacks
pub mod trainer;

/// Gradient-boosted decision trees
pub mod boosting;

/// SMOTE-ENN class rebalancing
pub mod resample;

/// Common fit/predict interface
pub mod estimator;

/// K-fold cross-validation and grid search
pub mod cross_validation;
