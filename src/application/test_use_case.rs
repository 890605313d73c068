// ============================================================
// Layer 2 — TestUseCase
// ============================================================
// Scores a saved model on the test dataset:
//
//   Step 1: Read the test CSV with the run's quota    (Layer 4)
//   Step 2: Materialize it as one raw matrix          (Layer 4)
//   Step 3: Load the checkpoint                       (Layer 6)
//   Step 4: Predict every row                         (Layer 5)
//   Step 5: Build the report                          (Layer 6)
//
// Networks report accuracy plus a confusion matrix; boosted
// trees report accuracy plus the imbalance-aware table.

use std::fmt;

use anyhow::{Context, Result};
use ndarray::Array2;

use crate::application::config::RunConfig;
use crate::data::{
    dataset::{MaterializeOptions, Partition, PhaseDataset},
    loader::CsvFeatureStore,
};
use crate::infra::report::{accuracy, ClassificationReport, ConfusionMatrix};
use crate::ml::{
    boosting::BoostedTrees,
    estimator::{Classifier, TrainedNetwork},
};

// ─── TestReport ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub enum TestReport {
    Network { accuracy: f64, confusion: ConfusionMatrix },
    Boosted { accuracy: f64, report: ClassificationReport },
}

impl TestReport {
    pub fn accuracy(&self) -> f64 {
        match self {
            TestReport::Network { accuracy, .. } | TestReport::Boosted { accuracy, .. } => *accuracy,
        }
    }
}

impl fmt::Display for TestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestReport::Network { accuracy, confusion } => {
                writeln!(f, "acc: {:.2}%", accuracy * 100.0)?;
                writeln!(f, "Confusion matrix:")?;
                write!(f, "{confusion}")
            }
            TestReport::Boosted { accuracy, report } => {
                writeln!(f, "Accuracy: {:.2}%", accuracy * 100.0)?;
                writeln!(f)?;
                write!(f, "{report}")
            }
        }
    }
}

// ─── TestUseCase ──────────────────────────────────────────────────────────────
pub struct TestUseCase {
    config: RunConfig,
}

impl TestUseCase {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<TestReport> {
        let manager = self.config.checkpoint();

        match self.config.kind.network() {
            None => {
                let trees = manager.load_trees()?;
                self.evaluate_trees(&trees)
            }
            Some(kind) => {
                let meta = manager.load_meta()?;
                if let Some((saved, _)) = meta.spec.as_network() {
                    if saved != kind {
                        tracing::warn!(
                            "checkpoint holds a {:?} network but --kind asks for {:?}; using the checkpoint",
                            saved, kind
                        );
                    }
                }
                let network = TrainedNetwork::load(&manager, &meta)?;
                let width   = meta.spec.as_network().map(|(_, config)| config.input_width);

                let (features, labels) = self.load_test_set(width)?;
                let predicted = network.predict(&features);
                Ok(TestReport::Network {
                    accuracy:  accuracy(&predicted, &labels),
                    confusion: ConfusionMatrix::new(&labels, &predicted),
                })
            }
        }
    }

    /// Score an in-memory tree ensemble on the test set.
    pub fn evaluate_trees(&self, trees: &BoostedTrees) -> Result<TestReport> {
        let (features, labels) = self.load_test_set(Some(trees.n_features()))?;
        let predicted = trees.predict(&features)?;
        Ok(TestReport::Boosted {
            accuracy: accuracy(&predicted, &labels),
            report:   ClassificationReport::new(&labels, &predicted),
        })
    }

    /// The whole test file under the run's quota, in file order.
    ///
    /// A header whose feature count differs from `width` is a schema
    /// error, raised before any row is predicted.
    fn load_test_set(&self, width: Option<usize>) -> Result<(Array2<f32>, Vec<usize>)> {
        let cfg   = &self.config;
        let mut store = CsvFeatureStore::new(&cfg.test_dataset);
        if let Some(width) = width {
            store = store.with_feature_width(width);
        }
        let dataset = PhaseDataset::load(&store, &cfg.phase_lengths, 0.0, None)
            .with_context(|| format!("loading test dataset '{}'", cfg.test_dataset.display()))?;

        let batch = dataset.materialize(Partition::Train, MaterializeOptions::raw());
        tracing::info!("Test set: {} rows × {} features", batch.len(), batch.feature_width());
        Ok((batch.matrix(), batch.class_indices()))
    }
}
