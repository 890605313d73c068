// ============================================================
// Layer 5 — Estimators
// ============================================================
// A common fit/predict face over the model families, so that
// cross-validation and grid search do not care what they fit:
//
//   Classifier
//     ├── NeuralEstimator  — dense or residual network,
//     │                      trained with fit_arrays
//     └── BoostedTrees     — see boosting.rs
//
// TrainedNetwork is the inference-side view of a fitted network:
// the model on InferBackend, plus checkpoint save/load.

use anyhow::{anyhow, bail, Result};
use burn::module::AutodiffModule;
use ndarray::Array2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::domain::error::{PhaseError, PhaseResult};
use crate::infra::checkpoint::{CheckpointManager, CheckpointMeta};
use crate::infra::report::accuracy;
use crate::ml::model::{DenseNet, NetworkConfig, NetworkKind, ResidualNet};
use crate::ml::trainer::{device, fit_arrays, predict, FitOptions, InferBackend, TrainBackend};

/// Rows evaluated per forward pass during prediction
pub const PREDICT_CHUNK: usize = 4096;

pub trait Classifier {
    fn fit(&mut self, features: &Array2<f32>, labels: &[usize]) -> Result<()>;

    fn predict(&self, features: &Array2<f32>) -> Result<Vec<usize>>;

    /// Fraction of rows whose predicted class matches `labels`
    fn score(&self, features: &Array2<f32>, labels: &[usize]) -> Result<f64> {
        Ok(accuracy(&self.predict(features)?, labels))
    }
}

// ─── Trained network ──────────────────────────────────────────────────────────

pub enum TrainedNetwork {
    Dense(DenseNet<InferBackend>),
    Residual(ResidualNet<InferBackend>),
}

impl TrainedNetwork {
    /// Rebuild the architecture recorded in `meta` and load its weights.
    pub fn load(manager: &CheckpointManager, meta: &CheckpointMeta) -> PhaseResult<Self> {
        let (kind, config) = meta.spec.as_network().ok_or_else(|| {
            PhaseError::model_load(manager.meta_path(), "checkpoint holds boosted trees, not a network")
        })?;
        let device = device();
        Ok(match kind {
            NetworkKind::Dense => {
                TrainedNetwork::Dense(manager.load_network::<InferBackend, _>(config.init_dense::<InferBackend>(&device), &device)?)
            }
            NetworkKind::Residual => {
                TrainedNetwork::Residual(manager.load_network::<InferBackend, _>(config.init_residual::<InferBackend>(&device), &device)?)
            }
        })
    }

    pub fn save(&self, manager: &CheckpointManager, meta: &CheckpointMeta) -> Result<()> {
        match self {
            TrainedNetwork::Dense(m)    => manager.save_network::<InferBackend, _>(m, meta),
            TrainedNetwork::Residual(m) => manager.save_network::<InferBackend, _>(m, meta),
        }
    }

    pub fn predict(&self, features: &Array2<f32>) -> Vec<usize> {
        match self {
            TrainedNetwork::Dense(m)    => predict(m, features, PREDICT_CHUNK),
            TrainedNetwork::Residual(m) => predict(m, features, PREDICT_CHUNK),
        }
    }
}

// ─── Neural estimator ─────────────────────────────────────────────────────────

/// A network built fresh on every `fit`, trained in memory.
pub struct NeuralEstimator {
    kind:    NetworkKind,
    config:  NetworkConfig,
    options: FitOptions,
    seed:    u64,
    trained: Option<TrainedNetwork>,
}

impl NeuralEstimator {
    pub fn new(kind: NetworkKind, config: NetworkConfig, options: FitOptions, seed: u64) -> Self {
        Self { kind, config, options, seed, trained: None }
    }

    pub fn trained(&self) -> Option<&TrainedNetwork> {
        self.trained.as_ref()
    }
}

impl Classifier for NeuralEstimator {
    fn fit(&mut self, features: &Array2<f32>, labels: &[usize]) -> Result<()> {
        if features.ncols() != self.config.input_width {
            bail!(
                "network expects {} features per row, got {}",
                self.config.input_width,
                features.ncols()
            );
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let device  = device();

        let trained = match self.kind {
            NetworkKind::Dense => {
                let model = self.config.init_dense::<TrainBackend>(&device);
                let (model, _) = fit_arrays(model, features, labels, &self.options, &mut rng, &mut [])?;
                TrainedNetwork::Dense(model.valid())
            }
            NetworkKind::Residual => {
                let model = self.config.init_residual::<TrainBackend>(&device);
                let (model, _) = fit_arrays(model, features, labels, &self.options, &mut rng, &mut [])?;
                TrainedNetwork::Residual(model.valid())
            }
        };
        self.trained = Some(trained);
        Ok(())
    }

    fn predict(&self, features: &Array2<f32>) -> Result<Vec<usize>> {
        let trained = self.trained.as_ref().ok_or_else(|| anyhow!("network has not been fitted"))?;
        Ok(trained.predict(features))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::ModelSpec;

    fn separable(per_class: usize) -> (Array2<f32>, Vec<usize>) {
        let n = per_class * 4;
        let x = Array2::from_shape_fn((n, 4), |(i, j)| {
            let noise = ((i * 7 + j * 3) % 11) as f32 * 0.02;
            if j == i % 4 { 2.0 + noise } else { noise }
        });
        let y = (0..n).map(|i| i % 4).collect();
        (x, y)
    }

    fn options() -> FitOptions {
        FitOptions { epochs: 25, batch_size: 8, learning_rate: 0.01, verbose: 0 }
    }

    #[test]
    fn test_neural_estimator_fits_and_scores() {
        let (x, y) = separable(12);
        let mut est = NeuralEstimator::new(NetworkKind::Dense, NetworkConfig::new(4, vec![8], 0.0), options(), 7);
        assert!(est.predict(&x).is_err());

        est.fit(&x, &y).unwrap();
        assert!(est.score(&x, &y).unwrap() > 0.9);
    }

    #[test]
    fn test_width_mismatch_is_rejected() {
        let (x, y) = separable(2);
        let mut est = NeuralEstimator::new(NetworkKind::Residual, NetworkConfig::new(6, vec![4], 0.0), options(), 1);
        assert!(est.fit(&x, &y).is_err());
    }

    #[test]
    fn test_trained_network_checkpoint_round_trip() {
        let (x, y) = separable(6);
        let config = NetworkConfig::new(4, vec![6, 6], 0.1);
        let mut est = NeuralEstimator::new(NetworkKind::Residual, config.clone(), options(), 3);
        est.fit(&x, &y).unwrap();

        let dir     = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path().join("cv_best"));
        let meta    = CheckpointMeta::new(ModelSpec::network(NetworkKind::Residual, config));
        est.trained().unwrap().save(&manager, &meta).unwrap();

        let restored = TrainedNetwork::load(&manager, &manager.load_meta().unwrap()).unwrap();
        assert_eq!(restored.predict(&x), est.predict(&x).unwrap());
    }
}
