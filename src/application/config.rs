// ============================================================
// Layer 2 — Run Configuration
// ============================================================
// Everything one invocation needs, parsed and validated once.
// The CLI layer builds it (cli/commands.rs); the use cases only
// read it. It is serialisable so the checkpoint sidecar records
// exactly which settings produced a model.

use std::path::PathBuf;

use clap::ValueEnum;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::domain::error::{PhaseError, PhaseResult};
use crate::domain::quota::{LayerSpec, PhaseLengths};
use crate::infra::checkpoint::{derive_base_path, CheckpointManager};
use crate::ml::model::{NetworkConfig, NetworkKind};
use crate::ml::trainer::FitOptions;

/// Model family selected with `--kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Plain feed-forward network
    Dense,
    /// Feed-forward network with skip connections
    Residual,
    /// Gradient-boosted trees on SMOTE-ENN resampled data
    Boosted,
}

impl ModelKind {
    pub fn network(self) -> Option<NetworkKind> {
        match self {
            ModelKind::Dense    => Some(NetworkKind::Dense),
            ModelKind::Residual => Some(NetworkKind::Residual),
            ModelKind::Boosted  => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub train_dataset:    PathBuf,
    pub test_dataset:     PathBuf,
    /// Explicit checkpoint base path; derived when absent
    pub model:            Option<PathBuf>,
    pub cross_validate:   bool,
    pub batch_size:       usize,
    /// Batch size for cross-validation fits; `batch_size` when absent
    pub cv_batch_size:    Option<usize>,
    pub epochs:           usize,
    pub layers:           LayerSpec,
    pub dropout:          f64,
    pub stations:         Vec<String>,
    pub verbose:          u8,
    pub phase_lengths:    PhaseLengths,
    pub kind:             ModelKind,
    pub learning_rate:    f64,
    pub seed:             u64,
    pub validation_split: f64,
    pub folds:            usize,
}

impl RunConfig {
    pub fn validate(&self) -> PhaseResult<()> {
        if self.batch_size == 0 {
            return Err(PhaseError::cli("batch size must be positive"));
        }
        if self.cv_batch_size == Some(0) {
            return Err(PhaseError::cli("cross-validation batch size must be positive"));
        }
        if self.epochs == 0 {
            return Err(PhaseError::cli("epochs must be positive"));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(PhaseError::cli(format!("dropout must be in [0, 1), got {}", self.dropout)));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(PhaseError::cli(format!("learning rate must be positive, got {}", self.learning_rate)));
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(PhaseError::cli(format!(
                "validation split must be in [0, 1), got {}",
                self.validation_split
            )));
        }
        if self.folds < 2 {
            return Err(PhaseError::cli("cross-validation needs at least 2 folds"));
        }
        if self.phase_lengths.is_empty() {
            return Err(PhaseError::cli("at least one station quota is required"));
        }

        // --stations is informational; the quota decides what is read
        for station in &self.stations {
            if self.phase_lengths.get(station).is_none() {
                tracing::warn!("station {} has no phase-length quota and will not be read", station);
            }
        }
        Ok(())
    }

    pub fn checkpoint(&self) -> CheckpointManager {
        let base = self
            .model
            .clone()
            .unwrap_or_else(|| derive_base_path(&self.phase_lengths, &self.layers, self.dropout));
        CheckpointManager::new(base)
    }

    pub fn rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.seed)
    }

    pub fn fit_options(&self) -> FitOptions {
        FitOptions {
            epochs:        self.epochs,
            batch_size:    self.batch_size,
            learning_rate: self.learning_rate,
            verbose:       self.verbose,
        }
    }

    pub fn cv_fit_options(&self) -> FitOptions {
        FitOptions {
            batch_size: self.cv_batch_size.unwrap_or(self.batch_size),
            // per-fold epoch lines would drown the fold summary
            verbose: self.verbose.saturating_sub(1),
            ..self.fit_options()
        }
    }

    pub fn network_config(&self, input_width: usize) -> NetworkConfig {
        NetworkConfig::new(input_width, self.layers.widths().to_vec(), self.dropout)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample() -> RunConfig {
        RunConfig {
            train_dataset:    PathBuf::from("data/phase/ml_features_train.csv"),
            test_dataset:     PathBuf::from("data/phase/ml_features_test.csv"),
            model:            None,
            cross_validate:   false,
            batch_size:       256,
            cv_batch_size:    None,
            epochs:           2000,
            layers:           "128 128 64 48 48 32 32 48 32 16".parse().unwrap(),
            dropout:          0.1,
            stations:         vec!["URZ".to_string()],
            verbose:          0,
            phase_lengths:    "URZ 6840 6840 6840 20520".parse().unwrap(),
            kind:             ModelKind::Residual,
            learning_rate:    0.001,
            seed:             7,
            validation_split: 0.1,
            folds:            10,
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        let cases: Vec<Box<dyn Fn(&mut RunConfig)>> = vec![
            Box::new(|c| c.batch_size = 0),
            Box::new(|c| c.cv_batch_size = Some(0)),
            Box::new(|c| c.epochs = 0),
            Box::new(|c| c.dropout = 1.0),
            Box::new(|c| c.learning_rate = 0.0),
            Box::new(|c| c.validation_split = 1.0),
            Box::new(|c| c.folds = 1),
            Box::new(|c| c.phase_lengths = PhaseLengths::new()),
        ];
        for mutate in cases {
            let mut cfg = sample();
            mutate(&mut cfg);
            assert!(matches!(cfg.validate(), Err(PhaseError::CliArgument(_))));
        }
    }

    #[test]
    fn test_derived_checkpoint_path() {
        let manager = sample().checkpoint();
        assert_eq!(
            manager.base(),
            std::path::Path::new("results/phase_weights_best_s_urz_l_128_128_64_48_48_32_32_48_32_16_d_0.1")
        );

        let mut cfg = sample();
        cfg.model = Some(PathBuf::from("/tmp/custom"));
        assert_eq!(cfg.checkpoint().base(), std::path::Path::new("/tmp/custom"));
    }

    #[test]
    fn test_cv_batch_size_override() {
        let mut cfg = sample();
        assert_eq!(cfg.cv_fit_options().batch_size, 256);
        cfg.cv_batch_size = Some(500);
        assert_eq!(cfg.cv_fit_options().batch_size, 500);
        assert_eq!(cfg.fit_options().batch_size, 256);
    }

    #[test]
    fn test_json_round_trip() {
        let cfg  = sample();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: RunConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}
