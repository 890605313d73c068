// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Three training workflows, picked from the RunConfig:
//
//   network, single fit
//     Step 1: Read + quota-select the train CSV       (Layer 4)
//     Step 2: Per-class train / validation split      (Layer 4)
//     Step 3: Build the network from --layers         (Layer 5)
//     Step 4: Stream batches through fit_generator,
//             saving the best epoch by training acc   (Layer 5/6)
//
//   network, --cv
//     Step 1: Read + quota-select, no validation      (Layer 4)
//     Step 2: Materialize one raw matrix              (Layer 4)
//     Step 3: K-fold: a fresh network per fold        (Layer 5)
//     Step 4: Save the best fold's network            (Layer 6)
//
//   boosted trees
//     Step 1: Read + quota-select, materialize raw    (Layer 4)
//     Step 2: SMOTE-ENN resample                      (Layer 5)
//     Step 3: Grid search with 3-fold CV, refit best  (Layer 5)
//     Step 4: Save the trees, score on the test set   (Layer 6)
//
// All randomness flows from one ChaCha8Rng seeded with --seed.

use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::{module::AutodiffModule, prelude::Backend};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::application::config::RunConfig;
use crate::application::test_use_case::{TestReport, TestUseCase};
use crate::data::{
    dataset::{FeatureBatch, MaterializeOptions, Partition, PhaseDataset},
    kfold::KFold,
    loader::CsvFeatureStore,
};
use crate::domain::phase::Phase;
use crate::infra::{
    checkpoint::{BestCheckpoint, CheckpointManager, CheckpointMeta},
    metrics::{MetricsLogger, Monitor},
};
use crate::ml::{
    boosting::BoostingConfig,
    cross_validation::{cross_validate, grid_search, ParamGrid},
    estimator::NeuralEstimator,
    model::{summary, ModelSpec, NetworkConfig, NetworkKind, PhaseNetwork},
    resample::{Resampler, SmoteEnn},
    trainer::{device, fit_generator, EpochCallback, History, InferBackend, TrainBackend},
};

/// Seed of the SMOTE-ENN resampler
const RESAMPLE_SEED: u64 = 42;

/// Folds of the boosted-tree grid search
const GRID_FOLDS: usize = 3;

// ─── TrainReport ──────────────────────────────────────────────────────────────
/// What a training run produced; printed by the CLI layer.
#[derive(Debug, Clone)]
pub enum TrainReport {
    Fit {
        history:    History,
        /// (epoch, acc) of the saved model
        best:       Option<(usize, f64)>,
        checkpoint: PathBuf,
    },
    CrossValidation {
        scores:     Vec<f64>,
        mean:       f64,
        std:        f64,
        best_fold:  usize,
        checkpoint: PathBuf,
    },
    Boosted {
        /// Mean CV accuracy of every grid candidate, in grid order
        grid:       Vec<(BoostingConfig, f64)>,
        best_score: f64,
        params:     Vec<(&'static str, String)>,
        checkpoint: PathBuf,
        test:       TestReport,
    },
}

fn or_nan(v: Option<f64>) -> f64 {
    v.unwrap_or(f64::NAN)
}

impl fmt::Display for TrainReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainReport::Fit { history, best, checkpoint } => {
                writeln!(
                    f,
                    "Max of acc: {}, val_acc: {}",
                    or_nan(history.max_acc()),
                    or_nan(history.max_val_acc())
                )?;
                write!(
                    f,
                    "Min of loss: {}, val_loss: {}",
                    or_nan(history.min_loss()),
                    or_nan(history.min_val_loss())
                )?;
                if let Some((epoch, _)) = best {
                    write!(f, "\nBest epoch {} saved to {}", epoch, checkpoint.display())?;
                }
                Ok(())
            }
            TrainReport::CrossValidation { scores, mean, std, best_fold, checkpoint } => {
                for (fold, score) in scores.iter().enumerate() {
                    writeln!(f, "Fold {:>2}: {:.2}%", fold + 1, score * 100.0)?;
                }
                writeln!(f, "Best fold {} saved to {}", best_fold + 1, checkpoint.display())?;
                write!(f, "Baseline: {:.2}% ({:.2}%)", mean * 100.0, std * 100.0)
            }
            TrainReport::Boosted { grid, best_score, params, checkpoint, test } => {
                for (config, score) in grid {
                    writeln!(
                        f,
                        "max_depth={} learning_rate={} n_estimators={}: {:.4}",
                        config.max_depth, config.learning_rate, config.n_estimators, score
                    )?;
                }
                writeln!(f, "Best accuracy obtained: {}", best_score)?;
                writeln!(f, "Parameters:")?;
                for (key, value) in params {
                    writeln!(f, "\t{}: {}", key, value)?;
                }
                writeln!(f, "Trees saved to {}", checkpoint.display())?;
                write!(f, "{test}")
            }
        }
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: RunConfig,
}

impl TrainUseCase {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<TrainReport> {
        let cfg = &self.config;
        // weight init and dropout masks
        <TrainBackend as Backend>::seed(cfg.seed);

        match cfg.kind.network() {
            None => self.fit_boosted(),
            Some(kind) if cfg.cross_validate => self.cross_validate_network(kind),
            Some(kind) => self.fit_network(kind),
        }
    }

    /// Train set under the run's quota.
    fn load_dataset(&self, validation_split: f64, rng: &mut ChaCha8Rng) -> Result<PhaseDataset> {
        let cfg   = &self.config;
        let requested: Vec<String> = Phase::ALL
            .iter()
            .map(|&p| format!("{p}={}", cfg.phase_lengths.class_total(p)))
            .collect();
        tracing::info!("Requested rows per class: {}", requested.join(", "));

        let store = CsvFeatureStore::new(&cfg.train_dataset);
        let dataset = PhaseDataset::load(&store, &cfg.phase_lengths, validation_split, Some(rng))
            .with_context(|| format!("loading train dataset '{}'", cfg.train_dataset.display()))?;

        tracing::info!(
            "Train set: {} rows, validation: {} rows, {} features, class counts {:?}",
            dataset.len(Partition::Train),
            dataset.len(Partition::Validation),
            dataset.feature_width(),
            dataset.class_counts(Partition::Train),
        );
        Ok(dataset)
    }

    fn load_matrix(&self, rng: &mut ChaCha8Rng) -> Result<FeatureBatch> {
        Ok(self.load_dataset(0.0, rng)?.materialize(Partition::Train, MaterializeOptions::raw()))
    }

    // ── Network, single fit ───────────────────────────────────────────────────
    fn fit_network(&self, kind: NetworkKind) -> Result<TrainReport> {
        let cfg     = &self.config;
        let mut rng = cfg.rng();
        let dataset = self.load_dataset(cfg.validation_split, &mut rng)?;

        let network = cfg.network_config(dataset.feature_width());
        let meta    = CheckpointMeta::new(ModelSpec::network(kind, network.clone())).with_config(cfg.clone());
        let device  = device();

        match kind {
            NetworkKind::Dense => {
                let model = network.init_dense::<TrainBackend>(&device);
                self.run_fit(model, kind, &network, &dataset, meta, &mut rng)
            }
            NetworkKind::Residual => {
                let model = network.init_residual::<TrainBackend>(&device);
                self.run_fit(model, kind, &network, &dataset, meta, &mut rng)
            }
        }
    }

    fn run_fit<M>(
        &self,
        model:   M,
        kind:    NetworkKind,
        network: &NetworkConfig,
        dataset: &PhaseDataset,
        meta:    CheckpointMeta,
        rng:     &mut ChaCha8Rng,
    ) -> Result<TrainReport>
    where
        M: AutodiffModule<TrainBackend> + PhaseNetwork<TrainBackend>,
        M::InnerModule: PhaseNetwork<InferBackend>,
    {
        let cfg     = &self.config;
        let options = cfg.fit_options();
        let manager = cfg.checkpoint();

        println!("{}", summary::<TrainBackend, _>(kind, network, &model));

        let steps            = dataset.steps_per_epoch(Partition::Train, options.batch_size);
        let validation_steps = dataset.steps_per_epoch(Partition::Validation, options.batch_size);
        if validation_steps == 0 && dataset.len(Partition::Validation) > 0 {
            tracing::warn!(
                "validation partition ({} rows) is smaller than one batch; val metrics will be NaN",
                dataset.len(Partition::Validation)
            );
        }

        // each generator owns its rng, seeded from the run's
        let mut train = dataset.generate(
            Partition::Train,
            options.batch_size,
            MaterializeOptions::default(),
            ChaCha8Rng::seed_from_u64(rng.gen()),
        );
        let mut validation = (validation_steps > 0).then(|| {
            dataset.generate(
                Partition::Validation,
                options.batch_size,
                MaterializeOptions::default(),
                ChaCha8Rng::seed_from_u64(rng.gen()),
            )
        });

        let mut checkpoint = BestCheckpoint::new(manager.clone(), meta, Monitor::Acc).with_verbose(cfg.verbose > 0);
        let mut logger     = MetricsLogger::new(manager.metrics_path())?;
        let mut callbacks: [&mut dyn EpochCallback<M>; 2] = [&mut checkpoint, &mut logger];

        let (_, history) = fit_generator(
            model,
            &mut train,
            steps,
            validation.as_mut(),
            validation_steps,
            &options,
            &mut callbacks,
        )?;
        tracing::info!("Finished {} epochs", history.epochs());

        Ok(TrainReport::Fit {
            history,
            best:       checkpoint.best(),
            checkpoint: manager.weights_path(),
        })
    }

    // ── Network, k-fold cross-validation ──────────────────────────────────────
    fn cross_validate_network(&self, kind: NetworkKind) -> Result<TrainReport> {
        let cfg     = &self.config;
        let mut rng = cfg.rng();
        let batch   = self.load_matrix(&mut rng)?;
        let (features, labels) = (batch.matrix(), batch.class_indices());

        let network = cfg.network_config(batch.feature_width());
        let options = cfg.cv_fit_options();
        let seed    = cfg.seed;

        let outcome = cross_validate(
            |fold| NeuralEstimator::new(kind, network.clone(), options.clone(), seed.wrapping_add(fold as u64)),
            &features,
            &labels,
            &KFold::new(cfg.folds),
            &mut rng,
        )?;

        let manager = cfg.checkpoint();
        if let Some(trained) = outcome.best.trained() {
            let meta = CheckpointMeta::new(ModelSpec::network(kind, network)).with_config(cfg.clone());
            trained.save(&manager, &meta)?;
            tracing::info!("Saved fold {} network to '{}'", outcome.best_fold + 1, manager.weights_path().display());
        }

        Ok(TrainReport::CrossValidation {
            mean:       outcome.mean(),
            std:        outcome.std(),
            best_fold:  outcome.best_fold,
            scores:     outcome.scores,
            checkpoint: manager.weights_path(),
        })
    }

    // ── Boosted trees ─────────────────────────────────────────────────────────
    fn fit_boosted(&self) -> Result<TrainReport> {
        let cfg     = &self.config;
        let mut rng = cfg.rng();
        let batch   = self.load_matrix(&mut rng)?;

        let resampled = SmoteEnn::new(RESAMPLE_SEED).fit_resample(&batch.matrix(), &batch.class_indices())?;

        let outcome = grid_search(
            &BoostingConfig::default(),
            &ParamGrid::default(),
            &resampled.features,
            &resampled.labels,
            GRID_FOLDS,
            &mut rng,
        )?;

        let manager: CheckpointManager = cfg.checkpoint();
        let meta = CheckpointMeta::new(ModelSpec::BoostedTrees(outcome.best_config.clone())).with_config(cfg.clone());
        manager.save_trees(&outcome.model, &meta)?;

        let test = TestUseCase::new(cfg.clone()).evaluate_trees(&outcome.model)?;

        Ok(TrainReport::Boosted {
            grid:       outcome.results,
            best_score: outcome.best_score,
            params:     outcome.best_config.params(),
            checkpoint: manager.trees_path(),
            test,
        })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::application::config::{tests::sample, ModelKind};
    use crate::domain::error::PhaseError;
    use std::io::Write;
    use std::path::Path;

    /// `per_class` well-separated URZ rows for every phase, 4 features
    pub(crate) fn write_features(path: &Path, per_class: usize) {
        let mut f = std::fs::File::create(path).unwrap();
        writeln!(f, "station,phase,f0,f1,f2,f3").unwrap();
        for i in 0..per_class {
            for phase in Phase::ALL {
                let values: Vec<String> = (0..4)
                    .map(|j| {
                        let noise = ((i * 5 + j * 3) % 7) as f32 * 0.05;
                        let v = if j == phase.index() { 3.0 + noise } else { noise };
                        format!("{v}")
                    })
                    .collect();
                writeln!(f, "URZ,{},{}", phase.label(), values.join(",")).unwrap();
            }
        }
    }

    fn config(dir: &Path, kind: ModelKind, per_class: usize) -> RunConfig {
        let csv = dir.join("features.csv");
        write_features(&csv, per_class);
        RunConfig {
            train_dataset: csv.clone(),
            test_dataset:  csv,
            model:         Some(dir.join("model")),
            batch_size:    4,
            epochs:        3,
            layers:        "8 8".parse().unwrap(),
            phase_lengths: format!("URZ {0} {0} {0} {0}", per_class).parse().unwrap(),
            kind,
            learning_rate: 0.01,
            validation_split: 0.25,
            folds:         2,
            ..sample()
        }
    }

    #[test]
    fn test_single_fit_writes_checkpoint_and_log() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), ModelKind::Dense, 8);

        let report = TrainUseCase::new(cfg.clone()).execute().unwrap();
        match &report {
            TrainReport::Fit { history, best, .. } => {
                assert_eq!(history.epochs(), 3);
                assert!(best.is_some());
                assert!(history.max_val_acc().is_some());
            }
            other => panic!("expected a single fit, got {other:?}"),
        }
        assert!(report.to_string().starts_with("Max of acc: "));

        let manager = cfg.checkpoint();
        assert!(manager.weights_path().exists());
        let log = std::fs::read_to_string(manager.metrics_path()).unwrap();
        assert_eq!(log.lines().count(), 1 + 3);

        // the saved model reloads and scores on the test set
        let test = TestUseCase::new(cfg).execute().unwrap();
        assert!(test.to_string().contains("Confusion matrix:"));
    }

    #[test]
    fn test_cross_validation_reports_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = RunConfig { cross_validate: true, ..config(dir.path(), ModelKind::Residual, 8) };

        let report = TrainUseCase::new(cfg.clone()).execute().unwrap();
        match &report {
            TrainReport::CrossValidation { scores, mean, .. } => {
                assert_eq!(scores.len(), 2);
                assert!((0.0..=1.0).contains(mean));
            }
            other => panic!("expected cross-validation, got {other:?}"),
        }
        let text  = report.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("Fold  1: "));
        assert!(lines[1].starts_with("Fold  2: "));
        assert!(lines[2].starts_with("Best fold "));
        assert!(lines[3].starts_with("Baseline: "));
        assert!(cfg.checkpoint().weights_path().exists());
    }

    #[test]
    fn test_boosted_grid_search_scores_test_set() {
        let dir = tempfile::tempdir().unwrap();
        // min_child_weight needs a few rows per class in every fold
        let cfg = config(dir.path(), ModelKind::Boosted, 16);

        let report = TrainUseCase::new(cfg.clone()).execute().unwrap();
        match &report {
            TrainReport::Boosted { grid, best_score, params, test, .. } => {
                assert_eq!(grid.len(), 4);
                assert!(grid.iter().any(|(_, score)| score == best_score));
                assert!(*best_score > 0.9);
                assert!(params.iter().any(|(k, _)| *k == "max_depth"));
                assert!(test.accuracy() > 0.9);
            }
            other => panic!("expected boosted trees, got {other:?}"),
        }
        let text = report.to_string();
        assert!(text.starts_with("max_depth=3 learning_rate=0.1 n_estimators=100: "));
        assert!(text.contains("Best accuracy obtained: "));
        assert!(text.contains("Parameters:\n\t"));
        assert!(text.contains("Trees saved to "));
        assert!(cfg.checkpoint().trees_path().exists());
    }

    #[test]
    fn test_short_quota_fails_before_training() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = RunConfig {
            phase_lengths: "URZ 9 8 8 8".parse().unwrap(),
            ..config(dir.path(), ModelKind::Dense, 8)
        };
        let err = TrainUseCase::new(cfg.clone()).execute().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PhaseError>(),
            Some(PhaseError::DataInsufficient { requested: 9, available: 8, .. })
        ));
        assert!(!cfg.checkpoint().weights_path().exists());
    }
}
