// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores trained models.
//
// Every run has one checkpoint base path, either given with
// `--model` or derived from the experiment parameters:
//
//   results/phase_weights_best_s_{stations}_l_{layers}_d_{dropout}
//
// e.g. results/phase_weights_best_s_lpaz_urz_l_128_64_d_0.1
//
// Files written next to that base:
//
//   <base>.mpk.gz       network weights (named MessagePack, gzip,
//                       full precision so a reload predicts exactly
//                       like the model that was saved)
//   <base>.meta.json    ModelSpec + run config + best epoch; the
//                       test action rebuilds the network from it
//                       before loading the weights
//   <base>.trees.json   boosted-tree ensemble
//   <base>.metrics.csv  per-epoch log (see metrics.rs)
//
// BestCheckpoint is the training callback: it rewrites the
// weights whenever the monitored metric improves, so the files
// always hold the best epoch seen so far.

use anyhow::{anyhow, Context, Result};
use burn::{
    module::AutodiffModule,
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder},
};
use serde::{Deserialize, Serialize};
use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use crate::application::config::RunConfig;
use crate::domain::error::{PhaseError, PhaseResult};
use crate::domain::quota::{LayerSpec, PhaseLengths};
use crate::infra::metrics::{EpochMetrics, Monitor};
use crate::ml::boosting::BoostedTrees;
use crate::ml::model::ModelSpec;
use crate::ml::trainer::{EpochCallback, InferBackend, TrainBackend};

type WeightsRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

/// The derived checkpoint base path of an experiment.
///
/// Station names are lower-cased and sorted, so the same quota
/// given in a different order maps to the same file.
pub fn derive_base_path(lengths: &PhaseLengths, layers: &LayerSpec, dropout: f64) -> PathBuf {
    let mut stations: Vec<String> = lengths.stations().map(str::to_lowercase).collect();
    stations.sort();
    PathBuf::from("results").join(format!(
        "phase_weights_best_s_{}_l_{}_d_{}",
        stations.join("_"),
        layers.slug(),
        dropout
    ))
}

/// Sidecar describing what the weights file contains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub spec:    ModelSpec,
    pub epoch:   Option<usize>,
    pub monitor: Option<Monitor>,
    pub value:   Option<f64>,
    pub config:  Option<RunConfig>,
}

impl CheckpointMeta {
    pub fn new(spec: ModelSpec) -> Self {
        Self { spec, epoch: None, monitor: None, value: None, config: None }
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = Some(config);
        self
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointManager {
    /// Path without extension; every file appends its own suffix
    base: PathBuf,
}

impl CheckpointManager {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    // The base may itself contain dots (`_d_0.1`), so suffixes are
    // appended rather than set with `with_extension`.
    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut s: OsString = self.base.clone().into_os_string();
        s.push(suffix);
        PathBuf::from(s)
    }

    pub fn weights_path(&self) -> PathBuf { self.with_suffix(".mpk.gz") }
    pub fn meta_path(&self)    -> PathBuf { self.with_suffix(".meta.json") }
    pub fn trees_path(&self)   -> PathBuf { self.with_suffix(".trees.json") }
    pub fn metrics_path(&self) -> PathBuf { self.with_suffix(".metrics.csv") }

    /// The recorder replaces the last extension of the path it is
    /// given with `mpk.gz`; hand it a throwaway one.
    fn recorder_path(&self) -> PathBuf {
        self.with_suffix(".weights")
    }

    fn ensure_dir(&self) -> Result<()> {
        if let Some(dir) = self.base.parent().filter(|d| !d.as_os_str().is_empty()) {
            // create_dir_all creates parent directories too, like `mkdir -p`
            fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        }
        Ok(())
    }

    fn write_meta(&self, meta: &CheckpointMeta) -> Result<()> {
        let path = self.meta_path();
        let json = serde_json::to_string_pretty(meta)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write checkpoint metadata to '{}'", path.display()))
    }

    /// Save network weights and their metadata sidecar.
    pub fn save_network<B: Backend, M: Module<B>>(&self, model: &M, meta: &CheckpointMeta) -> Result<()> {
        self.ensure_dir()?;
        model
            .clone()
            .save_file(self.recorder_path(), &WeightsRecorder::new())
            .map_err(|e| anyhow!("{e:?}"))
            .with_context(|| format!("Failed to save checkpoint to '{}'", self.weights_path().display()))?;
        self.write_meta(meta)?;
        tracing::debug!("Saved checkpoint '{}'", self.weights_path().display());
        Ok(())
    }

    pub fn load_meta(&self) -> PhaseResult<CheckpointMeta> {
        let path = self.meta_path();
        let json = fs::read_to_string(&path)
            .map_err(|e| PhaseError::model_load(&path, format!("{e}. Have you run 'train' first?")))?;
        serde_json::from_str(&json).map_err(|e| PhaseError::model_load(&path, e))
    }

    /// Load weights into a freshly built model of the saved architecture.
    pub fn load_network<B: Backend, M: Module<B>>(&self, model: M, device: &B::Device) -> PhaseResult<M> {
        let path = self.weights_path();
        if !path.exists() {
            return Err(PhaseError::model_load(&path, "no such file. Have you run 'train' first?"));
        }
        tracing::info!("Loading checkpoint '{}'", path.display());
        model
            .load_file(self.recorder_path(), &WeightsRecorder::new(), device)
            .map_err(|e| PhaseError::model_load(&path, format!("{e:?}")))
    }

    pub fn save_trees(&self, trees: &BoostedTrees, meta: &CheckpointMeta) -> Result<()> {
        self.ensure_dir()?;
        let path = self.trees_path();
        let json = serde_json::to_string(trees)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write trees to '{}'", path.display()))?;
        self.write_meta(meta)?;
        tracing::debug!("Saved {} boosting rounds to '{}'", trees.n_rounds(), path.display());
        Ok(())
    }

    pub fn load_trees(&self) -> PhaseResult<BoostedTrees> {
        let path = self.trees_path();
        let json = fs::read_to_string(&path)
            .map_err(|e| PhaseError::model_load(&path, format!("{e}. Have you run 'train' first?")))?;
        serde_json::from_str(&json).map_err(|e| PhaseError::model_load(&path, e))
    }
}

// ─── Best-model callback ──────────────────────────────────────────────────────

/// Saves the model whenever the monitored metric improves.
pub struct BestCheckpoint {
    manager: CheckpointManager,
    meta:    CheckpointMeta,
    monitor: Monitor,
    best:    Option<f64>,
    verbose: bool,
}

impl BestCheckpoint {
    pub fn new(manager: CheckpointManager, meta: CheckpointMeta, monitor: Monitor) -> Self {
        Self { manager, meta, monitor, best: None, verbose: false }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// (epoch, value) of the saved model, if any epoch improved
    pub fn best(&self) -> Option<(usize, f64)> {
        self.meta.epoch.zip(self.best)
    }
}

impl<M> EpochCallback<M> for BestCheckpoint
where
    M: AutodiffModule<TrainBackend>,
{
    fn on_epoch_end(&mut self, model: &M, metrics: &EpochMetrics) -> Result<()> {
        let value = self.monitor.value(metrics);
        let name  = self.monitor.name();

        if !self.monitor.is_improvement(value, self.best) {
            if self.verbose {
                if let Some(best) = self.best {
                    println!("Epoch {:05}: {} did not improve from {:.5}", metrics.epoch, name, best);
                }
            }
            return Ok(());
        }

        if self.verbose {
            let from = self.best.map_or_else(|| "-inf".to_string(), |b| format!("{b:.5}"));
            println!(
                "Epoch {:05}: {} improved from {} to {:.5}, saving model to {}",
                metrics.epoch, name, from, value, self.manager.weights_path().display()
            );
        }

        self.best         = Some(value);
        self.meta.epoch   = Some(metrics.epoch);
        self.meta.monitor = Some(self.monitor);
        self.meta.value   = Some(value);
        self.manager.save_network::<InferBackend, _>(&model.valid(), &self.meta)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::boosting::BoostingConfig;
    use crate::ml::estimator::Classifier;
    use crate::ml::model::{NetworkConfig, NetworkKind, PhaseNetwork};
    use crate::ml::trainer::device;
    use ndarray::Array2;

    #[test]
    fn test_derived_path_is_order_independent() {
        let layers: LayerSpec = "128 64".parse().unwrap();
        let a: PhaseLengths = "URZ 1 1 1 1, LPAZ 2 2 2 2".parse().unwrap();
        let b: PhaseLengths = "LPAZ 2 2 2 2, URZ 1 1 1 1".parse().unwrap();

        let path = derive_base_path(&a, &layers, 0.1);
        assert_eq!(path, derive_base_path(&b, &layers, 0.1));
        assert_eq!(path, PathBuf::from("results/phase_weights_best_s_lpaz_urz_l_128_64_d_0.1"));
    }

    #[test]
    fn test_suffixes_keep_dotted_base() {
        let manager = CheckpointManager::new("results/run_d_0.1");
        assert_eq!(manager.weights_path(), PathBuf::from("results/run_d_0.1.mpk.gz"));
        assert_eq!(manager.meta_path(), PathBuf::from("results/run_d_0.1.meta.json"));
        assert_eq!(manager.trees_path(), PathBuf::from("results/run_d_0.1.trees.json"));
    }

    #[test]
    fn test_network_round_trip_predicts_identically() {
        let dir     = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path().join("sub").join("net_d_0.2"));
        let device  = device();
        let config  = NetworkConfig::new(5, vec![7, 3], 0.2);
        let model   = config.init_residual::<InferBackend>(&device);

        let meta = CheckpointMeta::new(ModelSpec::network(NetworkKind::Residual, config.clone()));
        manager.save_network::<InferBackend, _>(&model, &meta).unwrap();
        assert!(manager.weights_path().exists());

        let restored = manager
            .load_network::<InferBackend, _>(config.init_residual::<InferBackend>(&device), &device)
            .unwrap();

        let x = Tensor::<InferBackend, 2>::from_data(
            TensorData::new((0..15).map(|i| i as f32 * 0.3 - 2.0).collect::<Vec<_>>(), [3, 5]),
            &device,
        );
        let before: Vec<f32> = model.forward(x.clone()).into_data().iter::<f32>().collect();
        let after:  Vec<f32> = restored.forward(x).into_data().iter::<f32>().collect();
        assert_eq!(before, after);

        let meta = manager.load_meta().unwrap();
        let (kind, cfg) = meta.spec.as_network().unwrap();
        assert_eq!(kind, NetworkKind::Residual);
        assert_eq!(cfg.layers, vec![7, 3]);
    }

    #[test]
    fn test_missing_checkpoint_is_model_load_error() {
        let dir     = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path().join("absent"));
        let device  = device();
        let model   = NetworkConfig::new(2, vec![2], 0.0).init_dense::<InferBackend>(&device);

        assert!(matches!(
            manager.load_network::<InferBackend, _>(model, &device),
            Err(PhaseError::ModelLoad { .. })
        ));
        assert!(matches!(manager.load_meta(), Err(PhaseError::ModelLoad { .. })));
        assert!(matches!(manager.load_trees(), Err(PhaseError::ModelLoad { .. })));
    }

    #[test]
    fn test_trees_round_trip() {
        let dir     = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path().join("trees"));
        let x = Array2::from_shape_fn((40, 2), |(i, j)| (i % 4) as f32 * 2.0 + j as f32 * 0.01 + (i / 4) as f32 * 0.001);
        let y: Vec<usize> = (0..40).map(|i| i % 4).collect();

        let config = BoostingConfig { n_estimators: 5, max_depth: 3, ..Default::default() };
        let mut trees = BoostedTrees::new(config.clone());
        trees.fit(&x, &y).unwrap();
        manager.save_trees(&trees, &CheckpointMeta::new(ModelSpec::BoostedTrees(config))).unwrap();

        let back = manager.load_trees().unwrap();
        assert_eq!(back.predict(&x).unwrap(), trees.predict(&x).unwrap());
        assert_eq!(manager.load_meta().unwrap().spec.name(), "boosted");
    }
}
