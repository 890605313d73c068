// ============================================================
// Layer 5 — Cross-Validation & Grid Search
// ============================================================
// K-fold cross-validation and grid search
//
// `cross_validate` fits a freshly built estimator on each training
// fold and scores it on the held-out fold. `grid_search` runs that
// for every boosting parameter combination over identical folds,
// then refits the winner on all rows.

use anyhow::{bail, Context, Result};
use ndarray::{Array2, Axis};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::data::kfold::KFold;
use crate::ml::boosting::{BoostedTrees, BoostingConfig};
use crate::ml::estimator::Classifier;

/// Per-fold scores plus the estimator of the best-scoring fold
pub struct CvOutcome<E> {
    pub scores:    Vec<f64>,
    pub best:      E,
    pub best_fold: usize,
}

impl<E> CvOutcome<E> {
    pub fn mean(&self) -> f64 {
        mean(&self.scores)
    }

    /// Population standard deviation of the fold scores
    pub fn std(&self) -> f64 {
        std(&self.scores)
    }
}

pub fn mean(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

pub fn std(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let m = mean(scores);
    (scores.iter().map(|s| (s - m).powi(2)).sum::<f64>() / scores.len() as f64).sqrt()
}

fn take_labels(labels: &[usize], rows: &[usize]) -> Vec<usize> {
    rows.iter().map(|&i| labels[i]).collect()
}

/// Score a fresh estimator per fold; `build` receives the fold index.
pub fn cross_validate<E, F>(
    mut build: F,
    features:  &Array2<f32>,
    labels:    &[usize],
    kfold:     &KFold,
    rng:       &mut ChaCha8Rng,
) -> Result<CvOutcome<E>>
where
    E: Classifier,
    F: FnMut(usize) -> E,
{
    if features.nrows() != labels.len() {
        bail!("{} feature rows but {} labels", features.nrows(), labels.len());
    }

    let folds = kfold.split(labels.len(), rng)?;
    let mut scores = Vec::with_capacity(folds.len());
    let mut best: Option<(usize, f64, E)> = None;

    for fold in folds {
        let mut estimator = build(fold.index);
        estimator
            .fit(&features.select(Axis(0), &fold.train), &take_labels(labels, &fold.train))
            .with_context(|| format!("fold {} failed to fit", fold.index + 1))?;
        let score = estimator.score(&features.select(Axis(0), &fold.test), &take_labels(labels, &fold.test))?;

        tracing::info!(
            "fold {:>2}/{}: accuracy {:.2}% ({} train, {} held out)",
            fold.index + 1,
            kfold.n_splits(),
            score * 100.0,
            fold.train.len(),
            fold.test.len(),
        );

        scores.push(score);
        if best.as_ref().map_or(true, |(_, s, _)| score > *s) {
            best = Some((fold.index, score, estimator));
        }
    }

    match best {
        Some((best_fold, _, best)) => Ok(CvOutcome { scores, best, best_fold }),
        None => bail!("cross-validation produced no folds"),
    }
}

// ─── Grid search ──────────────────────────────────────────────────────────────

/// Boosting parameters to try; every combination is evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    pub max_depth:     Vec<usize>,
    pub learning_rate: Vec<f64>,
    pub n_estimators:  Vec<usize>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self {
            max_depth:     vec![3, 6],
            learning_rate: vec![0.1, 0.3],
            n_estimators:  vec![100],
        }
    }
}

impl ParamGrid {
    pub fn candidates(&self, base: &BoostingConfig) -> Vec<BoostingConfig> {
        let mut out = Vec::new();
        for &max_depth in &self.max_depth {
            for &learning_rate in &self.learning_rate {
                for &n_estimators in &self.n_estimators {
                    out.push(BoostingConfig { max_depth, learning_rate, n_estimators, ..base.clone() });
                }
            }
        }
        out
    }
}

pub struct GridSearchOutcome {
    pub best_config: BoostingConfig,
    pub best_score:  f64,
    /// Best configuration refitted on every row
    pub model:       BoostedTrees,
    pub results:     Vec<(BoostingConfig, f64)>,
}

pub fn grid_search(
    base:     &BoostingConfig,
    grid:     &ParamGrid,
    features: &Array2<f32>,
    labels:   &[usize],
    folds:    usize,
    rng:      &mut ChaCha8Rng,
) -> Result<GridSearchOutcome> {
    let candidates = grid.candidates(base);
    if candidates.is_empty() {
        bail!("parameter grid is empty");
    }

    let kfold   = KFold::new(folds);
    let mut results = Vec::with_capacity(candidates.len());

    for config in candidates {
        // same rng state per candidate → identical folds
        let mut fold_rng = rng.clone();
        let outcome = cross_validate(|_| BoostedTrees::new(config.clone()), features, labels, &kfold, &mut fold_rng)?;
        tracing::info!(
            "grid: max_depth={} learning_rate={} n_estimators={} → {:.4}",
            config.max_depth, config.learning_rate, config.n_estimators, outcome.mean()
        );
        results.push((config, outcome.mean()));
    }

    let (best_config, best_score) = results
        .iter()
        .cloned()
        .fold(None, |best: Option<(BoostingConfig, f64)>, (c, s)| match best {
            Some((_, b)) if b >= s => best,
            _ => Some((c, s)),
        })
        .context("no grid result")?;

    let mut model = BoostedTrees::new(best_config.clone());
    model.fit(features, labels)?;

    Ok(GridSearchOutcome { best_config, best_score, model, results })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    /// Predicts the label it saw most often during fit
    struct Majority(usize);

    impl Classifier for Majority {
        fn fit(&mut self, _features: &Array2<f32>, labels: &[usize]) -> Result<()> {
            let mut counts = [0usize; 4];
            for &c in labels {
                counts[c] += 1;
            }
            self.0 = (0..4).max_by_key(|&c| (counts[c], std::cmp::Reverse(c))).unwrap_or(0);
            Ok(())
        }

        fn predict(&self, features: &Array2<f32>) -> Result<Vec<usize>> {
            Ok(vec![self.0; features.nrows()])
        }
    }

    #[test]
    fn test_mean_and_std() {
        assert_eq!(mean(&[0.5, 0.7]), 0.6);
        assert!((std(&[0.5, 0.7]) - 0.1).abs() < 1e-12);
        assert_eq!(std(&[]), 0.0);
    }

    #[test]
    fn test_cross_validate_scores_every_fold() {
        let x = Array2::<f32>::zeros((20, 2));
        let y: Vec<usize> = (0..20).map(|i| if i < 15 { 0 } else { 1 }).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let mut built = Vec::new();
        let outcome = cross_validate(
            |fold| {
                built.push(fold);
                Majority(0)
            },
            &x,
            &y,
            &KFold::new(5),
            &mut rng,
        )
        .unwrap();

        assert_eq!(built, vec![0, 1, 2, 3, 4]);
        assert_eq!(outcome.scores.len(), 5);
        // every held-out row predicted as class 0
        assert!((outcome.mean() - 0.75).abs() < 1e-12);
        assert!(outcome.scores.contains(&outcome.scores[outcome.best_fold]));
    }

    #[test]
    fn test_grid_candidates_cover_product() {
        let grid = ParamGrid { max_depth: vec![2, 4], learning_rate: vec![0.1, 0.2, 0.3], n_estimators: vec![5] };
        let candidates = grid.candidates(&BoostingConfig::default());
        assert_eq!(candidates.len(), 6);
        assert!(candidates.iter().all(|c| c.n_estimators == 5 && c.seed == 42));
    }

    #[test]
    fn test_grid_search_refits_best() {
        let x = Array2::from_shape_fn((48, 2), |(i, j)| ((i % 4) * 3) as f32 + j as f32 * 0.5 + (i / 4) as f32 * 0.01);
        let y: Vec<usize> = (0..48).map(|i| i % 4).collect();
        let grid = ParamGrid { max_depth: vec![1, 3], learning_rate: vec![0.3], n_estimators: vec![10] };
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let outcome = grid_search(&BoostingConfig::default(), &grid, &x, &y, 3, &mut rng).unwrap();
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.best_score > 0.9);
        assert_eq!(outcome.model.config(), &outcome.best_config);
        assert!(outcome.model.score(&x, &y).unwrap() > 0.9);
    }
}
