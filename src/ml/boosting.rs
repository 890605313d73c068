// ============================================================
// Layer 5 — Gradient-Boosted Trees
// ============================================================
// Multiclass gradient-boosted trees with second-order split finding
//
// Softmax objective, one regression tree per class per round:
// - gradient `g = p_k - y_k`, hessian `h = p_k (1 - p_k)`
// - leaf weight `w* = -G / (H + lambda)`
// - split gain `0.5 [GL²/(HL+λ) + GR²/(HR+λ) - G²/(H+λ)] - gamma`
// - row subsampling and per-tree column subsampling

use anyhow::{bail, Result};
use ndarray::{Array2, ArrayView1, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::phase::Phase;
use crate::ml::estimator::Classifier;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingConfig {
    pub n_estimators:     usize,
    pub learning_rate:    f64,
    pub max_depth:        usize,
    pub min_child_weight: f64,
    /// L2 regularization on leaf weights
    pub reg_lambda:       f64,
    /// Minimum loss reduction to make a split
    pub gamma:            f64,
    pub subsample:        f64,
    pub colsample_bytree: f64,
    pub seed:             u64,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators:     100,
            learning_rate:    0.1,
            max_depth:        6,
            min_child_weight: 1.0,
            reg_lambda:       1.0,
            gamma:            0.0,
            subsample:        1.0,
            colsample_bytree: 1.0,
            seed:             42,
        }
    }
}

impl BoostingConfig {
    /// `key: value` pairs in a stable order, for reports
    pub fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("colsample_bytree", self.colsample_bytree.to_string()),
            ("gamma",            self.gamma.to_string()),
            ("learning_rate",    self.learning_rate.to_string()),
            ("max_depth",        self.max_depth.to_string()),
            ("min_child_weight", self.min_child_weight.to_string()),
            ("n_estimators",     self.n_estimators.to_string()),
            ("reg_lambda",       self.reg_lambda.to_string()),
            ("subsample",        self.subsample.to_string()),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    Leaf { weight: f64 },
    Split {
        feature:   usize,
        threshold: f64,
        left:      Box<TreeNode>,
        right:     Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict(&self, sample: ArrayView1<'_, f64>) -> f64 {
        match self {
            TreeNode::Leaf { weight } => *weight,
            TreeNode::Split { feature, threshold, left, right } => {
                if sample[*feature] <= *threshold {
                    left.predict(sample)
                } else {
                    right.predict(sample)
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

/// Per-class gradient statistics for one boosting round
struct Gradients<'a> {
    grad: &'a [f64],
    hess: &'a [f64],
}

fn build_tree(
    x:        &Array2<f64>,
    stats:    &Gradients<'_>,
    indices:  &[usize],
    features: &[usize],
    depth:    usize,
    config:   &BoostingConfig,
) -> TreeNode {
    let g_sum: f64 = indices.iter().map(|&i| stats.grad[i]).sum();
    let h_sum: f64 = indices.iter().map(|&i| stats.hess[i]).sum();
    let weight = -g_sum / (h_sum + config.reg_lambda);

    if depth >= config.max_depth || indices.len() < 2 || h_sum < 2.0 * config.min_child_weight {
        return TreeNode::Leaf { weight };
    }

    let best = features
        .par_iter()
        .filter_map(|&f| best_split_for_feature(x, stats, indices, f, config))
        .max_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));

    match best {
        Some((feature, threshold, gain)) if gain > 0.0 => {
            let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
                indices.iter().partition(|&&i| x[[i, feature]] <= threshold);

            if left_idx.is_empty() || right_idx.is_empty() {
                return TreeNode::Leaf { weight };
            }

            TreeNode::Split {
                feature,
                threshold,
                left:  Box::new(build_tree(x, stats, &left_idx, features, depth + 1, config)),
                right: Box::new(build_tree(x, stats, &right_idx, features, depth + 1, config)),
            }
        }
        _ => TreeNode::Leaf { weight },
    }
}

/// Exact greedy scan over one feature: (feature, threshold, gain)
fn best_split_for_feature(
    x:       &Array2<f64>,
    stats:   &Gradients<'_>,
    indices: &[usize],
    feature: usize,
    config:  &BoostingConfig,
) -> Option<(usize, f64, f64)> {
    let mut sorted = indices.to_vec();
    sorted.sort_by(|&a, &b| {
        x[[a, feature]].partial_cmp(&x[[b, feature]]).unwrap_or(std::cmp::Ordering::Equal)
    });

    let g_total: f64 = sorted.iter().map(|&i| stats.grad[i]).sum();
    let h_total: f64 = sorted.iter().map(|&i| stats.hess[i]).sum();
    let lambda = config.reg_lambda;
    let parent = g_total * g_total / (h_total + lambda);

    let mut g_left = 0.0;
    let mut h_left = 0.0;
    let mut best: Option<(f64, f64)> = None;

    for pos in 0..sorted.len() - 1 {
        let idx  = sorted[pos];
        let next = sorted[pos + 1];
        g_left += stats.grad[idx];
        h_left += stats.hess[idx];

        let (here, there) = (x[[idx, feature]], x[[next, feature]]);
        if (there - here).abs() < 1e-12 {
            continue;
        }

        let g_right = g_total - g_left;
        let h_right = h_total - h_left;
        if h_left < config.min_child_weight || h_right < config.min_child_weight {
            continue;
        }

        let gain = 0.5 * (
            g_left * g_left / (h_left + lambda)
            + g_right * g_right / (h_right + lambda)
            - parent
        ) - config.gamma;

        if best.map_or(true, |(_, g)| gain > g) {
            best = Some(((here + there) / 2.0, gain));
        }
    }

    best.map(|(threshold, gain)| (feature, threshold, gain))
}

fn subsample(rng: &mut ChaCha8Rng, n: usize, ratio: f64) -> Vec<usize> {
    if ratio >= 1.0 {
        return (0..n).collect();
    }
    let k = ((n as f64) * ratio).ceil().max(1.0) as usize;
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    indices.truncate(k);
    indices.sort_unstable();
    indices
}

/// Row-wise softmax of raw class scores, in place
fn softmax_rows(scores: &mut Array2<f64>) {
    for mut row in scores.axis_iter_mut(Axis(0)) {
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum: f64 = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
}

// ─── Boosted Trees ────────────────────────────────────────────────────────────

/// Softmax gradient-boosted tree ensemble over the four phase classes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostedTrees {
    config:     BoostingConfig,
    n_classes:  usize,
    n_features: usize,
    base_score: Vec<f64>,
    /// rounds[r][k] is the tree for class k in round r
    rounds:     Vec<Vec<TreeNode>>,
}

impl BoostedTrees {
    pub fn new(config: BoostingConfig) -> Self {
        Self {
            config,
            n_classes:  Phase::COUNT,
            n_features: 0,
            base_score: Vec::new(),
            rounds:     Vec::new(),
        }
    }

    pub fn config(&self) -> &BoostingConfig {
        &self.config
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_rounds(&self) -> usize {
        self.rounds.len()
    }

    pub fn max_depth(&self) -> usize {
        self.rounds.iter().flatten().map(TreeNode::depth).max().unwrap_or(0)
    }

    fn raw_scores(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut scores = Array2::from_shape_fn((x.nrows(), self.n_classes), |(_, k)| self.base_score[k]);
        for round in &self.rounds {
            self.add_round(&mut scores, x, round);
        }
        scores
    }

    fn add_round(&self, scores: &mut Array2<f64>, x: &Array2<f64>, round: &[TreeNode]) {
        for (i, sample) in x.axis_iter(Axis(0)).enumerate() {
            for (k, tree) in round.iter().enumerate() {
                scores[[i, k]] += self.config.learning_rate * tree.predict(sample);
            }
        }
    }

    /// Class probabilities, shape `[n, 4]`
    pub fn predict_proba(&self, features: &Array2<f32>) -> Result<Array2<f64>> {
        if self.rounds.is_empty() {
            bail!("boosted trees have not been fitted");
        }
        if features.ncols() != self.n_features {
            bail!(
                "expected {} features per row, got {}",
                self.n_features,
                features.ncols()
            );
        }
        let mut scores = self.raw_scores(&features.mapv(f64::from));
        softmax_rows(&mut scores);
        Ok(scores)
    }
}

impl Classifier for BoostedTrees {
    fn fit(&mut self, features: &Array2<f32>, labels: &[usize]) -> Result<()> {
        let (n, d) = features.dim();
        if n == 0 {
            bail!("cannot fit boosted trees on an empty matrix");
        }
        if labels.len() != n {
            bail!("{} feature rows but {} labels", n, labels.len());
        }
        if let Some(&bad) = labels.iter().find(|&&c| c >= self.n_classes) {
            bail!("label {} out of range for {} classes", bad, self.n_classes);
        }

        let x = features.mapv(f64::from);
        let k = self.n_classes;
        self.n_features = d;

        // Log class priors as the starting score
        let mut counts = vec![0usize; k];
        for &c in labels {
            counts[c] += 1;
        }
        self.base_score = counts
            .iter()
            .map(|&c| ((c as f64) / (n as f64)).max(1e-6).ln())
            .collect();

        let mut scores = Array2::from_shape_fn((n, k), |(_, c)| self.base_score[c]);
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        self.rounds.clear();

        for round in 0..self.config.n_estimators {
            let mut probs = scores.clone();
            softmax_rows(&mut probs);

            let rows = subsample(&mut rng, n, self.config.subsample);
            let cols = subsample(&mut rng, d, self.config.colsample_bytree);

            let mut trees = Vec::with_capacity(k);
            for class in 0..k {
                let p = probs.column(class);
                let grad: Vec<f64> = (0..n)
                    .map(|i| p[i] - if labels[i] == class { 1.0 } else { 0.0 })
                    .collect();
                let hess: Vec<f64> = p.iter().map(|&pi| (pi * (1.0 - pi)).max(1e-6)).collect();

                let stats = Gradients { grad: &grad, hess: &hess };
                trees.push(build_tree(&x, &stats, &rows, &cols, 0, &self.config));
            }

            self.add_round(&mut scores, &x, &trees);
            self.rounds.push(trees);

            if (round + 1) % 10 == 0 {
                let mut p = scores.clone();
                softmax_rows(&mut p);
                let loss = labels
                    .iter()
                    .enumerate()
                    .map(|(i, &c)| -p[[i, c]].max(1e-15).ln())
                    .sum::<f64>()
                    / n as f64;
                tracing::debug!("boost round {:>4}: mlogloss={:.5}", round + 1, loss);
            }
        }

        tracing::debug!("boosting: {} rounds, deepest tree {}", self.rounds.len(), self.max_depth());
        Ok(())
    }

    fn predict(&self, features: &Array2<f32>) -> Result<Vec<usize>> {
        let probs = self.predict_proba(features)?;
        Ok(probs
            .axis_iter(Axis(0))
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f64::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
                    .0
            })
            .collect())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    /// Four well separated blobs, one per class
    fn blobs(per_class: usize, seed: u64) -> (Array2<f32>, Vec<usize>) {
        let centers = [(0.0, 0.0), (5.0, 0.0), (0.0, 5.0), (5.0, 5.0)];
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut data   = Vec::new();
        let mut labels = Vec::new();
        for (class, (cx, cy)) in centers.iter().enumerate() {
            for _ in 0..per_class {
                data.push(cx + rng.gen_range(-1.0..1.0f32));
                data.push(cy + rng.gen_range(-1.0..1.0f32));
                labels.push(class);
            }
        }
        (Array2::from_shape_vec((4 * per_class, 2), data).unwrap(), labels)
    }

    fn small_config() -> BoostingConfig {
        BoostingConfig { n_estimators: 20, max_depth: 3, learning_rate: 0.3, ..Default::default() }
    }

    #[test]
    fn test_separable_blobs_are_learned() {
        let (x, y) = blobs(40, 1);
        let mut model = BoostedTrees::new(small_config());
        model.fit(&x, &y).unwrap();

        assert_eq!(model.n_rounds(), 20);
        assert!(model.max_depth() <= 3);

        let (x_test, y_test) = blobs(20, 2);
        let acc = model.score(&x_test, &y_test).unwrap();
        assert!(acc > 0.95, "accuracy {acc}");
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, y) = blobs(10, 3);
        let mut model = BoostedTrees::new(small_config());
        model.fit(&x, &y).unwrap();
        let probs = model.predict_proba(&x).unwrap();
        for row in probs.axis_iter(Axis(0)) {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_json_round_trip_predicts_identically() {
        let (x, y) = blobs(15, 4);
        let mut model = BoostedTrees::new(small_config());
        model.fit(&x, &y).unwrap();

        let json = serde_json::to_string(&model).unwrap();
        let back: BoostedTrees = serde_json::from_str(&json).unwrap();
        assert_eq!(model.predict(&x).unwrap(), back.predict(&x).unwrap());
        assert_eq!(back.config(), model.config());
    }

    #[test]
    fn test_fixed_seed_with_subsampling_is_reproducible() {
        let (x, y) = blobs(15, 5);
        let config = BoostingConfig { subsample: 0.7, colsample_bytree: 0.5, ..small_config() };
        let mut a = BoostedTrees::new(config.clone());
        let mut b = BoostedTrees::new(config);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
    }

    #[test]
    fn test_rejects_bad_input() {
        let (x, y) = blobs(5, 6);
        let mut model = BoostedTrees::new(small_config());
        assert!(model.predict(&x).is_err());
        assert!(model.fit(&x, &y[..3]).is_err());
        assert!(model.fit(&x, &vec![7; y.len()]).is_err());

        model.fit(&x, &y).unwrap();
        assert!(model.predict(&Array2::zeros((2, 5))).is_err());
    }
}
