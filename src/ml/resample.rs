// ============================================================
// Layer 5 — Imbalance Resampling
// ============================================================
// Imbalance resampling: SMOTE oversampling followed by
// edited-nearest-neighbours cleaning (SMOTE-ENN)
//
// - `Smote` interpolates new minority rows between a sample and one
//   of its k nearest same-class neighbours until every class matches
//   the majority count
// - `EditedNearestNeighbours` drops every row whose k nearest
//   neighbours do not all share its label
//
// Neighbour searches are brute force, parallelised over query rows.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use anyhow::{bail, Result};
use ndarray::{Array2, ArrayView1};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::phase::Phase;

/// Ordered float for BinaryHeap-based partial sort
#[derive(Debug, Clone, Copy)]
struct DistIdx(f32, usize);

impl PartialEq for DistIdx {
    fn eq(&self, other: &Self) -> bool { self.0 == other.0 }
}
impl Eq for DistIdx {}
impl PartialOrd for DistIdx {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}
impl Ord for DistIdx {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

fn squared_distance(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// The `k` rows of `candidates` closest to row `point`, excluding itself
fn nearest(x: &Array2<f32>, candidates: &[usize], point: usize, k: usize) -> Vec<usize> {
    let mut heap: BinaryHeap<DistIdx> = BinaryHeap::with_capacity(k + 1);
    let query = x.row(point);

    for &i in candidates {
        if i == point {
            continue;
        }
        let dist = squared_distance(query, x.row(i));
        if heap.len() < k {
            heap.push(DistIdx(dist, i));
        } else if let Some(&DistIdx(max_dist, _)) = heap.peek() {
            if dist < max_dist {
                heap.pop();
                heap.push(DistIdx(dist, i));
            }
        }
    }

    heap.into_sorted_vec().into_iter().map(|DistIdx(_, i)| i).collect()
}

pub fn class_counts(labels: &[usize]) -> [usize; Phase::COUNT] {
    let mut counts = [0; Phase::COUNT];
    for &c in labels {
        if c < Phase::COUNT {
            counts[c] += 1;
        }
    }
    counts
}

/// Result of resampling
#[derive(Debug, Clone)]
pub struct Resampled {
    pub features:    Array2<f32>,
    pub labels:      Vec<usize>,
    /// Synthetic rows appended by oversampling
    pub n_synthetic: usize,
    /// Rows dropped by cleaning
    pub n_removed:   usize,
}

pub trait Resampler {
    fn fit_resample(&self, features: &Array2<f32>, labels: &[usize]) -> Result<Resampled>;
}

fn check_input(features: &Array2<f32>, labels: &[usize]) -> Result<()> {
    if features.nrows() != labels.len() {
        bail!("{} feature rows but {} labels", features.nrows(), labels.len());
    }
    if let Some(&bad) = labels.iter().find(|&&c| c >= Phase::COUNT) {
        bail!("label {} is not a phase class", bad);
    }
    Ok(())
}

// ─── SMOTE ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Smote {
    k_neighbors: usize,
    seed:        u64,
}

impl Smote {
    pub fn new(seed: u64) -> Self {
        Self { k_neighbors: 5, seed }
    }
}

impl Resampler for Smote {
    fn fit_resample(&self, features: &Array2<f32>, labels: &[usize]) -> Result<Resampled> {
        check_input(features, labels)?;
        let counts = class_counts(labels);
        if counts.iter().filter(|&&c| c > 0).count() < 2 {
            bail!("SMOTE needs at least two populated classes, got counts {:?}", counts);
        }

        let target = counts.iter().copied().max().unwrap_or(0);
        let width  = features.ncols();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let mut synthetic: Vec<f32>      = Vec::new();
        let mut synthetic_y: Vec<usize> = Vec::new();

        for class in 0..Phase::COUNT {
            let need = target - counts[class];
            if counts[class] == 0 || need == 0 {
                continue;
            }

            let members: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == class).collect();
            let k = self.k_neighbors.min(members.len() - 1);
            let neighbours: Vec<Vec<usize>> = members
                .par_iter()
                .map(|&i| nearest(features, &members, i, k))
                .collect();

            for _ in 0..need {
                let m      = rng.gen_range(0..members.len());
                let sample = features.row(members[m]);
                match neighbours[m].as_slice() {
                    // a lone sample can only be repeated
                    [] => synthetic.extend(sample.iter().copied()),
                    nbs => {
                        let other = features.row(nbs[rng.gen_range(0..nbs.len())]);
                        let gap: f32 = rng.gen();
                        synthetic.extend(
                            sample.iter().zip(other.iter()).map(|(&s, &o)| s + gap * (o - s)),
                        );
                    }
                }
                synthetic_y.push(class);
            }
            tracing::debug!("SMOTE: class {} {} → {}", Phase::ALL[class], counts[class], target);
        }

        let n_synthetic = synthetic_y.len();
        let mut data: Vec<f32> = features.iter().copied().collect();
        data.extend(synthetic);
        let mut out_labels = labels.to_vec();
        out_labels.extend(synthetic_y);

        let features = Array2::from_shape_vec((out_labels.len(), width), data)?;
        Ok(Resampled { features, labels: out_labels, n_synthetic, n_removed: 0 })
    }
}

// ─── Edited nearest neighbours ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditedNearestNeighbours {
    n_neighbors: usize,
}

impl EditedNearestNeighbours {
    pub fn new(n_neighbors: usize) -> Self {
        Self { n_neighbors: n_neighbors.max(1) }
    }
}

impl Default for EditedNearestNeighbours {
    fn default() -> Self {
        Self::new(3)
    }
}

impl Resampler for EditedNearestNeighbours {
    fn fit_resample(&self, features: &Array2<f32>, labels: &[usize]) -> Result<Resampled> {
        check_input(features, labels)?;
        let all: Vec<usize> = (0..labels.len()).collect();

        let keep: Vec<usize> = all
            .par_iter()
            .filter(|&&i| {
                nearest(features, &all, i, self.n_neighbors)
                    .iter()
                    .all(|&j| labels[j] == labels[i])
            })
            .copied()
            .collect();

        let n_removed = labels.len() - keep.len();
        let features  = features.select(ndarray::Axis(0), &keep);
        let labels    = keep.iter().map(|&i| labels[i]).collect();
        Ok(Resampled { features, labels, n_synthetic: 0, n_removed })
    }
}

// ─── SMOTE-ENN ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmoteEnn {
    smote: Smote,
    enn:   EditedNearestNeighbours,
}

impl SmoteEnn {
    pub fn new(seed: u64) -> Self {
        Self { smote: Smote::new(seed), enn: EditedNearestNeighbours::default() }
    }
}

impl Resampler for SmoteEnn {
    fn fit_resample(&self, features: &Array2<f32>, labels: &[usize]) -> Result<Resampled> {
        let before    = class_counts(labels);
        let oversized = self.smote.fit_resample(features, labels)?;
        let cleaned   = self.enn.fit_resample(&oversized.features, &oversized.labels)?;

        tracing::info!(
            "SMOTE-ENN: {:?} → {:?} (+{} synthetic, -{} edited)",
            before,
            class_counts(&cleaned.labels),
            oversized.n_synthetic,
            cleaned.n_removed,
        );

        Ok(Resampled {
            n_synthetic: oversized.n_synthetic,
            ..cleaned
        })
    }
}
