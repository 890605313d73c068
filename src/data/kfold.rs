// ============================================================
// Layer 4 — K-Fold Splitter
// ============================================================
// Shuffled k-fold index splits for cross-validation.
//
// Fold sizes follow the usual rule: the first (n % k) folds get
// one extra row, so sizes differ by at most one. The shuffle is
// driven by the caller's rng, which makes fold assignment
// reproducible for a fixed seed.

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::domain::error::{PhaseError, PhaseResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub index: usize,
    pub train: Vec<usize>,
    pub test:  Vec<usize>,
}

#[derive(Debug, Clone, Copy)]
pub struct KFold {
    n_splits: usize,
}

impl KFold {
    pub fn new(n_splits: usize) -> Self {
        Self { n_splits }
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    pub fn split(&self, n_samples: usize, rng: &mut ChaCha8Rng) -> PhaseResult<Vec<Fold>> {
        if self.n_splits < 2 {
            return Err(PhaseError::cli("cross-validation needs at least 2 folds"));
        }
        if n_samples < self.n_splits {
            return Err(PhaseError::cli(format!(
                "cannot split {} samples into {} folds",
                n_samples, self.n_splits
            )));
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        indices.shuffle(rng);

        let base      = n_samples / self.n_splits;
        let remainder = n_samples % self.n_splits;

        let mut folds   = Vec::with_capacity(self.n_splits);
        let mut current = 0;
        for index in 0..self.n_splits {
            let size = if index < remainder { base + 1 } else { base };
            let test = indices[current..current + size].to_vec();
            let train = indices[..current]
                .iter()
                .chain(&indices[current + size..])
                .copied()
                .collect();
            folds.push(Fold { index, train, test });
            current += size;
        }
        Ok(folds)
    }
}
