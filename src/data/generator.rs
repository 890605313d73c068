// ============================================================
// Layer 4 — Streaming Batch Generator
// ============================================================
// Feeds a training loop with fixed-size batches forever:
//
//   pass 1: shuffle ──► [b0][b1][b2]…[bk] (partial tail dropped)
//   pass 2: shuffle ──► [b0][b1][b2]…[bk]
//   …
//
// The consumer decides how many batches make an epoch
// (PhaseDataset::steps_per_epoch), so the iterator itself never
// ends. The only exception is a partition smaller than one
// batch: no full batch can ever be produced, so it yields None.
//
// A generator borrows the rows, owns its order and its rng, and
// advances through &mut self. Two consumers need two generators.

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::data::dataset::{FeatureBatch, MaterializeOptions};
use crate::domain::phase::Example;

pub struct BatchGenerator<'a> {
    rows:       &'a [Example],
    width:      usize,
    batch_size: usize,
    options:    MaterializeOptions,
    order:      Vec<usize>,
    cursor:     usize,
    passes:     usize,
    rng:        ChaCha8Rng,
}

impl<'a> BatchGenerator<'a> {
    pub fn new(
        rows:       &'a [Example],
        width:      usize,
        batch_size: usize,
        options:    MaterializeOptions,
        rng:        ChaCha8Rng,
    ) -> Self {
        Self {
            rows,
            width,
            batch_size,
            options,
            order: (0..rows.len()).collect(),
            cursor: 0,
            passes: 0,
            rng,
        }
    }

    /// Full batches per shuffled pass
    pub fn steps_per_pass(&self) -> usize {
        if self.batch_size == 0 { 0 } else { self.rows.len() / self.batch_size }
    }

    /// Number of shuffled passes started so far
    pub fn passes(&self) -> usize {
        self.passes
    }

    fn reshuffle(&mut self) {
        self.order.shuffle(&mut self.rng);
        self.cursor  = 0;
        self.passes += 1;
        tracing::trace!("Generator pass {} over {} rows", self.passes, self.rows.len());
    }
}

impl Iterator for BatchGenerator<'_> {
    type Item = FeatureBatch;

    fn next(&mut self) -> Option<FeatureBatch> {
        if self.steps_per_pass() == 0 {
            return None;
        }
        if self.passes == 0 || self.cursor + self.batch_size > self.order.len() {
            self.reshuffle();
        }

        let window = &self.order[self.cursor..self.cursor + self.batch_size];
        self.cursor += self.batch_size;

        let rows = self.rows;
        Some(FeatureBatch::from_examples(
            window.iter().map(|&i| &rows[i]),
            self.width,
            self.options,
        ))
    }
}
