// ============================================================
// Layer 4 — Tensor Batcher
// ============================================================
// Converts a framework-neutral FeatureBatch (ndarray matrices)
// into Burn tensors on a given device.
//
//   FeatureBatch.features [n, d] or [n, d, 1] ──► Tensor<B, 2>  [n, d]
//   FeatureBatch.targets  one-hot or classes  ──► Tensor<B, 1, Int> [n]
//
// The trailing channel axis is dropped: the dense and residual
// networks both consume flat feature rows. One-hot targets are
// decoded back to class indices because Burn's cross-entropy
// loss takes integer targets.
//
// B is the Burn Backend — generic so the same batcher serves the
// autodiff backend during training and the plain backend during
// validation and evaluation.

use burn::prelude::*;
use ndarray::{ArrayView2, Axis};

use crate::data::dataset::FeatureBatch;

/// One batch ready for the forward pass.
#[derive(Debug, Clone)]
pub struct PhaseBatch<B: Backend> {
    /// Feature rows — shape: [batch_size, n_features]
    pub features: Tensor<B, 2>,

    /// Class index per row — shape: [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

#[derive(Clone, Debug)]
pub struct PhaseBatcher<B: Backend> {
    /// The device to create tensors on
    pub device: B::Device,
}

impl<B: Backend> PhaseBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    pub fn batch(&self, batch: &FeatureBatch) -> PhaseBatch<B> {
        self.rows(batch.matrix().view(), &batch.class_indices())
    }

    /// Batch from a feature matrix and its class indices
    pub fn rows(&self, features: ArrayView2<'_, f32>, classes: &[usize]) -> PhaseBatch<B> {
        let classes: Vec<i32> = classes.iter().map(|&c| c as i32).collect();
        PhaseBatch {
            features: self.features(features),
            targets:  Tensor::<B, 1, Int>::from_ints(classes.as_slice(), &self.device),
        }
    }

    /// Build a `[rows, cols]` float tensor from a row-major matrix view
    pub fn features(&self, matrix: ArrayView2<'_, f32>) -> Tensor<B, 2> {
        let (rows, cols) = matrix.dim();
        // iter() walks in logical (row-major) order regardless of memory layout
        let flat: Vec<f32> = matrix.iter().copied().collect();
        Tensor::<B, 2>::from_data(TensorData::new(flat, [rows, cols]), &self.device)
    }

    /// Split a large matrix into tensors of at most `chunk` rows
    pub fn chunks<'a>(
        &'a self,
        matrix: ArrayView2<'a, f32>,
        chunk:  usize,
    ) -> impl Iterator<Item = Tensor<B, 2>> + 'a {
        let chunk = chunk.max(1);
        let n     = matrix.len_of(Axis(0));
        (0..n)
            .step_by(chunk)
            .map(move |start| self.features(matrix.slice_axis(Axis(0), (start..(start + chunk).min(n)).into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::MaterializeOptions;
    use crate::domain::phase::{Example, Phase};
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn batch(options: MaterializeOptions) -> FeatureBatch {
        let rows: Vec<Example> = (0..6)
            .map(|i| Example::new(i, "URZ", Phase::ALL[i % 4], vec![i as f32, 10.0 + i as f32, 0.0]))
            .collect();
        FeatureBatch::from_examples(&rows, 3, options)
    }

    #[test]
    fn test_shapes_from_one_hot_expanded_batch() {
        let batcher = PhaseBatcher::<TestBackend>::new(Default::default());
        let out     = batcher.batch(&batch(MaterializeOptions::default()));
        assert_eq!(out.features.dims(), [6, 3]);
        assert_eq!(out.targets.dims(), [6]);

        let targets: Vec<i64> = out.targets.into_data().iter::<i64>().collect();
        assert_eq!(targets, vec![0, 1, 2, 3, 0, 1]);
    }

    #[test]
    fn test_feature_values_are_row_major() {
        let batcher = PhaseBatcher::<TestBackend>::new(Default::default());
        let out     = batcher.batch(&batch(MaterializeOptions::raw()));
        let values: Vec<f32> = out.features.into_data().iter::<f32>().collect();
        assert_eq!(&values[..6], &[0.0, 10.0, 0.0, 1.0, 11.0, 0.0]);
    }

    #[test]
    fn test_chunks_cover_all_rows() {
        let batcher = PhaseBatcher::<TestBackend>::new(Default::default());
        let data    = batch(MaterializeOptions::raw()).matrix();
        let sizes: Vec<usize> = batcher.chunks(data.view(), 4).map(|t| t.dims()[0]).collect();
        assert_eq!(sizes, vec![4, 2]);
    }
}
