// ============================================================
// Layer 4 — Partitioned Dataset
// ============================================================
// Loads the quota-selected examples once, splits each class into
// train and validation parts, and turns a partition into matrices
// or a batch generator.

use ndarray::{Array2, ArrayD, Axis};
use rand_chacha::ChaCha8Rng;

use crate::data::generator::BatchGenerator;
use crate::data::splitter::split_by_class;
use crate::domain::error::PhaseResult;
use crate::domain::phase::{Example, Phase};
use crate::domain::quota::PhaseLengths;
use crate::domain::traits::FeatureSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Train,
    Validation,
}

/// How examples are laid out when turned into matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterializeOptions {
    /// `[n, 4]` one-hot targets instead of raw class indices
    pub one_hot:    bool,
    /// `[n, d, 1]` features for architectures expecting a channel axis
    pub expand_dim: bool,
}

impl MaterializeOptions {
    /// Raw class indices and a plain `[n, d]` matrix
    pub fn raw() -> Self {
        Self { one_hot: false, expand_dim: false }
    }
}

impl Default for MaterializeOptions {
    fn default() -> Self {
        Self { one_hot: true, expand_dim: true }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Targets {
    OneHot(Array2<f32>),
    Classes(Vec<usize>),
}

impl Targets {
    pub fn len(&self) -> usize {
        match self {
            Targets::OneHot(m)  => m.nrows(),
            Targets::Classes(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Class index per row; one-hot rows are decoded with argmax
    pub fn class_indices(&self) -> Vec<usize> {
        match self {
            Targets::Classes(c) => c.clone(),
            Targets::OneHot(m) => m
                .rows()
                .into_iter()
                .map(|row| {
                    row.iter()
                        .enumerate()
                        .fold((0, f32::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
                        .0
                })
                .collect(),
        }
    }
}

/// A feature matrix with its targets — one streamed batch or a whole partition.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBatch {
    pub features: ArrayD<f32>,
    pub targets:  Targets,
}

impl FeatureBatch {
    pub fn from_examples<'a>(
        rows:    impl IntoIterator<Item = &'a Example>,
        width:   usize,
        options: MaterializeOptions,
    ) -> Self {
        let rows: Vec<&Example> = rows.into_iter().collect();
        let n = rows.len();

        let matrix = Array2::from_shape_fn((n, width), |(i, j)| rows[i].features[j]);
        let features = if options.expand_dim {
            matrix.insert_axis(Axis(2)).into_dyn()
        } else {
            matrix.into_dyn()
        };

        let targets = if options.one_hot {
            Targets::OneHot(Array2::from_shape_fn((n, Phase::COUNT), |(i, j)| {
                if rows[i].phase.index() == j { 1.0 } else { 0.0 }
            }))
        } else {
            Targets::Classes(rows.iter().map(|r| r.phase.index()).collect())
        };

        Self { features, targets }
    }

    pub fn len(&self) -> usize {
        self.features.shape().first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of features per row, ignoring a trailing channel axis
    pub fn feature_width(&self) -> usize {
        self.features.shape().get(1).copied().unwrap_or(0)
    }

    /// The features as a plain `[n, d]` matrix
    pub fn matrix(&self) -> Array2<f32> {
        let (n, d)    = (self.len(), self.feature_width());
        let expanded = self.features.ndim() == 3;
        Array2::from_shape_fn((n, d), |(i, j)| {
            let index: &[usize] = if expanded { &[i, j, 0] } else { &[i, j] };
            self.features[index]
        })
    }

    pub fn class_indices(&self) -> Vec<usize> {
        self.targets.class_indices()
    }
}

/// The quota-selected examples of one feature file, split into
/// training and validation partitions.
#[derive(Debug, Clone)]
pub struct PhaseDataset {
    train:         Vec<Example>,
    validation:    Vec<Example>,
    feature_width: usize,
}

impl PhaseDataset {
    pub fn new(train: Vec<Example>, validation: Vec<Example>) -> Self {
        let feature_width = train
            .first()
            .or_else(|| validation.first())
            .map(Example::width)
            .unwrap_or(0);
        Self { train, validation, feature_width }
    }

    /// Read, quota-select and partition in one go.
    ///
    /// The same rng drives row sampling and the partition shuffle;
    /// `None` keeps everything in file order.
    pub fn load(
        source:           &dyn FeatureSource,
        quota:            &PhaseLengths,
        validation_split: f64,
        mut rng:          Option<&mut ChaCha8Rng>,
    ) -> PhaseResult<Self> {
        let examples = source.load(quota, rng.as_deref_mut())?;
        let (train, validation) = split_by_class(examples, validation_split, rng)?;
        Ok(Self::new(train, validation))
    }

    pub fn examples(&self, partition: Partition) -> &[Example] {
        match partition {
            Partition::Train      => &self.train,
            Partition::Validation => &self.validation,
        }
    }

    pub fn len(&self, partition: Partition) -> usize {
        self.examples(partition).len()
    }

    pub fn feature_width(&self) -> usize {
        self.feature_width
    }

    /// Full batches per pass; a trailing partial batch is never produced
    pub fn steps_per_epoch(&self, partition: Partition, batch_size: usize) -> usize {
        if batch_size == 0 {
            return 0;
        }
        self.len(partition) / batch_size
    }

    pub fn class_counts(&self, partition: Partition) -> [usize; Phase::COUNT] {
        let mut counts = [0; Phase::COUNT];
        for e in self.examples(partition) {
            counts[e.phase.index()] += 1;
        }
        counts
    }

    /// The whole partition as one batch, in partition order.
    pub fn materialize(&self, partition: Partition, options: MaterializeOptions) -> FeatureBatch {
        FeatureBatch::from_examples(self.examples(partition), self.feature_width, options)
    }

    /// An endless, reshuffling stream of full batches over one partition.
    ///
    /// Each generator owns its rng and row order; build one per consumer.
    pub fn generate(
        &self,
        partition:  Partition,
        batch_size: usize,
        options:    MaterializeOptions,
        rng:        ChaCha8Rng,
    ) -> BatchGenerator<'_> {
        BatchGenerator::new(self.examples(partition), self.feature_width, batch_size, options, rng)
    }
}
