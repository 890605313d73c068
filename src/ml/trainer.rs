// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Epoch loop with Adam and cross-entropy, two ways of feeding it:
//
//   fit_generator — pulls `steps_per_epoch` full batches per epoch
//                   from a streaming BatchGenerator, then scores
//                   `validation_steps` batches from a second one
//   fit_arrays    — shuffles an in-memory matrix each epoch and
//                   walks it in batch_size chunks (last chunk may
//                   be short); used for cross-validation folds
//
// Backends:
//   - Training uses TrainBackend (Autodiff<NdArray>) for gradients
//   - model.valid() returns the model on InferBackend (NdArray)
//     with dropout disabled; validation batches use it too
//   - argmax(1) returns [batch,1] so we flatten before .equal()
//
// After every epoch the EpochMetrics are handed to the
// callbacks (best-checkpoint saving, CSV log) in order.

use anyhow::{bail, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, Autodiff, NdArray},
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
};
use ndarray::{Array2, Axis};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::data::batcher::{PhaseBatch, PhaseBatcher};
use crate::data::generator::BatchGenerator;
use crate::infra::metrics::EpochMetrics;
use crate::ml::model::PhaseNetwork;

pub type TrainBackend = Autodiff<NdArray>;
pub type InferBackend = NdArray;

pub fn device() -> NdArrayDevice {
    NdArrayDevice::default()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitOptions {
    pub epochs:        usize,
    pub batch_size:    usize,
    pub learning_rate: f64,
    /// 0 silent, 1+ one line per epoch
    pub verbose:       u8,
}

/// Something that reacts to the end of an epoch.
pub trait EpochCallback<M> {
    fn on_epoch_end(&mut self, model: &M, metrics: &EpochMetrics) -> Result<()>;
}

/// Per-epoch loss and accuracy curves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub loss:     Vec<f64>,
    pub acc:      Vec<f64>,
    pub val_loss: Vec<f64>,
    pub val_acc:  Vec<f64>,
}

impl History {
    pub fn push(&mut self, m: &EpochMetrics) {
        self.loss.push(m.loss);
        self.acc.push(m.acc);
        self.val_loss.push(m.val_loss);
        self.val_acc.push(m.val_acc);
    }

    pub fn epochs(&self) -> usize {
        self.loss.len()
    }

    fn extreme(values: &[f64], max: bool) -> Option<f64> {
        values
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .reduce(if max { f64::max } else { f64::min })
    }

    pub fn max_acc(&self)      -> Option<f64> { Self::extreme(&self.acc, true) }
    pub fn max_val_acc(&self)  -> Option<f64> { Self::extreme(&self.val_acc, true) }
    pub fn min_loss(&self)     -> Option<f64> { Self::extreme(&self.loss, false) }
    pub fn min_val_loss(&self) -> Option<f64> { Self::extreme(&self.val_loss, false) }
}

/// Running sums over the batches of one epoch
#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    loss:    f64,
    correct: usize,
    seen:    usize,
}

impl Tally {
    fn add(&mut self, batch_loss: f64, correct: usize, n: usize) {
        self.loss    += batch_loss * n as f64;
        self.correct += correct;
        self.seen    += n;
    }

    fn mean_loss(&self) -> f64 {
        if self.seen > 0 { self.loss / self.seen as f64 } else { f64::NAN }
    }

    fn accuracy(&self) -> f64 {
        if self.seen > 0 { self.correct as f64 / self.seen as f64 } else { f64::NAN }
    }
}

fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let predicted = logits.argmax(1).flatten::<1>(0, 1);
    predicted.equal(targets).int().sum().into_scalar().elem::<i64>() as usize
}

fn train_step<M, O>(
    model: M,
    optim: &mut O,
    batch: PhaseBatch<TrainBackend>,
    lr:    f64,
    tally: &mut Tally,
) -> M
where
    M: AutodiffModule<TrainBackend> + PhaseNetwork<TrainBackend>,
    O: Optimizer<M, TrainBackend>,
{
    let n      = batch.targets.dims()[0];
    let logits = model.forward(batch.features);
    let loss   = CrossEntropyLossConfig::new()
        .init(&logits.device())
        .forward(logits.clone(), batch.targets.clone());

    let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
    tally.add(loss_val, count_correct(logits, batch.targets), n);

    // Backward pass + Adam update
    let grads = loss.backward();
    let grads = GradientsParams::from_grads(grads, &model);
    optim.step(lr, model, grads)
}

fn eval_step<M: PhaseNetwork<InferBackend>>(model: &M, batch: PhaseBatch<InferBackend>, tally: &mut Tally) {
    let n      = batch.targets.dims()[0];
    let logits = model.forward(batch.features);
    let loss   = CrossEntropyLossConfig::new()
        .init(&logits.device())
        .forward(logits.clone(), batch.targets.clone());
    tally.add(loss.into_scalar().elem::<f64>(), count_correct(logits, batch.targets), n);
}

fn end_epoch<M>(
    model:     &M,
    metrics:   EpochMetrics,
    options:   &FitOptions,
    history:   &mut History,
    callbacks: &mut [&mut dyn EpochCallback<M>],
) -> Result<()> {
    if options.verbose > 0 {
        println!(
            "Epoch {:>4}/{} - loss: {:.4} - acc: {:.4} - val_loss: {:.4} - val_acc: {:.4}",
            metrics.epoch, options.epochs, metrics.loss, metrics.acc, metrics.val_loss, metrics.val_acc,
        );
    }
    tracing::debug!("epoch {} done: loss={:.4} acc={:.4}", metrics.epoch, metrics.loss, metrics.acc);

    history.push(&metrics);
    for callback in callbacks.iter_mut() {
        callback.on_epoch_end(model, &metrics)?;
    }
    Ok(())
}

/// Train from streaming generators.
pub fn fit_generator<M>(
    mut model:        M,
    train:            &mut BatchGenerator<'_>,
    steps_per_epoch:  usize,
    mut validation:   Option<&mut BatchGenerator<'_>>,
    validation_steps: usize,
    options:          &FitOptions,
    callbacks:        &mut [&mut dyn EpochCallback<M>],
) -> Result<(M, History)>
where
    M: AutodiffModule<TrainBackend> + PhaseNetwork<TrainBackend>,
    M::InnerModule: PhaseNetwork<InferBackend>,
{
    if steps_per_epoch == 0 {
        bail!("training partition is smaller than one batch of {}", options.batch_size);
    }

    let device = device();
    let mut optim = AdamConfig::new().init();
    let train_batcher = PhaseBatcher::<TrainBackend>::new(device.clone());
    let val_batcher   = PhaseBatcher::<InferBackend>::new(device);
    let mut history   = History::default();

    tracing::info!(
        "fit_generator: {} epochs × {} steps, {} validation steps",
        options.epochs, steps_per_epoch, validation_steps
    );

    for epoch in 1..=options.epochs {
        // ── Training phase ────────────────────────────────────────────────────
        let mut train_tally = Tally::default();
        for _ in 0..steps_per_epoch {
            let Some(batch) = train.next() else { break };
            model = train_step(model, &mut optim, train_batcher.batch(&batch), options.learning_rate, &mut train_tally);
        }

        // ── Validation phase ──────────────────────────────────────────────────
        let mut val_tally = Tally::default();
        if let Some(generator) = validation.as_deref_mut() {
            let model_valid = model.valid();
            for _ in 0..validation_steps {
                let Some(batch) = generator.next() else { break };
                eval_step(&model_valid, val_batcher.batch(&batch), &mut val_tally);
            }
        }

        let metrics = EpochMetrics::new(
            epoch,
            train_tally.mean_loss(),
            train_tally.accuracy(),
            val_tally.mean_loss(),
            val_tally.accuracy(),
        );
        end_epoch(&model, metrics, options, &mut history, callbacks)?;
    }

    tracing::debug!("fit_generator: finished after {} passes over the training rows", train.passes());
    Ok((model, history))
}

/// Train on an in-memory matrix, reshuffled every epoch.
pub fn fit_arrays<M>(
    mut model: M,
    features:  &Array2<f32>,
    labels:    &[usize],
    options:   &FitOptions,
    rng:       &mut ChaCha8Rng,
    callbacks: &mut [&mut dyn EpochCallback<M>],
) -> Result<(M, History)>
where
    M: AutodiffModule<TrainBackend> + PhaseNetwork<TrainBackend>,
{
    if features.nrows() != labels.len() {
        bail!("{} feature rows but {} labels", features.nrows(), labels.len());
    }
    if features.nrows() == 0 || options.batch_size == 0 {
        bail!("nothing to fit: {} rows, batch size {}", features.nrows(), options.batch_size);
    }

    let mut optim   = AdamConfig::new().init();
    let batcher     = PhaseBatcher::<TrainBackend>::new(device());
    let mut history = History::default();
    let mut order: Vec<usize> = (0..labels.len()).collect();

    for epoch in 1..=options.epochs {
        order.shuffle(rng);
        let mut tally = Tally::default();
        for chunk in order.chunks(options.batch_size) {
            let rows: Vec<usize> = chunk.iter().map(|&i| labels[i]).collect();
            let x     = features.select(Axis(0), chunk);
            let batch = batcher.rows(x.view(), &rows);
            model = train_step(model, &mut optim, batch, options.learning_rate, &mut tally);
        }

        let metrics = EpochMetrics::new(epoch, tally.mean_loss(), tally.accuracy(), f64::NAN, f64::NAN);
        end_epoch(&model, metrics, options, &mut history, callbacks)?;
    }

    Ok((model, history))
}

/// Predicted class index per row, evaluated `chunk` rows at a time.
pub fn predict<M: PhaseNetwork<InferBackend>>(model: &M, features: &Array2<f32>, chunk: usize) -> Vec<usize> {
    let batcher = PhaseBatcher::<InferBackend>::new(device());
    batcher
        .chunks(features.view(), chunk)
        .flat_map(|x| {
            let data = model.forward(x).argmax(1).flatten::<1>(0, 1).into_data();
            data.iter::<i64>().map(|c| c as usize).collect::<Vec<_>>()
        })
        .collect()
}
