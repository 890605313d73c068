// ============================================================
// Layer 4 — Class-Quota Partitioner
// ============================================================
// Splits the quota-selected examples into training and
// validation sets *per class*:
//
//   regP pool ──► 90% train │ 10% validation
//   regS pool ──► 90% train │ 10% validation
//   tele pool ──► 90% train │ 10% validation
//   N    pool ──► 90% train │ 10% validation
//
// Splitting each class on its own keeps the configured class
// mix identical in both partitions, which is the whole point
// of the quota mechanism: imbalance experiments need the same
// ratios in the data that is fitted and the data that is scored.
//
// Validation rows per class = floor(validation_split * pool size).
// Without an rng the tail of each pool is held out; with an rng
// each pool is shuffled first and both partitions are shuffled
// after concatenation.

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::domain::error::{PhaseError, PhaseResult};
use crate::domain::phase::{Example, Phase};

/// Number of validation rows held out of a class pool of size `n`.
pub fn validation_count(n: usize, validation_split: f64) -> usize {
    // The epsilon absorbs representation error such as 0.29 * 100 = 28.999…
    (((n as f64) * validation_split) + 1e-9).floor().min(n as f64) as usize
}

/// Split `examples` into (train, validation) class by class.
pub fn split_by_class(
    examples:         Vec<Example>,
    validation_split: f64,
    mut rng:          Option<&mut ChaCha8Rng>,
) -> PhaseResult<(Vec<Example>, Vec<Example>)> {
    if !(0.0..1.0).contains(&validation_split) {
        return Err(PhaseError::cli(format!(
            "validation split must be in [0, 1), got {validation_split}"
        )));
    }

    let total = examples.len();

    // Stable grouping: each pool keeps the loader's order
    let mut pools: [Vec<Example>; Phase::COUNT] = Default::default();
    for example in examples {
        pools[example.phase.index()].push(example);
    }

    let mut train      = Vec::with_capacity(total);
    let mut validation = Vec::new();

    for mut pool in pools {
        if let Some(rng) = rng.as_deref_mut() {
            pool.shuffle(rng);
        }
        let n_val = validation_count(pool.len(), validation_split);
        // split_off(n) leaves [0..n) in `pool` and returns [n..)
        let held_out = pool.split_off(pool.len() - n_val);
        train.extend(pool);
        validation.extend(held_out);
    }

    if let Some(rng) = rng {
        train.shuffle(rng);
        validation.shuffle(rng);
    }

    tracing::debug!(
        "Dataset split: {} training, {} validation ({}% / {}%)",
        train.len(),
        validation.len(),
        (train.len()      * 100) / total.max(1),
        (validation.len() * 100) / total.max(1),
    );

    Ok((train, validation))
}
