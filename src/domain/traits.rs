// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer asks for "the examples that satisfy
// this quota" without knowing where they come from. Today the
// only source is a CSV feature file; the trait keeps the
// orchestration code independent of that choice.

use rand_chacha::ChaCha8Rng;

use crate::domain::error::PhaseResult;
use crate::domain::phase::Example;
use crate::domain::quota::PhaseLengths;

// ─── FeatureSource ────────────────────────────────────────────────────────────
/// Anything that can produce labelled feature rows for a quota.
///
/// Implementations:
///   - CsvFeatureStore → reads a delimited feature file
pub trait FeatureSource {
    /// Return exactly `quota` rows per station and class.
    ///
    /// With `rng == None` the first rows of each pool are taken in
    /// source order; otherwise rows are sampled without replacement.
    fn load(&self, quota: &PhaseLengths, rng: Option<&mut ChaCha8Rng>) -> PhaseResult<Vec<Example>>;
}
