// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types that describe the problem: the four seismic
// phase classes, a labelled feature vector, the per-station
// quota specification and the hidden-layer list.
//
// Rules for this layer:
//   - NO Burn or ndarray types here
//   - NO file I/O
//   - Parsing of user-supplied strings happens here, once,
//     so every other layer works with validated values
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Phase classes and the labelled example row
pub mod phase;

// Station quotas (`-p`) and hidden-layer widths (`-l`)
pub mod quota;

// The single typed error of the crate
pub mod error;

// Core abstractions implemented by the data layer
pub mod traits;
