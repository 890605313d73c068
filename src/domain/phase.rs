// ============================================================
// Layer 3 — Phase Classes and Examples
// ============================================================
// A detection is labelled with one of four phase classes:
//
//   regP  — regional P wave
//   regS  — regional S wave
//   tele  — teleseismic arrival
//   N     — noise
//
// The enum order is the class index used everywhere else:
// one-hot column, confusion-matrix row, boosted-tree output.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::PhaseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    RegP,
    RegS,
    Tele,
    Noise,
}

impl Phase {
    /// All classes in class-index order
    pub const ALL: [Phase; 4] = [Phase::RegP, Phase::RegS, Phase::Tele, Phase::Noise];

    /// Number of classes — the width of a one-hot label row
    pub const COUNT: usize = 4;

    pub fn index(self) -> usize {
        match self {
            Phase::RegP  => 0,
            Phase::RegS  => 1,
            Phase::Tele  => 2,
            Phase::Noise => 3,
        }
    }

    /// Short label used in reports and in the feature files
    pub fn label(self) -> &'static str {
        match self {
            Phase::RegP  => "regP",
            Phase::RegS  => "regS",
            Phase::Tele  => "tele",
            Phase::Noise => "N",
        }
    }

    pub fn labels() -> Vec<&'static str> {
        Self::ALL.iter().map(|p| p.label()).collect()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Accepts the long labels (`regP`, `regS`, `tele`, `N`) and the
/// single-letter forms (`P`, `S`, `T`) found in older feature files.
impl FromStr for Phase {
    type Err = PhaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "regp" | "p"                => Ok(Phase::RegP),
            "regs" | "s"                => Ok(Phase::RegS),
            "tele" | "t"                => Ok(Phase::Tele),
            "n" | "noise"               => Ok(Phase::Noise),
            _ => Err(PhaseError::UnknownPhase(s.trim().to_string())),
        }
    }
}

/// One labelled row of the feature file.
///
/// `row` is the 0-based data-row index in the source file and serves
/// as the identity of the example when partitions are compared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub row:      usize,
    pub station:  String,
    pub phase:    Phase,
    pub features: Vec<f32>,
}

impl Example {
    pub fn new(row: usize, station: impl Into<String>, phase: Phase, features: Vec<f32>) -> Self {
        Self { row, station: station.into(), phase, features }
    }

    pub fn width(&self) -> usize {
        self.features.len()
    }
}
