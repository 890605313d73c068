// ============================================================
// Layer 3 — Station Quotas and Layer Widths
// ============================================================
// Two user-supplied strings drive every experiment:
//
//   --phase-length "URZ 6840 6840 6840 20520, LPAZ 160 160 160 480"
//       station name followed by the exact number of regP, regS,
//       tele and N rows to read for that station
//
//   --layers "128 128 64 48 48 32 32 48 32 16"
//       whitespace-delimited hidden-layer widths
//
// Both are parsed exactly once through FromStr. A malformed
// string becomes PhaseError::CliArgument and the run ends.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::PhaseError;
use crate::domain::phase::Phase;

// ─── StationQuota ─────────────────────────────────────────────────────────────
/// Required number of rows per phase class for one station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StationQuota {
    pub reg_p: usize,
    pub reg_s: usize,
    pub tele:  usize,
    pub noise: usize,
}

impl StationQuota {
    pub fn new(reg_p: usize, reg_s: usize, tele: usize, noise: usize) -> Self {
        Self { reg_p, reg_s, tele, noise }
    }

    pub fn get(&self, phase: Phase) -> usize {
        match phase {
            Phase::RegP  => self.reg_p,
            Phase::RegS  => self.reg_s,
            Phase::Tele  => self.tele,
            Phase::Noise => self.noise,
        }
    }

    pub fn total(&self) -> usize {
        self.reg_p + self.reg_s + self.tele + self.noise
    }
}

// ─── PhaseLengths ─────────────────────────────────────────────────────────────
/// Ordered mapping station → quota. BTreeMap keeps stations sorted,
/// which fixes the row order of the loaded dataset and the station
/// part of the checkpoint file name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PhaseLengths {
    stations: BTreeMap<String, StationQuota>,
}

impl PhaseLengths {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, station: &str) -> Option<&StationQuota> {
        self.stations.get(station)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StationQuota)> {
        self.stations.iter().map(|(s, q)| (s.as_str(), q))
    }

    pub fn stations(&self) -> impl Iterator<Item = &str> {
        self.stations.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Requested rows of one class, summed over all stations
    pub fn class_total(&self, phase: Phase) -> usize {
        self.stations.values().map(|q| q.get(phase)).sum()
    }

    pub fn total(&self) -> usize {
        self.stations.values().map(StationQuota::total).sum()
    }
}

impl FromStr for PhaseLengths {
    type Err = PhaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let usage = "it should be a list of a station name followed by four numbers, \
                     e.g. 'URZ 6840 6840 6840 20520, LPAZ 160 160 160 480'";

        let mut lengths = PhaseLengths::new();
        for entry in s.split(',') {
            let tokens: Vec<&str> = entry.split_whitespace().collect();
            if tokens.len() != 5 {
                return Err(PhaseError::cli(format!("phase length '{}': {usage}", entry.trim())));
            }

            let mut counts = [0usize; 4];
            for (slot, token) in counts.iter_mut().zip(&tokens[1..]) {
                *slot = token.parse().map_err(|_| {
                    PhaseError::cli(format!("phase length '{}': '{token}' is not a count; {usage}", entry.trim()))
                })?;
            }

            let station = tokens[0].to_string();
            if lengths.stations.contains_key(&station) {
                return Err(PhaseError::cli(format!("station '{station}' is listed twice")));
            }
            lengths.stations.insert(
                station,
                StationQuota::new(counts[0], counts[1], counts[2], counts[3]),
            );
        }
        Ok(lengths)
    }
}

impl fmt::Display for PhaseLengths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self
            .stations
            .iter()
            .map(|(s, q)| format!("{s} {} {} {} {}", q.reg_p, q.reg_s, q.tele, q.noise))
            .collect();
        f.write_str(&entries.join(", "))
    }
}

// ─── LayerSpec ────────────────────────────────────────────────────────────────
/// Hidden-layer widths, in order from input to output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSpec(Vec<usize>);

impl LayerSpec {
    pub fn new(widths: Vec<usize>) -> Result<Self, PhaseError> {
        if widths.is_empty() {
            return Err(PhaseError::cli("at least one hidden layer is required"));
        }
        if widths.contains(&0) {
            return Err(PhaseError::cli("hidden layer widths must be positive"));
        }
        Ok(Self(widths))
    }

    pub fn widths(&self) -> &[usize] {
        &self.0
    }

    /// `128_64_32` — the layer part of a checkpoint file name
    pub fn slug(&self) -> String {
        self.0.iter().map(usize::to_string).collect::<Vec<_>>().join("_")
    }
}

impl FromStr for LayerSpec {
    type Err = PhaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let widths = s
            .split_whitespace()
            .map(|w| w.parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| {
                PhaseError::cli("the layers should be a list of integers, delimited by whitespace")
            })?;
        Self::new(widths)
    }
}

impl fmt::Display for LayerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths: Vec<String> = self.0.iter().map(usize::to_string).collect();
        f.write_str(&widths.join(" "))
    }
}
