// ============================================================
// Layer 4 — Feature Store Reader
// ============================================================
// Reads the per-detection feature CSV produced by the feature
// extraction pipeline and keeps exactly the number of rows per
// station and phase class requested by the quota.
//
// Expected layout (header row required):
//
//   station,phase,f0,f1,...,f15
//   URZ,regP,0.12,3.4,...
//   LPAZ,N,0.01,0.9,...
//
//   - station column: `station` or `STA`
//   - label column:   `phase`, `class_phase` or `label`
//   - every other column is a numeric feature
//
// The quota check happens after the whole file is read, so a
// short pool is reported with the exact number of rows that
// were available — before any model is built.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::PathBuf;

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::domain::error::{PhaseError, PhaseResult};
use crate::domain::phase::{Example, Phase};
use crate::domain::quota::PhaseLengths;
use crate::domain::traits::FeatureSource;

const STATION_HEADERS: [&str; 2] = ["station", "sta"];
const LABEL_HEADERS:   [&str; 3] = ["phase", "class_phase", "label"];

/// Reads labelled feature rows from a delimited text file.
pub struct CsvFeatureStore {
    path:          PathBuf,
    feature_width: Option<usize>,
}

/// Column positions resolved from the header row
struct Layout {
    station:  usize,
    label:    usize,
    features: Vec<usize>,
}

impl CsvFeatureStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), feature_width: None }
    }

    /// Require exactly `width` feature columns instead of trusting the header
    pub fn with_feature_width(mut self, width: usize) -> Self {
        self.feature_width = Some(width);
        self
    }

    /// Read every row that belongs to one of the quota's stations.
    fn read_rows(&self, quota: &PhaseLengths) -> PhaseResult<Vec<Example>> {
        let file = File::open(&self.path).map_err(|source| PhaseError::Io {
            path: self.path.clone(),
            source,
        })?;

        // flexible(true): we check field counts ourselves so the error
        // carries the schema context and line number
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let headers = reader.headers()?.clone();
        let layout  = self.resolve_layout(&headers)?;
        let n_fields = headers.len();

        let mut rows = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            // blank lines are skipped by the reader, so count from its position
            let line = record.position().map_or(row + 2, |p| p.line() as usize);

            if record.len() != n_fields {
                return Err(PhaseError::schema(
                    line,
                    format!("expected {} fields, found {}", n_fields, record.len()),
                ));
            }

            let station = &record[layout.station];
            if quota.get(station).is_none() {
                continue;
            }

            let phase: Phase = record[layout.label]
                .parse()
                .map_err(|e: PhaseError| PhaseError::schema(line, e.to_string()))?;

            let features = layout
                .features
                .iter()
                .map(|&col| {
                    record[col].parse::<f32>().map_err(|_| {
                        PhaseError::schema(
                            line,
                            format!("column '{}' is not numeric: '{}'", &headers[col], &record[col]),
                        )
                    })
                })
                .collect::<PhaseResult<Vec<f32>>>()?;

            rows.push(Example::new(row, station, phase, features));
        }

        tracing::debug!("Read {} candidate rows from '{}'", rows.len(), self.path.display());
        Ok(rows)
    }

    fn resolve_layout(&self, headers: &csv::StringRecord) -> PhaseResult<Layout> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
        };

        let station = find(&STATION_HEADERS)
            .ok_or_else(|| PhaseError::schema(1, "no station column (station / STA)"))?;
        let label = find(&LABEL_HEADERS)
            .ok_or_else(|| PhaseError::schema(1, "no label column (phase / class_phase / label)"))?;

        let features: Vec<usize> = (0..headers.len())
            .filter(|&i| i != station && i != label)
            .collect();

        if features.is_empty() {
            return Err(PhaseError::schema(1, "no feature columns"));
        }
        if let Some(expected) = self.feature_width {
            if features.len() != expected {
                return Err(PhaseError::schema(
                    1,
                    format!("expected {} feature columns, found {}", expected, features.len()),
                ));
            }
        }

        Ok(Layout { station, label, features })
    }
}

impl FeatureSource for CsvFeatureStore {
    fn load(&self, quota: &PhaseLengths, rng: Option<&mut ChaCha8Rng>) -> PhaseResult<Vec<Example>> {
        let rows     = self.read_rows(quota)?;
        let selected = select_quota(rows, quota, rng)?;
        tracing::info!(
            "Loaded {} rows for {} station(s) from '{}'",
            selected.len(),
            quota.stations().count(),
            self.path.display()
        );
        Ok(selected)
    }
}

/// Keep exactly the requested number of rows per (station, class).
///
/// Output order: stations sorted, then `Phase::ALL` order, then
/// file order (or sampled order when an rng is supplied).
pub fn select_quota(
    rows:    Vec<Example>,
    quota:   &PhaseLengths,
    mut rng: Option<&mut ChaCha8Rng>,
) -> PhaseResult<Vec<Example>> {
    let mut pools: BTreeMap<(String, Phase), Vec<Example>> = BTreeMap::new();
    for row in rows {
        pools.entry((row.station.clone(), row.phase)).or_default().push(row);
    }

    let mut selected = Vec::with_capacity(quota.total());
    for (station, station_quota) in quota.iter() {
        for phase in Phase::ALL {
            let requested = station_quota.get(phase);
            let mut pool = pools
                .remove(&(station.to_string(), phase))
                .unwrap_or_default();

            if pool.len() < requested {
                return Err(PhaseError::DataInsufficient {
                    station: station.to_string(),
                    phase,
                    requested,
                    available: pool.len(),
                });
            }

            if let Some(rng) = rng.as_deref_mut() {
                pool.shuffle(rng);
            }
            pool.truncate(requested);
            selected.extend(pool);
        }
    }
    Ok(selected)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::io::Write;

    /// Write a feature file with `counts[class]` rows per class for each station.
    fn write_fixture(stations: &[(&str, [usize; 4])]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "station,phase,amp,freq,snr").unwrap();
        let mut n = 0;
        for (station, counts) in stations {
            for phase in Phase::ALL {
                for _ in 0..counts[phase.index()] {
                    writeln!(file, "{station},{},{},{},{}", phase, n, phase.index(), 1.5).unwrap();
                    n += 1;
                }
            }
        }
        file.flush().unwrap();
        file
    }

    fn quota(station: &str, counts: [usize; 4]) -> PhaseLengths {
        format!("{station} {} {} {} {}", counts[0], counts[1], counts[2], counts[3])
            .parse()
            .unwrap()
    }

    #[test]
    fn test_exact_counts_per_class() {
        let file  = write_fixture(&[("URZ", [30, 20, 25, 60])]);
        let store = CsvFeatureStore::new(file.path());
        let rows  = store.load(&quota("URZ", [10, 20, 5, 40]), None).unwrap();

        let count = |p: Phase| rows.iter().filter(|r| r.phase == p).count();
        assert_eq!(count(Phase::RegP), 10);
        assert_eq!(count(Phase::RegS), 20);
        assert_eq!(count(Phase::Tele), 5);
        assert_eq!(count(Phase::Noise), 40);
        assert!(rows.iter().all(|r| r.width() == 3));
    }

    #[test]
    fn test_deterministic_selection_takes_first_rows() {
        let file  = write_fixture(&[("URZ", [5, 0, 0, 0])]);
        let store = CsvFeatureStore::new(file.path());
        let rows  = store.load(&quota("URZ", [3, 0, 0, 0]), None).unwrap();
        let ids: Vec<usize> = rows.iter().map(|r| r.row).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_sampled_selection_is_reproducible() {
        let file  = write_fixture(&[("URZ", [50, 50, 50, 50])]);
        let store = CsvFeatureStore::new(file.path());
        let q     = quota("URZ", [10, 10, 10, 10]);

        let mut a = ChaCha8Rng::seed_from_u64(7);
        let mut b = ChaCha8Rng::seed_from_u64(7);
        let first  = store.load(&q, Some(&mut a)).unwrap();
        let second = store.load(&q, Some(&mut b)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 40);
    }

    #[test]
    fn test_insufficient_rows_is_an_error() {
        let file  = write_fixture(&[("URZ", [300, 10, 10, 10])]);
        let store = CsvFeatureStore::new(file.path());
        let err   = store.load(&quota("URZ", [500, 1, 1, 1]), None).unwrap_err();
        match err {
            PhaseError::DataInsufficient { station, phase, requested, available } => {
                assert_eq!(station, "URZ");
                assert_eq!(phase, Phase::RegP);
                assert_eq!(requested, 500);
                assert_eq!(available, 300);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_station_counts_as_empty_pool() {
        let file  = write_fixture(&[("URZ", [5, 5, 5, 5])]);
        let store = CsvFeatureStore::new(file.path());
        let err   = store.load(&quota("LPAZ", [1, 0, 0, 0]), None).unwrap_err();
        assert!(matches!(err, PhaseError::DataInsufficient { available: 0, .. }));
    }

    #[test]
    fn test_multi_station_order() {
        let file  = write_fixture(&[("URZ", [2, 2, 2, 2]), ("LPAZ", [2, 2, 2, 2])]);
        let store = CsvFeatureStore::new(file.path());
        let q: PhaseLengths = "URZ 1 1 1 1, LPAZ 1 1 1 1".parse().unwrap();
        let rows  = store.load(&q, None).unwrap();
        let stations: Vec<&str> = rows.iter().map(|r| r.station.as_str()).collect();
        assert_eq!(stations, vec!["LPAZ", "LPAZ", "LPAZ", "LPAZ", "URZ", "URZ", "URZ", "URZ"]);
    }

    #[test]
    fn test_width_mismatch_is_schema_error() {
        let file  = write_fixture(&[("URZ", [1, 1, 1, 1])]);
        let store = CsvFeatureStore::new(file.path()).with_feature_width(16);
        let err   = store.load(&quota("URZ", [1, 1, 1, 1]), None).unwrap_err();
        assert!(matches!(err, PhaseError::Schema { line: 1, .. }));
    }

    #[test]
    fn test_ragged_row_is_schema_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "STA,CLASS_PHASE,a,b").unwrap();
        writeln!(file, "URZ,regP,1,2").unwrap();
        writeln!(file, "URZ,regP,1").unwrap();
        file.flush().unwrap();

        let err = CsvFeatureStore::new(file.path())
            .load(&quota("URZ", [1, 0, 0, 0]), None)
            .unwrap_err();
        assert!(matches!(err, PhaseError::Schema { line: 3, .. }));
    }

    #[test]
    fn test_schema_line_counts_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "station,phase,a").unwrap();
        writeln!(file, "URZ,N,1").unwrap();
        writeln!(file).unwrap();
        writeln!(file).unwrap();
        writeln!(file, "URZ,N,oops").unwrap();
        file.flush().unwrap();

        let err = CsvFeatureStore::new(file.path())
            .load(&quota("URZ", [0, 0, 0, 2]), None)
            .unwrap_err();
        assert!(matches!(err, PhaseError::Schema { line: 5, .. }), "{err}");
    }

    #[test]
    fn test_non_numeric_feature_is_schema_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "station,phase,a").unwrap();
        writeln!(file, "URZ,N,oops").unwrap();
        file.flush().unwrap();

        let err = CsvFeatureStore::new(file.path())
            .load(&quota("URZ", [0, 0, 0, 1]), None)
            .unwrap_err();
        assert!(matches!(err, PhaseError::Schema { line: 2, .. }));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let store = CsvFeatureStore::new("does/not/exist.csv");
        let err   = store.load(&quota("URZ", [1, 1, 1, 1]), None).unwrap_err();
        assert!(matches!(err, PhaseError::Io { .. }));
    }
}
