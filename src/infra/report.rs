// ============================================================
// Layer 6 — Evaluation Reports
// ============================================================
// Printed summaries of a model's predictions on a test set:
//
//   accuracy                 — "acc: 93.21%"
//   ConfusionMatrix          — true class rows × predicted columns
//   ClassificationReport     — per-class precision, recall,
//                              specificity, F1, geometric mean,
//                              index of balanced accuracy, support
//
// geo = sqrt(rec · spe)
// iba = (1 + α · (rec − spe)) · geo²   with α = 0.1
//
// The "avg / total" row weights every column by class support.

use std::fmt;

use crate::domain::phase::Phase;

const IBA_ALPHA: f64 = 0.1;

pub fn accuracy(predicted: &[usize], actual: &[usize]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let correct = predicted.iter().zip(actual).filter(|(p, a)| p == a).count();
    correct as f64 / actual.len() as f64
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    /// counts[true][predicted]
    counts: [[usize; Phase::COUNT]; Phase::COUNT],
}

impl ConfusionMatrix {
    /// Pairs with a class index outside the phase range are ignored
    pub fn new(actual: &[usize], predicted: &[usize]) -> Self {
        let mut counts = [[0; Phase::COUNT]; Phase::COUNT];
        for (&t, &p) in actual.iter().zip(predicted) {
            if t < Phase::COUNT && p < Phase::COUNT {
                counts[t][p] += 1;
            }
        }
        Self { counts }
    }

    pub fn get(&self, actual: Phase, predicted: Phase) -> usize {
        self.counts[actual.index()][predicted.index()]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn true_positives(&self, class: usize) -> usize {
        self.counts[class][class]
    }

    /// Rows whose true class is `class`
    pub fn support(&self, class: usize) -> usize {
        self.counts[class].iter().sum()
    }

    /// Rows predicted as `class`
    pub fn predicted(&self, class: usize) -> usize {
        self.counts.iter().map(|row| row[class]).sum()
    }

    pub fn accuracy(&self) -> f64 {
        let correct = (0..Phase::COUNT).map(|k| self.counts[k][k]).sum();
        ratio(correct, self.total())
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels = Phase::labels();
        let width  = labels
            .iter()
            .map(|l| l.len())
            .chain(self.counts.iter().flatten().map(|c| c.to_string().len()))
            .chain(std::iter::once(5))
            .max()
            .unwrap_or(5);

        write!(f, "    {:>width$}", "t/p")?;
        for label in &labels {
            write!(f, " {:>width$}", label)?;
        }
        writeln!(f)?;

        for (row, label) in self.counts.iter().zip(&labels) {
            write!(f, "    {:>width$}", label)?;
            for count in row {
                write!(f, " {:>width$}", count)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// One row of the imbalance-aware report
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassScores {
    pub precision:   f64,
    pub recall:      f64,
    pub specificity: f64,
    pub f1:          f64,
    pub geo_mean:    f64,
    pub iba:         f64,
    pub support:     usize,
}

impl ClassScores {
    fn from_matrix(cm: &ConfusionMatrix, class: usize) -> Self {
        let tp = cm.true_positives(class);
        let fp = cm.predicted(class) - tp;
        let fn_ = cm.support(class) - tp;
        let tn = cm.total() - tp - fp - fn_;

        let precision   = ratio(tp, tp + fp);
        let recall      = ratio(tp, tp + fn_);
        let specificity = ratio(tn, tn + fp);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        let geo_mean = (recall * specificity).sqrt();
        let iba      = (1.0 + IBA_ALPHA * (recall - specificity)) * geo_mean * geo_mean;

        Self { precision, recall, specificity, f1, geo_mean, iba, support: tp + fn_ }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationReport {
    pub classes: Vec<(Phase, ClassScores)>,
    pub average: ClassScores,
}

impl ClassificationReport {
    pub fn new(actual: &[usize], predicted: &[usize]) -> Self {
        Self::from_matrix(&ConfusionMatrix::new(actual, predicted))
    }

    pub fn from_matrix(cm: &ConfusionMatrix) -> Self {
        let classes: Vec<(Phase, ClassScores)> = Phase::ALL
            .iter()
            .map(|&p| (p, ClassScores::from_matrix(cm, p.index())))
            .collect();

        let total = cm.total();
        let weighted = |pick: fn(&ClassScores) -> f64| -> f64 {
            if total == 0 {
                return 0.0;
            }
            classes.iter().map(|(_, s)| pick(s) * s.support as f64).sum::<f64>() / total as f64
        };

        let average = ClassScores {
            precision:   weighted(|s| s.precision),
            recall:      weighted(|s| s.recall),
            specificity: weighted(|s| s.specificity),
            f1:          weighted(|s| s.f1),
            geo_mean:    weighted(|s| s.geo_mean),
            iba:         weighted(|s| s.iba),
            support:     total,
        };

        Self { classes, average }
    }

    pub fn scores(&self, phase: Phase) -> &ClassScores {
        &self.classes[phase.index()].1
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let row = |f: &mut fmt::Formatter<'_>, name: &str, s: &ClassScores| {
            writeln!(
                f,
                "{:>11} {:>9.2} {:>9.2} {:>9.2} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name, s.precision, s.recall, s.specificity, s.f1, s.geo_mean, s.iba, s.support
            )
        };

        writeln!(
            f,
            "{:>11} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9}",
            "", "pre", "rec", "spe", "f1", "geo", "iba", "sup"
        )?;
        writeln!(f)?;
        for phase in Phase::ALL {
            row(f, phase.label(), self.scores(phase))?;
        }
        writeln!(f)?;
        row(f, "avg / total", &self.average)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    // true:      P P P P S S S T T N
    // predicted: P P P S S S P T N N
    fn sample() -> (Vec<usize>, Vec<usize>) {
        (
            vec![0, 0, 0, 0, 1, 1, 1, 2, 2, 3],
            vec![0, 0, 0, 1, 1, 1, 0, 2, 3, 3],
        )
    }

    #[test]
    fn test_accuracy() {
        let (t, p) = sample();
        assert!((accuracy(&p, &t) - 0.7).abs() < 1e-12);
        assert_eq!(accuracy(&[], &[]), 0.0);
    }

    #[test]
    fn test_confusion_matrix_counts() {
        let (t, p) = sample();
        let cm = ConfusionMatrix::new(&t, &p);
        assert_eq!(cm.get(Phase::RegP, Phase::RegP), 3);
        assert_eq!(cm.get(Phase::RegP, Phase::RegS), 1);
        assert_eq!(cm.get(Phase::RegS, Phase::RegP), 1);
        assert_eq!(cm.get(Phase::Tele, Phase::Noise), 1);
        assert_eq!(cm.total(), 10);
        assert!((cm.accuracy() - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_confusion_matrix_display_has_labels() {
        let (t, p) = sample();
        let text = ConfusionMatrix::new(&t, &p).to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].contains("regP") && lines[0].contains("N"));
        assert!(lines[1].trim_start().starts_with("regP"));
        assert!(lines[1].trim_end().ends_with('0'));
    }

    #[test]
    fn test_report_matches_hand_computation() {
        let (t, p) = sample();
        let report = ClassificationReport::new(&t, &p);

        // regP: tp 3, fp 1, fn 1, tn 5
        let s = report.scores(Phase::RegP);
        assert!((s.precision - 0.75).abs() < 1e-12);
        assert!((s.recall - 0.75).abs() < 1e-12);
        assert!((s.specificity - 5.0 / 6.0).abs() < 1e-12);
        assert!((s.geo_mean - (0.75f64 * 5.0 / 6.0).sqrt()).abs() < 1e-12);
        let iba = (1.0 + 0.1 * (0.75 - 5.0 / 6.0)) * 0.75 * 5.0 / 6.0;
        assert!((s.iba - iba).abs() < 1e-12);
        assert_eq!(s.support, 4);

        // N: tp 1, fp 1, fn 0
        let n = report.scores(Phase::Noise);
        assert!((n.precision - 0.5).abs() < 1e-12);
        assert!((n.recall - 1.0).abs() < 1e-12);

        // weighted recall equals accuracy
        assert!((report.average.recall - 0.7).abs() < 1e-12);
        assert_eq!(report.average.support, 10);
    }

    #[test]
    fn test_report_display_layout() {
        let (t, p) = sample();
        let text = ClassificationReport::new(&t, &p).to_string();
        let header = text.lines().next().unwrap();
        for column in ["pre", "rec", "spe", "f1", "geo", "iba", "sup"] {
            assert!(header.contains(column));
        }
        assert!(text.lines().last().unwrap().starts_with("avg / total"));
    }

    #[test]
    fn test_absent_class_scores_zero() {
        let report = ClassificationReport::new(&[0, 0, 1], &[0, 0, 1]);
        let tele   = report.scores(Phase::Tele);
        assert_eq!(tele.support, 0);
        assert_eq!(tele.precision, 0.0);
        assert_eq!(tele.recall, 0.0);
    }
}
