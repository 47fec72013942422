//! Classification metrics.
//!
//! Precision, recall and F1 are macro-averaged over the labels present in
//! either the truth or the predictions. A metric whose denominator is zero
//! counts as 0.

use std::collections::BTreeSet;

use serde::Serialize;

/// Scores of one held-out fold, or their mean.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct FoldMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl FoldMetrics {
    pub fn score(truth: &[u8], pred: &[u8]) -> Self {
        let (precision, recall, f1) = macro_prf(truth, pred);
        Self {
            accuracy: accuracy(truth, pred),
            precision,
            recall,
            f1,
        }
    }

    /// Arithmetic mean of each metric; zero for an empty slice.
    pub fn mean(folds: &[FoldMetrics]) -> Self {
        if folds.is_empty() {
            return Self::default();
        }
        let n = folds.len() as f64;
        let sum = folds.iter().fold(Self::default(), |acc, m| Self {
            accuracy: acc.accuracy + m.accuracy,
            precision: acc.precision + m.precision,
            recall: acc.recall + m.recall,
            f1: acc.f1 + m.f1,
        });
        Self {
            accuracy: sum.accuracy / n,
            precision: sum.precision / n,
            recall: sum.recall / n,
            f1: sum.f1 / n,
        }
    }
}

pub fn accuracy(truth: &[u8], pred: &[u8]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let correct = truth.iter().zip(pred).filter(|(t, p)| t == p).count();
    correct as f64 / truth.len() as f64
}

/// Precision, recall and F1 treating `positive` as the positive class.
pub fn binary_prf(truth: &[u8], pred: &[u8], positive: u8) -> (f64, f64, f64) {
    let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
    for (&t, &p) in truth.iter().zip(pred) {
        match (t == positive, p == positive) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            (false, false) => {}
        }
    }
    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    (
        ratio(tp, tp + fp),
        ratio(tp, tp + fn_),
        ratio(2 * tp, 2 * tp + fp + fn_),
    )
}

/// Macro-averaged precision, recall and F1.
pub fn macro_prf(truth: &[u8], pred: &[u8]) -> (f64, f64, f64) {
    let labels: BTreeSet<u8> = truth.iter().chain(pred).copied().collect();
    if labels.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let n = labels.len() as f64;
    let (p, r, f) = labels
        .iter()
        .map(|&l| binary_prf(truth, pred, l))
        .fold((0.0, 0.0, 0.0), |acc, (p, r, f)| (acc.0 + p, acc.1 + r, acc.2 + f));
    (p / n, r / n, f / n)
}

pub fn macro_f1(truth: &[u8], pred: &[u8]) -> f64 {
    macro_prf(truth, pred).2
}
