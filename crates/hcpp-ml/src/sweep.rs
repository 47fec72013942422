//! Cross-validated grid search with independent re-evaluation of the winner.

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::cv::{Fold, stratified_kfold, take};
use crate::features::{AggregationMode, FeatureMatrix};
use crate::metrics::{FoldMetrics, macro_f1};
use crate::model::ModelFamily;
use crate::params::ParamSet;
use crate::scale::StandardScaler;
use crate::MlError;

#[derive(Debug, Clone, Copy)]
pub struct SweepConfig {
    pub n_splits: usize,
    /// Seeds fold shuffling and every stochastic model.
    pub seed: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            n_splits: 5,
            seed: 42,
        }
    }
}

/// Outcome of one (family, aggregation mode) sweep.
#[derive(Debug, Clone, Serialize)]
pub struct SweepResult {
    pub family: String,
    pub mode: AggregationMode,
    pub description: String,
    pub best_params: ParamSet,
    /// Mean macro-F1 of the best combination during the search.
    pub cv_macro_f1: f64,
    /// Best combination retrained and scored on each fold.
    pub folds: Vec<FoldMetrics>,
    pub mean: FoldMetrics,
    /// Combinations tried, and how many of them failed to fit.
    pub candidates: usize,
    pub failed: usize,
}

/// One fold's data, already scaled with training-fold statistics.
struct FoldData {
    train_x: Vec<Vec<f32>>,
    train_y: Vec<u8>,
    test_x: Vec<Vec<f32>>,
    test_y: Vec<u8>,
}

fn prepare(matrix: &FeatureMatrix, folds: &[Fold], scaled: bool) -> Vec<FoldData> {
    // Mean-centering would destroy the zero tail of padded rows.
    let with_mean = matrix.mode == AggregationMode::Averaged;
    folds
        .iter()
        .map(|fold| {
            let (train_x, train_y) = take(&matrix.rows, &matrix.labels, &fold.train);
            let (test_x, test_y) = take(&matrix.rows, &matrix.labels, &fold.test);
            if scaled {
                let scaler = StandardScaler::fit(&train_x, with_mean);
                FoldData {
                    train_x: scaler.transform(&train_x),
                    train_y,
                    test_x: scaler.transform(&test_x),
                    test_y,
                }
            } else {
                FoldData {
                    train_x,
                    train_y,
                    test_x,
                    test_y,
                }
            }
        })
        .collect()
}

fn evaluate(
    family: &dyn ModelFamily,
    params: &ParamSet,
    data: &[FoldData],
    seed: u64,
) -> Result<Vec<(Vec<u8>, Vec<u8>)>, MlError> {
    data.iter()
        .map(|fold| {
            let mut model = family.build(params, seed)?;
            model.fit(&fold.train_x, &fold.train_y)?;
            Ok((fold.test_y.clone(), model.predict(&fold.test_x)))
        })
        .collect()
}

/// Grid-search `family` over `matrix` with stratified K-fold scored by macro-F1,
/// then retrain the best combination on the same folds and report per-fold metrics.
///
/// Combinations run in parallel. Ties keep the earliest combination in grid order.
/// A combination whose fit fails is logged and skipped.
pub fn run_sweep(
    matrix: &FeatureMatrix,
    family: &dyn ModelFamily,
    config: &SweepConfig,
) -> Result<SweepResult, MlError> {
    if matrix.is_empty() {
        return Err(MlError::EmptyDataset);
    }
    let folds = stratified_kfold(&matrix.labels, config.n_splits, config.seed)?;
    let data = prepare(matrix, &folds, family.scaled());
    let combos = family.grid().expand();
    info!(
        family = family.name(),
        mode = %matrix.mode,
        dims = matrix.dim(),
        samples = matrix.len(),
        candidates = combos.len(),
        "starting grid search"
    );

    let scores: Vec<Option<f64>> = combos
        .par_iter()
        .map(|params| match evaluate(family, params, &data, config.seed) {
            Ok(preds) => {
                let total: f64 = preds.iter().map(|(t, p)| macro_f1(t, p)).sum();
                Some(total / preds.len() as f64)
            }
            Err(e) => {
                warn!(family = family.name(), %params, error = %e, "candidate failed");
                None
            }
        })
        .collect();

    let failed = scores.iter().filter(|s| s.is_none()).count();
    let mut best: Option<(usize, f64)> = None;
    for (i, score) in scores.iter().enumerate() {
        if let Some(s) = *score
            && best.is_none_or(|(_, b)| s > b)
        {
            best = Some((i, s));
        }
    }
    let (best_idx, cv_macro_f1) = best.ok_or_else(|| MlError::NoViableCandidate {
        family: family.name().to_string(),
    })?;
    let best_params = combos[best_idx].clone();

    let fold_metrics: Vec<FoldMetrics> = evaluate(family, &best_params, &data, config.seed)?
        .iter()
        .map(|(t, p)| FoldMetrics::score(t, p))
        .collect();
    let mean = FoldMetrics::mean(&fold_metrics);
    info!(
        family = family.name(),
        mode = %matrix.mode,
        best = %best_params,
        cv_macro_f1,
        accuracy = mean.accuracy,
        f1 = mean.f1,
        "grid search finished"
    );

    Ok(SweepResult {
        family: family.name().to_string(),
        mode: matrix.mode,
        description: matrix.description.clone(),
        best_params,
        cv_macro_f1,
        folds: fold_metrics,
        mean,
        candidates: combos.len(),
        failed,
    })
}
