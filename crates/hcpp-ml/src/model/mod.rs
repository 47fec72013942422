//! Binary classifier families and their hyperparameter grids.

mod forest;
mod logistic;
mod optim;
mod svm;

pub use forest::{RandomForest, RandomForestFamily};
pub use logistic::{LogisticFamily, LogisticRegression, Solver};
pub use svm::{Gamma, Kernel, KernelSvc, LinearSvc, LinearSvcFamily, SvcFamily};

use crate::MlError;
use crate::params::{ParamGrid, ParamSet};

/// A fitted (or fittable) binary classifier over dense rows.
pub trait Classifier: Send {
    fn fit(&mut self, rows: &[Vec<f32>], labels: &[u8]) -> Result<(), MlError>;

    fn predict(&self, rows: &[Vec<f32>]) -> Vec<u8>;
}

/// A model family: a grid of hyperparameters plus a way to build one model
/// per combination.
pub trait ModelFamily: Send + Sync {
    fn name(&self) -> &'static str;

    fn grid(&self) -> ParamGrid;

    /// Whether features are standardized before fitting.
    fn scaled(&self) -> bool {
        true
    }

    fn build(&self, params: &ParamSet, seed: u64) -> Result<Box<dyn Classifier>, MlError>;
}

/// Families selected by a CLI-style name: `lr`, `rf`, `svm` or `all`.
pub fn families_for(name: &str) -> Option<Vec<Box<dyn ModelFamily>>> {
    let lr = || Box::new(LogisticFamily) as Box<dyn ModelFamily>;
    let rf = || Box::new(RandomForestFamily) as Box<dyn ModelFamily>;
    let svm = || -> Vec<Box<dyn ModelFamily>> {
        vec![
            Box::new(LinearSvcFamily),
            Box::new(SvcFamily::linear()),
            Box::new(SvcFamily::rbf()),
            Box::new(SvcFamily::poly()),
            Box::new(SvcFamily::nu_rbf()),
        ]
    };
    match name {
        "lr" => Some(vec![lr()]),
        "rf" => Some(vec![rf()]),
        "svm" => Some(svm()),
        "all" => {
            let mut all = vec![lr(), rf()];
            all.extend(svm());
            Some(all)
        }
        _ => None,
    }
}

/// Class weights inversely proportional to class frequency:
/// `n_samples / (2 * n_class)`.
pub(crate) fn balanced_weights(labels: &[u8]) -> [f64; 2] {
    let n = labels.len() as f64;
    let pos = labels.iter().filter(|&&l| l == 1).count() as f64;
    let neg = n - pos;
    let w = |c: f64| if c > 0.0 { n / (2.0 * c) } else { 0.0 };
    [w(neg), w(pos)]
}

/// The only label present, if training data holds a single class.
pub(crate) fn single_class(labels: &[u8]) -> Option<u8> {
    let first = *labels.first()?;
    labels.iter().all(|&l| l == first).then_some(first)
}

pub(crate) fn check_shapes(rows: &[Vec<f32>], labels: &[u8]) -> Result<usize, MlError> {
    if rows.is_empty() {
        return Err(MlError::EmptyDataset);
    }
    if rows.len() != labels.len() {
        return Err(MlError::Fit(format!(
            "{} rows but {} labels",
            rows.len(),
            labels.len()
        )));
    }
    let dim = rows[0].len();
    if rows.iter().any(|r| r.len() != dim) {
        return Err(MlError::Fit("rows have differing widths".into()));
    }
    Ok(dim)
}

pub(crate) fn dot(w: &[f64], x: &[f32]) -> f64 {
    w.iter().zip(x).map(|(a, &b)| a * b as f64).sum()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_selection() {
        assert_eq!(families_for("lr").unwrap().len(), 1);
        assert_eq!(families_for("svm").unwrap().len(), 5);
        let names: Vec<&str> = families_for("all").unwrap().iter().map(|f| f.name()).collect();
        assert_eq!(
            names,
            [
                "logistic_regression",
                "random_forest",
                "linear_svc",
                "svc_linear",
                "svc_rbf",
                "svc_poly",
                "nusvc_rbf"
            ]
        );
        assert!(families_for("knn").is_none());
    }

    #[test]
    fn forest_is_unscaled() {
        assert!(!RandomForestFamily.scaled());
        assert!(LogisticFamily.scaled());
    }

    #[test]
    fn balanced_weights_inverse_frequency() {
        let w = balanced_weights(&[0, 0, 0, 1]);
        assert!((w[0] - 4.0 / 6.0).abs() < 1e-12);
        assert!((w[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn single_class_detection() {
        assert_eq!(single_class(&[1, 1]), Some(1));
        assert_eq!(single_class(&[1, 0]), None);
        assert_eq!(single_class(&[]), None);
    }

    #[test]
    fn grid_sizes() {
        assert_eq!(LogisticFamily.grid().size(), 10);
        assert_eq!(RandomForestFamily.grid().size(), 108);
        assert_eq!(LinearSvcFamily.grid().size(), 4);
        assert_eq!(SvcFamily::linear().grid().size(), 4);
        assert_eq!(SvcFamily::rbf().grid().size(), 9);
        assert_eq!(SvcFamily::poly().grid().size(), 12);
        assert_eq!(SvcFamily::nu_rbf().grid().size(), 4);
    }
}
