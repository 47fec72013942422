use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::debug;

use super::optim::minimize;
use super::{Classifier, ModelFamily, balanced_weights, check_shapes, dot, single_class};
use crate::MlError;
use crate::params::{ParamGrid, ParamSet};

const MAX_ITER: usize = 1000;
const TOL: f64 = 1e-4;
const SGD_ETA0: f64 = 0.1;
const SGD_PATIENCE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Solver {
    /// Full-batch gradient descent with backtracking line search.
    Gd,
    /// Shuffled stochastic gradient descent with a decaying step.
    Sgd,
}

impl Solver {
    fn parse(name: &str) -> Result<Self, MlError> {
        match name {
            "gd" => Ok(Self::Gd),
            "sgd" => Ok(Self::Sgd),
            other => Err(MlError::Param {
                name: "solver".into(),
                reason: format!("unknown solver {other}"),
            }),
        }
    }
}

/// L2-regularized logistic regression with balanced class weights.
///
/// Minimizes `0.5·|w|² + C·Σ sᵢ·log(1 + exp(-yᵢ·(w·xᵢ + b)))` with the
/// intercept left unregularized.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    c: f64,
    solver: Solver,
    max_iter: usize,
    seed: u64,
    weights: Vec<f64>,
    bias: f64,
    constant: Option<u8>,
}

impl LogisticRegression {
    pub fn new(c: f64, solver: Solver, seed: u64) -> Self {
        Self {
            c,
            solver,
            max_iter: MAX_ITER,
            seed,
            weights: Vec::new(),
            bias: 0.0,
            constant: None,
        }
    }

    pub fn decision(&self, x: &[f32]) -> f64 {
        dot(&self.weights, x) + self.bias
    }

    fn fit_gd(&mut self, rows: &[Vec<f32>], signs: &[f64], sw: &[f64]) {
        let dim = rows[0].len();
        let c = self.c;
        // Parameters: weights followed by bias.
        let mut params = vec![0.0; dim + 1];
        let iters = minimize(&mut params, self.max_iter, TOL, |p| {
            let (w, b) = p.split_at(dim);
            let mut loss = 0.5 * w.iter().map(|v| v * v).sum::<f64>();
            let mut grad: Vec<f64> = w.to_vec();
            grad.push(0.0);
            for ((x, &y), &s) in rows.iter().zip(signs).zip(sw) {
                let margin = y * (dot(w, x) + b[0]);
                loss += c * s * log1p_exp(-margin);
                let g = -c * s * y * sigmoid(-margin);
                for (gj, &xj) in grad[..dim].iter_mut().zip(x) {
                    *gj += g * xj as f64;
                }
                grad[dim] += g;
            }
            (loss, grad)
        });
        debug!(c, iters, "logistic regression (gd) converged");
        self.bias = params[dim];
        params.truncate(dim);
        self.weights = params;
    }

    fn fit_sgd(&mut self, rows: &[Vec<f32>], signs: &[f64], sw: &[f64]) {
        let n = rows.len();
        let dim = rows[0].len();
        let lambda = 1.0 / (self.c * n as f64);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut order: Vec<usize> = (0..n).collect();
        let mut w = vec![0.0; dim];
        let mut b = 0.0;
        let mut t = 0usize;
        let mut best = f64::INFINITY;
        let mut stale = 0usize;

        for epoch in 0..self.max_iter {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;
            for &i in &order {
                let eta = SGD_ETA0 / (1.0 + SGD_ETA0 * lambda * t as f64);
                let x = &rows[i];
                let margin = signs[i] * (dot(&w, x) + b);
                epoch_loss += sw[i] * log1p_exp(-margin);
                let g = -sw[i] * signs[i] * sigmoid(-margin);
                let shrink = 1.0 - eta * lambda;
                for (wj, &xj) in w.iter_mut().zip(x) {
                    *wj = *wj * shrink - eta * g * xj as f64;
                }
                b -= eta * g;
                t += 1;
            }
            epoch_loss = epoch_loss / n as f64 + 0.5 * lambda * w.iter().map(|v| v * v).sum::<f64>();
            if epoch_loss > best - TOL {
                stale += 1;
                if stale >= SGD_PATIENCE {
                    debug!(c = self.c, epoch, "logistic regression (sgd) stopped early");
                    break;
                }
            } else {
                stale = 0;
            }
            best = best.min(epoch_loss);
        }
        self.weights = w;
        self.bias = b;
    }
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, rows: &[Vec<f32>], labels: &[u8]) -> Result<(), MlError> {
        check_shapes(rows, labels)?;
        self.constant = single_class(labels);
        if self.constant.is_some() {
            return Ok(());
        }
        let class_w = balanced_weights(labels);
        let sw: Vec<f64> = labels.iter().map(|&l| class_w[l as usize]).collect();
        let signs: Vec<f64> = labels.iter().map(|&l| if l == 1 { 1.0 } else { -1.0 }).collect();
        match self.solver {
            Solver::Gd => self.fit_gd(rows, &signs, &sw),
            Solver::Sgd => self.fit_sgd(rows, &signs, &sw),
        }
        Ok(())
    }

    fn predict(&self, rows: &[Vec<f32>]) -> Vec<u8> {
        if let Some(label) = self.constant {
            return vec![label; rows.len()];
        }
        rows.iter().map(|x| u8::from(self.decision(x) > 0.0)).collect()
    }
}

/// `log(1 + exp(z))` without overflow.
fn log1p_exp(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

pub struct LogisticFamily;

impl ModelFamily for LogisticFamily {
    fn name(&self) -> &'static str {
        "logistic_regression"
    }

    fn grid(&self) -> ParamGrid {
        ParamGrid::new()
            .with("C", vec![0.01.into(), 0.1.into(), 1.0.into(), 10.0.into(), 100.0.into()])
            .with("solver", vec!["gd".into(), "sgd".into()])
    }

    fn build(&self, params: &ParamSet, seed: u64) -> Result<Box<dyn Classifier>, MlError> {
        let c = params.float("C")?;
        let solver = Solver::parse(params.text("solver")?)?;
        Ok(Box::new(LogisticRegression::new(c, solver, seed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::accuracy;
    use crate::model::testdata::blobs;

    #[test]
    fn separates_blobs_with_both_solvers() {
        let (rows, labels) = blobs(30, 5, 3);
        for solver in [Solver::Gd, Solver::Sgd] {
            let mut model = LogisticRegression::new(1.0, solver, 0);
            model.fit(&rows, &labels).unwrap();
            let acc = accuracy(&labels, &model.predict(&rows));
            assert!(acc > 0.95, "{solver:?} accuracy {acc}");
        }
    }

    #[test]
    fn single_class_predicts_constant() {
        let rows = vec![vec![1.0], vec![2.0]];
        let mut model = LogisticRegression::new(1.0, Solver::Gd, 0);
        model.fit(&rows, &[1, 1]).unwrap();
        assert_eq!(model.predict(&[vec![-5.0]]), vec![1]);
    }

    #[test]
    fn unknown_solver_rejected() {
        let mut set = ParamSet::default();
        set.0.insert("C".into(), 1.0.into());
        set.0.insert("solver".into(), "newton".into());
        assert!(LogisticFamily.build(&set, 0).is_err());
    }

    #[test]
    fn stable_helpers() {
        assert!((log1p_exp(1000.0) - 1000.0).abs() < 1e-9);
        assert!(log1p_exp(-1000.0) >= 0.0);
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(-1000.0) >= 0.0);
    }
}
