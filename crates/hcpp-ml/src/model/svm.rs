//! Support vector machines: a primal linear SVM and a kernel SVC trained by SMO.

use tracing::{debug, warn};

use super::optim::minimize;
use super::{Classifier, ModelFamily, balanced_weights, check_shapes, dot, single_class};
use crate::MlError;
use crate::params::{ParamGrid, ParamSet, ParamValue};

const LINEAR_MAX_ITER: usize = 10_000;
const LINEAR_TOL: f64 = 1e-4;
const SMO_EPS: f64 = 1e-3;
const TAU: f64 = 1e-12;

fn signs(labels: &[u8]) -> Vec<f64> {
    labels.iter().map(|&l| if l == 1 { 1.0 } else { -1.0 }).collect()
}

/// Linear SVM trained in the primal on the squared hinge loss.
///
/// Minimizes `0.5·|w|² + C·Σ sᵢ·max(0, 1 - yᵢ·(w·xᵢ + b))²`.
#[derive(Debug, Clone)]
pub struct LinearSvc {
    c: f64,
    weights: Vec<f64>,
    bias: f64,
    constant: Option<u8>,
}

impl LinearSvc {
    pub fn new(c: f64) -> Self {
        Self {
            c,
            weights: Vec::new(),
            bias: 0.0,
            constant: None,
        }
    }
}

impl Classifier for LinearSvc {
    fn fit(&mut self, rows: &[Vec<f32>], labels: &[u8]) -> Result<(), MlError> {
        let dim = check_shapes(rows, labels)?;
        self.constant = single_class(labels);
        if self.constant.is_some() {
            return Ok(());
        }
        let class_w = balanced_weights(labels);
        let sw: Vec<f64> = labels.iter().map(|&l| class_w[l as usize]).collect();
        let y = signs(labels);
        let c = self.c;

        let mut params = vec![0.0; dim + 1];
        let iters = minimize(&mut params, LINEAR_MAX_ITER, LINEAR_TOL, |p| {
            let (w, b) = p.split_at(dim);
            let mut loss = 0.5 * w.iter().map(|v| v * v).sum::<f64>();
            let mut grad: Vec<f64> = w.to_vec();
            grad.push(0.0);
            for ((x, &yi), &s) in rows.iter().zip(&y).zip(&sw) {
                let slack = 1.0 - yi * (dot(w, x) + b[0]);
                if slack > 0.0 {
                    loss += c * s * slack * slack;
                    let g = -2.0 * c * s * slack * yi;
                    for (gj, &xj) in grad[..dim].iter_mut().zip(x) {
                        *gj += g * xj as f64;
                    }
                    grad[dim] += g;
                }
            }
            (loss, grad)
        });
        if iters >= LINEAR_MAX_ITER {
            warn!(c, "linear SVM reached the iteration limit without converging");
        }
        self.bias = params[dim];
        params.truncate(dim);
        self.weights = params;
        Ok(())
    }

    fn predict(&self, rows: &[Vec<f32>]) -> Vec<u8> {
        if let Some(label) = self.constant {
            return vec![label; rows.len()];
        }
        rows.iter()
            .map(|x| u8::from(dot(&self.weights, x) + self.bias > 0.0))
            .collect()
    }
}

/// Kernel width: a fixed value or derived from the training data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gamma {
    /// `1 / (D · var(X))` over every entry of the training matrix.
    Scale,
    Value(f64),
}

impl Gamma {
    fn from_param(value: &ParamValue) -> Result<Self, MlError> {
        match value {
            ParamValue::Text(s) if s == "scale" => Ok(Self::Scale),
            ParamValue::Float(v) => Ok(Self::Value(*v)),
            other => Err(MlError::Param {
                name: "gamma".into(),
                reason: format!("expected 'scale' or a number, got {other}"),
            }),
        }
    }

    fn resolve(self, rows: &[Vec<f32>]) -> f64 {
        match self {
            Self::Value(v) => v,
            Self::Scale => {
                let dim = rows.first().map_or(0, Vec::len);
                let count = (rows.len() * dim) as f64;
                if count == 0.0 {
                    return 1.0;
                }
                let mean = rows.iter().flatten().map(|&v| v as f64).sum::<f64>() / count;
                let var = rows
                    .iter()
                    .flatten()
                    .map(|&v| (v as f64 - mean).powi(2))
                    .sum::<f64>()
                    / count;
                if var > 0.0 { 1.0 / (dim as f64 * var) } else { 1.0 }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kernel {
    Linear,
    Rbf { gamma: f64 },
    Poly { gamma: f64, degree: i32 },
}

impl Kernel {
    fn eval(&self, a: &[f32], b: &[f32]) -> f64 {
        match *self {
            Self::Linear => dot_f32(a, b),
            Self::Rbf { gamma } => {
                let d2: f64 = a
                    .iter()
                    .zip(b)
                    .map(|(&x, &y)| (x as f64 - y as f64).powi(2))
                    .sum();
                (-gamma * d2).exp()
            }
            Self::Poly { gamma, degree } => (gamma * dot_f32(a, b)).powi(degree),
        }
    }
}

fn dot_f32(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(&x, &y)| x as f64 * y as f64).sum()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum KernelSpec {
    Linear,
    Rbf(Gamma),
    Poly(Gamma, i32),
}

/// Which dual problem SMO solves.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Formulation {
    /// Box `0 ≤ αᵢ ≤ C·w(yᵢ)`, linear term `-Σαᵢ`.
    C(f64),
    /// Box `0 ≤ αᵢ ≤ w(yᵢ)`, each class's `Σαᵢ` fixed at `ν·Σw/2`.
    Nu(f64),
}

/// Kernel SVC solved with SMO over the full kernel matrix.
///
/// Balanced class weights become per-sample box constraints. In the C
/// formulation working pairs are the maximal violating pair; in the nu
/// formulation both members of the pair come from the same class.
#[derive(Debug, Clone)]
pub struct KernelSvc {
    form: Formulation,
    spec: KernelSpec,
    kernel: Kernel,
    support: Vec<Vec<f32>>,
    coef: Vec<f64>,
    rho: f64,
    constant: Option<u8>,
}

impl KernelSvc {
    fn with_spec(form: Formulation, spec: KernelSpec) -> Self {
        Self {
            form,
            spec,
            kernel: Kernel::Linear,
            support: Vec::new(),
            coef: Vec::new(),
            rho: 0.0,
            constant: None,
        }
    }

    pub fn linear(c: f64) -> Self {
        Self::with_spec(Formulation::C(c), KernelSpec::Linear)
    }

    pub fn rbf(c: f64, gamma: Gamma) -> Self {
        Self::with_spec(Formulation::C(c), KernelSpec::Rbf(gamma))
    }

    pub fn poly(c: f64, gamma: Gamma, degree: i32) -> Self {
        Self::with_spec(Formulation::C(c), KernelSpec::Poly(gamma, degree))
    }

    /// nu-SVC with an RBF kernel. `nu` bounds the fraction of margin errors
    /// from above and the fraction of support vectors from below.
    pub fn nu_rbf(nu: f64, gamma: Gamma) -> Result<Self, MlError> {
        if !(nu > 0.0 && nu <= 1.0) {
            return Err(MlError::Param {
                name: "nu".into(),
                reason: format!("must lie in (0, 1], got {nu}"),
            });
        }
        Ok(Self::with_spec(Formulation::Nu(nu), KernelSpec::Rbf(gamma)))
    }

    pub fn support_count(&self) -> usize {
        self.support.len()
    }

    pub fn decision(&self, x: &[f32]) -> f64 {
        self.support
            .iter()
            .zip(&self.coef)
            .map(|(sv, &a)| a * self.kernel.eval(sv, x))
            .sum::<f64>()
            - self.rho
    }

    fn keep_support(&mut self, rows: &[Vec<f32>], y: &[f64], alpha: &[f64], scale: f64) {
        self.support.clear();
        self.coef.clear();
        for (t, &a) in alpha.iter().enumerate() {
            if a > 0.0 {
                self.support.push(rows[t].clone());
                self.coef.push(y[t] * a / scale);
            }
        }
    }
}

impl Classifier for KernelSvc {
    fn fit(&mut self, rows: &[Vec<f32>], labels: &[u8]) -> Result<(), MlError> {
        check_shapes(rows, labels)?;
        self.constant = single_class(labels);
        if self.constant.is_some() {
            return Ok(());
        }
        self.kernel = match self.spec {
            KernelSpec::Linear => Kernel::Linear,
            KernelSpec::Rbf(g) => Kernel::Rbf { gamma: g.resolve(rows) },
            KernelSpec::Poly(g, degree) => Kernel::Poly {
                gamma: g.resolve(rows),
                degree,
            },
        };

        let n = rows.len();
        let y = signs(labels);
        let class_w = balanced_weights(labels);

        // Q[i][j] = yᵢ·yⱼ·K(xᵢ, xⱼ), stored row-major.
        let mut q = vec![0.0; n * n];
        for i in 0..n {
            for j in i..n {
                let v = y[i] * y[j] * self.kernel.eval(&rows[i], &rows[j]);
                q[i * n + j] = v;
                q[j * n + i] = v;
            }
        }
        let smo = Smo { n, q, y };

        match self.form {
            Formulation::C(c) => {
                let bound: Vec<f64> = labels.iter().map(|&l| c * class_w[l as usize]).collect();
                let mut alpha = vec![0.0; n];
                let mut grad = vec![-1.0; n];
                let iter = smo.solve(&mut alpha, &mut grad, &bound, select_pair);
                self.rho = compute_rho(&smo.y, &alpha, &bound, &grad);
                self.keep_support(rows, &smo.y, &alpha, 1.0);
                debug!(c, iter, support_vectors = self.support.len(), "kernel SVC converged");
            }
            Formulation::Nu(nu) => {
                let bound: Vec<f64> = labels.iter().map(|&l| class_w[l as usize]).collect();
                let mut alpha = nu_start(&smo.y, &bound, nu);
                let mut grad: Vec<f64> = (0..n)
                    .map(|t| (0..n).map(|s| smo.q[t * n + s] * alpha[s]).sum())
                    .collect();
                let iter = smo.solve(&mut alpha, &mut grad, &bound, select_pair_nu);
                let (rho, r) = nu_rho(&smo.y, &alpha, &bound, &grad);
                if r <= TAU {
                    return Err(MlError::Fit(format!("nu-SVC margin collapsed (r = {r}) for nu = {nu}")));
                }
                self.rho = rho / r;
                self.keep_support(rows, &smo.y, &alpha, r);
                debug!(nu, iter, support_vectors = self.support.len(), "nu-SVC converged");
            }
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

type SelectPair = fn(&[f64], &[f64], &[f64], &[f64]) -> Option<(usize, usize)>;

/// Dense SMO state shared by both formulations.
struct Smo {
    n: usize,
    q: Vec<f64>,
    y: Vec<f64>,
}

impl Smo {
    /// Iterate pair updates until `select` finds no violating pair; returns the
    /// iteration count.
    fn solve(&self, alpha: &mut [f64], grad: &mut [f64], bound: &[f64], select: SelectPair) -> usize {
        let max_iter = 100_000.max(100 * self.n);
        let mut iter = 0;
        while iter < max_iter {
            let Some((i, j)) = select(&self.y, alpha, bound, grad) else {
                break;
            };
            iter += 1;
            self.step(i, j, alpha, grad, bound);
        }
        if iter >= max_iter {
            warn!(iter, "SMO reached the iteration limit without converging");
        }
        iter
    }

    fn step(&self, i: usize, j: usize, alpha: &mut [f64], grad: &mut [f64], bound: &[f64]) {
        let (n, q, y) = (self.n, &self.q, &self.y);
        let (old_i, old_j) = (alpha[i], alpha[j]);
        let (ci, cj) = (bound[i], bound[j]);
        let (qii, qjj, qij) = (q[i * n + i], q[j * n + j], q[i * n + j]);

        if y[i] != y[j] {
            let quad = (qii + qjj + 2.0 * qij).max(TAU);
            let delta = (-grad[i] - grad[j]) / quad;
            let diff = alpha[i] - alpha[j];
            alpha[i] += delta;
            alpha[j] += delta;
            if diff > 0.0 {
                if alpha[j] < 0.0 {
                    alpha[j] = 0.0;
                    alpha[i] = diff;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = -diff;
            }
            if diff > ci - cj {
                if alpha[i] > ci {
                    alpha[i] = ci;
                    alpha[j] = ci - diff;
                }
            } else if alpha[j] > cj {
                alpha[j] = cj;
                alpha[i] = cj + diff;
            }
        } else {
            let quad = (qii + qjj - 2.0 * qij).max(TAU);
            let delta = (grad[i] - grad[j]) / quad;
            let sum = alpha[i] + alpha[j];
            alpha[i] -= delta;
            alpha[j] += delta;
            if sum > ci {
                if alpha[i] > ci {
                    alpha[i] = ci;
                    alpha[j] = sum - ci;
                }
            } else if alpha[j] < 0.0 {
                alpha[j] = 0.0;
                alpha[i] = sum;
            }
            if sum > cj {
                if alpha[j] > cj {
                    alpha[j] = cj;
                    alpha[i] = sum - cj;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = sum;
            }
        }

        let (di, dj) = (alpha[i] - old_i, alpha[j] - old_j);
        for (t, g) in grad.iter_mut().enumerate() {
            *g += q[t * n + i] * di + q[t * n + j] * dj;
        }
    }
}

fn in_up(y: f64, alpha: f64, bound: f64) -> bool {
    if y > 0.0 { alpha < bound } else { alpha > 0.0 }
}

fn in_low(y: f64, alpha: f64, bound: f64) -> bool {
    if y > 0.0 { alpha > 0.0 } else { alpha < bound }
}

/// Maximal violating pair, or `None` once the KKT gap is below tolerance.
fn select_pair(y: &[f64], alpha: &[f64], bound: &[f64], grad: &[f64]) -> Option<(usize, usize)> {
    let mut up = (f64::NEG_INFINITY, None);
    let mut low = (f64::INFINITY, None);
    for t in 0..y.len() {
        let v = -y[t] * grad[t];
        if in_up(y[t], alpha[t], bound[t]) && v > up.0 {
            up = (v, Some(t));
        }
        if in_low(y[t], alpha[t], bound[t]) && v < low.0 {
            low = (v, Some(t));
        }
    }
    match (up, low) {
        ((m, Some(i)), (big_m, Some(j))) if m - big_m >= SMO_EPS => Some((i, j)),
        _ => None,
    }
}

/// Maximal violating pair within one class: the class with the larger gap wins.
fn select_pair_nu(y: &[f64], alpha: &[f64], bound: &[f64], grad: &[f64]) -> Option<(usize, usize)> {
    // Index 0 collects y = +1, index 1 collects y = -1.
    let mut up = [(f64::NEG_INFINITY, None); 2];
    let mut low = [(f64::INFINITY, None); 2];
    for t in 0..y.len() {
        let k = usize::from(y[t] < 0.0);
        let v = -y[t] * grad[t];
        if in_up(y[t], alpha[t], bound[t]) && v > up[k].0 {
            up[k] = (v, Some(t));
        }
        if in_low(y[t], alpha[t], bound[t]) && v < low[k].0 {
            low[k] = (v, Some(t));
        }
    }
    let mut best: Option<(f64, usize, usize)> = None;
    for k in 0..2 {
        if let ((m, Some(i)), (big_m, Some(j))) = (up[k], low[k]) {
            let gap = m - big_m;
            if gap >= SMO_EPS && best.is_none_or(|(g, _, _)| gap > g) {
                best = Some((gap, i, j));
            }
        }
    }
    best.map(|(_, i, j)| (i, j))
}

fn compute_rho(y: &[f64], alpha: &[f64], bound: &[f64], grad: &[f64]) -> f64 {
    let mut ub = f64::INFINITY;
    let mut lb = f64::NEG_INFINITY;
    let mut free_sum = 0.0;
    let mut free = 0usize;
    for t in 0..y.len() {
        let yg = y[t] * grad[t];
        if alpha[t] >= bound[t] {
            if y[t] < 0.0 {
                ub = ub.min(yg);
            } else {
                lb = lb.max(yg);
            }
        } else if alpha[t] <= 0.0 {
            if y[t] > 0.0 {
                ub = ub.min(yg);
            } else {
                lb = lb.max(yg);
            }
        } else {
            free_sum += yg;
            free += 1;
        }
    }
    if free > 0 {
        free_sum / free as f64
    } else {
        (ub + lb) / 2.0
    }
}

/// Feasible starting point: each class's budget `ν·Σw/2` is poured into its
/// samples in order, each capped at its bound.
fn nu_start(y: &[f64], bound: &[f64], nu: f64) -> Vec<f64> {
    let total: f64 = bound.iter().sum();
    let mut budget = [nu * total / 2.0; 2];
    y.iter()
        .zip(bound)
        .map(|(&yi, &b)| {
            let k = usize::from(yi < 0.0);
            let a = b.min(budget[k]);
            budget[k] -= a;
            a
        })
        .collect()
}

/// Offset and margin scale of the nu problem, as `(rho, r)`.
fn nu_rho(y: &[f64], alpha: &[f64], bound: &[f64], grad: &[f64]) -> (f64, f64) {
    let mut per_class = [0.0; 2];
    for (k, slot) in per_class.iter_mut().enumerate() {
        let mut ub = f64::INFINITY;
        let mut lb = f64::NEG_INFINITY;
        let mut free_sum = 0.0;
        let mut free = 0usize;
        for t in (0..y.len()).filter(|&t| usize::from(y[t] < 0.0) == k) {
            if alpha[t] >= bound[t] {
                lb = lb.max(grad[t]);
            } else if alpha[t] <= 0.0 {
                ub = ub.min(grad[t]);
            } else {
                free_sum += grad[t];
                free += 1;
            }
        }
        *slot = if free > 0 { free_sum / free as f64 } else { (ub + lb) / 2.0 };
    }
    let [r1, r2] = per_class;
    ((r1 - r2) / 2.0, (r1 + r2) / 2.0)
}

pub struct LinearSvcFamily;

impl ModelFamily for LinearSvcFamily {
    fn name(&self) -> &'static str {
        "linear_svc"
    }

    fn grid(&self) -> ParamGrid {
        ParamGrid::new().with("C", vec![0.01.into(), 0.1.into(), 1.0.into(), 10.0.into()])
    }

    fn build(&self, params: &ParamSet, _seed: u64) -> Result<Box<dyn Classifier>, MlError> {
        Ok(Box::new(LinearSvc::new(params.float("C")?)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SvcKind {
    Linear,
    Rbf,
    Poly,
    NuRbf,
}

/// Kernel SVC family; one instance per kernel.
pub struct SvcFamily {
    kind: SvcKind,
}

impl SvcFamily {
    pub fn linear() -> Self {
        Self { kind: SvcKind::Linear }
    }

    pub fn rbf() -> Self {
        Self { kind: SvcKind::Rbf }
    }

    pub fn poly() -> Self {
        Self { kind: SvcKind::Poly }
    }

    pub fn nu_rbf() -> Self {
        Self { kind: SvcKind::NuRbf }
    }
}

impl ModelFamily for SvcFamily {
    fn name(&self) -> &'static str {
        match self.kind {
            SvcKind::Linear => "svc_linear",
            SvcKind::Rbf => "svc_rbf",
            SvcKind::Poly => "svc_poly",
            SvcKind::NuRbf => "nusvc_rbf",
        }
    }

    fn grid(&self) -> ParamGrid {
        match self.kind {
            SvcKind::Linear => {
                ParamGrid::new().with("C", vec![0.01.into(), 0.1.into(), 1.0.into(), 10.0.into()])
            }
            SvcKind::Rbf => ParamGrid::new()
                .with("C", vec![0.1.into(), 1.0.into(), 10.0.into()])
                .with("gamma", vec!["scale".into(), 0.001.into(), 0.0001.into()]),
            SvcKind::Poly => ParamGrid::new()
                .with("C", vec![0.1.into(), 1.0.into(), 10.0.into()])
                .with("degree", vec![2usize.into(), 3usize.into()])
                .with("gamma", vec!["scale".into(), 0.001.into()]),
            SvcKind::NuRbf => ParamGrid::new()
                .with("nu", vec![0.25.into(), 0.5.into()])
                .with("gamma", vec!["scale".into(), 0.001.into()]),
        }
    }

    fn build(&self, params: &ParamSet, _seed: u64) -> Result<Box<dyn Classifier>, MlError> {
        let gamma = || -> Result<Gamma, MlError> {
            let value = params.0.get("gamma").ok_or_else(|| MlError::Param {
                name: "gamma".into(),
                reason: "missing".into(),
            })?;
            Gamma::from_param(value)
        };
        let model = match self.kind {
            SvcKind::Linear => KernelSvc::linear(params.float("C")?),
            SvcKind::Rbf => KernelSvc::rbf(params.float("C")?, gamma()?),
            SvcKind::Poly => {
                let degree = i32::try_from(params.usize("degree")?).map_err(|_| MlError::Param {
                    name: "degree".into(),
                    reason: "too large".into(),
                })?;
                KernelSvc::poly(params.float("C")?, gamma()?, degree)
            }
            SvcKind::NuRbf => KernelSvc::nu_rbf(params.float("nu")?, gamma()?)?,
        };
        Ok(Box::new(model))
    }
}
