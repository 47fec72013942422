//! Random forest of weighted Gini CART trees.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};

use super::{Classifier, ModelFamily, balanced_weights, check_shapes, single_class};
use crate::MlError;
use crate::params::{ParamGrid, ParamSet};

#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        proba: [f64; 2],
    },
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn proba(&self, x: &[f32]) -> [f64; 2] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { proba } => return *proba,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => idx = if x[*feature] <= *threshold { *left } else { *right },
            }
        }
    }
}

struct Builder<'a> {
    rows: &'a [Vec<f32>],
    labels: &'a [u8],
    weights: &'a [f64],
    params: TreeParams,
    max_features: usize,
    rng: StdRng,
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f32,
    impurity: f64,
}

fn class_mass(labels: &[u8], weights: &[f64], idx: &[usize]) -> [f64; 2] {
    let mut mass = [0.0; 2];
    for &i in idx {
        mass[labels[i] as usize] += weights[i];
    }
    mass
}

/// Weighted Gini impurity times total weight.
fn weighted_gini(mass: [f64; 2]) -> f64 {
    let total = mass[0] + mass[1];
    if total <= 0.0 {
        return 0.0;
    }
    total - (mass[0] * mass[0] + mass[1] * mass[1]) / total
}

impl Builder<'_> {
    fn build(mut self, idx: Vec<usize>) -> Tree {
        self.grow(idx, 0);
        Tree { nodes: self.nodes }
    }

    fn leaf(&mut self, mass: [f64; 2]) -> usize {
        let total = mass[0] + mass[1];
        let proba = if total > 0.0 {
            [mass[0] / total, mass[1] / total]
        } else {
            [0.5, 0.5]
        };
        self.nodes.push(Node::Leaf { proba });
        self.nodes.len() - 1
    }

    fn grow(&mut self, idx: Vec<usize>, depth: usize) -> usize {
        let mass = class_mass(self.labels, self.weights, &idx);
        let parent = weighted_gini(mass);
        let depth_reached = self.params.max_depth.is_some_and(|d| depth >= d);
        if depth_reached || idx.len() < self.params.min_samples_split || parent <= 0.0 {
            return self.leaf(mass);
        }

        let Some(best) = self.best_split(&idx, parent) else {
            return self.leaf(mass);
        };
        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = idx
            .iter()
            .partition(|&&i| self.rows[i][best.feature] <= best.threshold);

        let slot = self.nodes.len();
        self.nodes.push(Node::Leaf { proba: [0.0; 2] });
        let left = self.grow(left_idx, depth + 1);
        let right = self.grow(right_idx, depth + 1);
        self.nodes[slot] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        slot
    }

    fn best_split(&mut self, idx: &[usize], parent: f64) -> Option<BestSplit> {
        let dim = self.rows[0].len();
        let features = sample(&mut self.rng, dim, self.max_features.min(dim));
        let min_leaf = self.params.min_samples_leaf.max(1);
        let total = class_mass(self.labels, self.weights, idx);
        let mut best: Option<BestSplit> = None;

        let mut order = idx.to_vec();
        for feature in features.iter() {
            order.sort_by(|&a, &b| self.rows[a][feature].total_cmp(&self.rows[b][feature]));
            let mut left = [0.0; 2];
            for pos in 0..order.len() - 1 {
                let i = order[pos];
                left[self.labels[i] as usize] += self.weights[i];
                let n_left = pos + 1;
                if n_left < min_leaf || order.len() - n_left < min_leaf {
                    continue;
                }
                let here = self.rows[i][feature];
                let next = self.rows[order[pos + 1]][feature];
                if here >= next {
                    continue;
                }
                let right = [total[0] - left[0], total[1] - left[1]];
                let impurity = weighted_gini(left) + weighted_gini(right);
                if impurity < parent - 1e-12 && best.as_ref().is_none_or(|b| impurity < b.impurity) {
                    let mid = here + (next - here) / 2.0;
                    let threshold = if mid < next { mid } else { here };
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        impurity,
                    });
                }
            }
        }
        best
    }
}

/// Bagged ensemble of CART trees with balanced class weights.
///
/// Each tree sees a bootstrap sample and `sqrt(D)` candidate features per
/// split. Class probabilities are averaged across trees; ties go to class 0.
#[derive(Debug, Clone)]
pub struct RandomForest {
    n_estimators: usize,
    params: TreeParams,
    seed: u64,
    trees: Vec<Tree>,
    constant: Option<u8>,
}

impl RandomForest {
    pub fn new(n_estimators: usize, params: TreeParams, seed: u64) -> Self {
        Self {
            n_estimators,
            params,
            seed,
            trees: Vec::new(),
            constant: None,
        }
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

impl Classifier for RandomForest {
    fn fit(&mut self, rows: &[Vec<f32>], labels: &[u8]) -> Result<(), MlError> {
        let dim = check_shapes(rows, labels)?;
        self.constant = single_class(labels);
        if self.constant.is_some() {
            return Ok(());
        }
        let n = rows.len();
        let class_w = balanced_weights(labels);
        let max_features = ((dim as f64).sqrt() as usize).max(1);

        self.trees = (0..self.n_estimators)
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(t as u64));
                let mut counts = vec![0u32; n];
                for _ in 0..n {
                    counts[rng.gen_range(0..n)] += 1;
                }
                let weights: Vec<f64> = counts
                    .iter()
                    .zip(labels)
                    .map(|(&c, &l)| c as f64 * class_w[l as usize])
                    .collect();
                let idx: Vec<usize> = (0..n).filter(|&i| counts[i] > 0).collect();
                Builder {
                    rows,
                    labels,
                    weights: &weights,
                    params: self.params,
                    max_features,
                    rng,
                    nodes: Vec::new(),
                }
                .build(idx)
            })
            .collect();
        Ok(())
    }

    fn predict(&self, rows: &[Vec<f32>]) -> Vec<u8> {
        if let Some(label) = self.constant {
            return vec![label; rows.len()];
        }
        rows.iter()
            .map(|x| {
                let mut sum = [0.0; 2];
                for tree in &self.trees {
                    let p = tree.proba(x);
                    sum[0] += p[0];
                    sum[1] += p[1];
                }
                u8::from(sum[1] > sum[0])
            })
            .collect()
    }
}

pub struct RandomForestFamily;

impl ModelFamily for RandomForestFamily {
    fn name(&self) -> &'static str {
        "random_forest"
    }

    fn grid(&self) -> ParamGrid {
        ParamGrid::new()
            .with("n_estimators", vec![100usize.into(), 200usize.into(), 500usize.into()])
            .with(
                "max_depth",
                vec![None::<usize>.into(), Some(10usize).into(), Some(20usize).into(), Some(50usize).into()],
            )
            .with("min_samples_split", vec![2usize.into(), 5usize.into(), 10usize.into()])
            .with("min_samples_leaf", vec![1usize.into(), 2usize.into(), 4usize.into()])
    }

    fn scaled(&self) -> bool {
        false
    }

    fn build(&self, params: &ParamSet, seed: u64) -> Result<Box<dyn Classifier>, MlError> {
        let tree = TreeParams {
            max_depth: params.opt_usize("max_depth")?,
            min_samples_split: params.usize("min_samples_split")?,
            min_samples_leaf: params.usize("min_samples_leaf")?,
        };
        Ok(Box::new(RandomForest::new(params.usize("n_estimators")?, tree, seed)))
    }
}
