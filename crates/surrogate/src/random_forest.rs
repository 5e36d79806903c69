//! Probabilistic random forest regression.
//!
//! An ensemble of regression trees grown on bootstrap samples of the training data.
//! Each leaf keeps the mean and the variance of its training outputs, the forest
//! prediction variance is given by the law of total variance over the trees:
//! mean of the leaf variances plus variance of the leaf means.
//!
//! Components flagged as categorical (choice indices) are split on equality
//! (`x_j == c` vs `x_j != c`), others on a threshold (`x_j <= t` vs `x_j > t`).

use crate::errors::{GpError, Result};

use linfa::prelude::{DatasetBase, Fit, PredictInplace};
use linfa::ParamGuard;
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Axis, Data, Ix1, Ix2, Zip};
use ndarray_rand::rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// A set of validated random forest parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RandomForestValidParams {
    n_trees: usize,
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
    max_features: f64,
    bootstrap: bool,
    seed: Option<u64>,
    var_floor: f64,
    cat_mask: Vec<bool>,
}

impl Default for RandomForestValidParams {
    fn default() -> Self {
        RandomForestValidParams {
            n_trees: 10,
            max_depth: None,
            min_samples_split: 3,
            min_samples_leaf: 3,
            max_features: 5. / 6.,
            bootstrap: true,
            seed: None,
            var_floor: 1e-10,
            cat_mask: vec![],
        }
    }
}

impl RandomForestValidParams {
    /// Number of trees
    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    /// Maximum depth of trees, `None` if unlimited
    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// Minimum number of samples required to split a node
    pub fn min_samples_split(&self) -> usize {
        self.min_samples_split
    }

    /// Minimum number of samples in a leaf
    pub fn min_samples_leaf(&self) -> usize {
        self.min_samples_leaf
    }

    /// Ratio of input components considered at each split
    pub fn max_features(&self) -> f64 {
        self.max_features
    }

    /// Whether trees are grown on bootstrap samples
    pub fn bootstrap(&self) -> bool {
        self.bootstrap
    }

    /// Random generator seed
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Lower bound of predicted variances
    pub fn var_floor(&self) -> f64 {
        self.var_floor
    }

    /// Categorical flags of input components
    pub fn cat_mask(&self) -> &[bool] {
        &self.cat_mask
    }
}

/// The set of hyperparameters that can be specified for the training of
/// a [`RandomForest`].
#[derive(Clone, Debug, Default)]
pub struct RandomForestParams(RandomForestValidParams);

impl RandomForestParams {
    /// Constructor with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of trees
    pub fn n_trees(mut self, n_trees: usize) -> Self {
        self.0.n_trees = n_trees;
        self
    }

    /// Set the maximum depth of the trees
    pub fn max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.0.max_depth = max_depth;
        self
    }

    /// Set the minimum number of samples required to split a node
    pub fn min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.0.min_samples_split = min_samples_split;
        self
    }

    /// Set the minimum number of samples in a leaf
    pub fn min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.0.min_samples_leaf = min_samples_leaf;
        self
    }

    /// Set the ratio in ]0, 1] of input components considered at each split
    pub fn max_features(mut self, max_features: f64) -> Self {
        self.0.max_features = max_features;
        self
    }

    /// Grow trees on bootstrap samples or on the whole training set
    pub fn bootstrap(mut self, bootstrap: bool) -> Self {
        self.0.bootstrap = bootstrap;
        self
    }

    /// Set the random generator seed
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.0.seed = seed;
        self
    }

    /// Set the lower bound of predicted variances
    pub fn var_floor(mut self, var_floor: f64) -> Self {
        self.0.var_floor = var_floor;
        self
    }

    /// Set categorical flags of input components
    pub fn cat_mask(mut self, cat_mask: Vec<bool>) -> Self {
        self.0.cat_mask = cat_mask;
        self
    }
}

impl ParamGuard for RandomForestParams {
    type Checked = RandomForestValidParams;
    type Error = GpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        let p = &self.0;
        if p.n_trees == 0 {
            return Err(GpError::InvalidValueError(
                "n_trees should be strictly positive".to_string(),
            ));
        }
        if !(p.max_features > 0. && p.max_features <= 1.) {
            return Err(GpError::InvalidValueError(format!(
                "max_features should be in ]0, 1], got {}",
                p.max_features
            )));
        }
        if p.min_samples_leaf == 0 {
            return Err(GpError::InvalidValueError(
                "min_samples_leaf should be strictly positive".to_string(),
            ));
        }
        if !(p.var_floor >= 0.) {
            return Err(GpError::InvalidValueError(format!(
                "var_floor should be positive, got {}",
                p.var_floor
            )));
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

/// A node in the regression tree (arena-allocated).
#[derive(Clone, Debug, Serialize, Deserialize)]
enum TreeNode {
    Leaf {
        mean: f64,
        var: f64,
    },
    Split {
        feature: usize,
        rule: SplitRule,
        left: usize,
        right: usize,
    },
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
enum SplitRule {
    /// go left when `x <= threshold`
    Threshold(f64),
    /// go left when `x == category`
    Category(f64),
}

impl SplitRule {
    fn goes_left(&self, v: f64) -> bool {
        match self {
            SplitRule::Threshold(t) => v <= *t,
            SplitRule::Category(c) => (v - c).abs() < 0.5,
        }
    }
}

/// A regression tree minimizing squared error
#[derive(Clone, Debug, Serialize, Deserialize)]
struct RegressionTree {
    nodes: Vec<TreeNode>,
}

struct TreeBuilder<'a, R: Rng> {
    x: ArrayView1<'a, f64>,
    ncols: usize,
    y: &'a [f64],
    params: &'a RandomForestValidParams,
    rng: R,
}

impl<'a, R: Rng> TreeBuilder<'a, R> {
    fn value(&self, i: usize, j: usize) -> f64 {
        self.x[i * self.ncols + j]
    }

    fn is_categorical(&self, j: usize) -> bool {
        self.params.cat_mask.get(j).copied().unwrap_or(false)
    }

    fn leaf(&self, nodes: &mut Vec<TreeNode>, indices: &[usize]) -> usize {
        let n = indices.len() as f64;
        let mean = indices.iter().map(|&i| self.y[i]).sum::<f64>() / n;
        let var = indices
            .iter()
            .map(|&i| (self.y[i] - mean).powi(2))
            .sum::<f64>()
            / n;
        nodes.push(TreeNode::Leaf { mean, var });
        nodes.len() - 1
    }

    fn build_node(&mut self, nodes: &mut Vec<TreeNode>, indices: &[usize], depth: usize) -> usize {
        let n = indices.len();
        if n < self.params.min_samples_split
            || n < 2 * self.params.min_samples_leaf
            || self.params.max_depth.is_some_and(|d| depth >= d)
            || indices.iter().all(|&i| self.y[i] == self.y[indices[0]])
        {
            return self.leaf(nodes, indices);
        }

        let n_features = self.ncols;
        let n_candidates = ((self.params.max_features * n_features as f64).ceil() as usize)
            .clamp(1, n_features);
        let candidates = partial_shuffle(n_features, n_candidates, &mut self.rng);

        let mut best: Option<(f64, usize, SplitRule)> = None;
        for &feat in &candidates {
            let found = if self.is_categorical(feat) {
                self.best_category_split(indices, feat)
            } else {
                self.best_threshold_split(indices, feat)
            };
            if let Some((score, rule)) = found {
                if best.as_ref().map_or(true, |(s, _, _)| score > *s) {
                    best = Some((score, feat, rule));
                }
            }
        }

        let Some((score, feature, rule)) = best else {
            return self.leaf(nodes, indices);
        };
        if score <= 0. {
            return self.leaf(nodes, indices);
        }

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| rule.goes_left(self.value(i, feature)));

        // Reserve slot for this split node
        let node_idx = self.leaf(nodes, indices);
        let left = self.build_node(nodes, &left_indices, depth + 1);
        let right = self.build_node(nodes, &right_indices, depth + 1);
        nodes[node_idx] = TreeNode::Split {
            feature,
            rule,
            left,
            right,
        };
        node_idx
    }

    /// Sweeps sorted values of the component, returns the best variance reduction
    fn best_threshold_split(&self, indices: &[usize], feat: usize) -> Option<(f64, SplitRule)> {
        let mut sorted: Vec<(f64, f64)> = indices
            .iter()
            .map(|&i| (self.value(i, feat), self.y[i]))
            .collect();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        let n = sorted.len();
        let total_sum: f64 = sorted.iter().map(|v| v.1).sum();
        let total_sq: f64 = sorted.iter().map(|v| v.1 * v.1).sum();
        let total_sse = total_sq - total_sum * total_sum / n as f64;

        let min_leaf = self.params.min_samples_leaf;
        let (mut l_sum, mut l_sq) = (0., 0.);
        let mut best: Option<(f64, SplitRule)> = None;
        for k in 0..n - 1 {
            l_sum += sorted[k].1;
            l_sq += sorted[k].1 * sorted[k].1;
            let (l_n, r_n) = (k + 1, n - k - 1);
            if sorted[k].0 == sorted[k + 1].0 || l_n < min_leaf || r_n < min_leaf {
                continue;
            }
            let (r_sum, r_sq) = (total_sum - l_sum, total_sq - l_sq);
            let sse = (l_sq - l_sum * l_sum / l_n as f64) + (r_sq - r_sum * r_sum / r_n as f64);
            let score = total_sse - sse;
            if best.as_ref().map_or(true, |(s, _)| score > *s) {
                let threshold = 0.5 * (sorted[k].0 + sorted[k + 1].0);
                best = Some((score, SplitRule::Threshold(threshold)));
            }
        }
        best
    }

    /// One category against the others, returns the best variance reduction
    fn best_category_split(&self, indices: &[usize], feat: usize) -> Option<(f64, SplitRule)> {
        let mut categories: Vec<f64> = indices
            .iter()
            .map(|&i| self.value(i, feat).round())
            .collect();
        categories.sort_by(f64::total_cmp);
        categories.dedup();
        if categories.len() < 2 {
            return None;
        }

        let min_leaf = self.params.min_samples_leaf;
        let mut best: Option<(f64, SplitRule)> = None;
        for c in categories {
            let rule = SplitRule::Category(c);
            let (mut l, mut r) = (Stats::default(), Stats::default());
            for &i in indices {
                if rule.goes_left(self.value(i, feat)) {
                    l.push(self.y[i]);
                } else {
                    r.push(self.y[i]);
                }
            }
            if l.n < min_leaf || r.n < min_leaf {
                continue;
            }
            let mut all = l.clone();
            all.merge(&r);
            let score = all.sse() - l.sse() - r.sse();
            if best.as_ref().map_or(true, |(s, _)| score > *s) {
                best = Some((score, rule));
            }
        }
        best
    }
}

#[derive(Clone, Default)]
struct Stats {
    n: usize,
    sum: f64,
    sq: f64,
}

impl Stats {
    fn push(&mut self, y: f64) {
        self.n += 1;
        self.sum += y;
        self.sq += y * y;
    }

    fn merge(&mut self, other: &Stats) {
        self.n += other.n;
        self.sum += other.sum;
        self.sq += other.sq;
    }

    fn sse(&self) -> f64 {
        if self.n == 0 {
            0.
        } else {
            self.sq - self.sum * self.sum / self.n as f64
        }
    }
}

/// Select `k` random indices from `0..n` using partial Fisher-Yates shuffle.
fn partial_shuffle<R: Rng>(n: usize, k: usize, rng: &mut R) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    let k = k.min(n);
    for i in 0..k {
        let j = rng.gen_range(i..n);
        indices.swap(i, j);
    }
    indices.truncate(k);
    indices
}

impl RegressionTree {
    /// Returns (mean, variance) of the leaf `x` falls in
    fn leaf_value(&self, x: &ArrayView1<f64>) -> (f64, f64) {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { mean, var } => return (*mean, *var),
                TreeNode::Split {
                    feature,
                    rule,
                    left,
                    right,
                } => {
                    idx = if rule.goes_left(x[*feature]) {
                        *left
                    } else {
                        *right
                    }
                }
            }
        }
    }

    fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }
}

/// Probabilistic random forest regressor
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
    dim: usize,
    params: RandomForestValidParams,
}

impl RandomForest {
    /// Random forest parameters constructor
    pub fn params() -> RandomForestParams {
        RandomForestParams::new()
    }

    /// Predict output values at n given `x` points specified as a (n, nx) matrix.
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array1<f64>> {
        self.predict_valvar(x).map(|(v, _)| v)
    }

    /// Predict both output values and variances at n given `x` points
    pub fn predict_valvar(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<(Array1<f64>, Array1<f64>)> {
        if x.ncols() != self.dim {
            return Err(GpError::InvalidValueError(format!(
                "Expected inputs of dimension {}, got {}",
                self.dim,
                x.ncols()
            )));
        }
        let n_trees = self.trees.len() as f64;
        let mut means = Array1::zeros(x.nrows());
        let mut vars = Array1::zeros(x.nrows());
        Zip::from(&mut means)
            .and(&mut vars)
            .and(x.rows())
            .par_for_each(|m, v, xi| {
                let (sum_mean, sum_mean2, sum_var) = self.trees.iter().fold(
                    (0., 0., 0.),
                    |(sm, sm2, sv), tree| {
                        let (mean, var) = tree.leaf_value(&xi);
                        (sm + mean, sm2 + mean * mean, sv + var)
                    },
                );
                *m = sum_mean / n_trees;
                let var_of_means = (sum_mean2 / n_trees - *m * *m).max(0.);
                *v = (sum_var / n_trees + var_of_means).max(self.params.var_floor);
            });
        Ok((means, vars))
    }

    /// Number of trees of the forest
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Total number of leaves
    pub fn n_leaves(&self) -> usize {
        self.trees.iter().map(|t| t.n_leaves()).sum()
    }

    /// Input dimension
    pub fn dim(&self) -> usize {
        self.dim
    }
}

impl<D: Data<Elem = f64>> Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>, GpError>
    for RandomForestValidParams
{
    type Object = RandomForest;

    fn fit(&self, dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>) -> Result<RandomForest> {
        let x = dataset.records();
        let y = dataset.targets();
        let (n, dim) = (x.nrows(), x.ncols());
        if n == 0 {
            return Err(GpError::EmptyData(
                "random forest needs at least one training point".to_string(),
            ));
        }
        if !self.cat_mask.is_empty() && self.cat_mask.len() != dim {
            return Err(GpError::InvalidValueError(format!(
                "Categorical mask length ({}) should match input dimension ({dim})",
                self.cat_mask.len()
            )));
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(GpError::InvalidValueError(
                "Training data should be finite".to_string(),
            ));
        }

        // standard layout to index rows in a flat slice
        let xs: Array2<f64> = x.as_standard_layout().into_owned();
        let flat = xs.view().into_shape(n * dim).map_err(|e| {
            GpError::InvalidValueError(format!("Cannot flatten training inputs: {e}"))
        })?;
        let ys = y.to_vec();

        let mut rng = match self.seed {
            Some(seed) => Xoshiro256Plus::seed_from_u64(seed),
            None => Xoshiro256Plus::from_entropy(),
        };
        let seeds: Vec<u64> = (0..self.n_trees).map(|_| rng.gen()).collect();

        let trees = seeds
            .into_par_iter()
            .map(|seed| {
                let mut rng = Xoshiro256Plus::seed_from_u64(seed);
                let indices: Vec<usize> = if self.bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                let mut builder = TreeBuilder {
                    x: flat,
                    ncols: dim,
                    y: &ys,
                    params: self,
                    rng,
                };
                let mut nodes = vec![];
                if dim == 0 {
                    builder.leaf(&mut nodes, &indices);
                } else {
                    builder.build_node(&mut nodes, &indices, 0);
                }
                RegressionTree { nodes }
            })
            .collect::<Vec<_>>();
        log::debug!(
            "Random forest trained: {} trees, {} leaves",
            trees.len(),
            trees.iter().map(|t| t.n_leaves()).sum::<usize>()
        );

        Ok(RandomForest {
            trees,
            dim,
            params: self.clone(),
        })
    }
}

impl<D: Data<Elem = f64>> PredictInplace<ArrayBase<D, Ix2>, Array1<f64>> for RandomForest {
    fn predict_inplace(&self, x: &ArrayBase<D, Ix2>, y: &mut Array1<f64>) {
        assert_eq!(
            x.nrows(),
            y.len(),
            "The number of data points must match the number of output targets."
        );
        match self.predict(x) {
            Ok(values) => *y = values,
            Err(err) => {
                log::warn!("Random forest prediction failed: {err}");
                y.fill(f64::NAN)
            }
        }
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array1<f64> {
        Array1::zeros(x.len_of(Axis(0)))
    }
}
