use crate::algorithm::GaussianProcess;
use crate::correlation_models::{CorrelationModel, Matern52Corr};
use crate::errors::{GpError, Result};
use crate::mean_models::{ConstantMean, RegressionModel};
use crate::random_forest::RandomForest;

use linfa::prelude::{Dataset, Fit};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum dimension for which [`SurrogateType::Auto`] picks a gaussian process
pub const AUTO_GP_MAX_DIM: usize = 10;

/// A trained surrogate model of a scalar output
pub trait Surrogate: Send + Sync + fmt::Display {
    /// Predict means and variances at n points given as a (n, nx) matrix
    fn predict_valvar(&self, x: &ArrayView2<f64>) -> Result<(Array1<f64>, Array1<f64>)>;

    /// Predict means at n points given as a (n, nx) matrix
    fn predict(&self, x: &ArrayView2<f64>) -> Result<Array1<f64>> {
        self.predict_valvar(x).map(|(m, _)| m)
    }

    /// Draw `n_traj` output realizations at n points, returns a (n, n_traj) matrix.
    ///
    /// Defaults to independent draws from the marginal predictive distributions.
    fn sample(
        &self,
        x: &ArrayView2<f64>,
        n_traj: usize,
        rng: &mut Xoshiro256Plus,
    ) -> Result<Array2<f64>> {
        let (mean, var) = self.predict_valvar(x)?;
        let mut draws: Array2<f64> = Array2::random_using((x.nrows(), n_traj), StandardNormal, rng);
        Zip::from(draws.rows_mut())
            .and(&mean)
            .and(&var)
            .for_each(|mut row, m, v| row.mapv_inplace(|z| m + v.sqrt() * z));
        Ok(draws)
    }
}

impl<Mean: RegressionModel, Corr: CorrelationModel> Surrogate for GaussianProcess<Mean, Corr> {
    fn predict_valvar(&self, x: &ArrayView2<f64>) -> Result<(Array1<f64>, Array1<f64>)> {
        GaussianProcess::predict_valvar(self, x)
    }

    fn sample(
        &self,
        x: &ArrayView2<f64>,
        n_traj: usize,
        rng: &mut Xoshiro256Plus,
    ) -> Result<Array2<f64>> {
        GaussianProcess::sample(self, x, n_traj, rng)
    }
}

impl fmt::Display for RandomForest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "RandomForest(n_trees={}, n_leaves={})",
            self.n_trees(),
            self.n_leaves()
        )
    }
}

impl Surrogate for RandomForest {
    fn predict_valvar(&self, x: &ArrayView2<f64>) -> Result<(Array1<f64>, Array1<f64>)> {
        RandomForest::predict_valvar(self, x)
    }
}

/// Kind of surrogate model
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurrogateType {
    /// Gaussian process with constant mean and Matern 5/2 kernel
    Gp,
    /// Probabilistic random forest
    Prf,
    /// Gaussian process for small continuous spaces, random forest otherwise
    #[default]
    Auto,
}

impl SurrogateType {
    /// Resolves `Auto` given the categorical flags of input components
    pub fn resolve(&self, cat_mask: &[bool]) -> SurrogateType {
        match self {
            SurrogateType::Auto => {
                if cat_mask.iter().any(|c| *c) || cat_mask.len() > AUTO_GP_MAX_DIM {
                    SurrogateType::Prf
                } else {
                    SurrogateType::Gp
                }
            }
            other => *other,
        }
    }
}

/// A builder of [`Surrogate`] models
#[derive(Clone, Debug, Default)]
pub struct SurrogateBuilder {
    surrogate_type: SurrogateType,
    cat_mask: Vec<bool>,
    seed: Option<u64>,
}

impl SurrogateBuilder {
    /// Constructor given the kind of surrogate to train
    pub fn new(surrogate_type: SurrogateType) -> Self {
        SurrogateBuilder {
            surrogate_type,
            ..Default::default()
        }
    }

    /// Set categorical flags of input components, its length is the input dimension
    pub fn cat_mask(mut self, cat_mask: Vec<bool>) -> Self {
        self.cat_mask = cat_mask;
        self
    }

    /// Set the random seed used by random forests
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Kind of surrogate trained for the current categorical flags
    pub fn resolved_type(&self) -> SurrogateType {
        self.surrogate_type.resolve(&self.cat_mask)
    }

    /// Train a surrogate on (n, nx) inputs `x` and (n,) outputs `y`
    pub fn train(&self, x: &ArrayView2<f64>, y: &ArrayView1<f64>) -> Result<Box<dyn Surrogate>> {
        if x.nrows() != y.len() {
            return Err(GpError::InvalidValueError(format!(
                "{} inputs for {} outputs",
                x.nrows(),
                y.len()
            )));
        }
        if !self.cat_mask.is_empty() && self.cat_mask.len() != x.ncols() {
            return Err(GpError::InvalidValueError(format!(
                "Categorical mask length ({}) should match input dimension ({})",
                self.cat_mask.len(),
                x.ncols()
            )));
        }
        let dataset = Dataset::new(x.to_owned(), y.to_owned());
        let model: Box<dyn Surrogate> = match self.resolved_type() {
            SurrogateType::Prf => Box::new(
                RandomForest::params()
                    .cat_mask(self.cat_mask.clone())
                    .seed(self.seed)
                    .fit(&dataset)?,
            ),
            _ => Box::new(
                GaussianProcess::<ConstantMean, Matern52Corr>::params(
                    ConstantMean(),
                    Matern52Corr(),
                )
                .cat_mask(self.cat_mask.clone())
                .nugget(1e-10)
                .fit(&dataset)?,
            ),
        };
        log::debug!("Surrogate trained: {model}");
        Ok(model)
    }
}

/// Stacks predictions of several surrogates at the same points.
/// Returns (n, k) means and variances for k surrogates.
pub fn predict_all(
    models: &[Box<dyn Surrogate>],
    x: &ArrayView2<f64>,
) -> Result<(Array2<f64>, Array2<f64>)> {
    let mut means = Array2::zeros((x.nrows(), models.len()));
    let mut vars = Array2::zeros((x.nrows(), models.len()));
    for (k, model) in models.iter().enumerate() {
        let (m, v) = model.predict_valvar(x)?;
        means.index_axis_mut(Axis(1), k).assign(&m);
        vars.index_axis_mut(Axis(1), k).assign(&v);
    }
    Ok((means, vars))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array};
    use ndarray_rand::rand::SeedableRng;

    #[test]
    fn test_auto_resolution() {
        assert_eq!(SurrogateType::Auto.resolve(&[false; 3]), SurrogateType::Gp);
        assert_eq!(
            SurrogateType::Auto.resolve(&[false, true]),
            SurrogateType::Prf
        );
        assert_eq!(SurrogateType::Auto.resolve(&[false; 11]), SurrogateType::Prf);
        assert_eq!(SurrogateType::Gp.resolve(&[true]), SurrogateType::Gp);
    }

    #[test]
    fn test_train_gp_and_forest() {
        let x = Array::linspace(0., 1., 12).insert_axis(Axis(1));
        let y = x.column(0).mapv(|v: f64| (6. * v).sin());
        for kind in [SurrogateType::Gp, SurrogateType::Prf] {
            let model = SurrogateBuilder::new(kind)
                .cat_mask(vec![false])
                .seed(Some(0))
                .train(&x.view(), &y.view())
                .unwrap();
            let (m, v) = model.predict_valvar(&x.view()).unwrap();
            assert_eq!(m.len(), 12);
            assert!(v.iter().all(|v| *v >= 0.));
        }
    }

    #[test]
    fn test_constant_outputs() {
        let x = array![[0.1], [0.4], [0.9]];
        let y = array![2., 2., 2.];
        let model = SurrogateBuilder::new(SurrogateType::Gp)
            .train(&x.view(), &y.view())
            .unwrap();
        let (m, v) = model.predict_valvar(&array![[0.5]].view()).unwrap();
        assert_abs_diff_eq!(m[0], 2., epsilon = 1e-9);
        assert_abs_diff_eq!(v[0], 0., epsilon = 1e-12);
    }

    #[test]
    fn test_sample_and_predict_all() {
        let x = array![[0.], [0.5], [1.]];
        let y = array![0., 1., 0.];
        let models = vec![
            SurrogateBuilder::new(SurrogateType::Gp)
                .train(&x.view(), &y.view())
                .unwrap(),
            SurrogateBuilder::new(SurrogateType::Prf)
                .seed(Some(1))
                .train(&x.view(), &y.view())
                .unwrap(),
        ];
        let xs = array![[0.25], [0.75]];
        let (means, vars) = predict_all(&models, &xs.view()).unwrap();
        assert_eq!(means.dim(), (2, 2));
        assert_eq!(vars.dim(), (2, 2));
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        for model in &models {
            let s = model.sample(&xs.view(), 4, &mut rng).unwrap();
            assert_eq!(s.dim(), (2, 4));
            assert!(s.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_mismatched_inputs() {
        let x = array![[0.], [0.5]];
        let y = array![0.];
        assert!(SurrogateBuilder::new(SurrogateType::Gp)
            .train(&x.view(), &y.view())
            .is_err());
    }
}
