use crate::correlation_models::*;
use crate::errors::{GpError, Result};
use crate::mean_models::*;
use crate::optimization::{optimize_params, prepare_multistart, CobylaParams};
use crate::parameters::{GpParams, GpValidParams, ThetaTuning};
use crate::utils::{pairwise_differences, DiffMatrix, NormalizedData};

use linfa::prelude::{DatasetBase, Fit, PredictInplace};
use linfa_linalg::{cholesky::*, eigh::*, qr::*, svd::*, triangular::*};
use ndarray::{Array, Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2};
use ndarray_rand::rand::Rng;
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use ndarray_stats::QuantileExt;

use log::{debug, warn};
use rayon::prelude::*;
use std::fmt;
use std::time::Instant;

/// Default number of multistart for hyperparameters optimization
pub const GP_OPTIM_N_START: usize = 10;
/// Minimum of function evaluations for COBYLA optimizer
pub const GP_COBYLA_MIN_EVAL: usize = 25;
/// Maximum of function evaluations for COBYLA optimizer
pub const GP_COBYLA_MAX_EVAL: usize = 1000;

/// Internal parameters computed Gp during training
/// used later on in prediction computations
#[derive(Clone, Default, Debug)]
pub(crate) struct GpInnerParams {
    /// Gaussian process variance
    sigma2: f64,
    /// Generalized least-squares regression weights for Universal Kriging or given beta0 for Ordinary Kriging
    beta: Array2<f64>,
    /// Gaussian Process weights
    gamma: Array2<f64>,
    /// Cholesky decomposition of the correlation matrix \[R\]
    r_chol: Array2<f64>,
    /// Solution of the linear equation system : \[R\] x Ft = y
    ft: Array2<f64>,
    /// R upper triangle matrix of QR decomposition of the matrix Ft
    ft_qr_r: Array2<f64>,
}

/// A GP regression is an interpolation method where the
/// interpolated values are modeled by a Gaussian process with a mean and
/// governed by a prior covariance kernel, which depends on some
/// parameters to be determined.
///
/// The interpolated output is modeled as stochastic process as follows:
///
/// `Y(x) = mu(x) + Z(x)`
///
/// where:
/// * `mu(x)` is the trend i.e. the mean of the gaussian process
/// * `Z(x)` the realization of stochastic gaussian process ~ `Normal(0, sigma^2)`
///
/// which in turn is written as:
///
/// `Y(x) = betas.regr(x) + sigma^2*corr(x, x')`
///
/// where:
/// * `betas` is a vector of linear regression parameters to be determined
/// * `regr(x)` a vector of polynomial basis functions
/// * `sigma^2` is the process variance
/// * `corr(x, x')` is a correlation function which depends on `distance(x, x')`
///   and a set of unknown parameters `thetas` to be determined (one per input component).
///
/// Inputs may hold categorical components given as choice indices
/// (see [`GpParams::cat_mask`]).
///
/// # Example
///
/// ```no_run
/// use openbox_surrogate::{correlation_models::*, mean_models::*, GaussianProcess};
/// use linfa::prelude::*;
/// use ndarray::{arr2, Array, Array1, Array2, Axis};
///
/// // one-dimensional test function to approximate
/// fn xsinx(x: &Array2<f64>) -> Array1<f64> {
///     ((x - 3.5) * ((x - 3.5) / std::f64::consts::PI).mapv(|v| v.sin())).remove_axis(Axis(1))
/// }
///
/// // training data
/// let xt = arr2(&[[0.0], [5.0], [10.0], [15.0], [18.0], [20.0], [25.0]]);
/// let yt = xsinx(&xt);
///
/// // GP with constant mean model and squared exponential correlation model
/// // i.e. Oridinary Kriging model
/// let kriging = GaussianProcess::<ConstantMean, SquaredExponentialCorr>::params(
///                 ConstantMean::default(),
///                 SquaredExponentialCorr::default())
///                 .fit(&Dataset::new(xt, yt))
///                 .expect("Kriging trained");
///
/// // Use trained model for making predictions
/// let xtest = Array::linspace(0., 25., 26).insert_axis(Axis(1));
/// let (ypred, yvariances) = kriging.predict_valvar(&xtest).expect("Kriging prediction");
///```
#[derive(Clone, Debug)]
pub struct GaussianProcess<Mean: RegressionModel, Corr: CorrelationModel> {
    /// Parameter of the autocorrelation model equal to the inverse of length scale
    theta: Array1<f64>,
    /// Reduced likelihood value (result from internal optimization)
    /// Maybe used to compare different trained models
    likelihood: f64,
    /// Gaussian process internal fitted params
    inner_params: GpInnerParams,
    /// Training inputs
    xt_norm: NormalizedData,
    /// Training outputs
    yt_norm: NormalizedData,
    /// Training dataset (input, output)
    pub(crate) training_data: (Array2<f64>, Array1<f64>),
    /// Parameters used to fit this model
    pub(crate) params: GpValidParams<Mean, Corr>,
}

enum GpSamplingMethod {
    Cholesky,
    EigenValues,
}

/// Kriging as GP special case when using constant mean and squared exponential correlation
pub type Kriging = GpParams<ConstantMean, SquaredExponentialCorr>;

impl Kriging {
    /// Kriging parameters constructor
    pub fn params() -> GpParams<ConstantMean, SquaredExponentialCorr> {
        GpParams::new(ConstantMean(), SquaredExponentialCorr())
    }
}

impl<Mean: RegressionModel, Corr: CorrelationModel> fmt::Display for GaussianProcess<Mean, Corr> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "GP(mean={}, corr={}, theta={}, variance={}, likelihood={})",
            self.params.mean,
            self.params.corr,
            self.theta,
            self.inner_params.sigma2,
            self.likelihood,
        )
    }
}

impl<Mean: RegressionModel, Corr: CorrelationModel> GaussianProcess<Mean, Corr> {
    /// Gp parameters contructor
    pub fn params<NewMean: RegressionModel, NewCorr: CorrelationModel>(
        mean: NewMean,
        corr: NewCorr,
    ) -> GpParams<NewMean, NewCorr> {
        GpParams::new(mean, corr)
    }

    /// Predict output values at n given `x` points of nx components specified as a (n, nx) matrix.
    /// Returns n scalar output values as a vector (n,).
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array1<f64>> {
        self.check_dim(x)?;
        let xnorm = self.xt_norm.apply(x);
        let corr = self._compute_correlation(&xnorm);
        Ok(self._predict_from_corr(&xnorm, &corr))
    }

    /// Predict variance values at n given `x` points of nx components specified as a (n, nx) matrix.
    /// Returns n variance values as (n,) column vector.
    pub fn predict_var(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array1<f64>> {
        self.check_dim(x)?;
        let xnorm = self.xt_norm.apply(x);
        let corr = self._compute_correlation(&xnorm);
        self._predict_var_from_corr(&xnorm, &corr)
    }

    /// Predict both output values and variance at n given `x` points of nx components
    pub fn predict_valvar(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<(Array1<f64>, Array1<f64>)> {
        self.check_dim(x)?;
        let xnorm = self.xt_norm.apply(x);
        let corr = self._compute_correlation(&xnorm);
        let yp = self._predict_from_corr(&xnorm, &corr);
        let vmse = self._predict_var_from_corr(&xnorm, &corr)?;
        Ok((yp, vmse))
    }

    fn check_dim(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<()> {
        if x.ncols() != self.xt_norm.ncols() {
            return Err(GpError::InvalidValueError(format!(
                "Expected inputs of dimension {}, got {}",
                self.xt_norm.ncols(),
                x.ncols()
            )));
        }
        Ok(())
    }

    fn _predict_from_corr(&self, xnorm: &Array2<f64>, corr: &Array2<f64>) -> Array1<f64> {
        // Compute the mean term at x
        let f = self.params.mean.value(xnorm);
        // Scaled predictor
        let y_ = &f.dot(&self.inner_params.beta) + &corr.dot(&self.inner_params.gamma);
        // Predictor
        (&y_ * &self.yt_norm.std + &self.yt_norm.mean).remove_axis(Axis(1))
    }

    fn _predict_var_from_corr(&self, xnorm: &Array2<f64>, corr: &Array2<f64>) -> Result<Array1<f64>> {
        let (rt, u) = self._compute_rt_u(xnorm, corr)?;

        let mut mse = Array1::<f64>::ones(rt.ncols()) - rt.mapv(|v| v * v).sum_axis(Axis(0))
            + u.mapv(|v| v * v).sum_axis(Axis(0));
        mse.mapv_inplace(|v| self.inner_params.sigma2 * v);

        // Mean Squared Error might be slightly negative depending on
        // machine precision: set to zero in that case
        Ok(mse.mapv(|v| if v < 0. { 0. } else { v }))
    }

    /// Compute covariance matrix given x points specified as a (n, nx) matrix
    fn _compute_covariance(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array2<f64>> {
        let xnorm = self.xt_norm.apply(x);
        let corr = self._compute_correlation(&xnorm);
        let (rt, u) = self._compute_rt_u(&xnorm, &corr)?;

        let cross_dx = pairwise_differences(&xnorm, &xnorm, &self.params.cat_mask);
        let k = self.params.corr.value(&cross_dx, &self.theta);
        let k = k
            .into_shape((xnorm.nrows(), xnorm.nrows()))
            .map_err(|e| GpError::InvalidValueError(e.to_string()))?;

        let mut cov_matrix = k - rt.t().dot(&rt) + u.t().dot(&u);
        cov_matrix.mapv_inplace(|v| self.inner_params.sigma2 * v);
        Ok(cov_matrix)
    }

    /// Compute `rt` and `u` matrices used to get variances and covariance matrix
    fn _compute_rt_u(
        &self,
        xnorm: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        corr: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<(Array2<f64>, Array2<f64>)> {
        let inners = &self.inner_params;

        let corr_t = corr.t().to_owned();
        let rt = inners.r_chol.solve_triangular(&corr_t, UPLO::Lower)?;

        let rhs = inners.ft.t().dot(&rt) - self.params.mean.value(xnorm).t();
        let u = inners.ft_qr_r.t().solve_triangular(&rhs, UPLO::Lower)?;
        Ok((rt, u))
    }

    /// Compute correlation matrix given x points specified as a (n, nx) matrix
    fn _compute_correlation(&self, xnorm: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Array2<f64> {
        // Get pairwise componentwise L1-distances to the input training set
        let dx = pairwise_differences(xnorm, &self.xt_norm.data, &self.params.cat_mask);
        // Compute the correlation function
        let r = self.params.corr.value(&dx, &self.theta);
        let n_obs = xnorm.nrows();
        let nt = self.xt_norm.data.nrows();
        r.into_shape((n_obs, nt))
            .unwrap_or_else(|_| Array2::zeros((n_obs, nt)))
    }

    /// Sample the gaussian process at the given `x` points for `n_traj` trajectories.
    /// Returns a (n, n_traj) matrix.
    ///
    /// The cholesky decomposition of the conditioned covariance matrix is used,
    /// falling back to its eigenvalues decomposition when the matrix is ill-conditioned.
    pub fn sample<R: Rng>(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        n_traj: usize,
        rng: &mut R,
    ) -> Result<Array2<f64>> {
        self.check_dim(x)?;
        let mean = self.predict(x)?;
        let cov = self._compute_covariance(x)?;
        let c = match sampling_factor(&cov, GpSamplingMethod::Cholesky) {
            Ok(c) => c,
            Err(_) => sampling_factor(&cov, GpSamplingMethod::EigenValues)?,
        };
        let ary: Array2<f64> = Array::random_using((x.nrows(), n_traj), StandardNormal, rng);
        Ok(mean.insert_axis(Axis(1)) + c.dot(&ary))
    }

    /// Retrieve optimized hyperparameters theta
    pub fn theta(&self) -> &Array1<f64> {
        &self.theta
    }

    /// Estimated variance
    pub fn variance(&self) -> f64 {
        self.inner_params.sigma2
    }

    /// Retrieve reduced likelihood value
    pub fn likelihood(&self) -> f64 {
        self.likelihood
    }

    /// Retrieve input and output dimensions
    pub fn dims(&self) -> (usize, usize) {
        (self.xt_norm.ncols(), self.yt_norm.ncols())
    }

    /// Training data used to fit the model
    pub fn training_data(&self) -> &(Array2<f64>, Array1<f64>) {
        &self.training_data
    }

    /// Parameters used to fit the model
    pub fn params_used(&self) -> &GpValidParams<Mean, Corr> {
        &self.params
    }
}

impl<D, Mean, Corr> PredictInplace<ArrayBase<D, Ix2>, Array1<f64>> for GaussianProcess<Mean, Corr>
where
    D: Data<Elem = f64>,
    Mean: RegressionModel,
    Corr: CorrelationModel,
{
    fn predict_inplace(&self, x: &ArrayBase<D, Ix2>, y: &mut Array1<f64>) {
        assert_eq!(
            x.nrows(),
            y.len(),
            "The number of data points must match the number of output targets."
        );

        match self.predict(x) {
            Ok(values) => *y = values,
            Err(err) => {
                warn!("GP prediction failed: {err}");
                y.fill(f64::NAN)
            }
        }
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array1<f64> {
        Array1::zeros((x.nrows(),))
    }
}

impl<Mean: RegressionModel, Corr: CorrelationModel, D: Data<Elem = f64>>
    Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>, GpError> for GpValidParams<Mean, Corr>
{
    type Object = GaussianProcess<Mean, Corr>;

    /// Fit GP parameters using maximum likelihood
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>,
    ) -> Result<Self::Object> {
        let x = dataset.records();
        let y = dataset.targets().to_owned().insert_axis(Axis(1));

        let dim = x.ncols();
        if dim == 0 {
            return Err(GpError::InvalidValueError(
                "GP inputs should have at least one component".to_string(),
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
                "GP training data should be finite".to_string(),
            ));
        }

        let init = self.theta_tuning().init();
        let theta0 = if init.len() == 1 {
            Array1::from_elem(dim, init[0])
        } else if init.len() == dim {
            init.to_owned()
        } else {
            return Err(GpError::InvalidValueError(format!(
                "Initial guess for theta should be either 1-dim or dim of xtrain ({dim}), got {}",
                init.len()
            )));
        };

        let xtrain = NormalizedData::new(x, &self.cat_mask);
        let ytrain = NormalizedData::new(&y, &[]);

        let fx = self.mean().value(&xtrain.data);
        if fx.nrows() < fx.ncols() {
            return Err(GpError::EmptyData(format!(
                "{} training points for a mean model with {} terms",
                fx.nrows(),
                fx.ncols()
            )));
        }

        let x_distances = DiffMatrix::new(&xtrain.data, &self.cat_mask);
        if x_distances.n_obs > 1 {
            let sums = x_distances.d.sum_axis(Axis(1));
            if sums.min().map(|v| *v == 0.).unwrap_or(false) {
                warn!("Multiple x input features have the same value (at least same row twice).");
            }
        }
        let y_constant = y.iter().all(|v| *v == y[[0, 0]]);

        let opt_params = match self.theta_tuning() {
            ThetaTuning::Fixed(_) => theta0.to_owned(),
            // Likelihood is flat: nothing to optimize
            ThetaTuning::Full { .. } if y_constant => theta0.to_owned(),
            ThetaTuning::Full { bounds, .. } => {
                let base: f64 = 10.;
                let objfn = |x: &[f64], _gradient: Option<&mut [f64]>, _params: &mut ()| -> f64 {
                    let theta = x.iter().map(|v| base.powf(*v)).collect::<Array1<_>>();
                    // optimizer may return nan values
                    if theta.iter().any(|v| v.is_nan()) {
                        return f64::INFINITY;
                    }
                    let rxx = self.corr().value(&x_distances.d, &theta);
                    match reduced_likelihood(&fx, rxx, &x_distances, &ytrain, self.nugget()) {
                        Ok(r) => -r.0,
                        Err(_) => f64::INFINITY,
                    }
                };

                let bounds = if bounds.len() == 1 {
                    vec![bounds[0]; dim]
                } else if bounds.len() == dim {
                    bounds.to_vec()
                } else {
                    return Err(GpError::InvalidValueError(format!(
                        "Bounds for theta should be either 1-dim or dim of xtrain ({dim}), got {}",
                        bounds.len()
                    )));
                };
                let theta0 = clip_theta(&theta0, &bounds);

                let (theta_inits, bounds) = prepare_multistart(self.n_start(), &theta0, &bounds);
                debug!("Optimize with multistart theta = {theta_inits:?} and bounds = {bounds:?}");
                let now = Instant::now();
                let opt_params = (0..theta_inits.nrows())
                    .into_par_iter()
                    .map(|i| {
                        optimize_params(
                            objfn,
                            &theta_inits.row(i).to_owned(),
                            &bounds,
                            CobylaParams {
                                maxeval: (10 * theta_inits.ncols())
                                    .clamp(GP_COBYLA_MIN_EVAL, self.max_eval()),
                                ..CobylaParams::default()
                            },
                        )
                    })
                    .reduce(
                        || (f64::INFINITY, theta_inits.row(0).to_owned()),
                        |a, b| if b.0 < a.0 { b } else { a },
                    );
                debug!("elapsed optim = {:?}", now.elapsed().as_millis());
                opt_params.1.mapv(|v| base.powf(v))
            }
        };

        let rxx = self.corr().value(&x_distances.d, &opt_params);
        let (lkh, inner_params) =
            reduced_likelihood(&fx, rxx, &x_distances, &ytrain, self.nugget())?;
        Ok(GaussianProcess {
            theta: opt_params,
            likelihood: lkh,
            inner_params,
            xt_norm: xtrain,
            yt_norm: ytrain,
            training_data: (x.to_owned(), y.remove_axis(Axis(1))),
            params: self.clone(),
        })
    }
}

fn clip_theta(theta: &Array1<f64>, bounds: &[(f64, f64)]) -> Array1<f64> {
    theta
        .iter()
        .zip(bounds)
        .map(|(v, (lo, up))| v.clamp(*lo, *up))
        .collect()
}

/// Compute reduced likelihood function
/// fx: mean factors term at x samples,
/// rxx: correlation factors at x samples,
/// x_distances: pairwise distances between x samples
/// ytrain: normalized output training values
/// nugget: factor to improve numerical stability
fn reduced_likelihood(
    fx: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    rxx: Array1<f64>,
    x_distances: &DiffMatrix,
    ytrain: &NormalizedData,
    nugget: f64,
) -> Result<(f64, GpInnerParams)> {
    // Set up R
    let mut r_mx: Array2<f64> = Array2::<f64>::eye(x_distances.n_obs).mapv(|v| v + v * nugget);
    for (i, ij) in x_distances.d_indices.outer_iter().enumerate() {
        r_mx[[ij[0], ij[1]]] = rxx[i];
        r_mx[[ij[1], ij[0]]] = rxx[i];
    }
    // R cholesky decomposition
    let r_chol = r_mx.cholesky()?;
    // Solve generalized least squared problem
    let ft = r_chol.solve_triangular(fx, UPLO::Lower)?;
    let (ft_qr_q, ft_qr_r) = ft.qr()?.into_decomp();

    // Check whether we have an ill-conditionned problem
    let (_, sv_qr_r, _) = ft_qr_r.svd(false, false)?;
    let cond_ft = sv_qr_r[sv_qr_r.len() - 1] / sv_qr_r[0];
    if !(cond_ft >= 1e-10) {
        let (_, sv_f, _) = fx.svd(false, false)?;
        let cond_fx = sv_f[0] / sv_f[sv_f.len() - 1];
        if cond_fx > 1e15 {
            return Err(GpError::LikelihoodComputationError(
                "F is too ill conditioned. Poor combination \
                of regression model and observations."
                    .to_string(),
            ));
        } else {
            // ft is too ill conditioned, get out (try different theta)
            return Err(GpError::LikelihoodComputationError(
                "ft is too ill conditioned, try another theta again".to_string(),
            ));
        }
    }
    let yt = r_chol.solve_triangular(&ytrain.data, UPLO::Lower)?;

    let beta = ft_qr_r.solve_triangular_into(ft_qr_q.t().dot(&yt), UPLO::Upper)?;
    let rho = yt - ft.dot(&beta);
    let rho_sqr = rho.mapv(|v| v * v).sum_axis(Axis(0));

    let gamma = r_chol.t().solve_triangular_into(rho, UPLO::Upper)?;
    // The determinant of R is equal to the squared product of
    // the diagonal elements of its Cholesky decomposition r_chol
    let n_obs = x_distances.n_obs as f64;

    let logdet = r_chol.diag().mapv(|v| v.log10()).sum() * 2. / n_obs;

    // Reduced likelihood
    let sigma2 = rho_sqr / n_obs;
    let reduced_likelihood = -n_obs * (sigma2.sum().log10() + logdet);

    Ok((
        reduced_likelihood,
        GpInnerParams {
            sigma2: sigma2[0] * ytrain.std[0] * ytrain.std[0],
            beta,
            gamma,
            r_chol,
            ft,
            ft_qr_r,
        },
    ))
}

/// Returns a matrix `C` such that `C.C^T` is the given covariance matrix
fn sampling_factor(cov: &Array2<f64>, method: GpSamplingMethod) -> Result<Array2<f64>> {
    match method {
        GpSamplingMethod::Cholesky => {
            let jitter = 1e-10 * cov.diag().iter().cloned().fold(1e-10, f64::max);
            let cov = cov + &(Array2::<f64>::eye(cov.nrows()) * jitter);
            Ok(cov.cholesky()?)
        }
        GpSamplingMethod::EigenValues => {
            let (v, w) = cov.to_owned().eigh_into()?;
            // eigenvalues lower bounded at 1e-9
            let v = v.mapv(|x| if x < 1e-9 { 0. } else { x.sqrt() });
            Ok(w.dot(&Array2::from_diag(&v)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_abs_diff_ne};
    use argmin_testfunctions::rosenbrock_ab;
    use linfa::prelude::{Dataset, Predict};
    use ndarray::{arr1, arr2, array, Zip};
    use ndarray_rand::rand::SeedableRng;
    use openbox_space::{Lhs, SamplingMethod};
    use paste::paste;
    use rand_xoshiro::Xoshiro256Plus;

    #[test]
    fn test_constant_function() {
        let dim = 3;
        let lim = array![[0., 1.]];
        let xlimits = lim.broadcast((dim, 2)).unwrap();
        let rng = Xoshiro256Plus::seed_from_u64(42);
        let nt = 5;
        let xt = Lhs::new(&xlimits).with_rng(rng).sample(nt);
        let yt = Array::from_vec(vec![3.1; nt]);
        let gp = Kriging::params()
            .theta_init(array![0.1])
            .fit(&Dataset::new(xt, yt))
            .expect("GP fit error");
        let rng = Xoshiro256Plus::seed_from_u64(43);
        let xtest = Lhs::new(&xlimits).with_rng(rng).sample(nt);
        let (ytest, vtest) = gp.predict_valvar(&xtest).expect("prediction error");
        assert_abs_diff_eq!(Array::from_elem((nt,), 3.1), ytest, epsilon = 1e-6);
        assert_abs_diff_eq!(Array::<f64, _>::zeros(nt), vtest, epsilon = 1e-12);
    }

    macro_rules! test_gp {
        ($regr:ident, $corr:ident) => {
            paste! {

                #[test]
                fn [<test_gp_ $regr:snake _ $corr:snake >]() {
                    let xt = array![[0.0], [1.0], [2.0], [3.0], [4.0]];
                    let yt = array![0.0, 1.0, 1.5, 0.9, 1.0];
                    let gp = GaussianProcess::<[<$regr Mean>], [<$corr Corr>] >::params(
                        [<$regr Mean>]::default(),
                        [<$corr Corr>]::default(),
                    )
                    .theta_init(array![0.1])
                    .fit(&Dataset::new(xt, yt))
                    .expect("GP fit error");
                    let yvals = gp
                        .predict(&arr2(&[[1.0], [3.5]]))
                        .expect("prediction error");
                    let expected_y = arr1(&[1.0, 0.9]);
                    assert_abs_diff_eq!(expected_y, yvals, epsilon = 0.5);

                    let yvars = gp
                        .predict_var(&arr2(&[[1.0], [3.5]]))
                        .expect("prediction error");
                    let expected_vars = arr1(&[0., 0.1]);
                    assert_abs_diff_eq!(expected_vars, yvars, epsilon = 0.5);

                    let (vals, vars) = gp.predict_valvar(&arr2(&[[1.0], [3.5]])).unwrap();
                    assert_abs_diff_eq!(vals, yvals, epsilon = 1e-12);
                    assert_abs_diff_eq!(vars, yvars, epsilon = 1e-12);
                }
            }
        };
    }

    test_gp!(Constant, SquaredExponential);
    test_gp!(Constant, AbsoluteExponential);
    test_gp!(Constant, Matern32);
    test_gp!(Constant, Matern52);

    test_gp!(Linear, SquaredExponential);
    test_gp!(Linear, AbsoluteExponential);
    test_gp!(Linear, Matern32);
    test_gp!(Linear, Matern52);

    test_gp!(Quadratic, SquaredExponential);
    test_gp!(Quadratic, AbsoluteExponential);
    test_gp!(Quadratic, Matern32);
    test_gp!(Quadratic, Matern52);

    #[test]
    fn test_interpolation() {
        let xt = array![[0.0], [1.0], [2.0], [3.0], [4.0]];
        let yt = array![0.0, 1.0, 1.5, 0.9, 1.0];
        let gp = Kriging::params()
            .fit(&Dataset::new(xt.clone(), yt.clone()))
            .expect("GP fit error");
        let (y, v) = gp.predict_valvar(&xt).unwrap();
        assert_abs_diff_eq!(y, yt, epsilon = 1e-4);
        assert!(v.iter().all(|v| *v < 1e-4));
        // linfa predict interface
        let y2 = gp.predict(&xt).unwrap();
        let y3: Array1<f64> = Predict::predict(&gp, &xt);
        assert_abs_diff_eq!(y2, y3, epsilon = 1e-12);
    }

    #[test]
    fn test_rosenbrock_2d() {
        let xlimits = array![[-2., 2.], [-1., 3.]];
        let xt = Lhs::new(&xlimits)
            .with_rng(Xoshiro256Plus::seed_from_u64(42))
            .sample(20);
        let mut yt = Array1::zeros(xt.nrows());
        Zip::from(&mut yt)
            .and(xt.rows())
            .for_each(|y, x| *y = rosenbrock_ab(&x.to_vec(), 1., 100.));
        let gp = GaussianProcess::<QuadraticMean, SquaredExponentialCorr>::params(
            QuadraticMean(),
            SquaredExponentialCorr(),
        )
        .fit(&Dataset::new(xt.clone(), yt.clone()))
        .expect("GP fit error");
        assert_eq!(gp.dims(), (2, 1));
        let ypred = gp.predict(&xt).unwrap();
        let scale = yt.iter().fold(1., |acc: f64, v| acc.max(v.abs()));
        assert_abs_diff_eq!(ypred / scale, yt / scale, epsilon = 1e-3);
    }

    #[test]
    fn test_fixed_theta() {
        let xt = array![[0.0], [1.0], [2.0], [3.0], [4.0]];
        let yt = array![0.0, 1.0, 1.5, 0.9, 1.0];
        let gp = Kriging::params()
            .fit(&Dataset::new(xt.clone(), yt.clone()))
            .expect("GP fit error");
        let default = ThetaTuning::default();
        assert_abs_diff_ne!(gp.theta(), default.init());
        let expected = gp.theta().clone();

        let gp = Kriging::params()
            .theta_tuning(ThetaTuning::Fixed(expected.clone()))
            .fit(&Dataset::new(xt, yt))
            .expect("GP fit error");
        assert_abs_diff_eq!(*gp.theta(), expected);
    }

    #[test]
    fn test_categorical_input() {
        // y depends on the category: 0 for "a", 10 for "b"
        let xt = array![
            [0.1, 0.],
            [0.5, 0.],
            [0.9, 0.],
            [0.2, 1.],
            [0.6, 1.],
            [0.8, 1.]
        ];
        let yt = array![0.1, 0.5, 0.9, 10.2, 10.6, 10.8];
        let gp = Kriging::params()
            .cat_mask(vec![false, true])
            .fit(&Dataset::new(xt, yt))
            .expect("GP fit error");
        let y = gp.predict(&array![[0.5, 1.]]).unwrap();
        assert!(y[0] > 5., "got {}", y[0]);
        let y = gp.predict(&array![[0.5, 0.]]).unwrap();
        assert_abs_diff_eq!(y[0], 0.5, epsilon = 1e-3);
    }

    #[test]
    fn test_bad_inputs() {
        let xt = array![[0.0], [1.0]];
        let yt = array![0.0, f64::NAN];
        assert!(Kriging::params().fit(&Dataset::new(xt, yt)).is_err());

        let xt = array![[0.0], [1.0], [2.0]];
        let yt = array![0.0, 1.0, 2.0];
        let gp = Kriging::params().fit(&Dataset::new(xt, yt)).unwrap();
        assert!(gp.predict(&array![[0., 1.]]).is_err());

        let xt = array![[0.0, 1.0]];
        let yt = array![0.0];
        let res = GaussianProcess::<QuadraticMean, SquaredExponentialCorr>::params(
            QuadraticMean(),
            SquaredExponentialCorr(),
        )
        .fit(&Dataset::new(xt, yt));
        assert!(matches!(res, Err(GpError::EmptyData(_))));
    }

    fn x2sinx(x: &Array2<f64>) -> Array1<f64> {
        ((x * x) * (x).mapv(|v| v.sin())).remove_axis(Axis(1))
    }

    #[test]
    fn test_sampling() {
        let xdoe = array![[-8.5], [-4.0], [-3.0], [-1.0], [4.0], [7.5]];
        let ydoe = x2sinx(&xdoe);
        let krg = Kriging::params()
            .fit(&Dataset::new(xdoe.clone(), ydoe.clone()))
            .expect("Kriging training");
        let n_plot = 35;
        let n_traj = 10;
        let x = Array::linspace(-10., 10., n_plot)
            .into_shape((n_plot, 1))
            .unwrap();
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let trajs = krg.sample(&x, n_traj, &mut rng).unwrap();
        assert_eq!(&[n_plot, n_traj], trajs.shape());
        assert!(!trajs.iter().any(|v| v.is_nan()));

        // trajectories interpolate training data
        let trajs = krg.sample(&xdoe, 3, &mut rng).unwrap();
        for traj in trajs.columns() {
            assert_abs_diff_eq!(traj, ydoe.view(), epsilon = 0.5);
        }
    }
}
