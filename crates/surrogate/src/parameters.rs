use crate::correlation_models::CorrelationModel;
use crate::errors::{GpError, Result};
use crate::mean_models::RegressionModel;
use crate::{GP_COBYLA_MAX_EVAL, GP_COBYLA_MIN_EVAL, GP_OPTIM_N_START};
use linfa::ParamGuard;

use ndarray::{array, Array1};
use serde::{Deserialize, Serialize};

/// An enum to represent a n-dim hyper parameter tuning
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ThetaTuning {
    /// Constant parameter (ie given not estimated)
    Fixed(Array1<f64>),
    /// Parameter is optimized between given bounds (lower, upper) starting from the inital guess
    Full {
        /// Initial guess for the parameter
        init: Array1<f64>,
        /// Bounds for the parameter array(lower, upper)
        bounds: Array1<(f64, f64)>,
    },
}

impl Default for ThetaTuning {
    fn default() -> Self {
        ThetaTuning::Full {
            init: array![ThetaTuning::DEFAULT_INIT],
            bounds: array![ThetaTuning::DEFAULT_BOUNDS],
        }
    }
}

impl ThetaTuning {
    /// Default initial theta value
    pub const DEFAULT_INIT: f64 = 1e-1;
    /// Default bounds for theta values
    pub const DEFAULT_BOUNDS: (f64, f64) = (1e-2, 1e1);

    /// Get initial theta value
    pub fn init(&self) -> &Array1<f64> {
        match self {
            ThetaTuning::Full { init, .. } => init,
            ThetaTuning::Fixed(init) => init,
        }
    }

    /// Get bounds for theta value
    pub fn bounds(&self) -> Option<&Array1<(f64, f64)>> {
        match self {
            ThetaTuning::Full { bounds, .. } => Some(bounds),
            ThetaTuning::Fixed(_) => None,
        }
    }
}

/// A set of validated GP parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GpValidParams<Mean: RegressionModel, Corr: CorrelationModel> {
    /// Parameter tuning hint of the autocorrelation model
    pub(crate) theta_tuning: ThetaTuning,
    /// Regression model representing the mean(x)
    pub(crate) mean: Mean,
    /// Correlation model representing the spatial correlation between errors at e(x) and e(x')
    pub(crate) corr: Corr,
    /// Categorical flags of input components, empty when all are continuous
    pub(crate) cat_mask: Vec<bool>,
    /// Number of internal likelihood optimization restart
    pub(crate) n_start: usize,
    /// Max number of internal likelihood evaluation during optimization
    pub(crate) max_eval: usize,
    /// Parameter to improve numerical stability
    pub(crate) nugget: f64,
}

impl<Mean: RegressionModel, Corr: CorrelationModel> Default for GpValidParams<Mean, Corr> {
    fn default() -> GpValidParams<Mean, Corr> {
        GpValidParams {
            theta_tuning: ThetaTuning::default(),
            mean: Mean::default(),
            corr: Corr::default(),
            cat_mask: vec![],
            n_start: GP_OPTIM_N_START,
            max_eval: GP_COBYLA_MAX_EVAL,
            nugget: 100.0 * f64::EPSILON,
        }
    }
}

impl<Mean: RegressionModel, Corr: CorrelationModel> GpValidParams<Mean, Corr> {
    /// Get mean model
    pub fn mean(&self) -> &Mean {
        &self.mean
    }

    /// Get correlation corr k(x, x')
    pub fn corr(&self) -> &Corr {
        &self.corr
    }

    /// Get starting theta value for optimization
    pub fn theta_tuning(&self) -> &ThetaTuning {
        &self.theta_tuning
    }

    /// Get categorical flags of input components
    pub fn cat_mask(&self) -> &[bool] {
        &self.cat_mask
    }

    /// Get the number of internal optimization restart
    pub fn n_start(&self) -> usize {
        self.n_start
    }

    /// Get the max number of internal likelihood evaluations during one optimization
    pub fn max_eval(&self) -> usize {
        self.max_eval
    }

    /// Get nugget
    pub fn nugget(&self) -> f64 {
        self.nugget
    }
}

#[derive(Clone, Debug)]
/// The set of hyperparameters that can be specified for the execution of
/// the [GP algorithm](struct.GaussianProcess.html).
pub struct GpParams<Mean: RegressionModel, Corr: CorrelationModel>(GpValidParams<Mean, Corr>);

impl<Mean: RegressionModel, Corr: CorrelationModel> GpParams<Mean, Corr> {
    /// A constructor for GP parameters given mean and correlation models
    pub fn new(mean: Mean, corr: Corr) -> GpParams<Mean, Corr> {
        Self(GpValidParams {
            mean,
            corr,
            ..Default::default()
        })
    }

    /// Set mean model.
    pub fn mean(mut self, mean: Mean) -> Self {
        self.0.mean = mean;
        self
    }

    /// Set correlation model.
    pub fn corr(mut self, corr: Corr) -> Self {
        self.0.corr = corr;
        self
    }

    /// Set value for theta hyper parameter.
    ///
    /// When theta is optimized, the internal optimization is started from `theta_init`.
    /// When theta is fixed, this set theta constant value.
    pub fn theta_init(mut self, theta_init: Array1<f64>) -> Self {
        self.0.theta_tuning = match self.0.theta_tuning {
            ThetaTuning::Full { bounds, .. } => ThetaTuning::Full {
                init: theta_init,
                bounds,
            },
            ThetaTuning::Fixed(_) => ThetaTuning::Fixed(theta_init),
        };
        self
    }

    /// Set theta hyper parameter search space.
    ///
    /// This function is no-op when theta tuning is fixed
    pub fn theta_bounds(mut self, theta_bounds: Array1<(f64, f64)>) -> Self {
        self.0.theta_tuning = match self.0.theta_tuning {
            ThetaTuning::Full { init, .. } => ThetaTuning::Full {
                init,
                bounds: theta_bounds,
            },
            ThetaTuning::Fixed(f) => ThetaTuning::Fixed(f),
        };
        self
    }

    /// Set theta hyper parameter tuning
    pub fn theta_tuning(mut self, theta_tuning: ThetaTuning) -> Self {
        self.0.theta_tuning = theta_tuning;
        self
    }

    /// Set categorical flags of input components.
    ///
    /// Categorical components hold choice indices: they are not normalized and
    /// their distance is 0 for identical choices, 1 otherwise.
    pub fn cat_mask(mut self, cat_mask: Vec<bool>) -> Self {
        self.0.cat_mask = cat_mask;
        self
    }

    /// Set the number of internal GP hyperparameter theta optimization restarts
    pub fn n_start(mut self, n_start: usize) -> Self {
        self.0.n_start = n_start;
        self
    }

    /// Set the max number of internal likelihood evaluations during one optimization
    /// Given max_eval has to be greater than [crate::GP_COBYLA_MIN_EVAL] otherwise
    /// max_eval is set to [crate::GP_COBYLA_MIN_EVAL].
    pub fn max_eval(mut self, max_eval: usize) -> Self {
        self.0.max_eval = GP_COBYLA_MIN_EVAL.max(max_eval);
        self
    }

    /// Set nugget.
    ///
    /// Nugget is used to improve numerical stability
    pub fn nugget(mut self, nugget: f64) -> Self {
        self.0.nugget = nugget;
        self
    }
}

impl<Mean: RegressionModel, Corr: CorrelationModel> From<GpValidParams<Mean, Corr>>
    for GpParams<Mean, Corr>
{
    fn from(valid: GpValidParams<Mean, Corr>) -> Self {
        GpParams(valid)
    }
}

impl<Mean: RegressionModel, Corr: CorrelationModel> ParamGuard for GpParams<Mean, Corr> {
    type Checked = GpValidParams<Mean, Corr>;
    type Error = GpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        let tuning = &self.0.theta_tuning;
        if tuning.init().iter().any(|v| !(*v > 0.)) {
            return Err(GpError::InvalidValueError(
                "theta init values should be strictly positive".to_string(),
            ));
        }
        if let Some(bounds) = tuning.bounds() {
            if bounds.iter().any(|(lo, up)| !(*lo > 0. && lo < up)) {
                return Err(GpError::InvalidValueError(format!(
                    "theta bounds should verify 0 < lower < upper, got {bounds:?}"
                )));
            }
        }
        if self.0.nugget < 0. {
            return Err(GpError::InvalidValueError(format!(
                "nugget should be positive, got {}",
                self.0.nugget
            )));
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation_models::SquaredExponentialCorr;
    use crate::mean_models::ConstantMean;

    #[test]
    fn test_check() {
        let params = GpParams::new(ConstantMean(), SquaredExponentialCorr());
        assert!(params.clone().check().is_ok());
        assert!(params
            .clone()
            .theta_init(array![0.])
            .check_ref()
            .is_err());
        assert!(params
            .clone()
            .theta_bounds(array![(1., 0.1)])
            .check_ref()
            .is_err());
        assert!(params.nugget(-1.).check().is_err());
    }

    #[test]
    fn test_max_eval_floor() {
        let params = GpParams::new(ConstantMean(), SquaredExponentialCorr())
            .max_eval(3)
            .check()
            .unwrap();
        assert_eq!(params.max_eval(), GP_COBYLA_MIN_EVAL);
    }
}
