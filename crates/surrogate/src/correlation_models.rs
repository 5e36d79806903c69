//! Correlation models used to model the error term of the GP model.
//!
//! Correlations are computed from absolute componentwise distances `d`
//! with one `theta` per input component (anisotropic kernel):
//! * squared exponential,
//! * absolute exponential,
//! * matern 3/2,
//! * matern 5/2.
//!
//! Distances along categorical components are 0 (same choice) or 1 (different choices),
//! see [`DiffMatrix`](crate::DiffMatrix).

use ndarray::{Array1, ArrayBase, Axis, Data, Ix1, Ix2, Zip};
use paste::paste;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;

/// A trait for using a correlation model in GP regression
pub trait CorrelationModel: Clone + Copy + Default + fmt::Display + Send + Sync {
    /// Compute correlation values r(x, x') given absolute distances `d` between x and x'
    /// specified as a (n, nx) matrix and `theta` parameters as a (nx,) vector.
    /// Returns a (n,) vector.
    fn value(
        &self,
        d: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Array1<f64>;
}

/// Squared exponential correlation models
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct SquaredExponentialCorr();

impl CorrelationModel for SquaredExponentialCorr {
    ///   d
    /// prod exp( - |theta_j * d_j|^2 / 2 )
    ///  j=1
    fn value(
        &self,
        d: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Array1<f64> {
        let theta2 = theta.mapv(|v| v * v);
        let r = d.mapv(|v| v * v).dot(&theta2);
        r.mapv(|v| f64::exp(-0.5 * v))
    }
}

/// Absolute exponential correlation models
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct AbsoluteExponentialCorr();

impl CorrelationModel for AbsoluteExponentialCorr {
    ///   d
    /// prod exp( - theta_j * |d_j| )
    ///  j=1
    fn value(
        &self,
        d: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Array1<f64> {
        let r = d.mapv(|v| v.abs()).dot(theta);
        r.mapv(|v| f64::exp(-v))
    }
}

/// Matern 3/2 correlation model
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Matern32Corr();

impl CorrelationModel for Matern32Corr {
    ///   d
    /// prod (1 + sqrt(3) * theta_j * |d_j|) exp( - sqrt(3) * theta_j * |d_j| )
    ///  j=1
    fn value(
        &self,
        d: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Array1<f64> {
        let sqrt3 = 3f64.sqrt();
        let theta_d = d.mapv(|v| v.abs()) * theta;
        let a = theta_d
            .mapv(|v| 1. + sqrt3 * v)
            .map_axis(Axis(1), |row| row.product());
        let b = theta_d.sum_axis(Axis(1)).mapv(|v| f64::exp(-sqrt3 * v));
        a * b
    }
}

/// Matern 5/2 correlation model
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Matern52Corr();

impl CorrelationModel for Matern52Corr {
    ///   d
    /// prod (1 + sqrt(5) * theta_j * |d_j| + (5./3.) * theta_j^2 * |d_j|^2) exp( - sqrt(5) * theta_j * |d_j| )
    ///  j=1
    fn value(
        &self,
        d: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Array1<f64> {
        let sqrt5 = 5f64.sqrt();
        let theta_d = d.mapv(|v| v.abs()) * theta;
        let mut a = Array1::<f64>::ones(d.nrows());
        Zip::from(&mut a)
            .and(theta_d.rows())
            .for_each(|a_i, theta_d_i| {
                *a_i = theta_d_i
                    .iter()
                    .map(|v| 1. + sqrt5 * v + 5. / 3. * v * v)
                    .product();
            });
        let b = theta_d.sum_axis(Axis(1)).mapv(|v| f64::exp(-sqrt5 * v));
        a * b
    }
}

macro_rules! declare_corr_util_impls {
    ($corr:ident) => {
        paste! {
            impl fmt::Display for [<$corr Corr>] {
                fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    write!(f, stringify!($corr))
                }
            }

            impl From<[<$corr Corr>]> for String {
                fn from(item: [<$corr Corr>]) -> Self {
                    item.to_string()
                }
            }

            impl TryFrom<String> for [<$corr Corr>] {
                type Error = String;
                fn try_from(s: String) -> Result<Self, Self::Error> {
                    if s == stringify!($corr) {
                        Ok(Self::default())
                    } else {
                        Err(format!("Bad string value for {}, got '{}'", stringify!([<$corr Corr>]), s))
                    }
                }
            }
        }
    };
}

declare_corr_util_impls!(SquaredExponential);
declare_corr_util_impls!(AbsoluteExponential);
declare_corr_util_impls!(Matern32);
declare_corr_util_impls!(Matern52);
