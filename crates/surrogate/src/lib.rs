//! This library implements surrogate models used to drive black-box optimization:
//!
//! * [Gaussian process](https://en.wikipedia.org/wiki/Gaussian_process) regression
//!   (aka kriging) with anisotropic correlation models, trained by maximizing
//!   the reduced likelihood,
//! * probabilistic random forest regression, the predictive variance being given
//!   by the law of total variance over the trees.
//!
//! Both implement the [`Surrogate`] trait which provides predictive means and variances.
//! Inputs may hold categorical components given as choice indices (see
//! [`SurrogateBuilder::cat_mask`]).
//!
//! # Gaussian process
//!
//! The GP mean is taken from [`mean_models`]:
//!
//! * constant
//! * linear
//! * quadratic
//!
//! and the correlation kernel from [`correlation_models`]:
//!
//! * squared exponential
//! * absolute exponential
//! * matern 3/2
//! * matern 5/2
//!
//! # Example
//!
//! ```no_run
//! use openbox_surrogate::{Kriging, SurrogateBuilder, SurrogateType};
//! use linfa::prelude::*;
//! use ndarray::array;
//!
//! let xt = array![[0.0], [1.0], [2.0], [3.0], [4.0]];
//! let yt = array![0.0, 1.0, 1.5, 0.9, 1.0];
//!
//! let gp = Kriging::params()
//!     .fit(&Dataset::new(xt.clone(), yt.clone()))
//!     .expect("GP fitted");
//! let (mean, var) = gp.predict_valvar(&array![[1.5], [3.5]]).expect("GP prediction");
//!
//! // or any surrogate through the common trait
//! let rf = SurrogateBuilder::new(SurrogateType::Prf)
//!     .seed(Some(42))
//!     .train(&xt.view(), &yt.view())
//!     .expect("Random forest trained");
//! let (mean, var) = rf.predict_valvar(&array![[1.5], [3.5]].view()).expect("RF prediction");
//! ```
#![warn(missing_docs)]
mod algorithm;
pub mod correlation_models;
mod errors;
pub mod mean_models;
mod optimization;
mod parameters;
mod random_forest;
mod surrogate;
mod utils;

pub use algorithm::*;
pub use errors::*;
pub use parameters::*;
pub use random_forest::*;
pub use surrogate::*;
pub use utils::DiffMatrix;
