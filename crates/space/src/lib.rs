//! This library implements configuration spaces used to describe the inputs
//! of black-box optimization problems, as well as some designs of experiments (DoE).
//!
//! A [`ConfigSpace`] is made of [`Hyperparameter`]s: floats and integers (optionally on
//! a log scale), categorical and ordinal choices and constants. Configurations are encoded
//! as vectors for surrogate modeling (see [`ConfigSpace::to_array`]).
//!
//! The following DoE are available and work on continuous (nx, 2) sampling spaces:
//!
//! * random design
//! * [Latin Hypercube sampling](https://en.wikipedia.org/wiki/Latin_hypercube_sampling)
//! * [Halton sequence](https://en.wikipedia.org/wiki/Halton_sequence)
//!
//! They are used to build initial designs of configurations (see [`InitStrategy`]).
//!
//! # Example
//!
//! ```
//! use openbox_space::{ConfigSpace, Hyperparameter, InitStrategy};
//! use rand_xoshiro::{rand_core::SeedableRng, Xoshiro256Plus};
//!
//! let space = ConfigSpace::new()
//!     .add(Hyperparameter::float("x1", -5., 10.)).unwrap()
//!     .add(Hyperparameter::float("x2", 0., 15.)).unwrap();
//!
//! let mut rng = Xoshiro256Plus::seed_from_u64(42);
//! let design = space.initial_design(InitStrategy::LatinHypercube, 5, &mut rng).unwrap();
//! assert_eq!(design.len(), 5);
//! assert_eq!(design[0], space.default_configuration());
//! ```
//!
//! ```
//! use openbox_space::{Lhs, LhsKind, SamplingMethod};
//! use ndarray::arr2;
//! use rand_xoshiro::{rand_core::SeedableRng, Xoshiro256Plus};
//!
//! // Design space is defined as [5., 10.] x [0., 1.], samples are 2-dimensional.
//! let xlimits = arr2(&[[5., 10.], [0., 1.]]);
//! let samples = Lhs::new(&xlimits)
//!     .kind(LhsKind::Classic)
//!     .with_rng(Xoshiro256Plus::seed_from_u64(42))
//!     .sample(10);
//! assert_eq!(samples.dim(), (10, 2));
//! ```
#![warn(missing_docs)]
mod design;
mod errors;
mod halton;
mod hyperparameter;
mod lhs;
mod random;
mod space;
mod traits;
mod utils;

pub use design::*;
pub use errors::*;
pub use halton::*;
pub use hyperparameter::*;
pub use lhs::*;
pub use random::*;
pub use space::*;
pub use traits::*;
pub use utils::{cdist, pdist};
