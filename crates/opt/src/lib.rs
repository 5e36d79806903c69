//! This library implements generalized black-box optimization, that is the minimization
//! of expensive functions whose gradients are not available, using Bayesian optimization:
//! surrogate models of objectives and constraints are trained on observed trials and an
//! acquisition function built on them selects the next configuration to evaluate.
//!
//! It handles:
//!
//! * single and multi-objective problems (Pareto front, hypervolume),
//! * black-box constraints, a configuration being feasible when every constraint
//!   value is non positive,
//! * mixed spaces of float, integer, ordinal and categorical hyperparameters
//!   (see [`openbox_space`]),
//! * failed and timed out trials, recorded without stopping the optimization.
//!
//! Three drivers share the same suggestion core (the [`Advisor`]):
//!
//! * [`Optimizer`]: sequential evaluations,
//! * [`ParallelOptimizer`]: concurrent evaluations on local threads, in synchronous
//!   rounds or asynchronously,
//! * [`DistributedOptimizer`]: evaluations by [`DistributedWorker`]s connected over TCP.
//!
//! # Acquisition functions
//!
//! | problem                        | default (`Auto`)  | others                 |
//! |--------------------------------|-------------------|------------------------|
//! | single objective               | EI                | LogEI, PI, LCB         |
//! | single objective, constrained  | EIC               | EI, LogEI, PI, LCB     |
//! | multi-objective                | EHVI (up to 4)    | ParEGO, MESMO, USEMO   |
//! | multi-objective, constrained   | EHVIC (up to 4)   | ParEGO, MESMO, USEMO   |
//!
//! Beyond 4 objectives `Auto` selects MESMO. Constraints are handled by weighting
//! the criterion with the probability of feasibility given by constraint surrogates.
//!
//! # Example
//!
//! ```no_run
//! use openbox_opt::{Evaluation, OptimizerBuilder};
//! use openbox_space::{ConfigSpace, Configuration, Hyperparameter};
//!
//! // Townsend function subject to a disk constraint
//! fn townsend(c: &Configuration) -> anyhow::Result<Evaluation> {
//!     let x = c.get_f64("x").unwrap_or_default();
//!     let y = c.get_f64("y").unwrap_or_default();
//!     let f = -(((x - 0.1) * y).cos()).powi(2) - x * (3. * x + y).sin();
//!     let t = f64::atan2(x, y);
//!     let r = 2. * t.cos() - 0.5 * (2. * t).cos() - 0.25 * (3. * t).cos() - 0.125 * (4. * t).cos();
//!     Ok(Evaluation::from(f).with_constraints(vec![x * x + y * y - r * r]))
//! }
//!
//! let space = ConfigSpace::new()
//!     .add(Hyperparameter::float("x", -2.25, 2.5)).unwrap()
//!     .add(Hyperparameter::float("y", -2.5, 1.75)).unwrap();
//! let history = OptimizerBuilder::optimize(townsend)
//!     .configure(|config| config.num_constraints(1).max_runs(60).task_id("townsend"))
//!     .within(space)
//!     .expect("valid optimizer")
//!     .run()
//!     .expect("Townsend minimization");
//! println!("Best feasible value = {:?}", history.get_incumbent_value());
//! ```
//!
//! # Logging
//!
//! Logs go through the `log` facade. Setting the `OPENBOX_LOG` environment variable
//! activates their display on stdout, its value being an `env_logger` filter,
//! for instance `OPENBOX_LOG=debug`.
#![warn(missing_docs)]
pub mod acq_optimizer;
pub mod acquisition;
mod advisor;
mod distributed;
mod errors;
mod history;
mod optimizer;
mod parallel;
pub mod pareto;
mod runner;
mod utils;

pub use acq_optimizer::{AcqOptimizer, AcqOptimizerType};
pub use acquisition::{AcquisitionFunction, AcquisitionType};
pub use advisor::*;
pub use distributed::*;
pub use errors::*;
pub use history::*;
pub use optimizer::*;
pub use parallel::*;
pub use runner::*;

/// Environment variable activating logs display, its value being used as filter
pub const OPENBOX_LOG: &str = "OPENBOX_LOG";
