//! `openbox` is a toolbox for generalized black-box optimization (BBO).
//!
//! It gathers the crates of the workspace:
//!
//! * [`space`]: configuration spaces made of float, integer, ordinal and categorical
//!   hyperparameters, and designs of experiments,
//! * [`surrogate`]: gaussian process and probabilistic random forest surrogate models,
//! * [`opt`]: single and multi-objective constrained optimizers, run sequentially,
//!   in parallel or distributed over workers.
//!
//! # Example
//!
//! ```no_run
//! use openbox::prelude::*;
//!
//! // Branin function: minimum 0.397887 at (-pi, 12.275), (pi, 2.275), (9.42478, 2.475)
//! fn branin(c: &Configuration) -> anyhow::Result<Evaluation> {
//!     let x1 = c.get_f64("x1").unwrap_or_default();
//!     let x2 = c.get_f64("x2").unwrap_or_default();
//!     let pi = std::f64::consts::PI;
//!     let y = (x2 - 5.1 / (4. * pi * pi) * x1 * x1 + 5. / pi * x1 - 6.).powi(2)
//!         + 10. * (1. - 1. / (8. * pi)) * x1.cos()
//!         + 10.;
//!     Ok(Evaluation::from(y))
//! }
//!
//! let space = ConfigSpace::new()
//!     .add(Hyperparameter::float("x1", -5., 10.))?
//!     .add(Hyperparameter::float("x2", 0., 15.))?;
//! let history = OptimizerBuilder::optimize(branin)
//!     .configure(|config| config.max_runs(50).surrogate_type(SurrogateType::Gp))
//!     .within(space)?
//!     .run()?;
//! println!("Branin min = {:?}", history.get_incumbent_value());
//! # Ok::<(), OpenBoxError>(())
//! ```
pub use openbox_opt as opt;
pub use openbox_space as space;
pub use openbox_surrogate as surrogate;

/// Most used types
pub mod prelude {
    pub use openbox_opt::{
        AcqOptimizerType, AcquisitionType, Advisor, AdvisorConfig, BatchStrategy,
        DistributedOptimizerBuilder, DistributedWorker, Evaluation, History, Observation,
        OpenBoxError, OptimizerBuilder, ParallelOptimizerBuilder, ParallelStrategy, TrialState,
    };
    pub use openbox_space::{ConfigSpace, Configuration, Hyperparameter, InitStrategy};
    pub use openbox_surrogate::SurrogateType;
}
