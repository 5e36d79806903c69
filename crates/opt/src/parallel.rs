//! Parallel optimizer evaluating several configurations concurrently,
//! either in synchronous rounds or asynchronously.
//!
//! ```no_run
//! use openbox_opt::{Evaluation, ParallelOptimizerBuilder, ParallelStrategy};
//! use openbox_space::{ConfigSpace, Configuration, Hyperparameter};
//!
//! fn sphere(c: &Configuration) -> anyhow::Result<Evaluation> {
//!     let x = c.get_f64("x").unwrap_or_default();
//!     Ok(Evaluation::from(x * x))
//! }
//!
//! let space = ConfigSpace::new()
//!     .add(Hyperparameter::float("x", -5., 5.)).unwrap();
//! let history = ParallelOptimizerBuilder::optimize(sphere)
//!     .configure(|config| {
//!         config
//!             .batch_size(4)
//!             .parallel_strategy(ParallelStrategy::Sync)
//!             .optimizer(|o| o.max_runs(40))
//!     })
//!     .within(space)
//!     .expect("valid optimizer")
//!     .run()
//!     .expect("sphere minimization");
//! println!("min = {:?}", history.get_incumbent_value());
//! ```
use crate::advisor::{Advisor, BatchStrategy};
use crate::errors::{OpenBoxError, Result};
use crate::history::{History, Observation};
use crate::optimizer::{init_logger, EarlyStopping, OptimizerConfig, ValidOptimizerConfig};
use crate::runner::{run_trial, ObjectiveFn};

use log::{debug, info};
use openbox_space::{ConfigSpace, Configuration};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::task::{block_in_place, JoinSet};
use web_time::Instant;

/// Scheduling of parallel evaluations
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParallelStrategy {
    /// Rounds of `batch_size` suggestions, all evaluated before the next round
    Sync,
    /// `batch_size` evaluations kept in flight, a new suggestion as soon as one ends
    #[default]
    Async,
}

/// Parallel optimizer configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParallelOptimizerConfig {
    /// Sequential settings
    #[serde(flatten)]
    pub(crate) optimizer: OptimizerConfig,
    /// Number of concurrent evaluations
    pub(crate) batch_size: usize,
    /// Scheduling of evaluations
    pub(crate) parallel_strategy: ParallelStrategy,
}

impl Default for ParallelOptimizerConfig {
    fn default() -> Self {
        ParallelOptimizerConfig {
            optimizer: OptimizerConfig::default(),
            batch_size: 4,
            parallel_strategy: ParallelStrategy::Async,
        }
    }
}

impl ParallelOptimizerConfig {
    /// Sets the number of concurrent evaluations
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the scheduling of evaluations
    pub fn parallel_strategy(mut self, parallel_strategy: ParallelStrategy) -> Self {
        self.parallel_strategy = parallel_strategy;
        self
    }

    /// Sets the multi-point suggestion strategy
    pub fn batch_strategy(self, batch_strategy: BatchStrategy) -> Self {
        self.optimizer(|o| o.batch_strategy(batch_strategy))
    }

    /// Sets sequential settings (budget, objectives, constraints, ...)
    pub fn optimizer<F: FnOnce(OptimizerConfig) -> OptimizerConfig>(mut self, init: F) -> Self {
        self.optimizer = init(self.optimizer);
        self
    }

    /// Checks the consistency of the configuration
    pub fn check(self) -> Result<ValidParallelOptimizerConfig> {
        if self.batch_size == 0 {
            return Err(OpenBoxError::InvalidConfigError(
                "batch_size should be positive".to_string(),
            ));
        }
        Ok(ValidParallelOptimizerConfig {
            optimizer: self.optimizer.clone().check()?,
            config: self,
        })
    }
}

/// A [`ParallelOptimizerConfig`] whose consistency was checked
#[derive(Clone, Debug)]
pub struct ValidParallelOptimizerConfig {
    pub(crate) optimizer: ValidOptimizerConfig,
    pub(crate) config: ParallelOptimizerConfig,
}

impl std::ops::Deref for ValidParallelOptimizerConfig {
    type Target = ParallelOptimizerConfig;

    fn deref(&self) -> &ParallelOptimizerConfig {
        &self.config
    }
}

/// Parallel optimizer builder allowing to specify the function to be minimized
pub struct ParallelOptimizerBuilder<O: ObjectiveFn> {
    fobj: O,
    config: ParallelOptimizerConfig,
}

impl<O: ObjectiveFn> ParallelOptimizerBuilder<O> {
    /// Function to be minimized, it is evaluated concurrently on several threads
    pub fn optimize(fobj: O) -> Self {
        ParallelOptimizerBuilder {
            fobj,
            config: ParallelOptimizerConfig::default(),
        }
    }

    /// Set configuration of the optimizer
    pub fn configure<F: FnOnce(ParallelOptimizerConfig) -> ParallelOptimizerConfig>(
        mut self,
        init: F,
    ) -> Self {
        self.config = init(self.config);
        self
    }

    /// Build a parallel optimizer to minimize the function over the given space
    pub fn within(self, space: ConfigSpace) -> Result<ParallelOptimizer<O>> {
        let config = self.config.check()?;
        let advisor = Advisor::new(space, config.optimizer.advisor.clone())?;
        Ok(ParallelOptimizer {
            fobj: self.fobj,
            config,
            advisor,
        })
    }
}

/// Optimizer evaluating `batch_size` trials concurrently
pub struct ParallelOptimizer<O: ObjectiveFn> {
    fobj: O,
    config: ValidParallelOptimizerConfig,
    advisor: Advisor,
}

impl<O: ObjectiveFn> ParallelOptimizer<O> {
    /// Configuration of the optimizer
    pub fn config(&self) -> &ValidParallelOptimizerConfig {
        &self.config
    }

    /// Observations recorded so far
    pub fn get_history(&self) -> &History {
        self.advisor.get_history()
    }

    /// Runs the optimization until `max_runs` trials, `max_runtime` or early stop
    pub fn run(&mut self) -> Result<History> {
        init_logger();
        info!("{:?}", self.config.config);
        self.config.optimizer.save()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        match self.config.parallel_strategy {
            ParallelStrategy::Sync => runtime.block_on(self.run_sync())?,
            ParallelStrategy::Async => runtime.block_on(self.run_async())?,
        }

        let history = self.get_history();
        let counts = history.get_trial_counts();
        info!(
            "Parallel optimization done: {} trials ({} successful, {} failed)",
            history.len(),
            counts.success,
            counts.failed
        );
        Ok(history.clone())
    }

    fn spawn_trial(&self, trials: &mut JoinSet<(usize, Observation)>, id: usize, config: Configuration) {
        let fobj = self.fobj.clone();
        let time_limit = self.config.optimizer.time_limit_per_trial;
        let num_objectives = self.config.optimizer.advisor.num_objectives;
        let num_constraints = self.config.optimizer.advisor.num_constraints;
        debug!("Launch trial {id}: {config}");
        trials.spawn_blocking(move || {
            let obs = run_trial(&fobj, &config, time_limit, num_objectives, num_constraints);
            (id, obs)
        });
    }

    fn record(&mut self, obs: Observation) -> Result<()> {
        info!(
            "Trial {} ends: {:?} {:?}",
            self.get_history().len() + 1,
            obs.trial_state,
            obs.objectives
        );
        self.advisor.update_observation(obs)?;
        if let Some(path) = self.config.optimizer.history_path() {
            self.get_history().save_json(path)?;
        }
        Ok(())
    }

    async fn run_sync(&mut self) -> Result<()> {
        let start = Instant::now();
        let max_runs = self.config.optimizer.max_runs;
        let mut early_stopping = EarlyStopping::default();
        let mut round = 0;
        while self.get_history().len() < max_runs {
            if self.config.optimizer.runtime_exceeded(&start) {
                info!("Max runtime reached, stop optimization");
                break;
            }
            round += 1;
            let n = self.config.batch_size.min(max_runs - self.get_history().len());
            let batch = match block_in_place(|| self.advisor.get_suggestions(n, &[])) {
                Ok(batch) => batch,
                Err(OpenBoxError::NoMoreCandidates(msg)) => {
                    info!("Stop optimization: {msg}");
                    break;
                }
                Err(err) => return Err(err),
            };
            info!("Round {round} begins with {} trials", batch.len());
            let mut trials = JoinSet::new();
            for (id, config) in batch.into_iter().enumerate() {
                self.spawn_trial(&mut trials, id, config);
            }
            let mut results = BTreeMap::new();
            while let Some(res) = trials.join_next().await {
                let (id, obs) = res?;
                results.insert(id, obs);
            }
            for obs in results.into_values() {
                self.record(obs)?;
            }
            info!(
                "Round {round} ends, incumbent {:?}",
                self.get_history().get_incumbent_value()
            );
            if early_stopping.update(self.get_history(), self.config.optimizer.early_stop) {
                info!("No improvement, stop optimization");
                break;
            }
        }
        Ok(())
    }

    async fn run_async(&mut self) -> Result<()> {
        let start = Instant::now();
        let max_runs = self.config.optimizer.max_runs;
        let mut early_stopping = EarlyStopping::default();
        let mut running: BTreeMap<usize, Configuration> = BTreeMap::new();
        let mut trials = JoinSet::new();
        let mut issued = self.get_history().len();
        let mut issuing = true;
        loop {
            while issuing && running.len() < self.config.batch_size {
                if issued >= max_runs {
                    issuing = false;
                } else if self.config.optimizer.runtime_exceeded(&start) {
                    info!("Max runtime reached, wait for running trials");
                    issuing = false;
                } else {
                    let pending: Vec<Configuration> = running.values().cloned().collect();
                    match block_in_place(|| self.advisor.get_suggestions(1, &pending)) {
                        Ok(suggestions) => {
                            for config in suggestions {
                                running.insert(issued, config.clone());
                                self.spawn_trial(&mut trials, issued, config);
                                issued += 1;
                            }
                        }
                        Err(OpenBoxError::NoMoreCandidates(msg)) => {
                            info!("Stop issuing trials: {msg}");
                            issuing = false;
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
            let Some(res) = trials.join_next().await else {
                break;
            };
            let (id, obs) = res?;
            running.remove(&id);
            self.record(obs)?;
            if issuing
                && early_stopping.update(self.get_history(), self.config.optimizer.early_stop)
            {
                info!("No improvement, wait for running trials");
                issuing = false;
            }
        }
        Ok(())
    }
}
