//! Sequential optimizer driving the suggest, evaluate and update loop.
//!
//! ```no_run
//! use openbox_opt::{Evaluation, OptimizerBuilder};
//! use openbox_space::{ConfigSpace, Configuration, Hyperparameter};
//!
//! use argmin_testfunctions::rosenbrock;
//!
//! // Rosenbrock test function: minimum y_opt = 0 at x_opt = (1, 1)
//! fn rosenb(c: &Configuration) -> anyhow::Result<Evaluation> {
//!     let x1 = c.get_f64("x1").unwrap_or_default();
//!     let x2 = c.get_f64("x2").unwrap_or_default();
//!     Ok(Evaluation::from(rosenbrock(&[x1, x2])))
//! }
//!
//! let space = ConfigSpace::new()
//!     .add(Hyperparameter::float("x1", -2., 2.)).unwrap()
//!     .add(Hyperparameter::float("x2", -2., 2.)).unwrap();
//! let history = OptimizerBuilder::optimize(rosenb)
//!     .configure(|config| config.max_runs(30).task_id("rosenbrock").random_state(42))
//!     .within(space)
//!     .expect("valid optimizer")
//!     .run()
//!     .expect("Rosenbrock minimization");
//! println!("Rosenbrock min = {:?}", history.get_incumbent_value());
//! ```
//!
//! Constraints are returned along objectives in the [`Evaluation`](crate::Evaluation)
//! and are satisfied when non positive. Their number has to be declared with the
//! `num_constraints` setter, as the number of objectives with `num_objectives`.
use crate::acq_optimizer::AcqOptimizerType;
use crate::acquisition::AcquisitionType;
use crate::advisor::{Advisor, AdvisorConfig, BatchStrategy, ValidAdvisorConfig};
use crate::errors::{OpenBoxError, Result};
use crate::history::{History, Observation};
use crate::runner::{run_trial, ObjectiveFn};
use crate::OPENBOX_LOG;

use env_logger::{Builder, Env};
use log::{debug, info};
use openbox_space::{ConfigSpace, Configuration, InitStrategy};
use openbox_surrogate::SurrogateType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use web_time::Instant;

/// Json filename for configuration
pub const CONFIG_FILE: &str = "openbox_config.json";

/// Json filename of the history of the given task
pub fn history_filename(task_id: &str) -> String {
    format!("history_{task_id}.json")
}

/// Initializes logging when `OPENBOX_LOG` environment variable is set
pub(crate) fn init_logger() {
    if std::env::var(OPENBOX_LOG).is_ok() {
        let env = Env::new().filter_or(OPENBOX_LOG, "info");
        let mut builder = Builder::from_env(env);
        let builder = builder.target(env_logger::Target::Stdout);
        builder.try_init().ok();
    }
}

/// Optimizer configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Suggestion settings
    #[serde(flatten)]
    pub(crate) advisor: AdvisorConfig,
    /// Max number of trials
    pub(crate) max_runs: usize,
    /// Max duration of the optimization in seconds, unlimited when `None`
    pub(crate) max_runtime: Option<f64>,
    /// Max duration of a trial in seconds
    pub(crate) time_limit_per_trial: Option<f64>,
    /// Number of consecutive iterations without improvement stopping the optimization
    pub(crate) early_stop: Option<usize>,
    /// Directory where configuration and history are saved
    pub(crate) logging_dir: Option<String>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            advisor: AdvisorConfig::default(),
            max_runs: 100,
            max_runtime: None,
            time_limit_per_trial: None,
            early_stop: None,
            logging_dir: None,
        }
    }
}

impl OptimizerConfig {
    /// Sets the max number of trials
    pub fn max_runs(mut self, max_runs: usize) -> Self {
        self.max_runs = max_runs;
        self
    }

    /// Sets the max duration of the optimization in seconds
    pub fn max_runtime(mut self, max_runtime: f64) -> Self {
        self.max_runtime = Some(max_runtime);
        self
    }

    /// Sets the max duration of a trial in seconds
    pub fn time_limit_per_trial(mut self, time_limit: f64) -> Self {
        self.time_limit_per_trial = Some(time_limit);
        self
    }

    /// Stops after `n` consecutive iterations without improvement
    pub fn early_stop(mut self, n: usize) -> Self {
        self.early_stop = Some(n);
        self
    }

    /// Sets the directory where configuration and history are saved
    pub fn logging_dir(mut self, dir: impl Into<String>) -> Self {
        self.logging_dir = Some(dir.into());
        self
    }

    /// Sets suggestion settings at once
    pub fn advisor<F: FnOnce(AdvisorConfig) -> AdvisorConfig>(mut self, init: F) -> Self {
        self.advisor = init(self.advisor);
        self
    }

    /// Sets the number of objectives
    pub fn num_objectives(self, n: usize) -> Self {
        self.advisor(|a| a.num_objectives(n))
    }

    /// Sets the number of constraints
    pub fn num_constraints(self, n: usize) -> Self {
        self.advisor(|a| a.num_constraints(n))
    }

    /// Sets the size of the initial design
    pub fn initial_runs(self, n: usize) -> Self {
        self.advisor(|a| a.initial_runs(n))
    }

    /// Sets the initial design strategy
    pub fn init_strategy(self, strategy: InitStrategy) -> Self {
        self.advisor(|a| a.init_strategy(strategy))
    }

    /// Sets configurations to evaluate first
    pub fn initial_configurations(self, configs: Vec<Configuration>) -> Self {
        self.advisor(|a| a.initial_configurations(configs))
    }

    /// Sets the surrogate model kind
    pub fn surrogate_type(self, surrogate_type: SurrogateType) -> Self {
        self.advisor(|a| a.surrogate_type(surrogate_type))
    }

    /// Sets the acquisition function
    pub fn acq_type(self, acq_type: AcquisitionType) -> Self {
        self.advisor(|a| a.acq_type(acq_type))
    }

    /// Sets the acquisition maximization strategy
    pub fn acq_optimizer_type(self, acq_optimizer_type: AcqOptimizerType) -> Self {
        self.advisor(|a| a.acq_optimizer_type(acq_optimizer_type))
    }

    /// Sets the hypervolume reference point
    pub fn ref_point(self, ref_point: Vec<f64>) -> Self {
        self.advisor(|a| a.ref_point(ref_point))
    }

    /// Sets the probability of suggesting a random configuration
    pub fn rand_prob(self, rand_prob: f64) -> Self {
        self.advisor(|a| a.rand_prob(rand_prob))
    }

    /// Sets the seed of the random generator
    pub fn random_state(self, seed: u64) -> Self {
        self.advisor(|a| a.random_state(seed))
    }

    /// Sets the task label
    pub fn task_id(self, task_id: impl Into<String>) -> Self {
        let task_id = task_id.into();
        self.advisor(|a| a.task_id(task_id))
    }

    /// Sets the multi-point suggestion strategy
    pub fn batch_strategy(self, batch_strategy: BatchStrategy) -> Self {
        self.advisor(|a| a.batch_strategy(batch_strategy))
    }

    /// Checks the consistency of the configuration
    pub fn check(self) -> Result<ValidOptimizerConfig> {
        if let Some(t) = self.max_runtime {
            if t.is_nan() || t <= 0. {
                return Err(OpenBoxError::InvalidConfigError(format!(
                    "max_runtime should be positive, got {t}"
                )));
            }
        }
        if let Some(t) = self.time_limit_per_trial {
            if !t.is_finite() || t <= 0. {
                return Err(OpenBoxError::InvalidConfigError(format!(
                    "time_limit_per_trial should be positive, got {t}"
                )));
            }
        }
        if self.early_stop == Some(0) {
            return Err(OpenBoxError::InvalidConfigError(
                "early_stop should be positive".to_string(),
            ));
        }
        let advisor = self.advisor.clone().check()?;
        Ok(ValidOptimizerConfig {
            advisor,
            config: self,
        })
    }
}

/// An [`OptimizerConfig`] whose consistency was checked
#[derive(Clone, Debug, Serialize)]
pub struct ValidOptimizerConfig {
    #[serde(skip)]
    pub(crate) advisor: ValidAdvisorConfig,
    #[serde(flatten)]
    pub(crate) config: OptimizerConfig,
}

impl std::ops::Deref for ValidOptimizerConfig {
    type Target = OptimizerConfig;

    fn deref(&self) -> &OptimizerConfig {
        &self.config
    }
}

impl ValidOptimizerConfig {
    /// Writes the configuration as json in the logging directory if any
    pub(crate) fn save(&self) -> Result<()> {
        if let Some(outdir) = self.logging_dir.as_ref() {
            std::fs::create_dir_all(outdir)?;
            let filepath = Path::new(outdir).join(CONFIG_FILE);
            let json = serde_json::to_string(&self.config)?;
            std::fs::write(filepath, json)?;
        }
        Ok(())
    }

    /// Path of the history file in the logging directory if any
    pub(crate) fn history_path(&self) -> Option<PathBuf> {
        self.logging_dir
            .as_ref()
            .map(|dir| Path::new(dir).join(history_filename(&self.advisor.task_id)))
    }

    pub(crate) fn runtime_exceeded(&self, start: &Instant) -> bool {
        self.max_runtime
            .is_some_and(|t| start.elapsed().as_secs_f64() >= t)
    }
}

/// Value whose decrease is an improvement: the incumbent value for a single
/// objective, the opposite of the hypervolume of the Pareto front otherwise
/// (`None` when no reference point is available).
fn progress_indicator(history: &History) -> Option<f64> {
    if history.num_objectives == 1 {
        history.get_incumbent_value()
    } else {
        history.get_mo_hypervolume(None).ok().map(|hv| -hv)
    }
}

/// Tracks consecutive iterations without improvement
#[derive(Clone, Debug, Default)]
pub(crate) struct EarlyStopping {
    best: Option<f64>,
    stalled: usize,
}

impl EarlyStopping {
    /// Updates with the history, returns whether the optimization should stop
    pub(crate) fn update(&mut self, history: &History, patience: Option<usize>) -> bool {
        let Some(patience) = patience else {
            return false;
        };
        let current = progress_indicator(history);
        match (self.best, current) {
            (_, None) => {}
            (Some(best), Some(cur)) if cur >= best => self.stalled += 1,
            (_, Some(cur)) => {
                self.best = Some(cur);
                self.stalled = 0;
            }
        }
        self.stalled >= patience
    }
}

/// Optimizer builder allowing to specify the function to be minimized
pub struct OptimizerBuilder<O: ObjectiveFn> {
    fobj: O,
    config: OptimizerConfig,
}

impl<O: ObjectiveFn> OptimizerBuilder<O> {
    /// Function to be minimized, returning objective and constraint values
    /// of a configuration
    pub fn optimize(fobj: O) -> Self {
        OptimizerBuilder {
            fobj,
            config: OptimizerConfig::default(),
        }
    }

    /// Set configuration of the optimizer
    pub fn configure<F: FnOnce(OptimizerConfig) -> OptimizerConfig>(mut self, init: F) -> Self {
        self.config = init(self.config);
        self
    }

    /// Build an optimizer to minimize the function over the given space
    pub fn within(self, space: ConfigSpace) -> Result<Optimizer<O>> {
        let config = self.config.check()?;
        let advisor = Advisor::new(space, config.advisor.clone())?;
        Ok(Optimizer {
            fobj: self.fobj,
            config,
            advisor,
            iteration: 0,
            early_stopping: EarlyStopping::default(),
        })
    }
}

/// Sequential optimizer: one trial evaluated at a time
pub struct Optimizer<O: ObjectiveFn> {
    fobj: O,
    config: ValidOptimizerConfig,
    advisor: Advisor,
    iteration: usize,
    early_stopping: EarlyStopping,
}

impl<O: ObjectiveFn> Optimizer<O> {
    /// Configuration of the optimizer
    pub fn config(&self) -> &ValidOptimizerConfig {
        &self.config
    }

    /// Observations recorded so far
    pub fn get_history(&self) -> &History {
        self.advisor.get_history()
    }

    /// Underlying advisor
    pub fn advisor(&self) -> &Advisor {
        &self.advisor
    }

    /// Runs the optimization until `max_runs` trials, `max_runtime` or early stop
    pub fn run(&mut self) -> Result<History> {
        init_logger();
        info!("{:?}", self.config.config);
        self.config.save()?;

        let start = Instant::now();
        while self.get_history().len() < self.config.max_runs {
            if self.config.runtime_exceeded(&start) {
                info!("Max runtime reached, stop optimization");
                break;
            }
            match self.iterate() {
                Ok(_) => {}
                Err(OpenBoxError::NoMoreCandidates(msg)) => {
                    info!("Stop optimization: {msg}");
                    break;
                }
                Err(err) => return Err(err),
            }
            if self
                .early_stopping
                .update(self.advisor.get_history(), self.config.early_stop)
            {
                info!(
                    "No improvement for {} iterations, stop optimization",
                    self.config.early_stop.unwrap_or_default()
                );
                break;
            }
        }

        let history = self.get_history();
        let counts = history.get_trial_counts();
        info!(
            "Optimization done: {} trials ({} successful, {} failed including {} timeouts)",
            history.len(),
            counts.success,
            counts.failed,
            counts.timeout
        );
        if history.num_objectives == 1 {
            info!("Incumbent value: {:?}", history.get_incumbent_value());
        } else {
            info!("Pareto front: {}", history.get_pareto_front());
        }
        Ok(history.clone())
    }

    /// Runs a single suggest, evaluate and update step
    pub fn iterate(&mut self) -> Result<Observation> {
        self.iteration += 1;
        info!("Iteration {} begins", self.iteration);
        let config = self.advisor.get_suggestion(None)?;
        debug!("Evaluate {config}");
        let obs = run_trial(
            &self.fobj,
            &config,
            self.config.time_limit_per_trial,
            self.config.advisor.num_objectives,
            self.config.advisor.num_constraints,
        );
        self.advisor.update_observation(obs.clone())?;
        if let Some(path) = self.config.history_path() {
            self.get_history().save_json(path)?;
        }
        info!(
            "Iteration {} ends: {:?} {:?}, incumbent {:?}",
            self.iteration,
            obs.trial_state,
            obs.objectives,
            self.get_history().get_incumbent_value()
        );
        Ok(obs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{Evaluation, TrialState};
    use argmin_testfunctions::rosenbrock;
    use openbox_space::Hyperparameter;
    use serial_test::serial;

    fn xsinx(c: &Configuration) -> anyhow::Result<Evaluation> {
        let x = c.get_f64("x").unwrap_or_default();
        Ok(Evaluation::from((x - 3.5) * f64::sin((x - 3.5) / std::f64::consts::PI)))
    }

    fn rosenb(c: &Configuration) -> anyhow::Result<Evaluation> {
        let x = [c.get_f64("x1").unwrap_or(0.), c.get_f64("x2").unwrap_or(0.)];
        Ok(Evaluation::from(rosenbrock(&x)))
    }

    fn space_1d() -> ConfigSpace {
        ConfigSpace::new()
            .add(Hyperparameter::float("x", 0., 25.))
            .unwrap()
    }

    #[test]
    fn test_xsinx_optimizer() {
        let history = OptimizerBuilder::optimize(xsinx)
            .configure(|config| config.max_runs(20).initial_runs(4).random_state(42))
            .within(space_1d())
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(history.len(), 20);
        // global minimum -15.125 at x = 18.935
        let best = history.get_incumbent_value().unwrap();
        assert!(best < -13., "best xsinx value {best}");
    }

    #[test]
    fn test_rosenbrock_optimizer() {
        let space = ConfigSpace::new()
            .add(Hyperparameter::float("x1", -2., 2.))
            .unwrap()
            .add(Hyperparameter::float("x2", -2., 2.))
            .unwrap();
        let history = OptimizerBuilder::optimize(rosenb)
            .configure(|config| config.max_runs(30).initial_runs(8).random_state(0))
            .within(space)
            .unwrap()
            .run()
            .unwrap();
        assert!(history.get_incumbent_value().unwrap() < 5.);
    }

    #[test]
    fn test_failures_do_not_stop_run() {
        let flaky = |c: &Configuration| -> anyhow::Result<Evaluation> {
            let x = c.get_f64("x").unwrap_or_default();
            if x > 20. {
                anyhow::bail!("out of validity domain")
            }
            Ok(Evaluation::from(x))
        };
        let history = OptimizerBuilder::optimize(flaky)
            .configure(|config| config.max_runs(12).random_state(3))
            .within(space_1d())
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(history.len(), 12);
        for obs in history.observations.iter() {
            let x = obs.config.get_f64("x").unwrap();
            assert_eq!(obs.trial_state.is_success(), x <= 20.);
        }
    }

    #[test]
    fn test_max_runtime() {
        let slow = |c: &Configuration| -> anyhow::Result<Evaluation> {
            std::thread::sleep(std::time::Duration::from_millis(100));
            Ok(Evaluation::from(c.get_f64("x").unwrap_or_default()))
        };
        let history = OptimizerBuilder::optimize(slow)
            .configure(|config| config.max_runs(100).max_runtime(0.35).random_state(1))
            .within(space_1d())
            .unwrap()
            .run()
            .unwrap();
        assert!(history.len() >= 3 && history.len() < 10, "{}", history.len());
    }

    #[test]
    fn test_time_limit_per_trial() {
        let slow = |c: &Configuration| -> anyhow::Result<Evaluation> {
            let x = c.get_f64("x").unwrap_or_default();
            if x > 12.5 {
                std::thread::sleep(std::time::Duration::from_millis(800));
            }
            Ok(Evaluation::from(x))
        };
        let history = OptimizerBuilder::optimize(slow)
            .configure(|config| {
                config
                    .max_runs(6)
                    .time_limit_per_trial(0.1)
                    .random_state(8)
            })
            .within(space_1d())
            .unwrap()
            .run()
            .unwrap();
        for obs in history.observations.iter() {
            let x = obs.config.get_f64("x").unwrap();
            let expected = if x > 12.5 {
                TrialState::Timeout
            } else {
                TrialState::Success
            };
            assert_eq!(obs.trial_state, expected);
        }
    }

    #[test]
    fn test_early_stop() {
        let constant = |_: &Configuration| -> anyhow::Result<Evaluation> { Ok(Evaluation::from(1.)) };
        let history = OptimizerBuilder::optimize(constant)
            .configure(|config| config.max_runs(50).early_stop(5).random_state(2))
            .within(space_1d())
            .unwrap()
            .run()
            .unwrap();
        // first trial sets the best value, 5 more without improvement
        assert_eq!(history.len(), 6);
    }

    #[test]
    fn test_invalid_config() {
        assert!(OptimizerBuilder::optimize(xsinx)
            .configure(|config| config.time_limit_per_trial(-1.))
            .within(space_1d())
            .is_err());
        assert!(OptimizerBuilder::optimize(xsinx)
            .configure(|config| config.num_objectives(2))
            .within(space_1d())
            .is_err());
    }

    #[test]
    #[serial]
    fn test_logging_dir() {
        let outdir = "target/tests/optimizer";
        let _ = std::fs::remove_dir_all(outdir);
        let space = space_1d();
        let history = OptimizerBuilder::optimize(xsinx)
            .configure(|config| {
                config
                    .max_runs(5)
                    .task_id("xsinx")
                    .logging_dir(outdir)
                    .random_state(4)
            })
            .within(space.clone())
            .unwrap()
            .run()
            .unwrap();
        assert!(Path::new(outdir).join(CONFIG_FILE).exists());
        let loaded = History::load_json(Path::new(outdir).join("history_xsinx.json"), &space).unwrap();
        assert_eq!(loaded, history);

        let json = std::fs::read_to_string(Path::new(outdir).join(CONFIG_FILE)).unwrap();
        let config: OptimizerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.max_runs, 5);
        assert_eq!(config.advisor.task_id, "xsinx");
    }

    #[test]
    fn test_constrained_multi_objective_run() {
        let fobj = |c: &Configuration| -> anyhow::Result<Evaluation> {
            let x = c.get_f64("x").unwrap_or_default();
            Ok(Evaluation::new(vec![x, (x - 10.).powi(2)]).with_constraints(vec![2. - x]))
        };
        let history = OptimizerBuilder::optimize(fobj)
            .configure(|config| {
                config
                    .max_runs(10)
                    .num_objectives(2)
                    .num_constraints(1)
                    .ref_point(vec![30., 700.])
                    .random_state(5)
            })
            .within(space_1d())
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(history.len(), 10);
        assert!(history
            .get_pareto()
            .iter()
            .all(|o| o.config.get_f64("x").unwrap() >= 2.));
        assert!(history.get_mo_hypervolume(None).unwrap() > 0.);
    }
}
