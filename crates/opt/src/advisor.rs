//! Ask-and-tell core of the optimization: the [`Advisor`] suggests configurations
//! to evaluate given the observations recorded so far.
//!
//! ```no_run
//! use openbox_opt::{Advisor, AdvisorConfig, Evaluation, Observation};
//! use openbox_space::{ConfigSpace, Hyperparameter};
//!
//! let space = ConfigSpace::new()
//!     .add(Hyperparameter::float("x", -5., 5.)).unwrap();
//! let config = AdvisorConfig::default().initial_runs(5).random_state(42).check().unwrap();
//! let mut advisor = Advisor::new(space, config).unwrap();
//! for _ in 0..20 {
//!     let conf = advisor.get_suggestion(None).unwrap();
//!     let x = conf.get_f64("x").unwrap();
//!     let obs = Observation::new(conf, Evaluation::from(x * x), 0.);
//!     advisor.update_observation(obs).unwrap();
//! }
//! println!("min = {:?}", advisor.get_history().get_incumbent_value());
//! ```
use crate::acq_optimizer::{AcqOptimizer, AcqOptimizerType};
use crate::acquisition::{
    estimate_lipschitz, parego_scalarize, parego_weights, AcquisitionBuilder, AcquisitionType,
    LCB_KAPPA, PAREGO_RHO,
};
use crate::errors::{OpenBoxError, Result};
use crate::history::{Evaluation, History, Observation};

use log::{debug, info, warn};
use ndarray::{Array1, Array2, Axis};
use ndarray_rand::rand::{Rng, SeedableRng};
use openbox_space::{ConfigSpace, Configuration, InitStrategy};
use openbox_surrogate::{Surrogate, SurrogateBuilder, SurrogateType};
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// Number of candidates on which MESMO samples Pareto fronts
const MESMO_POOL_SIZE: usize = 200;

/// Strategy used to suggest several configurations at once
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStrategy {
    /// Pending configurations are given the median of observed values
    /// and surrogates are refit before each pick
    #[default]
    MedianImputation,
    /// The acquisition is penalized around pending configurations
    /// (single objective only)
    LocalPenalization,
    /// The acquisition optimizer is rerun for each pick, skipping pending configurations
    Reoptimization,
}

/// Advisor configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdvisorConfig {
    /// Number of objectives to minimize
    pub(crate) num_objectives: usize,
    /// Number of constraints, feasible when non positive
    pub(crate) num_constraints: usize,
    /// Number of configurations of the initial design
    pub(crate) initial_runs: usize,
    /// How the initial design is built
    pub(crate) init_strategy: InitStrategy,
    /// User configurations evaluated first
    pub(crate) initial_configurations: Vec<Configuration>,
    /// Surrogate used for objectives and constraints
    pub(crate) surrogate_type: SurrogateType,
    /// Acquisition function
    pub(crate) acq_type: AcquisitionType,
    /// Acquisition maximization strategy
    pub(crate) acq_optimizer_type: AcqOptimizerType,
    /// Hypervolume reference point
    pub(crate) ref_point: Option<Vec<f64>>,
    /// Probability of suggesting a random configuration
    pub(crate) rand_prob: f64,
    /// Seed of the random generator
    pub(crate) random_state: Option<u64>,
    /// Task label
    pub(crate) task_id: String,
    /// Exploration weight of confidence bounds
    pub(crate) lcb_kappa: f64,
    /// Multi-point suggestion strategy
    pub(crate) batch_strategy: BatchStrategy,
    /// Max number of random draws to find an unevaluated configuration
    pub(crate) max_retries: usize,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        AdvisorConfig {
            num_objectives: 1,
            num_constraints: 0,
            initial_runs: 3,
            init_strategy: InitStrategy::RandomExploreFirst,
            initial_configurations: vec![],
            surrogate_type: SurrogateType::Auto,
            acq_type: AcquisitionType::Auto,
            acq_optimizer_type: AcqOptimizerType::LocalRandom,
            ref_point: None,
            rand_prob: 0.1,
            random_state: None,
            task_id: "default".to_string(),
            lcb_kappa: LCB_KAPPA,
            batch_strategy: BatchStrategy::MedianImputation,
            max_retries: 100,
        }
    }
}

impl AdvisorConfig {
    /// Sets the number of objectives
    pub fn num_objectives(mut self, num_objectives: usize) -> Self {
        self.num_objectives = num_objectives;
        self
    }

    /// Sets the number of constraints
    pub fn num_constraints(mut self, num_constraints: usize) -> Self {
        self.num_constraints = num_constraints;
        self
    }

    /// Sets the size of the initial design
    pub fn initial_runs(mut self, initial_runs: usize) -> Self {
        self.initial_runs = initial_runs;
        self
    }

    /// Sets the initial design strategy
    pub fn init_strategy(mut self, init_strategy: InitStrategy) -> Self {
        self.init_strategy = init_strategy;
        self
    }

    /// Sets configurations to evaluate first, completed by the initial design
    /// up to `initial_runs`
    pub fn initial_configurations(mut self, configs: Vec<Configuration>) -> Self {
        self.initial_configurations = configs;
        self
    }

    /// Sets the surrogate model kind
    pub fn surrogate_type(mut self, surrogate_type: SurrogateType) -> Self {
        self.surrogate_type = surrogate_type;
        self
    }

    /// Sets the acquisition function
    pub fn acq_type(mut self, acq_type: AcquisitionType) -> Self {
        self.acq_type = acq_type;
        self
    }

    /// Sets the acquisition maximization strategy
    pub fn acq_optimizer_type(mut self, acq_optimizer_type: AcqOptimizerType) -> Self {
        self.acq_optimizer_type = acq_optimizer_type;
        self
    }

    /// Sets the hypervolume reference point
    pub fn ref_point(mut self, ref_point: Vec<f64>) -> Self {
        self.ref_point = Some(ref_point);
        self
    }

    /// Sets the probability of suggesting a random configuration
    pub fn rand_prob(mut self, rand_prob: f64) -> Self {
        self.rand_prob = rand_prob;
        self
    }

    /// Allow to specify a seed for random number generator to allow
    /// reproducible runs.
    pub fn random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Sets the task label
    pub fn task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = task_id.into();
        self
    }

    /// Sets the exploration weight of confidence bound criteria
    pub fn lcb_kappa(mut self, lcb_kappa: f64) -> Self {
        self.lcb_kappa = lcb_kappa;
        self
    }

    /// Sets the multi-point suggestion strategy
    pub fn batch_strategy(mut self, batch_strategy: BatchStrategy) -> Self {
        self.batch_strategy = batch_strategy;
        self
    }

    /// Sets the max number of random draws to find an unevaluated configuration
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Number of objectives
    pub fn get_num_objectives(&self) -> usize {
        self.num_objectives
    }

    /// Number of constraints
    pub fn get_num_constraints(&self) -> usize {
        self.num_constraints
    }

    /// Task label
    pub fn get_task_id(&self) -> &str {
        &self.task_id
    }

    /// Checks the consistency of the configuration
    pub fn check(self) -> Result<ValidAdvisorConfig> {
        if let Some(ref_point) = &self.ref_point {
            if ref_point.len() != self.num_objectives {
                return Err(OpenBoxError::InvalidConfigError(format!(
                    "reference point of length {} for {} objectives",
                    ref_point.len(),
                    self.num_objectives
                )));
            }
        }
        self.acq_type.check(
            self.num_objectives,
            self.num_constraints,
            self.ref_point.as_deref(),
        )?;
        if !(0. ..=1.).contains(&self.rand_prob) {
            return Err(OpenBoxError::InvalidConfigError(format!(
                "rand_prob should be in [0, 1], got {}",
                self.rand_prob
            )));
        }
        if self.batch_strategy == BatchStrategy::LocalPenalization && self.num_objectives > 1 {
            return Err(OpenBoxError::InvalidConfigError(
                "LocalPenalization batch strategy handles a single objective".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(OpenBoxError::InvalidConfigError(
                "max_retries should be positive".to_string(),
            ));
        }
        Ok(ValidAdvisorConfig(self))
    }
}

/// An [`AdvisorConfig`] whose consistency was checked
#[derive(Clone, Debug, Serialize)]
#[serde(transparent)]
pub struct ValidAdvisorConfig(AdvisorConfig);

impl Deref for ValidAdvisorConfig {
    type Target = AdvisorConfig;

    fn deref(&self) -> &AdvisorConfig {
        &self.0
    }
}

/// Trained models of the objectives (or their scalarization) and constraints
struct Models {
    objectives: Vec<Box<dyn Surrogate>>,
    constraints: Vec<Box<dyn Surrogate>>,
    /// Training targets of the objective models
    targets: Array2<f64>,
    feasible: Vec<bool>,
}

/// Suggests configurations to evaluate
pub struct Advisor {
    space: ConfigSpace,
    config: ValidAdvisorConfig,
    history: History,
    initial_configs: Vec<Configuration>,
    acq_optimizer: AcqOptimizer,
    rng: Xoshiro256Plus,
}

impl Advisor {
    /// Constructor given the space to explore
    pub fn new(space: ConfigSpace, config: ValidAdvisorConfig) -> Result<Self> {
        if config.acq_optimizer_type == AcqOptimizerType::RandomCobyla
            && space.categorical_mask().iter().any(|c| *c)
        {
            return Err(OpenBoxError::InvalidConfigError(
                "RandomCobyla acquisition optimizer requires a space without categorical hyperparameter".to_string(),
            ));
        }
        let mut rng = if let Some(seed) = config.random_state {
            Xoshiro256Plus::seed_from_u64(seed)
        } else {
            Xoshiro256Plus::from_entropy()
        };

        let mut initial_configs = vec![];
        for c in config.initial_configurations.iter() {
            let c = space.canonicalize(c)?;
            if !initial_configs.contains(&c) {
                initial_configs.push(c);
            }
        }
        let n_design = config.initial_runs.saturating_sub(initial_configs.len());
        if n_design > 0 {
            for c in space.initial_design(config.init_strategy, n_design, &mut rng)? {
                if !initial_configs.contains(&c) {
                    initial_configs.push(c);
                }
            }
        }
        debug!("Initial design of {} configurations", initial_configs.len());

        let history = History::new(
            config.task_id.clone(),
            config.num_objectives,
            config.num_constraints,
            config.ref_point.clone(),
        );
        Ok(Advisor {
            acq_optimizer: AcqOptimizer::new(config.acq_optimizer_type),
            space,
            config,
            history,
            initial_configs,
            rng,
        })
    }

    /// Replaces the acquisition maximizer settings
    pub fn with_acq_optimizer(mut self, acq_optimizer: AcqOptimizer) -> Self {
        self.acq_optimizer = acq_optimizer;
        self
    }

    /// Explored space
    pub fn space(&self) -> &ConfigSpace {
        &self.space
    }

    /// Configuration of the advisor
    pub fn config(&self) -> &ValidAdvisorConfig {
        &self.config
    }

    /// Observations recorded so far
    pub fn get_history(&self) -> &History {
        &self.history
    }

    /// Configurations of the initial design
    pub fn initial_configurations(&self) -> &[Configuration] {
        &self.initial_configs
    }

    /// Records an observation
    pub fn update_observation(&mut self, obs: Observation) -> Result<()> {
        self.history.update_observation(obs)
    }

    /// Suggests the next configuration to evaluate given `history`,
    /// the advisor own history being used when `None`
    pub fn get_suggestion(&mut self, history: Option<&History>) -> Result<Configuration> {
        let mut rng = self.rng.clone();
        let res = self.suggest(history.unwrap_or(&self.history), &[], false, &mut rng);
        self.rng = rng;
        res
    }

    /// Suggests `batch_size` distinct configurations, different from the `running` ones,
    /// following the batch strategy
    pub fn get_suggestions(
        &mut self,
        batch_size: usize,
        running: &[Configuration],
    ) -> Result<Vec<Configuration>> {
        let mut rng = self.rng.clone();
        let res = self.suggest_batch(batch_size, running, &mut rng);
        self.rng = rng;
        res
    }

    fn suggest_batch(
        &self,
        batch_size: usize,
        running: &[Configuration],
        rng: &mut Xoshiro256Plus,
    ) -> Result<Vec<Configuration>> {
        let mut pending: Vec<Configuration> = running.to_vec();
        let mut batch = Vec::with_capacity(batch_size);
        for _ in 0..batch_size {
            let next = match self.config.batch_strategy {
                BatchStrategy::MedianImputation if !pending.is_empty() => {
                    let imputed = self.impute_median(&pending)?;
                    self.suggest(&imputed, &pending, false, rng)?
                }
                BatchStrategy::LocalPenalization => {
                    self.suggest(&self.history, &pending, true, rng)?
                }
                _ => self.suggest(&self.history, &pending, false, rng)?,
            };
            pending.push(next.clone());
            batch.push(next);
        }
        Ok(batch)
    }

    /// History completed with pending configurations observed at the median of
    /// successful values
    fn impute_median(&self, pending: &[Configuration]) -> Result<History> {
        let successes: Vec<&Observation> = self
            .history
            .observations
            .iter()
            .filter(|o| o.trial_state.is_success())
            .collect();
        if successes.is_empty() {
            return Ok(self.history.clone());
        }
        let objectives = (0..self.config.num_objectives)
            .map(|j| median(successes.iter().map(|o| o.objectives[j])))
            .collect();
        let constraints = (0..self.config.num_constraints)
            .map(|j| median(successes.iter().map(|o| o.constraints[j])))
            .collect();
        let evaluation = Evaluation::new(objectives).with_constraints(constraints);
        let mut imputed = self.history.clone();
        for config in pending {
            if !imputed.contains(config) {
                imputed.update_observation(Observation::new(
                    config.clone(),
                    evaluation.clone(),
                    0.,
                ))?;
            }
        }
        Ok(imputed)
    }

    fn suggest(
        &self,
        history: &History,
        pending: &[Configuration],
        penalize: bool,
        rng: &mut Xoshiro256Plus,
    ) -> Result<Configuration> {
        let is_fresh = |c: &Configuration| !history.contains(c) && !pending.contains(c);

        if let Some(c) = self.initial_configs.iter().find(|c| is_fresh(*c)) {
            debug!("Suggest initial design configuration {c}");
            return Ok(c.clone());
        }
        let n_success = history.get_trial_counts().success;
        if n_success < self.config.initial_runs.max(1) {
            info!(
                "{n_success} successful trials (initial runs = {}), suggest random configuration",
                self.config.initial_runs
            );
            return self.random_configuration(history, pending, rng);
        }
        if rng.gen::<f64>() < self.config.rand_prob {
            debug!("Suggest random configuration");
            return self.random_configuration(history, pending, rng);
        }

        match self.model_based_suggestion(history, pending, penalize, rng) {
            Ok(Some(c)) => Ok(c),
            Ok(None) => {
                info!("Every candidate was already evaluated, suggest random configuration");
                self.random_configuration(history, pending, rng)
            }
            Err(OpenBoxError::GpError(err)) => {
                warn!("Surrogate training failed ({err}), suggest random configuration");
                self.random_configuration(history, pending, rng)
            }
            Err(err) => Err(err),
        }
    }

    fn train_models(&self, history: &History, rng: &mut Xoshiro256Plus) -> Result<Models> {
        let x = history.get_config_array(&self.space)?;
        let y = history.get_objectives(true);
        let c = history.get_constraints();
        let feasible: Vec<bool> = history
            .observations
            .iter()
            .map(|o| o.is_feasible())
            .collect();

        let kind = self
            .config
            .acq_type
            .resolve(self.config.num_objectives, self.config.num_constraints);
        let targets = if kind == AcquisitionType::ParEGO {
            let weights = parego_weights(self.config.num_objectives, rng);
            debug!("ParEGO weights {weights}");
            parego_scalarize(&y, &weights, PAREGO_RHO).insert_axis(Axis(1))
        } else {
            y
        };

        let builder = SurrogateBuilder::new(self.config.surrogate_type)
            .cat_mask(self.space.categorical_mask());
        info!(
            "Train {:?} surrogates with {} points...",
            builder.resolved_type(),
            x.nrows()
        );
        let objectives = train_columns(&builder, &x, &targets, rng)?;
        let constraints = train_columns(&builder, &x, &c, rng)?;
        debug!("... surrogates trained");
        Ok(Models {
            objectives,
            constraints,
            targets,
            feasible,
        })
    }

    fn model_based_suggestion(
        &self,
        history: &History,
        pending: &[Configuration],
        penalize: bool,
        rng: &mut Xoshiro256Plus,
    ) -> Result<Option<Configuration>> {
        let kind = self
            .config
            .acq_type
            .resolve(self.config.num_objectives, self.config.num_constraints);
        let Models {
            objectives,
            constraints,
            targets,
            feasible,
        } = self.train_models(history, rng)?;

        let mut acq_builder = AcquisitionBuilder::new(kind)
            .ref_point(self.config.ref_point.clone())
            .lcb_kappa(self.config.lcb_kappa);
        if kind == AcquisitionType::MESMO {
            let pool = self
                .space
                .sample_configurations(MESMO_POOL_SIZE, rng);
            acq_builder = acq_builder.pool(self.space.to_array2(&pool)?);
        }
        if penalize && !pending.is_empty() {
            let bounds = self.space.bounds();
            let scale: Array1<f64> = &bounds.column(1) - &bounds.column(0);
            let rows: Vec<usize> = (0..history.len())
                .filter(|&i| history.observations[i].trial_state.is_success())
                .collect();
            let x = history.get_config_array(&self.space)?.select(Axis(0), &rows);
            let y = targets.column(0).select(Axis(0), &rows);
            let lipschitz = estimate_lipschitz(&x, &y, &scale);
            debug!("Local penalization with Lipschitz constant {lipschitz}");
            acq_builder =
                acq_builder.local_penalization(self.space.to_array2(pending)?, lipschitz, scale);
        }
        let acq = acq_builder.build(objectives, constraints, &targets, &feasible, rng)?;

        let ranked = self
            .acq_optimizer
            .maximize(&self.space, acq.as_ref(), history, rng)?;
        let best = ranked.into_iter().find(|(_, c)| !pending.contains(c));
        if let Some((value, config)) = &best {
            info!("Suggest {config} with {} = {value}", acq.name());
        }
        Ok(best.map(|(_, c)| c))
    }

    /// Draws a configuration neither evaluated nor pending
    fn random_configuration(
        &self,
        history: &History,
        pending: &[Configuration],
        rng: &mut Xoshiro256Plus,
    ) -> Result<Configuration> {
        for _ in 0..self.config.max_retries {
            let c = self.space.sample_configuration(rng);
            if !history.contains(&c) && !pending.contains(&c) {
                return Ok(c);
            }
        }
        Err(OpenBoxError::NoMoreCandidates(format!(
            "no unevaluated configuration found after {} random draws",
            self.config.max_retries
        )))
    }
}

/// Trains one surrogate per column of `y`
fn train_columns(
    builder: &SurrogateBuilder,
    x: &Array2<f64>,
    y: &Array2<f64>,
    rng: &mut Xoshiro256Plus,
) -> Result<Vec<Box<dyn Surrogate>>> {
    let seeds: Vec<u64> = (0..y.ncols()).map(|_| rng.gen()).collect();
    y.columns()
        .into_iter()
        .zip(seeds)
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|(col, seed)| -> Result<Box<dyn Surrogate>> {
            Ok(builder
                .clone()
                .seed(Some(seed))
                .train(&x.view(), &col)?)
        })
        .collect()
}

fn median(values: impl Iterator<Item = f64>) -> f64 {
    let mut v: Vec<f64> = values.collect();
    v.sort_by(f64::total_cmp);
    let n = v.len();
    match n {
        0 => 0.,
        _ if n % 2 == 1 => v[n / 2],
        _ => 0.5 * (v[n / 2 - 1] + v[n / 2]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::TrialState;
    use openbox_space::Hyperparameter;
    use std::collections::HashSet;

    fn space() -> ConfigSpace {
        ConfigSpace::new()
            .add(Hyperparameter::float("x1", -5., 10.))
            .unwrap()
            .add(Hyperparameter::float("x2", 0., 15.))
            .unwrap()
    }

    fn branin(c: &Configuration) -> f64 {
        let x1 = c.get_f64("x1").unwrap();
        let x2 = c.get_f64("x2").unwrap();
        let a = x2 - 5.1 / (4. * std::f64::consts::PI.powi(2)) * x1 * x1
            + 5. / std::f64::consts::PI * x1
            - 6.;
        a * a + 10. * (1. - 1. / (8. * std::f64::consts::PI)) * x1.cos() + 10.
    }

    fn fast_advisor(config: AdvisorConfig, space: ConfigSpace) -> Advisor {
        Advisor::new(space, config.check().unwrap())
            .unwrap()
            .with_acq_optimizer(AcqOptimizer::default().n_random(200).n_local_starts(4))
    }

    #[test]
    fn test_check() {
        assert!(AdvisorConfig::default().check().is_ok());
        assert!(AdvisorConfig::default().num_objectives(2).check().is_err());
        assert!(AdvisorConfig::default()
            .num_objectives(2)
            .ref_point(vec![1., 1.])
            .check()
            .is_ok());
        assert!(AdvisorConfig::default()
            .num_objectives(2)
            .acq_type(AcquisitionType::ParEGO)
            .batch_strategy(BatchStrategy::LocalPenalization)
            .check()
            .is_err());
        assert!(AdvisorConfig::default().rand_prob(1.5).check().is_err());
        let cat_space = ConfigSpace::new()
            .add(Hyperparameter::categorical("c", ["a", "b"]))
            .unwrap();
        assert!(Advisor::new(
            cat_space,
            AdvisorConfig::default()
                .acq_optimizer_type(AcqOptimizerType::RandomCobyla)
                .check()
                .unwrap()
        )
        .is_err());
    }

    #[test]
    fn test_initial_design_first() {
        let user = Configuration::new().with("x1", 1.).with("x2", 2.);
        let mut advisor = fast_advisor(
            AdvisorConfig::default()
                .initial_runs(4)
                .initial_configurations(vec![user.clone()])
                .random_state(0),
            space(),
        );
        assert_eq!(advisor.initial_configurations().len(), 4);
        let first = advisor.get_suggestion(None).unwrap();
        assert_eq!(first, user);
        for _ in 0..4 {
            let c = advisor.get_suggestion(None).unwrap();
            assert!(!advisor.get_history().contains(&c));
            let y = branin(&c);
            advisor
                .update_observation(Observation::new(c, Evaluation::from(y), 0.))
                .unwrap();
        }
        let evaluated: HashSet<Configuration> = advisor
            .get_history()
            .observations
            .iter()
            .map(|o| o.config.clone())
            .collect();
        let design: HashSet<Configuration> =
            advisor.initial_configurations().iter().cloned().collect();
        assert_eq!(evaluated, design);
    }

    #[test]
    fn test_user_configurations_are_canonical() {
        let as_ints = Configuration::new().with("x1", 1i64).with("x2", 2i64);
        let as_floats = Configuration::new().with("x1", 1.).with("x2", 2.);
        let advisor = fast_advisor(
            AdvisorConfig::default()
                .initial_runs(2)
                .initial_configurations(vec![as_ints, as_floats.clone()])
                .random_state(0),
            space(),
        );
        let user: Vec<&Configuration> = advisor
            .initial_configurations()
            .iter()
            .filter(|c| **c == as_floats)
            .collect();
        assert_eq!(user.len(), 1);
        let x = advisor.space().to_array(&as_floats).unwrap();
        assert_eq!(advisor.space().from_array(&x), as_floats);
    }

    #[test]
    fn test_branin_improves() {
        let mut advisor = fast_advisor(
            AdvisorConfig::default()
                .initial_runs(5)
                .rand_prob(0.)
                .random_state(42),
            space(),
        );
        for _ in 0..15 {
            let c = advisor.get_suggestion(None).unwrap();
            let y = branin(&c);
            advisor
                .update_observation(Observation::new(c, Evaluation::from(y), 0.))
                .unwrap();
        }
        let history = advisor.get_history();
        assert_eq!(history.len(), 15);
        let best = history.get_incumbent_value().unwrap();
        assert!(best < 5., "best branin value {best}");
    }

    #[test]
    fn test_failed_initial_trials_get_random_configurations() {
        let mut advisor = fast_advisor(
            AdvisorConfig::default().initial_runs(2).random_state(3),
            space(),
        );
        for _ in 0..4 {
            let c = advisor.get_suggestion(None).unwrap();
            advisor
                .update_observation(Observation::failed(c, TrialState::Failed, 1, 0, 0.))
                .unwrap();
        }
        let c = advisor.get_suggestion(None).unwrap();
        assert!(!advisor.get_history().contains(&c));
    }

    #[test]
    fn test_batch_suggestions_are_distinct() {
        for strategy in [
            BatchStrategy::MedianImputation,
            BatchStrategy::LocalPenalization,
            BatchStrategy::Reoptimization,
        ] {
            let mut advisor = fast_advisor(
                AdvisorConfig::default()
                    .initial_runs(4)
                    .rand_prob(0.)
                    .batch_strategy(strategy)
                    .random_state(7),
                space(),
            );
            let initial = advisor.get_suggestions(4, &[]).unwrap();
            for c in initial {
                let y = branin(&c);
                advisor
                    .update_observation(Observation::new(c, Evaluation::from(y), 0.))
                    .unwrap();
            }
            let running = vec![Configuration::new().with("x1", 3.).with("x2", 3.)];
            let batch = advisor.get_suggestions(3, &running).unwrap();
            assert_eq!(batch.len(), 3);
            let distinct: HashSet<&Configuration> = batch.iter().chain(running.iter()).collect();
            assert_eq!(distinct.len(), 4, "{strategy:?}");
            assert!(batch.iter().all(|c| !advisor.get_history().contains(c)));
        }
    }

    #[test]
    fn test_constrained_and_multi_objective() {
        let mut advisor = fast_advisor(
            AdvisorConfig::default()
                .num_objectives(2)
                .num_constraints(1)
                .ref_point(vec![50., 50.])
                .initial_runs(5)
                .rand_prob(0.)
                .random_state(11),
            space(),
        );
        for _ in 0..8 {
            let c = advisor.get_suggestion(None).unwrap();
            let x1 = c.get_f64("x1").unwrap();
            let x2 = c.get_f64("x2").unwrap();
            let eval = Evaluation::new(vec![(x1 * x1 + x2) / 10., (x1 - 5.).abs() + x2 / 5.])
                .with_constraints(vec![x1 - 8.]);
            advisor
                .update_observation(Observation::new(c, eval, 0.))
                .unwrap();
        }
        assert_eq!(advisor.get_history().len(), 8);
        assert!(!advisor.get_history().get_pareto().is_empty());
    }

    #[test]
    fn test_exhausted_space() {
        let space = ConfigSpace::new()
            .add(Hyperparameter::categorical("c", ["a", "b"]))
            .unwrap();
        let mut advisor = fast_advisor(
            AdvisorConfig::default().initial_runs(2).max_retries(20).random_state(5),
            space,
        );
        for _ in 0..2 {
            let c = advisor.get_suggestion(None).unwrap();
            advisor
                .update_observation(Observation::new(c, Evaluation::from(1.), 0.))
                .unwrap();
        }
        assert!(matches!(
            advisor.get_suggestion(None),
            Err(OpenBoxError::NoMoreCandidates(_))
        ));
    }

    #[test]
    fn test_median() {
        assert_eq!(median([3., 1., 2.].into_iter()), 2.);
        assert_eq!(median([4., 1., 2., 3.].into_iter()), 2.5);
    }
}
