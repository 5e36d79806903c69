//! Records of evaluated configurations.
//!
//! A [`History`] collects the [`Observation`]s of a task and answers the queries
//! needed to fit surrogates and report results: incumbents, Pareto front,
//! hypervolume, objective and constraint matrices.
use crate::errors::{OpenBoxError, Result};
use crate::pareto::{hypervolume, pareto_front_indices};

use log::{debug, warn};
use ndarray::{Array2, Axis};
use openbox_space::{ConfigSpace, Configuration};
use serde::{Deserialize, Serialize};
use std::path::Path;
use web_time::{SystemTime, UNIX_EPOCH};

/// Outcome of a trial
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialState {
    /// Objective evaluated successfully
    Success,
    /// Objective failed (error, panic, invalid output)
    Failed,
    /// Objective did not return within its time limit
    Timeout,
}

impl TrialState {
    /// Whether the trial succeeded
    pub fn is_success(&self) -> bool {
        *self == TrialState::Success
    }
}

/// Values returned by an objective function
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Objective values, to be minimized
    pub objectives: Vec<f64>,
    /// Constraint values, a configuration is feasible when all are non positive
    #[serde(default)]
    pub constraints: Vec<f64>,
    /// Free-form information attached to the trial
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_info: Option<serde_json::Value>,
}

impl Evaluation {
    /// An unconstrained evaluation
    pub fn new(objectives: Vec<f64>) -> Self {
        Evaluation {
            objectives,
            ..Default::default()
        }
    }

    /// Sets constraint values
    pub fn with_constraints(mut self, constraints: Vec<f64>) -> Self {
        self.constraints = constraints;
        self
    }

    /// Attaches extra information
    pub fn with_extra_info(mut self, extra_info: serde_json::Value) -> Self {
        self.extra_info = Some(extra_info);
        self
    }
}

impl From<f64> for Evaluation {
    fn from(objective: f64) -> Self {
        Evaluation::new(vec![objective])
    }
}

impl From<Vec<f64>> for Evaluation {
    fn from(objectives: Vec<f64>) -> Self {
        Evaluation::new(objectives)
    }
}

/// An evaluated configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Evaluated configuration
    pub config: Configuration,
    /// Objective values (`f64::MAX` placeholders when the trial failed)
    pub objectives: Vec<f64>,
    /// Constraint values
    pub constraints: Vec<f64>,
    /// Outcome of the trial
    pub trial_state: TrialState,
    /// Evaluation duration in seconds
    pub elapsed_time: f64,
    /// Free-form information returned by the objective
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_info: Option<serde_json::Value>,
}

impl Observation {
    /// A successful observation
    pub fn new(config: Configuration, evaluation: Evaluation, elapsed_time: f64) -> Self {
        Observation {
            config,
            objectives: evaluation.objectives,
            constraints: evaluation.constraints,
            trial_state: TrialState::Success,
            elapsed_time,
            extra_info: evaluation.extra_info,
        }
    }

    /// A failed (or timed out) observation with `f64::MAX` placeholder values
    pub fn failed(
        config: Configuration,
        trial_state: TrialState,
        num_objectives: usize,
        num_constraints: usize,
        elapsed_time: f64,
    ) -> Self {
        Observation {
            config,
            objectives: vec![f64::MAX; num_objectives],
            constraints: vec![f64::MAX; num_constraints],
            trial_state,
            elapsed_time,
            extra_info: None,
        }
    }

    /// Successful with every constraint non positive
    pub fn is_feasible(&self) -> bool {
        self.trial_state.is_success() && self.constraints.iter().all(|c| *c <= 0.)
    }
}

/// Trial counters of a history
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrialCounts {
    /// Successful trials
    pub success: usize,
    /// Failed trials, timeouts included
    pub failed: usize,
    /// Timed out trials
    pub timeout: usize,
}

/// Observations of an optimization task
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct History {
    /// Task label
    pub task_id: String,
    /// Number of objectives of every observation
    pub num_objectives: usize,
    /// Number of constraints of every observation
    pub num_constraints: usize,
    /// Reference point used for hypervolume computation
    pub ref_point: Option<Vec<f64>>,
    /// Observations in recording order
    pub observations: Vec<Observation>,
    /// Creation time in seconds since UNIX epoch
    pub global_start_time: f64,
}

impl History {
    /// An empty history
    pub fn new(
        task_id: impl Into<String>,
        num_objectives: usize,
        num_constraints: usize,
        ref_point: Option<Vec<f64>>,
    ) -> Self {
        let global_start_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        History {
            task_id: task_id.into(),
            num_objectives,
            num_constraints,
            ref_point,
            observations: vec![],
            global_start_time,
        }
    }

    /// Number of observations
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    /// Whether no observation was recorded
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Records an observation.
    ///
    /// Fails when the numbers of objectives or constraints do not match the task.
    /// A successful observation with non finite objectives is recorded as failed.
    pub fn update_observation(&mut self, mut obs: Observation) -> Result<()> {
        if obs.objectives.len() != self.num_objectives {
            return Err(OpenBoxError::InvalidValue(format!(
                "expected {} objectives, got {}",
                self.num_objectives,
                obs.objectives.len()
            )));
        }
        if obs.constraints.len() != self.num_constraints {
            return Err(OpenBoxError::InvalidValue(format!(
                "expected {} constraints, got {}",
                self.num_constraints,
                obs.constraints.len()
            )));
        }
        if obs.trial_state.is_success()
            && obs
                .objectives
                .iter()
                .chain(obs.constraints.iter())
                .any(|v| !v.is_finite())
        {
            warn!(
                "Non finite values {:?} {:?} for {}, trial marked as failed",
                obs.objectives, obs.constraints, obs.config
            );
            obs.trial_state = TrialState::Failed;
        }
        if !obs.trial_state.is_success() {
            // keep the history serializable
            obs.objectives
                .iter_mut()
                .chain(obs.constraints.iter_mut())
                .filter(|v| !v.is_finite())
                .for_each(|v| *v = f64::MAX);
        }
        debug!(
            "Observation #{}: {} -> {:?} ({:?})",
            self.observations.len(),
            obs.config,
            obs.objectives,
            obs.trial_state
        );
        self.observations.push(obs);
        Ok(())
    }

    /// Successful with every constraint non positive
    pub fn is_feasible(&self, obs: &Observation) -> bool {
        obs.is_feasible()
    }

    /// Whether at least one feasible observation exists
    pub fn has_feasible(&self) -> bool {
        self.observations.iter().any(Observation::is_feasible)
    }

    /// Whether the configuration was already evaluated
    pub fn contains(&self, config: &Configuration) -> bool {
        self.observations.iter().any(|o| &o.config == config)
    }

    /// Numbers of successful and failed trials
    pub fn get_trial_counts(&self) -> TrialCounts {
        self.observations
            .iter()
            .fold(TrialCounts::default(), |mut counts, o| {
                match o.trial_state {
                    TrialState::Success => counts.success += 1,
                    TrialState::Failed => counts.failed += 1,
                    TrialState::Timeout => {
                        counts.failed += 1;
                        counts.timeout += 1
                    }
                }
                counts
            })
    }

    /// Feasible observations reaching the best value of the first objective (ties included)
    pub fn get_incumbents(&self) -> Vec<&Observation> {
        match self.get_incumbent_value() {
            Some(best) => self
                .observations
                .iter()
                .filter(|o| o.is_feasible() && o.objectives[0] == best)
                .collect(),
            None => vec![],
        }
    }

    /// Best feasible value of the first objective
    pub fn get_incumbent_value(&self) -> Option<f64> {
        self.observations
            .iter()
            .filter(|o| o.is_feasible())
            .map(|o| o.objectives[0])
            .min_by(f64::total_cmp)
    }

    /// Configurations of the incumbents
    pub fn get_incumbent_configs(&self) -> Vec<Configuration> {
        self.get_incumbents()
            .into_iter()
            .map(|o| o.config.clone())
            .collect()
    }

    /// Non-dominated feasible observations
    pub fn get_pareto(&self) -> Vec<&Observation> {
        let feasible: Vec<&Observation> =
            self.observations.iter().filter(|o| o.is_feasible()).collect();
        let values = objectives_matrix(&feasible, self.num_objectives);
        let mut indices = pareto_front_indices(&values);
        indices.sort_unstable();
        indices.into_iter().map(|i| feasible[i]).collect()
    }

    /// Objective values of the Pareto front as a (n_front, num_objectives) matrix
    pub fn get_pareto_front(&self) -> Array2<f64> {
        objectives_matrix(&self.get_pareto(), self.num_objectives)
    }

    /// Hypervolume of the Pareto front wrt `ref_point`, or the history reference point
    /// when `None`
    pub fn get_mo_hypervolume(&self, ref_point: Option<&[f64]>) -> Result<f64> {
        let ref_point = ref_point
            .or(self.ref_point.as_deref())
            .ok_or_else(|| OpenBoxError::InvalidValue("no reference point".to_string()))?;
        if ref_point.len() != self.num_objectives {
            return Err(OpenBoxError::InvalidValue(format!(
                "reference point of length {} for {} objectives",
                ref_point.len(),
                self.num_objectives
            )));
        }
        Ok(hypervolume(&self.get_pareto_front(), ref_point))
    }

    /// Objectives as a (n, num_objectives) matrix.
    ///
    /// With `transform_failed`, values of failed trials are replaced by the worst
    /// successful value of each objective (`f64::MAX` when none succeeded).
    pub fn get_objectives(&self, transform_failed: bool) -> Array2<f64> {
        let all: Vec<&Observation> = self.observations.iter().collect();
        let mut y = objectives_matrix(&all, self.num_objectives);
        if transform_failed {
            for j in 0..self.num_objectives {
                let worst = self
                    .observations
                    .iter()
                    .filter(|o| o.trial_state.is_success())
                    .map(|o| o.objectives[j])
                    .max_by(f64::total_cmp)
                    .unwrap_or(f64::MAX);
                for (i, o) in self.observations.iter().enumerate() {
                    if !o.trial_state.is_success() {
                        y[[i, j]] = worst;
                    }
                }
            }
        }
        y
    }

    /// Constraints as a (n, num_constraints) matrix, failed trials being set infeasible (1.0)
    pub fn get_constraints(&self) -> Array2<f64> {
        let mut c = Array2::zeros((self.observations.len(), self.num_constraints));
        for (mut row, o) in c.axis_iter_mut(Axis(0)).zip(self.observations.iter()) {
            if o.trial_state.is_success() {
                row.iter_mut()
                    .zip(o.constraints.iter())
                    .for_each(|(r, v)| *r = *v);
            } else {
                row.fill(1.);
            }
        }
        c
    }

    /// Encoded configurations as a (n, space.dim()) matrix
    pub fn get_config_array(&self, space: &ConfigSpace) -> Result<Array2<f64>> {
        Ok(space.to_array2(self.observations.iter().map(|o| &o.config))?)
    }

    /// Writes the history as JSON, creating parent directories
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        debug!("History saved in {:?}", path);
        Ok(())
    }

    /// Reads a history saved with [`History::save_json`], checking its configurations
    /// against the given space
    pub fn load_json<P: AsRef<Path>>(path: P, space: &ConfigSpace) -> Result<History> {
        let json = std::fs::read_to_string(path)?;
        let history: History = serde_json::from_str(&json)?;
        for obs in history.observations.iter() {
            space.validate(&obs.config)?;
            if obs.objectives.len() != history.num_objectives
                || obs.constraints.len() != history.num_constraints
            {
                return Err(OpenBoxError::InvalidValue(format!(
                    "inconsistent observation of {}",
                    obs.config
                )));
            }
        }
        Ok(history)
    }
}

fn objectives_matrix(observations: &[&Observation], num_objectives: usize) -> Array2<f64> {
    let mut y = Array2::zeros((observations.len(), num_objectives));
    for (mut row, o) in y.axis_iter_mut(Axis(0)).zip(observations.iter()) {
        row.iter_mut()
            .zip(o.objectives.iter())
            .for_each(|(r, v)| *r = *v);
    }
    y
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use openbox_space::Hyperparameter;
    use serial_test::serial;

    fn space() -> ConfigSpace {
        ConfigSpace::new()
            .add(Hyperparameter::float("x", 0., 10.))
            .unwrap()
            .add(Hyperparameter::categorical("c", ["a", "b"]))
            .unwrap()
    }

    fn conf(x: f64) -> Configuration {
        Configuration::new().with("x", x).with("c", "a")
    }

    fn obs(x: f64, objectives: Vec<f64>, constraints: Vec<f64>) -> Observation {
        Observation::new(
            conf(x),
            Evaluation::new(objectives).with_constraints(constraints),
            0.1,
        )
    }

    #[test]
    fn test_arity_check() {
        let mut history = History::new("test", 1, 1, None);
        assert!(history.update_observation(obs(1., vec![1.], vec![])).is_err());
        assert!(history
            .update_observation(obs(1., vec![1., 2.], vec![0.]))
            .is_err());
        assert!(history.update_observation(obs(1., vec![1.], vec![0.])).is_ok());
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_nan_is_failure() {
        let mut history = History::new("test", 1, 0, None);
        history
            .update_observation(obs(1., vec![f64::NAN], vec![]))
            .unwrap();
        assert_eq!(history.observations[0].trial_state, TrialState::Failed);
        assert_eq!(history.observations[0].objectives, vec![f64::MAX]);
        assert_eq!(history.get_incumbent_value(), None);
        let counts = history.get_trial_counts();
        assert_eq!((counts.success, counts.failed), (0, 1));
    }

    #[test]
    fn test_incumbents_with_constraints() {
        let mut history = History::new("test", 1, 1, None);
        history.update_observation(obs(1., vec![3.], vec![-1.])).unwrap();
        // infeasible but better
        history.update_observation(obs(2., vec![1.], vec![0.5])).unwrap();
        history.update_observation(obs(3., vec![2.], vec![0.])).unwrap();
        history.update_observation(obs(4., vec![2.], vec![-2.])).unwrap();
        assert_eq!(history.get_incumbent_value(), Some(2.));
        assert_eq!(history.get_incumbent_configs(), vec![conf(3.), conf(4.)]);
        assert!(history.contains(&conf(2.)));
        assert!(!history.contains(&conf(5.)));
    }

    #[test]
    fn test_transform_failed() {
        let mut history = History::new("test", 2, 1, None);
        history
            .update_observation(obs(1., vec![1., 5.], vec![-1.]))
            .unwrap();
        history
            .update_observation(Observation::failed(conf(2.), TrialState::Timeout, 2, 1, 3.))
            .unwrap();
        history
            .update_observation(obs(3., vec![4., 2.], vec![0.3]))
            .unwrap();
        let y = history.get_objectives(true);
        assert_eq!(y, array![[1., 5.], [4., 5.], [4., 2.]]);
        let y = history.get_objectives(false);
        assert_eq!(y[[1, 0]], f64::MAX);
        let c = history.get_constraints();
        assert_eq!(c, array![[-1.], [1.], [0.3]]);
        let counts = history.get_trial_counts();
        assert_eq!(counts.timeout, 1);
        assert_eq!(counts.failed, 1);

        let mut failed_only = History::new("test", 1, 0, None);
        failed_only
            .update_observation(Observation::failed(conf(2.), TrialState::Failed, 1, 0, 0.))
            .unwrap();
        assert_eq!(failed_only.get_objectives(true), array![[f64::MAX]]);
    }

    #[test]
    fn test_pareto_and_hypervolume() {
        let mut history = History::new("test", 2, 0, Some(vec![4., 4.]));
        for (i, y) in [[1., 3.], [2., 2.], [3., 1.], [3., 3.]].iter().enumerate() {
            history
                .update_observation(obs(i as f64, y.to_vec(), vec![]))
                .unwrap();
        }
        assert_eq!(history.get_pareto().len(), 3);
        assert_eq!(
            history.get_pareto_front(),
            array![[1., 3.], [2., 2.], [3., 1.]]
        );
        assert_abs_diff_eq!(history.get_mo_hypervolume(None).unwrap(), 6., epsilon = 1e-12);
        assert_abs_diff_eq!(
            history.get_mo_hypervolume(Some(&[3., 3.])).unwrap(),
            3.,
            epsilon = 1e-12
        );
        assert!(history.get_mo_hypervolume(Some(&[3.])).is_err());
    }

    #[test]
    fn test_config_array() {
        let mut history = History::new("test", 1, 0, None);
        history.update_observation(obs(5., vec![1.], vec![])).unwrap();
        let x = history.get_config_array(&space()).unwrap();
        assert_eq!(x.dim(), (1, 2));
        assert_abs_diff_eq!(x[[0, 0]], 0.5, epsilon = 1e-12);
    }

    #[test]
    #[serial]
    fn test_save_load_json() {
        let path = "target/tests/history/history_test.json";
        let _ = std::fs::remove_file(path);
        let mut history = History::new("test", 1, 1, None);
        history
            .update_observation(obs(1.5, vec![0.1], vec![-0.2]))
            .unwrap();
        let mut with_info = obs(2.5, vec![0.3], vec![0.2]);
        with_info.extra_info = Some(serde_json::json!({"note": "slow"}));
        history.update_observation(with_info).unwrap();
        history
            .update_observation(Observation::failed(conf(7.), TrialState::Timeout, 1, 1, 2.))
            .unwrap();
        history.save_json(path).unwrap();

        let loaded = History::load_json(path, &space()).unwrap();
        assert_eq!(loaded, history);

        let other = ConfigSpace::new()
            .add(Hyperparameter::float("y", 0., 1.))
            .unwrap();
        assert!(History::load_json(path, &other).is_err());
    }
}
