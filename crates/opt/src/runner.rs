//! Evaluation of the objective function on a single configuration.
use crate::history::{Evaluation, Observation, TrialState};

use log::{debug, warn};
use openbox_space::Configuration;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;
use web_time::Instant;

/// An interface for the objective function to be minimized.
///
/// The function returns objective values and constraint values (feasible when
/// non positive) of a configuration. Any error returned (or panic raised) by the
/// function marks the trial as failed without stopping the optimization.
pub trait ObjectiveFn:
    Clone + Fn(&Configuration) -> anyhow::Result<Evaluation> + Send + Sync + 'static
{
}
impl<T> ObjectiveFn for T where
    T: Clone + Fn(&Configuration) -> anyhow::Result<Evaluation> + Send + Sync + 'static
{
}

enum Outcome {
    Done(Evaluation),
    Failed(String),
    Timeout,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

fn evaluate<O: ObjectiveFn>(objective: &O, config: &Configuration) -> Outcome {
    match panic::catch_unwind(AssertUnwindSafe(|| objective(config))) {
        Ok(Ok(evaluation)) => Outcome::Done(evaluation),
        Ok(Err(err)) => Outcome::Failed(format!("{err:#}")),
        Err(payload) => Outcome::Failed(format!("panicked: {}", panic_message(payload))),
    }
}

fn evaluate_within<O: ObjectiveFn>(
    objective: &O,
    config: &Configuration,
    time_limit: f64,
) -> Outcome {
    let (tx, rx) = mpsc::channel();
    let fobj = objective.clone();
    let conf = config.clone();
    // A trial which exceeds its time limit is left running detached
    let spawned = std::thread::Builder::new()
        .name("openbox-trial".to_string())
        .spawn(move || {
            let _ = tx.send(evaluate(&fobj, &conf));
        });
    if let Err(err) = spawned {
        return Outcome::Failed(format!("cannot spawn trial thread: {err}"));
    }
    let limit = Duration::try_from_secs_f64(time_limit).unwrap_or(Duration::MAX);
    match rx.recv_timeout(limit) {
        Ok(outcome) => outcome,
        Err(RecvTimeoutError::Timeout) => Outcome::Timeout,
        Err(RecvTimeoutError::Disconnected) => {
            Outcome::Failed("trial thread ended without result".to_string())
        }
    }
}

/// Runs the objective on `config` and returns the resulting observation.
///
/// With a `time_limit` (in seconds), the objective runs on a dedicated thread
/// and a result not available in time gives a [`TrialState::Timeout`] observation.
/// Errors, panics and results with unexpected numbers of objectives or
/// constraints give [`TrialState::Failed`] observations.
pub fn run_trial<O: ObjectiveFn>(
    objective: &O,
    config: &Configuration,
    time_limit: Option<f64>,
    num_objectives: usize,
    num_constraints: usize,
) -> Observation {
    let start = Instant::now();
    let outcome = match time_limit {
        Some(limit) => evaluate_within(objective, config, limit),
        None => evaluate(objective, config),
    };
    let elapsed = start.elapsed().as_secs_f64();

    let failed = |state| {
        Observation::failed(
            config.clone(),
            state,
            num_objectives,
            num_constraints,
            elapsed,
        )
    };
    match outcome {
        Outcome::Done(evaluation) => {
            if evaluation.objectives.len() != num_objectives
                || evaluation.constraints.len() != num_constraints
            {
                warn!(
                    "Trial {config} returned {} objectives and {} constraints, expected {num_objectives} and {num_constraints}",
                    evaluation.objectives.len(),
                    evaluation.constraints.len()
                );
                failed(TrialState::Failed)
            } else {
                debug!("Trial {config} done in {elapsed:.3}s");
                Observation::new(config.clone(), evaluation, elapsed)
            }
        }
        Outcome::Failed(msg) => {
            warn!("Trial {config} failed: {msg}");
            failed(TrialState::Failed)
        }
        Outcome::Timeout => {
            warn!(
                "Trial {config} exceeded its time limit of {}s",
                time_limit.unwrap_or_default()
            );
            failed(TrialState::Timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conf(x: f64) -> Configuration {
        Configuration::new().with("x", x)
    }

    fn square(c: &Configuration) -> anyhow::Result<Evaluation> {
        let x = c
            .get_f64("x")
            .ok_or_else(|| anyhow::anyhow!("missing x"))?;
        if x < 0. {
            anyhow::bail!("negative input");
        }
        if x > 100. {
            panic!("too large");
        }
        if x > 10. {
            std::thread::sleep(Duration::from_millis(1500));
        }
        Ok(Evaluation::from(x * x))
    }

    #[test]
    fn test_success() {
        let obs = run_trial(&square, &conf(3.), None, 1, 0);
        assert_eq!(obs.trial_state, TrialState::Success);
        assert_eq!(obs.objectives, vec![9.]);
        assert!(obs.elapsed_time >= 0.);
        let obs = run_trial(&square, &conf(3.), Some(10.), 1, 0);
        assert_eq!(obs.objectives, vec![9.]);
    }

    #[test]
    fn test_error_and_panic_are_failures() {
        let obs = run_trial(&square, &conf(-1.), None, 1, 0);
        assert_eq!(obs.trial_state, TrialState::Failed);
        assert_eq!(obs.objectives, vec![f64::MAX]);
        let obs = run_trial(&square, &conf(200.), None, 1, 0);
        assert_eq!(obs.trial_state, TrialState::Failed);
        let obs = run_trial(&square, &conf(200.), Some(5.), 1, 0);
        assert_eq!(obs.trial_state, TrialState::Failed);
    }

    #[test]
    fn test_timeout() {
        let obs = run_trial(&square, &conf(20.), Some(0.2), 1, 0);
        assert_eq!(obs.trial_state, TrialState::Timeout);
        assert_eq!(obs.objectives, vec![f64::MAX]);
        assert!(obs.elapsed_time >= 0.2);
        assert!(obs.elapsed_time < 1.5);
    }

    #[test]
    fn test_wrong_arity() {
        let obs = run_trial(&square, &conf(2.), None, 2, 0);
        assert_eq!(obs.trial_state, TrialState::Failed);
        assert_eq!(obs.objectives, vec![f64::MAX, f64::MAX]);
        let obs = run_trial(&square, &conf(2.), None, 1, 1);
        assert_eq!(obs.trial_state, TrialState::Failed);
        assert_eq!(obs.constraints.len(), 1);
    }
}
