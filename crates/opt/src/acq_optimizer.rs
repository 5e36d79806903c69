//! Maximization of acquisition functions over a configuration space.
use crate::acquisition::AcquisitionFunction;
use crate::errors::{OpenBoxError, Result};
use crate::history::History;

use log::{debug, warn};
use ndarray::{arr1, Array1, ArrayView2};
use ndarray_rand::rand::{Rng, SeedableRng};
use openbox_space::{ConfigSpace, Configuration};
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Strategy used to maximize the acquisition function
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcqOptimizerType {
    /// Random search interleaved with one-exchange local searches
    #[default]
    LocalRandom,
    /// Random search refined with COBYLA in the encoded unit hypercube,
    /// for spaces without categorical hyperparameters
    RandomCobyla,
}

/// Maximizer of acquisition functions returning ranked candidates
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AcqOptimizer {
    kind: AcqOptimizerType,
    /// Size of the random pool
    n_random: usize,
    /// Number of local searches
    n_local_starts: usize,
    /// Max number of moves of a local search
    max_local_steps: usize,
    /// Neighbours evaluated at each local move
    n_neighbors: usize,
    /// Number of pool candidates refined by COBYLA
    n_cobyla_starts: usize,
    /// Evaluation budget of each COBYLA run
    cobyla_max_eval: usize,
}

impl Default for AcqOptimizer {
    fn default() -> Self {
        AcqOptimizer {
            kind: AcqOptimizerType::default(),
            n_random: 1000,
            n_local_starts: 10,
            max_local_steps: 20,
            n_neighbors: 50,
            n_cobyla_starts: 5,
            cobyla_max_eval: 200,
        }
    }
}

impl AcqOptimizer {
    /// Constructor given the maximization strategy
    pub fn new(kind: AcqOptimizerType) -> Self {
        AcqOptimizer {
            kind,
            ..Default::default()
        }
    }

    /// Sets the size of the random pool
    pub fn n_random(mut self, n_random: usize) -> Self {
        self.n_random = n_random.max(1);
        self
    }

    /// Sets the number of local searches
    pub fn n_local_starts(mut self, n_local_starts: usize) -> Self {
        self.n_local_starts = n_local_starts;
        self
    }

    /// Sets the max number of moves of a local search
    pub fn max_local_steps(mut self, max_local_steps: usize) -> Self {
        self.max_local_steps = max_local_steps;
        self
    }

    /// Sets the number of candidates refined by COBYLA
    pub fn n_cobyla_starts(mut self, n_cobyla_starts: usize) -> Self {
        self.n_cobyla_starts = n_cobyla_starts;
        self
    }

    /// Maximization strategy
    pub fn kind(&self) -> AcqOptimizerType {
        self.kind
    }

    /// Returns distinct configurations not yet in `history` sorted by decreasing
    /// acquisition values
    pub fn maximize(
        &self,
        space: &ConfigSpace,
        acq: &dyn AcquisitionFunction,
        history: &History,
        rng: &mut Xoshiro256Plus,
    ) -> Result<Vec<(f64, Configuration)>> {
        let pool = space.sample_configurations(self.n_random, rng);
        let pool_values = score(space, acq, &pool)?;
        let mut scored: Vec<(f64, Configuration)> = pool_values.into_iter().zip(pool).collect();
        sort_desc(&mut scored);

        match self.kind {
            AcqOptimizerType::LocalRandom if acq.pointwise() => {
                let mut starts: Vec<Configuration> = vec![];
                let n_history_starts = self.n_local_starts / 2;
                if n_history_starts > 0 && !history.is_empty() {
                    let evaluated: Vec<Configuration> = history
                        .observations
                        .iter()
                        .filter(|o| o.trial_state.is_success())
                        .map(|o| o.config.clone())
                        .collect();
                    let values = score(space, acq, &evaluated)?;
                    let mut ranked: Vec<(f64, Configuration)> =
                        values.into_iter().zip(evaluated).collect();
                    sort_desc(&mut ranked);
                    starts.extend(ranked.into_iter().take(n_history_starts).map(|(_, c)| c));
                }
                let n_pool_starts = self.n_local_starts - starts.len();
                starts.extend(scored.iter().take(n_pool_starts).map(|(_, c)| c.clone()));

                let seeds: Vec<u64> = starts.iter().map(|_| rng.gen()).collect();
                let local: Vec<Vec<(f64, Configuration)>> = starts
                    .into_par_iter()
                    .zip(seeds)
                    .map(|(start, seed)| {
                        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
                        self.local_search(space, acq, start, &mut rng)
                    })
                    .collect::<Result<_>>()?;
                scored.extend(local.into_iter().flatten());
            }
            AcqOptimizerType::LocalRandom => {
                debug!("{} criterion is not pointwise, local search skipped", acq.name())
            }
            AcqOptimizerType::RandomCobyla => {
                if space.categorical_mask().iter().any(|c| *c) {
                    return Err(OpenBoxError::InvalidConfigError(
                        "RandomCobyla acquisition optimizer requires a space without categorical hyperparameter".to_string(),
                    ));
                }
                if acq.pointwise() {
                    let refined = scored
                        .iter()
                        .take(self.n_cobyla_starts)
                        .collect::<Vec<_>>()
                        .par_iter()
                        .map(|(_, start)| self.cobyla_refine(space, acq, start))
                        .collect::<Result<Vec<_>>>()?;
                    scored.extend(refined);
                }
            }
        }

        let mut seen = HashSet::new();
        scored.retain(|(v, c)| !v.is_nan() && !history.contains(c) && seen.insert(c.clone()));
        sort_desc(&mut scored);
        debug!(
            "Acquisition {} maximized over {} candidates, best = {:?}",
            acq.name(),
            scored.len(),
            scored.first().map(|(v, _)| *v)
        );
        Ok(scored)
    }

    /// Greedy hill climbing on one-exchange neighbours, returns the visited configurations
    fn local_search(
        &self,
        space: &ConfigSpace,
        acq: &dyn AcquisitionFunction,
        start: Configuration,
        rng: &mut Xoshiro256Plus,
    ) -> Result<Vec<(f64, Configuration)>> {
        let mut current_value = score(space, acq, std::slice::from_ref(&start))?[0];
        let mut current = start;
        let mut visited = vec![];
        for _ in 0..self.max_local_steps {
            let neighbors = space.neighbors(&current, self.n_neighbors, rng)?;
            if neighbors.is_empty() {
                break;
            }
            let values = score(space, acq, &neighbors)?;
            let (best, best_value) = values
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, v)| (i, *v))
                .unwrap_or((0, f64::NEG_INFINITY));
            if best_value <= current_value {
                break;
            }
            visited.push((current_value, current));
            current = neighbors[best].clone();
            current_value = best_value;
        }
        visited.push((current_value, current));
        Ok(visited)
    }

    /// COBYLA maximization of the acquisition in the encoded space from `start`
    fn cobyla_refine(
        &self,
        space: &ConfigSpace,
        acq: &dyn AcquisitionFunction,
        start: &Configuration,
    ) -> Result<(f64, Configuration)> {
        use cobyla::{minimize, Func, RhoBeg, StopTols};

        let x0 = space.to_array(start)?;
        let bounds: Vec<(f64, f64)> = space
            .bounds()
            .rows()
            .into_iter()
            .map(|r| (r[0], r[1]))
            .collect();
        let obj = |x: &[f64], _u: &mut ()| -> f64 {
            if x.iter().any(|v| v.is_nan()) {
                return f64::INFINITY;
            }
            match ArrayView2::from_shape((1, x.len()), x)
                .map_err(|e| OpenBoxError::InvalidValue(e.to_string()))
                .and_then(|pt| acq.values(&pt))
            {
                Ok(v) => -v[0],
                Err(_) => f64::INFINITY,
            }
        };
        let cons: Vec<&dyn Func<()>> = vec![];
        let x_opt = match minimize(
            obj,
            &x0.to_vec(),
            &bounds,
            &cons,
            (),
            self.cobyla_max_eval,
            RhoBeg::All(0.1),
            Some(StopTols {
                ftol_rel: 1e-6,
                ..StopTols::default()
            }),
        ) {
            Ok((_, x_opt, _)) => x_opt,
            Err((status, x_opt, _)) => {
                warn!("Cobyla acquisition optimization status={status:?}");
                x_opt
            }
        };
        let config = space.from_array(&arr1(&x_opt));
        let value = score(space, acq, std::slice::from_ref(&config))?[0];
        Ok((value, config))
    }
}

/// Acquisition values of configurations
fn score(
    space: &ConfigSpace,
    acq: &dyn AcquisitionFunction,
    configs: &[Configuration],
) -> Result<Array1<f64>> {
    if configs.is_empty() {
        return Ok(Array1::zeros(0));
    }
    let x = space.to_array2(configs)?;
    acq.values(&x.view())
}

fn sort_desc(scored: &mut [(f64, Configuration)]) {
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
}
