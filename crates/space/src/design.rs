use crate::errors::Result;
use crate::halton::Halton;
use crate::lhs::{Lhs, LhsKind};
use crate::space::{ConfigSpace, Configuration};
use crate::utils::cdist;
use crate::SamplingMethod;
use log::debug;
use ndarray::{Array1, Array2, Axis};
use ndarray_rand::rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Size factor of the candidate pool used by [`InitStrategy::RandomExploreFirst`]
const EXPLORE_POOL_FACTOR: usize = 100;
/// Number of extra draws allowed to replace duplicated configurations
const MAX_DUPLICATE_DRAWS: usize = 1000;

/// Strategy used to build the initial design of an optimization
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitStrategy {
    /// Default configuration completed with random ones
    Default,
    /// Random configurations only
    Random,
    /// Default configuration then configurations picked from a random pool
    /// so as to maximize their distance to the ones already picked
    #[default]
    RandomExploreFirst,
    /// Default configuration then a maximin latin hypercube design
    LatinHypercube,
    /// Default configuration then a Halton sequence
    Halton,
}

impl ConfigSpace {
    /// Returns `n` distinct configurations following the given strategy.
    ///
    /// Fewer configurations are returned when the space holds less than `n`
    /// distinct configurations, a space of constants giving a single one.
    pub fn initial_design<R: Rng>(
        &self,
        strategy: InitStrategy,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<Configuration>> {
        let n = match self.cardinality() {
            Some(card) => n.min(card),
            None => n,
        };
        if n == 0 {
            return Ok(vec![]);
        }
        if self.dim() == 0 {
            return Ok(vec![self.default_configuration()]);
        }

        let mut design = Vec::with_capacity(n);
        if strategy != InitStrategy::Random {
            design.push(self.default_configuration());
        }
        let remaining = n - design.len();
        let candidates = match strategy {
            InitStrategy::Default | InitStrategy::Random => {
                self.sample_configurations(remaining, rng)
            }
            InitStrategy::LatinHypercube => {
                let doe = Lhs::new(&self.unit_limits())
                    .kind(LhsKind::Maximin)
                    .with_rng(Xoshiro256Plus::seed_from_u64(rng.gen()))
                    .sample(remaining);
                self.unit_configurations(&doe)
            }
            InitStrategy::Halton => {
                let doe = Halton::new(&self.unit_limits())
                    .with_rng(Xoshiro256Plus::seed_from_u64(rng.gen()))
                    .sample(remaining);
                self.unit_configurations(&doe)
            }
            InitStrategy::RandomExploreFirst => {
                self.explore_first(&design, remaining, rng)?
            }
        };

        let mut seen: HashSet<Configuration> = design.iter().cloned().collect();
        for c in candidates {
            if design.len() >= n {
                break;
            }
            if seen.insert(c.clone()) {
                design.push(c);
            }
        }
        let mut draws = 0;
        while design.len() < n && draws < MAX_DUPLICATE_DRAWS {
            let c = self.sample_configuration(rng);
            if seen.insert(c.clone()) {
                design.push(c);
            }
            draws += 1;
        }
        debug!(
            "Initial design ({:?}): {} configurations",
            strategy,
            design.len()
        );
        Ok(design)
    }

    fn unit_limits(&self) -> Array2<f64> {
        let mut xlimits = Array2::zeros((self.dim(), 2));
        xlimits.column_mut(1).fill(1.);
        xlimits
    }

    fn unit_configurations(&self, doe: &Array2<f64>) -> Vec<Configuration> {
        doe.rows()
            .into_iter()
            .map(|u| self.from_unit(&u))
            .collect()
    }

    /// Greedy maximin selection among a random pool
    fn explore_first<R: Rng>(
        &self,
        chosen: &[Configuration],
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<Configuration>> {
        let pool = self.sample_configurations(EXPLORE_POOL_FACTOR * n, rng);
        let xpool = pool
            .iter()
            .map(|c| self.to_unit_array(c))
            .collect::<Result<Vec<_>>>()?;
        let xpool = stack_rows(&xpool, self.dim());

        let mut min_dist = Array1::from_elem(pool.len(), f64::INFINITY);
        for c in chosen {
            let x = self.to_unit_array(c)?.insert_axis(Axis(0));
            let d = cdist(&xpool, &x);
            min_dist.zip_mut_with(&d.column(0), |m, v| *m = m.min(*v));
        }

        let mut res = Vec::with_capacity(n);
        let mut taken = vec![false; pool.len()];
        for _ in 0..n {
            let best = min_dist
                .iter()
                .enumerate()
                .filter(|(i, _)| !taken[*i])
                .max_by(|(_, a), (_, b)| a.total_cmp(b))
                .map(|(i, _)| i);
            let Some(best) = best else { break };
            taken[best] = true;
            res.push(pool[best].clone());
            let x = xpool.row(best).to_owned().insert_axis(Axis(0));
            let d = cdist(&xpool, &x);
            min_dist.zip_mut_with(&d.column(0), |m, v| *m = m.min(*v));
        }
        Ok(res)
    }
}

fn stack_rows(rows: &[Array1<f64>], dim: usize) -> Array2<f64> {
    let mut x = Array2::zeros((rows.len(), dim));
    for (mut row, r) in x.rows_mut().into_iter().zip(rows) {
        row.assign(r);
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Hyperparameter;

    fn space() -> ConfigSpace {
        ConfigSpace::new()
            .add(Hyperparameter::float("x1", -5., 10.))
            .unwrap()
            .add(Hyperparameter::float("x2", 0., 15.))
            .unwrap()
            .add(Hyperparameter::categorical("c", ["a", "b"]))
            .unwrap()
    }

    #[test]
    fn test_initial_designs() {
        let space = space();
        for strategy in [
            InitStrategy::Default,
            InitStrategy::Random,
            InitStrategy::RandomExploreFirst,
            InitStrategy::LatinHypercube,
            InitStrategy::Halton,
        ] {
            let mut rng = Xoshiro256Plus::seed_from_u64(42);
            let design = space.initial_design(strategy, 8, &mut rng).unwrap();
            assert_eq!(design.len(), 8, "{strategy:?}");
            let distinct: HashSet<_> = design.iter().collect();
            assert_eq!(distinct.len(), 8);
            for c in design.iter() {
                space.validate(c).unwrap();
            }
            if strategy != InitStrategy::Random {
                assert_eq!(design[0], space.default_configuration());
            }
        }
    }

    #[test]
    fn test_explore_first_spreads() {
        let space = ConfigSpace::new()
            .add(Hyperparameter::float("x", 0., 1.))
            .unwrap();
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        let design = space
            .initial_design(InitStrategy::RandomExploreFirst, 3, &mut rng)
            .unwrap();
        // default is the middle, so next picks go to the edges
        let mut xs: Vec<f64> = design.iter().map(|c| c.get_f64("x").unwrap()).collect();
        xs.sort_by(f64::total_cmp);
        assert!(xs[0] < 0.1);
        assert!(xs[2] > 0.9);
    }

    #[test]
    fn test_small_spaces() {
        let space = ConfigSpace::new()
            .add(Hyperparameter::categorical("c", ["a", "b", "c"]))
            .unwrap();
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        let design = space
            .initial_design(InitStrategy::Default, 10, &mut rng)
            .unwrap();
        assert_eq!(design.len(), 3);

        let space = ConfigSpace::new()
            .add(Hyperparameter::constant("k", 1.5))
            .unwrap();
        let design = space
            .initial_design(InitStrategy::LatinHypercube, 5, &mut rng)
            .unwrap();
        assert_eq!(design.len(), 1);
    }
}
