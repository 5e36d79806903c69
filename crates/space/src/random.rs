use crate::utils::write_rng;
use crate::SamplingMethod;
use ndarray::{Array, Array2, ArrayBase, Data, Ix2};
use ndarray_rand::{rand::Rng, rand::SeedableRng, rand_distr::Uniform, RandomExt};
use rand_xoshiro::Xoshiro256Plus;
use std::sync::{Arc, RwLock};

type RngRef<R> = Arc<RwLock<R>>;

/// The Random design consists in drawing samples uniformly.
#[derive(Clone, Debug)]
pub struct Random<R: Rng> {
    /// Sampling space definition as a (nx, 2) matrix
    /// The ith row is the [lower_bound, upper_bound] of xi, the ith component of x
    xlimits: Array2<f64>,
    /// Random generator used for reproducibility
    rng: RngRef<R>,
}

impl Random<Xoshiro256Plus> {
    /// Constructor given a design space given a (nx, 2) matrix \[\[lower bound, upper bound\], ...\]
    ///
    /// ```
    /// use openbox_space::Random;
    /// use ndarray::arr2;
    ///
    /// let doe = Random::new(&arr2(&[[0.0, 1.0], [5.0, 10.0]]));
    /// ```
    pub fn new(xlimits: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Self {
        Self::new_with_rng(xlimits, Xoshiro256Plus::from_entropy())
    }
}

impl<R: Rng> Random<R> {
    /// Constructor with given design space and random generator.
    ///
    /// **Panics** if xlimits number of columns is different from 2.
    pub fn new_with_rng(xlimits: &ArrayBase<impl Data<Elem = f64>, Ix2>, rng: R) -> Self {
        if xlimits.ncols() != 2 {
            panic!("xlimits must have 2 columns (lower, upper)");
        }
        Random {
            xlimits: xlimits.to_owned(),
            rng: Arc::new(RwLock::new(rng)),
        }
    }

    /// Set random generator
    pub fn with_rng<R2: Rng>(self, rng: R2) -> Random<R2> {
        Random {
            xlimits: self.xlimits,
            rng: Arc::new(RwLock::new(rng)),
        }
    }
}

impl<R: Rng> SamplingMethod for Random<R> {
    fn sampling_space(&self) -> &Array2<f64> {
        &self.xlimits
    }

    fn normalized_sample(&self, ns: usize) -> Array2<f64> {
        let mut rng = write_rng(&self.rng);
        let nx = self.xlimits.nrows();
        Array::random_using((ns, nx), Uniform::new(0., 1.), &mut *rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_ne;
    use ndarray::arr2;

    #[test]
    fn test_random_within_bounds() {
        let xlimits = arr2(&[[5., 10.], [0., 1.]]);
        let actual = Random::new(&xlimits)
            .with_rng(Xoshiro256Plus::seed_from_u64(42))
            .sample(50);
        assert_eq!(actual.dim(), (50, 2));
        assert!(actual.column(0).iter().all(|v| (5. ..=10.).contains(v)));
        assert!(actual.column(1).iter().all(|v| (0. ..=1.).contains(v)));
    }

    #[test]
    fn test_random_reproducible() {
        let xlimits = arr2(&[[5., 10.], [0., 1.]]);
        let s1 = Random::new(&xlimits)
            .with_rng(Xoshiro256Plus::seed_from_u64(42))
            .sample(9);
        let s2 = Random::new(&xlimits)
            .with_rng(Xoshiro256Plus::seed_from_u64(42))
            .sample(9);
        assert_eq!(s1, s2);
        let s3 = Random::new(&xlimits)
            .with_rng(Xoshiro256Plus::seed_from_u64(43))
            .sample(9);
        assert_abs_diff_ne!(s1, s3);
    }
}
