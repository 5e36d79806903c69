use crate::utils::{cdist, pdist, write_rng};
use crate::SamplingMethod;
use ndarray::{s, Array, Array2, ArrayBase, Axis, Data, Ix2, ShapeBuilder};
use ndarray_rand::{
    rand::seq::SliceRandom, rand::Rng, rand::SeedableRng, rand_distr::Uniform, RandomExt,
};
use ndarray_stats::QuantileExt;
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};
use std::cmp;
use std::sync::{Arc, RwLock};

/// Kinds of Latin Hypercube Design
#[derive(Clone, Debug, Default, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LhsKind {
    /// sample is choosen randomly within its latin hypercube intervals
    Classic,
    /// sample is the middle of its latin hypercube intervals
    Centered,
    /// distance between points is maximized
    #[default]
    Maximin,
    /// sample is the middle of its latin hypercube intervals and distance between points is maximized
    CenteredMaximin,
    /// samples locations is optimized using the Enhanced Stochastic Evolutionary algorithm (ESE)
    /// See Jin, R. and Chen, W. and Sudjianto, A. (2005), “An efficient algorithm for constructing
    /// optimal design of computer experiments.” Journal of Statistical Planning and Inference, 134:268-287.
    Optimized,
}

type RngRef<R> = Arc<RwLock<R>>;

/// The LHS design is built as follows: each dimension space is divided into ns sections
/// where ns is the number of sampling points, and one point in selected in each section.
/// The selection method gives different kind of LHS (see [LhsKind])
#[derive(Clone, Debug)]
pub struct Lhs<R: Rng> {
    /// Sampling space definition as a (nx, 2) matrix
    xlimits: Array2<f64>,
    /// The requested kind of LHS
    kind: LhsKind,
    /// Random generator used for reproducibility
    rng: RngRef<R>,
}

impl Lhs<Xoshiro256Plus> {
    /// Constructor given a design space given a (nx, 2) matrix \[\[lower bound, upper bound\], ...\]
    ///
    /// ```
    /// use openbox_space::Lhs;
    /// use ndarray::arr2;
    ///
    /// let doe = Lhs::new(&arr2(&[[0.0, 1.0], [5.0, 10.0]]));
    /// ```
    pub fn new(xlimits: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Self {
        Self::new_with_rng(xlimits, Xoshiro256Plus::from_entropy())
    }
}

impl<R: Rng> SamplingMethod for Lhs<R> {
    fn sampling_space(&self) -> &Array2<f64> {
        &self.xlimits
    }

    fn normalized_sample(&self, ns: usize) -> Array2<f64> {
        let nx = self.xlimits.nrows();
        if ns < 2 || nx == 0 {
            return self._classic_lhs(ns);
        }
        match &self.kind {
            LhsKind::Classic => self._classic_lhs(ns),
            LhsKind::Centered => self._centered_lhs(ns),
            LhsKind::Maximin => self._maximin_lhs(ns, false, 5),
            LhsKind::CenteredMaximin => self._maximin_lhs(ns, true, 5),
            LhsKind::Optimized => {
                let doe = self._classic_lhs(ns);
                let outer_loop = cmp::min((1.5 * nx as f64) as usize, 30).max(1);
                let inner_loop = cmp::min(20 * nx, 100);
                self._maximin_ese(&doe, outer_loop, inner_loop)
            }
        }
    }
}

impl<R: Rng> Lhs<R> {
    /// Constructor with given design space and random generator.
    /// * `xlimits`: (nx, 2) matrix where nx is the dimension of the samples and the ith row
    ///   is the definition interval of the ith component of x.
    /// * `rng`: random generator
    ///
    /// **Panics** if xlimits number of columns is different from 2.
    pub fn new_with_rng(xlimits: &ArrayBase<impl Data<Elem = f64>, Ix2>, rng: R) -> Self {
        if xlimits.ncols() != 2 {
            panic!("xlimits must have 2 columns (lower, upper)");
        }
        Lhs {
            xlimits: xlimits.to_owned(),
            kind: LhsKind::default(),
            rng: Arc::new(RwLock::new(rng)),
        }
    }

    /// Sets the kind of LHS
    pub fn kind(mut self, kind: LhsKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the random generator
    pub fn with_rng<R2: Rng>(self, rng: R2) -> Lhs<R2> {
        Lhs {
            xlimits: self.xlimits,
            kind: self.kind,
            rng: Arc::new(RwLock::new(rng)),
        }
    }

    fn _maximin_ese(&self, lhs: &Array2<f64>, outer_loop: usize, inner_loop: usize) -> Array2<f64> {
        let j_range = 20;
        let p = 10.;
        let t0 = 0.005 * self._phip(lhs, p);
        let tol = 1e-3;

        let mut t = t0;
        let mut lhs_own = lhs.to_owned();
        let mut lhs_best = lhs.to_owned();
        let nx = lhs.ncols();
        let mut phip = self._phip(&lhs_best, p);
        let mut phip_best = phip;

        for _ in 0..outer_loop {
            let mut n_acpt = 0.;
            let mut n_imp = 0.;

            for i in 0..inner_loop {
                let modulo = (i + 1) % nx;
                let mut l_x: Vec<Array2<f64>> = Vec::with_capacity(j_range);
                let mut l_phip: Vec<f64> = Vec::with_capacity(j_range);

                // j candidate plans obtained by a single column swap each
                let mut rng = write_rng(&self.rng);
                for j in 0..j_range {
                    l_x.push(lhs_own.to_owned());
                    let php = self._phip_swap(&mut l_x[j], modulo, phip, p, &mut *rng);
                    l_phip.push(php);
                }
                let lphip = Array::from_vec(l_phip);
                let k = lphip.argmin().unwrap_or(0);
                let phip_try = lphip[k];
                // threshold of acceptance
                if phip_try - phip <= t * rng.gen::<f64>() {
                    phip = phip_try;
                    n_acpt += 1.;
                    lhs_own = l_x.swap_remove(k);

                    if phip < phip_best {
                        lhs_best = lhs_own.to_owned();
                        phip_best = phip;
                        n_imp += 1.;
                    }
                }
            }
            let p_accpt = n_acpt / (inner_loop as f64);
            let p_imp = n_imp / (inner_loop as f64);

            if phip - phip_best > tol {
                if p_accpt >= 0.1 && p_imp < p_accpt {
                    t *= 0.8
                } else if !(p_accpt >= 0.1 && (p_imp - p_accpt).abs() < f64::EPSILON) {
                    t /= 0.8
                }
            } else if p_accpt <= 0.1 {
                t /= 0.7
            } else {
                t *= 0.9
            }
        }
        lhs_best
    }

    fn _phip(&self, lhs: &ArrayBase<impl Data<Elem = f64> + Sync, Ix2>, p: f64) -> f64 {
        pdist(lhs).mapv(|v| v.powf(-p)).sum().powf(1. / p)
    }

    fn _phip_swap(&self, x: &mut Array2<f64>, k: usize, phip: f64, p: f64, rng: &mut R) -> f64 {
        let i1 = rng.gen_range(0..x.nrows());
        let mut i2 = rng.gen_range(0..x.nrows());
        while i2 == i1 {
            i2 = rng.gen_range(0..x.nrows());
        }
        let mut x_rest = Array2::zeros((x.nrows() - 2, x.ncols()));
        let mut row_i = 0;
        for (i, row) in x.axis_iter(Axis(0)).enumerate() {
            if i != i1 && i != i2 {
                x_rest.row_mut(row_i).assign(&row);
                row_i += 1;
            }
        }

        let mut dist1 = cdist(&x.slice(s![i1..i1 + 1, ..]), &x_rest);
        let mut dist2 = cdist(&x.slice(s![i2..i2 + 1, ..]), &x_rest);

        let m1 = x_rest.column(k).mapv(|v| (v - x[[i1, k]]).powi(2));
        let m2 = x_rest.column(k).mapv(|v| (v - x[[i2, k]]).powi(2));

        let mut d1 = dist1.mapv(|v| v * v) - &m1 + &m2;
        d1.mapv_inplace(|v| v.powf(-p / 2.));
        let mut d2 = dist2.mapv(|v| v * v) + &m1 - &m2;
        d2.mapv_inplace(|v| v.powf(-p / 2.));

        dist1.mapv_inplace(|v| v.powf(-p));
        dist2.mapv_inplace(|v| v.powf(-p));
        let res = (d1 - dist1).sum() + (d2 - dist2).sum();

        x.swap([i1, k], [i2, k]);
        (phip.powf(p) + res).powf(1. / p)
    }

    fn _classic_lhs(&self, ns: usize) -> Array2<f64> {
        let nx = self.xlimits.nrows();
        let cut = Array::linspace(0., 1., ns + 1);

        let mut rng = write_rng(&self.rng);
        let rnd = Array::random_using((ns, nx).f(), Uniform::new(0., 1.), &mut *rng);
        let a = cut.slice(s![..ns]).to_owned();
        let b = cut.slice(s![1..(ns + 1)]);
        let c = &b - &a;
        let mut lhs = Array::zeros((ns, nx).f());
        for j in 0..nx {
            let mut colj = rnd.column(j).to_vec();
            for (i, v) in colj.iter_mut().enumerate() {
                *v = *v * c[i] + a[i];
            }
            colj.shuffle(&mut *rng);
            lhs.column_mut(j).assign(&Array::from_vec(colj));
        }
        lhs
    }

    fn _centered_lhs(&self, ns: usize) -> Array2<f64> {
        let nx = self.xlimits.nrows();
        let cut = Array::linspace(0., 1., ns + 1);

        let a = cut.slice(s![..ns]).to_owned();
        let b = cut.slice(s![1..(ns + 1)]);
        let mut c = ((a + b) / 2.).to_vec();
        let mut lhs = Array::zeros((ns, nx).f());

        let mut rng = write_rng(&self.rng);
        for j in 0..nx {
            c.shuffle(&mut *rng);
            lhs.column_mut(j).assign(&Array::from_vec(c.clone()));
        }
        lhs
    }

    fn _maximin_lhs(&self, ns: usize, centered: bool, max_iters: usize) -> Array2<f64> {
        let draw = |this: &Self| {
            if centered {
                this._centered_lhs(ns)
            } else {
                this._classic_lhs(ns)
            }
        };
        let mut lhs_maximin = draw(self);
        let mut max_dist = pdist(&lhs_maximin).min().copied().unwrap_or(0.);
        for _ in 1..max_iters {
            let lhs = draw(self);
            let d_min = pdist(&lhs).min().copied().unwrap_or(0.);
            if max_dist < d_min {
                max_dist = d_min;
                lhs_maximin = lhs;
            }
        }
        lhs_maximin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_abs_diff_ne};
    use ndarray::{arr2, array};

    fn assert_latin(doe: &Array2<f64>) {
        let ns = doe.nrows();
        for col in doe.columns() {
            let mut bins: Vec<usize> = col
                .iter()
                .map(|v| ((v * ns as f64).floor() as usize).min(ns - 1))
                .collect();
            bins.sort();
            assert_eq!(bins, (0..ns).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_lhs_is_latin() {
        let xlimits = arr2(&[[0., 1.], [0., 1.], [0., 1.]]);
        for kind in [
            LhsKind::Classic,
            LhsKind::Centered,
            LhsKind::Maximin,
            LhsKind::CenteredMaximin,
            LhsKind::Optimized,
        ] {
            let doe = Lhs::new(&xlimits)
                .kind(kind)
                .with_rng(Xoshiro256Plus::seed_from_u64(42))
                .sample(7);
            assert_latin(&doe);
        }
    }

    #[test]
    fn test_lhs_bounds() {
        let xlimits = arr2(&[[5., 10.], [0., 1.]]);
        let doe = Lhs::new(&xlimits)
            .with_rng(Xoshiro256Plus::seed_from_u64(42))
            .sample(5);
        assert!(doe.column(0).iter().all(|v| (5. ..=10.).contains(v)));
        assert!(doe.column(1).iter().all(|v| (0. ..=1.).contains(v)));
    }

    #[test]
    fn test_centered_lhs() {
        let xlimits = arr2(&[[5., 10.], [0., 1.]]);
        let actual = Lhs::new(&xlimits)
            .with_rng(Xoshiro256Plus::seed_from_u64(0))
            .kind(LhsKind::Centered)
            .sample(5);
        let mut col0 = actual.column(0).to_vec();
        col0.sort_by(|a, b| a.total_cmp(b));
        assert_abs_diff_eq!(
            Array::from_vec(col0),
            array![5.5, 6.5, 7.5, 8.5, 9.5],
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_phip_swap_keeps_latin() {
        let xlimits = arr2(&[[0., 1.], [0., 1.]]);
        let lhs = Lhs::new(&xlimits).with_rng(Xoshiro256Plus::seed_from_u64(42));
        let mut p0 = lhs.clone().kind(LhsKind::Centered).normalized_sample(10);
        let phip = lhs._phip(&p0, 10.);
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let lhs = lhs.with_rng(Xoshiro256Plus::seed_from_u64(1));
        let res = lhs._phip_swap(&mut p0, 1, phip, 10., &mut rng);
        assert!(res.is_finite());
        assert_abs_diff_eq!(res, lhs._phip(&p0, 10.), epsilon = 1e-4);
        assert_latin(&p0);
    }

    #[test]
    fn test_no_duplicate() {
        let xlimits = arr2(&[[5., 10.], [0., 1.]]);
        let lhs = Lhs::new(&xlimits).with_rng(Xoshiro256Plus::seed_from_u64(42));
        let sample1 = lhs.sample(5);
        let sample2 = lhs.sample(5);
        assert_abs_diff_ne!(sample1, sample2);
    }

    #[test]
    fn test_single_sample() {
        let xlimits = arr2(&[[0., 1.], [0., 1.]]);
        let doe = Lhs::new(&xlimits).sample(1);
        assert_eq!(doe.dim(), (1, 2));
    }
}
