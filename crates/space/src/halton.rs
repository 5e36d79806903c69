use crate::utils::write_rng;
use crate::SamplingMethod;
use ndarray::{Array2, ArrayBase, Data, Ix2};
use ndarray_rand::rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use std::sync::{Arc, RwLock};

const PRIMES: [u64; 32] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97,
    101, 103, 107, 109, 113, 127, 131,
];

/// Returns the first `n` prime numbers
fn primes(n: usize) -> Vec<u64> {
    if n <= PRIMES.len() {
        return PRIMES[..n].to_vec();
    }
    let mut res = PRIMES.to_vec();
    let mut candidate = PRIMES[PRIMES.len() - 1] + 2;
    while res.len() < n {
        if res
            .iter()
            .take_while(|p| *p * *p <= candidate)
            .all(|p| candidate % p != 0)
        {
            res.push(candidate);
        }
        candidate += 2;
    }
    res
}

/// Van der Corput radical inverse of `index` in given `base`
fn radical_inverse(mut index: u64, base: u64) -> f64 {
    let inv_base = 1. / base as f64;
    let mut factor = inv_base;
    let mut res = 0.;
    while index > 0 {
        res += (index % base) as f64 * factor;
        index /= base;
        factor *= inv_base;
    }
    res
}

/// The Halton design is a low discrepancy sequence using the radical inverse
/// of the sample index in successive prime bases, one base per dimension.
///
/// A random offset of the sequence start index (drawn with the random generator)
/// gives different designs from one call to another.
#[derive(Clone, Debug)]
pub struct Halton<R: Rng> {
    xlimits: Array2<f64>,
    /// Number of leading sequence elements to skip (0 is always skipped)
    skip: u64,
    rng: Arc<RwLock<R>>,
}

impl Halton<Xoshiro256Plus> {
    /// Constructor given a design space given a (nx, 2) matrix \[\[lower bound, upper bound\], ...\]
    pub fn new(xlimits: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Self {
        Self::new_with_rng(xlimits, Xoshiro256Plus::from_entropy())
    }
}

impl<R: Rng> Halton<R> {
    /// Constructor with given design space and random generator.
    ///
    /// **Panics** if xlimits number of columns is different from 2.
    pub fn new_with_rng(xlimits: &ArrayBase<impl Data<Elem = f64>, Ix2>, rng: R) -> Self {
        if xlimits.ncols() != 2 {
            panic!("xlimits must have 2 columns (lower, upper)");
        }
        Halton {
            xlimits: xlimits.to_owned(),
            skip: 0,
            rng: Arc::new(RwLock::new(rng)),
        }
    }

    /// Sets a deterministic number of sequence elements to skip,
    /// disabling the random start offset
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    /// Sets the random generator
    pub fn with_rng<R2: Rng>(self, rng: R2) -> Halton<R2> {
        Halton {
            xlimits: self.xlimits,
            skip: self.skip,
            rng: Arc::new(RwLock::new(rng)),
        }
    }
}

impl<R: Rng> SamplingMethod for Halton<R> {
    fn sampling_space(&self) -> &Array2<f64> {
        &self.xlimits
    }

    fn normalized_sample(&self, ns: usize) -> Array2<f64> {
        let nx = self.xlimits.nrows();
        let bases = primes(nx);
        let start = if self.skip > 0 {
            self.skip
        } else {
            write_rng(&self.rng).gen_range(0..1000u64)
        };
        Array2::from_shape_fn((ns, nx), |(i, j)| {
            radical_inverse(start + 1 + i as u64, bases[j])
        })
    }
}
