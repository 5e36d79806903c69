use ndarray::{Array, Array1, Array2, ArrayBase, Data, Ix2, Zip};
use ndarray_stats::DeviationExt;
use rayon::prelude::*;
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

/// Locks a shared random generator, recovering it when another holder panicked
pub(crate) fn write_rng<R>(rng: &RwLock<R>) -> RwLockWriteGuard<'_, R> {
    rng.write().unwrap_or_else(PoisonError::into_inner)
}

/// Computes the pairwise distances between rows of a 2D-array.
/// Order of the returned distances is unspecified: only use it where order
/// does not matter (e.g. min distance).
pub fn pdist(x: &ArrayBase<impl Data<Elem = f64> + Sync, Ix2>) -> Array1<f64> {
    let nrows = x.nrows();
    let pairs: Vec<_> = (0..nrows)
        .flat_map(|i| ((i + 1)..nrows).map(move |j| (i, j)))
        .collect();

    let distances: Vec<_> = pairs
        .par_iter()
        .map(|&(i, j)| x.row(i).l2_dist(&x.row(j)).unwrap_or(f64::INFINITY))
        .collect();

    Array::from_vec(distances)
}

/// Computes the distances between rows of two 2D arrays as a (ma, mb) matrix
///
/// **Panics** if `xa` and `xb` have a different number of columns.
pub fn cdist(
    xa: &ArrayBase<impl Data<Elem = f64> + Sync, Ix2>,
    xb: &ArrayBase<impl Data<Elem = f64> + Sync, Ix2>,
) -> Array2<f64> {
    let (na, nb) = (xa.ncols(), xb.ncols());
    if na != nb {
        panic!("cdist: operands should have same nb of columns. Found {na} and {nb}");
    }

    let mut res = Array2::zeros((xa.nrows(), xb.nrows()));
    Zip::from(res.rows_mut())
        .and(xa.rows())
        .par_for_each(|mut row_res, row_a| {
            for (j, row_b) in xb.rows().into_iter().enumerate() {
                row_res[j] = row_a.l2_dist(&row_b).unwrap_or(f64::INFINITY);
            }
        });
    res
}
