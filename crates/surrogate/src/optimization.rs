use ndarray::{arr1, s, Array1, Array2, Zip};
use ndarray_rand::rand::{Rng, SeedableRng};
use openbox_space::{Lhs, LhsKind, SamplingMethod};
use rand_xoshiro::Xoshiro256Plus;

pub(crate) struct CobylaParams {
    pub rhobeg: f64,
    pub ftol_rel: f64,
    pub maxeval: usize,
}

impl Default for CobylaParams {
    fn default() -> Self {
        CobylaParams {
            rhobeg: 0.5,
            ftol_rel: 1e-4,
            maxeval: 200,
        }
    }
}

/// Returns starting points on log10 scale (first one being `theta0`) and log10 bounds
pub(crate) fn prepare_multistart(
    n_start: usize,
    theta0: &Array1<f64>,
    bounds: &[(f64, f64)],
) -> (Array2<f64>, Vec<(f64, f64)>) {
    let bounds: Vec<(f64, f64)> = bounds
        .iter()
        .map(|(lo, up)| (lo.log10(), up.log10()))
        .collect();

    let mut theta0s = Array2::zeros((n_start + 1, theta0.len()));
    theta0s.row_mut(0).assign(&theta0.mapv(f64::log10));

    match n_start.cmp(&1) {
        std::cmp::Ordering::Equal => {
            let mut rng = Xoshiro256Plus::seed_from_u64(42);
            let vals: Array1<f64> = bounds.iter().map(|(a, b)| rng.gen_range(*a..*b)).collect();
            theta0s.row_mut(1).assign(&vals)
        }
        std::cmp::Ordering::Greater => {
            let mut xlimits: Array2<f64> = Array2::zeros((bounds.len(), 2));
            Zip::from(xlimits.rows_mut())
                .and(&bounds)
                .for_each(|mut row, limits| row.assign(&arr1(&[limits.0, limits.1])));
            // Seeded: starting points only need to be spread over the bounds
            let seeds = Lhs::new(&xlimits)
                .kind(LhsKind::Maximin)
                .with_rng(Xoshiro256Plus::seed_from_u64(42))
                .sample(n_start);
            theta0s.slice_mut(s![1.., ..]).assign(&seeds);
        }
        std::cmp::Ordering::Less => (),
    };
    (theta0s, bounds)
}

/// Minimizes `objfn` with COBYLA given an initial guess and bounds.
/// Returns `(fmin, xmin)`, `fmin` being infinite when the optimizer fails.
pub(crate) fn optimize_params<ObjF>(
    objfn: ObjF,
    param0: &Array1<f64>,
    bounds: &[(f64, f64)],
    cobyla: CobylaParams,
) -> (f64, Array1<f64>)
where
    ObjF: Fn(&[f64], Option<&mut [f64]>, &mut ()) -> f64,
{
    use cobyla::{minimize, Func, StopTols};

    let cons: Vec<&dyn Func<()>> = vec![];
    let param0 = param0.to_vec();

    match minimize(
        |x, u| objfn(x, None, u),
        &param0,
        bounds,
        &cons,
        (),
        cobyla.maxeval,
        cobyla::RhoBeg::All(cobyla.rhobeg),
        Some(StopTols {
            ftol_rel: cobyla.ftol_rel,
            ..StopTols::default()
        }),
    ) {
        Ok((_, x_opt, fval)) => {
            let fval = if f64::is_nan(fval) {
                f64::INFINITY
            } else {
                fval
            };
            (fval, arr1(&x_opt))
        }
        Err((status, x_opt, _)) => {
            log::warn!("ERROR Cobyla optimizer status={status:?}");
            (f64::INFINITY, arr1(&x_opt))
        }
    }
}
