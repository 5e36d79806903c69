use ndarray::{s, Array1, Array2, ArrayBase, Axis, Data, Ix2};
use serde::{Deserialize, Serialize};

/// A structure to store (n, xdim) matrix data and its mean and standard deviation vectors.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct NormalizedData {
    /// normalized data
    pub data: Array2<f64>,
    /// mean vector computed from data
    pub mean: Array1<f64>,
    /// standard deviation vector computed from data
    pub std: Array1<f64>,
}

impl NormalizedData {
    /// Constructor, components flagged in `cat_mask` are left untouched
    pub fn new(x: &ArrayBase<impl Data<Elem = f64>, Ix2>, cat_mask: &[bool]) -> NormalizedData {
        let (data, mean, std) = normalize(x, cat_mask);
        NormalizedData { data, mean, std }
    }

    /// Dimension of data points
    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }

    /// Applies the normalization to other data
    pub fn apply(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Array2<f64> {
        (x - &self.mean) / &self.std
    }
}

pub(crate) fn normalize(
    x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    cat_mask: &[bool],
) -> (Array2<f64>, Array1<f64>, Array1<f64>) {
    let mut x_mean = x
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(x.ncols()));
    let mut x_std = if x.nrows() > 1 {
        x.std_axis(Axis(0), 1.)
    } else {
        Array1::ones(x.ncols())
    };
    x_std.mapv_inplace(|v| if v == 0. || !v.is_finite() { 1. } else { v });
    for (j, _) in cat_mask.iter().enumerate().filter(|(_, c)| **c) {
        x_mean[j] = 0.;
        x_std[j] = 1.;
    }
    let xnorm = (x - &x_mean) / &x_std;

    (xnorm, x_mean, x_std)
}

/// Turns differences along categorical components into 0/1 distances
fn apply_categorical(d: &mut Array2<f64>, cat_mask: &[bool]) {
    for (j, _) in cat_mask.iter().enumerate().filter(|(_, c)| **c) {
        d.column_mut(j)
            .mapv_inplace(|v| if v.abs() > 0.5 { 1. } else { 0. });
    }
}

/// A structure to retain absolute differences computation used to compute covariance matrix
#[derive(Debug)]
pub struct DiffMatrix {
    /// Differences as (n_obs * (n_obs-1))/2, nx) array
    pub d: Array2<f64>,
    /// Indices of the differences in the original data array
    pub d_indices: Array2<usize>,
    /// Number of observations
    pub n_obs: usize,
}

impl DiffMatrix {
    /// Compute differences given points given as an array (n_obs, nx).
    /// Differences of categorical components (flagged in `cat_mask`) are 0 or 1.
    pub fn new(x: &ArrayBase<impl Data<Elem = f64>, Ix2>, cat_mask: &[bool]) -> DiffMatrix {
        let (mut d, d_indices) = Self::_cross_diff(x);
        apply_categorical(&mut d, cat_mask);
        DiffMatrix {
            d,
            d_indices,
            n_obs: x.nrows(),
        }
    }

    fn _cross_diff(x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> (Array2<f64>, Array2<usize>) {
        let n_obs = x.nrows();
        let nx = x.ncols();
        let n_non_zero_cross_dist = n_obs * n_obs.saturating_sub(1) / 2;
        let mut indices = Array2::<usize>::zeros((n_non_zero_cross_dist, 2));
        let mut d = Array2::zeros((n_non_zero_cross_dist, nx));
        let mut idx = 0;
        for k in 0..n_obs.saturating_sub(1) {
            let idx0 = idx;
            idx = idx0 + n_obs - k - 1;

            for i in (k + 1)..n_obs {
                let r = idx0 + i - k - 1;
                indices[[r, 0]] = k;
                indices[[r, 1]] = i;
            }

            let diff = &x.slice(s![k, ..]) - &x.slice(s![k + 1..n_obs, ..]);
            d.slice_mut(s![idx0..idx, ..]).assign(&diff);
        }
        d.mapv_inplace(|v| v.abs());

        (d, indices)
    }
}

/// Computes absolute differences between each row of x and each row of y
/// resulting in a 2d array of shape (nrows(x) * nrows(y), ncols(x)).
///
/// **Panics** if x and y have not the same column numbers
pub(crate) fn pairwise_differences(
    x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    y: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    cat_mask: &[bool],
) -> Array2<f64> {
    assert!(x.ncols() == y.ncols());

    let ny = y.nrows();
    let mut result = Array2::zeros((x.nrows() * ny, x.ncols()));
    for (i, x_row) in x.rows().into_iter().enumerate() {
        let diff = (&y.view() - &x_row).mapv(f64::abs);
        result.slice_mut(s![i * ny..(i + 1) * ny, ..]).assign(&diff);
    }
    apply_categorical(&mut result, cat_mask);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_pairwise_differences() {
        let x = array![[-0.9486833], [-0.82219219]];
        let y = array![
            [-1.26491106],
            [-0.63245553],
            [0.],
            [0.63245553],
            [1.26491106]
        ];
        assert_abs_diff_eq!(
            &array![
                [0.31622777],
                [0.31622777],
                [0.9486833],
                [1.58113883],
                [2.21359436],
                [0.44271887],
                [0.18973666],
                [0.82219219],
                [1.45464772],
                [2.08710326]
            ],
            &pairwise_differences(&x, &y, &[]),
            epsilon = 1e-6
        )
    }

    #[test]
    fn test_normalized_matrix() {
        let x = array![[1., 2.], [3., 4.]];
        let xnorm = NormalizedData::new(&x, &[]);
        assert_eq!(xnorm.ncols(), 2);
        assert_eq!(array![2., 3.], xnorm.mean);
        assert_eq!(array![f64::sqrt(2.), f64::sqrt(2.)], xnorm.std);

        let xnorm = NormalizedData::new(&x, &[false, true]);
        assert_eq!(array![2., 0.], xnorm.mean);
        assert_eq!(array![f64::sqrt(2.), 1.], xnorm.std);
        assert_eq!(xnorm.data.column(1), x.column(1));
    }

    #[test]
    fn test_normalized_constant() {
        let x = array![[1., 2.], [1., 4.]];
        let xnorm = NormalizedData::new(&x, &[]);
        assert_eq!(xnorm.std[0], 1.);
        assert_eq!(xnorm.data.column(0), array![0., 0.]);
    }

    #[test]
    fn test_diff_matrix() {
        let xt = array![[0.5], [1.2], [2.0], [3.0], [4.0]];
        let expected = (
            array![
                [0.7],
                [1.5],
                [2.5],
                [3.5],
                [0.8],
                [1.8],
                [2.8],
                [1.],
                [2.],
                [1.]
            ],
            array![
                [0, 1],
                [0, 2],
                [0, 3],
                [0, 4],
                [1, 2],
                [1, 3],
                [1, 4],
                [2, 3],
                [2, 4],
                [3, 4]
            ],
        );
        let dm = DiffMatrix::new(&xt, &[]);
        assert_abs_diff_eq!(expected.0, dm.d, epsilon = 1e-12);
        assert_eq!(expected.1, dm.d_indices);
    }
}
