//! Pareto dominance utilities for multi-objective minimization.
//!
//! Objective values of n solutions with m objectives are given as (n, m) matrices.
//!
//! ```
//! use ndarray::array;
//! use openbox_opt::pareto::{hypervolume, pareto_front_indices};
//!
//! let values = array![[1., 5.], [5., 1.], [3., 3.], [4., 4.]];
//! let mut front = pareto_front_indices(&values);
//! front.sort_unstable();
//! assert_eq!(front, vec![0, 1, 2]);
//!
//! let hv = hypervolume(&values, &[6., 6.]);
//! assert!((hv - 15.).abs() < 1e-12);
//! ```
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Axis, Data, Ix1, Ix2};

/// Returns `true` if `a` Pareto-dominates `b` (minimization): `a` is at least
/// as good on every objective and strictly better on at least one.
pub fn dominates(
    a: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    b: &ArrayBase<impl Data<Elem = f64>, Ix1>,
) -> bool {
    debug_assert_eq!(a.len(), b.len());
    let mut strictly_better = false;
    for (av, bv) in a.iter().zip(b.iter()) {
        if av > bv {
            return false;
        }
        if av < bv {
            strictly_better = true;
        }
    }
    strictly_better
}

/// Fast non-dominated sorting (Deb et al., 2002).
///
/// Returns the successive fronts as lists of row indices of `values`,
/// the first one being the Pareto front.
pub fn non_dominated_sort(values: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Vec<Vec<usize>> {
    let n = values.nrows();
    if n == 0 {
        return vec![];
    }

    // solutions dominated by each solution
    let mut dominated_by: Vec<Vec<usize>> = vec![vec![]; n];
    let mut domination_count: Vec<usize> = vec![0; n];

    for i in 0..n {
        for j in (i + 1)..n {
            if dominates(&values.row(i), &values.row(j)) {
                dominated_by[i].push(j);
                domination_count[j] += 1;
            } else if dominates(&values.row(j), &values.row(i)) {
                dominated_by[j].push(i);
                domination_count[i] += 1;
            }
        }
    }

    let mut fronts: Vec<Vec<usize>> = vec![];
    let mut current: Vec<usize> = (0..n).filter(|&i| domination_count[i] == 0).collect();
    while !current.is_empty() {
        let mut next = vec![];
        for &p in &current {
            for &q in &dominated_by[p] {
                domination_count[q] -= 1;
                if domination_count[q] == 0 {
                    next.push(q);
                }
            }
        }
        fronts.push(current);
        current = next;
    }
    fronts
}

/// Row indices of the non-dominated solutions
pub fn pareto_front_indices(values: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Vec<usize> {
    non_dominated_sort(values)
        .into_iter()
        .next()
        .unwrap_or_default()
}

/// Crowding distance of the solutions of a front, boundary solutions get `f64::INFINITY`.
pub fn crowding_distance(front: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Array1<f64> {
    let n = front.nrows();
    if n <= 2 {
        return Array1::from_elem(n, f64::INFINITY);
    }
    let mut distances = Array1::zeros(n);
    for col in front.columns() {
        let mut sorted: Vec<usize> = (0..n).collect();
        sorted.sort_by(|&a, &b| col[a].total_cmp(&col[b]));

        distances[sorted[0]] = f64::INFINITY;
        distances[sorted[n - 1]] = f64::INFINITY;

        let range = col[sorted[n - 1]] - col[sorted[0]];
        if range > 0. {
            for i in 1..(n - 1) {
                distances[sorted[i]] += (col[sorted[i + 1]] - col[sorted[i - 1]]) / range;
            }
        }
    }
    distances
}

/// Keeps points strictly dominating the reference point
fn filter_by_ref(front: &ArrayBase<impl Data<Elem = f64>, Ix2>, ref_point: &[f64]) -> Vec<Vec<f64>> {
    front
        .rows()
        .into_iter()
        .filter(|p| p.iter().zip(ref_point).all(|(v, r)| v < r))
        .map(|p| p.to_vec())
        .collect()
}

/// Hypervolume of the region dominated by `front` and bounded by `ref_point`.
///
/// Points not strictly dominating the reference point are ignored. Computed
/// by recursive slicing on the last objective, with a sweep in 2-D.
pub fn hypervolume(front: &ArrayBase<impl Data<Elem = f64>, Ix2>, ref_point: &[f64]) -> f64 {
    debug_assert_eq!(front.ncols(), ref_point.len());
    let points = filter_by_ref(front, ref_point);
    if points.is_empty() {
        return 0.;
    }
    hv_recursive(&points, ref_point)
}

fn hv_2d(points: &[Vec<f64>], reference: &[f64]) -> f64 {
    let mut sorted: Vec<&Vec<f64>> = points.iter().collect();
    sorted.sort_by(|a, b| a[0].total_cmp(&b[0]).then(a[1].total_cmp(&b[1])));
    let mut hv = 0.;
    let mut current_y = reference[1];
    for p in sorted {
        if p[1] < current_y {
            hv += (reference[0] - p[0]) * (current_y - p[1]);
            current_y = p[1];
        }
    }
    hv
}

fn hv_recursive(points: &[Vec<f64>], reference: &[f64]) -> f64 {
    let d = reference.len();
    if d == 1 {
        let min_val = points.iter().map(|p| p[0]).fold(f64::INFINITY, f64::min);
        return (reference[0] - min_val).max(0.);
    }
    if d == 2 {
        return hv_2d(points, reference);
    }
    if points.len() == 1 {
        return points[0]
            .iter()
            .zip(reference)
            .map(|(p, r)| (r - p).max(0.))
            .product();
    }

    let mut sorted: Vec<&Vec<f64>> = points.iter().collect();
    sorted.sort_by(|a, b| a[d - 1].total_cmp(&b[d - 1]));

    let sub_ref = &reference[..d - 1];
    let mut result = 0.;
    for i in 0..sorted.len() {
        let height = if i + 1 < sorted.len() {
            sorted[i + 1][d - 1] - sorted[i][d - 1]
        } else {
            reference[d - 1] - sorted[i][d - 1]
        };
        if height <= 0. {
            continue;
        }
        let projected: Vec<Vec<f64>> = sorted[..=i].iter().map(|p| p[..d - 1].to_vec()).collect();
        let non_dom = non_dominated_points(&projected);
        result += height * hv_recursive(&non_dom, sub_ref);
    }
    result
}

fn non_dominated_points(points: &[Vec<f64>]) -> Vec<Vec<f64>> {
    points
        .iter()
        .enumerate()
        .filter(|(i, p)| {
            !points.iter().enumerate().any(|(j, q)| {
                j != *i
                    && dominates(&ArrayView1::from(&q[..]), &ArrayView1::from(&p[..]))
            })
        })
        .map(|(_, p)| p.clone())
        .collect()
}

/// A hyper-rectangle `[lower, upper]`, lower bounds may be `-inf`
#[derive(Clone, Debug, PartialEq)]
pub struct HyperCell {
    /// Lower corner
    pub lower: Array1<f64>,
    /// Upper corner
    pub upper: Array1<f64>,
}

/// Partitions the region bounded by `ref_point` and not dominated by `front`
/// into hyper-rectangles.
///
/// The first m-1 objectives are gridded on the front coordinates, each grid cell being
/// extended along the last objective down to `-inf` up to the lowest front point
/// dominating its lower corner. In 2-D it reduces to the k+1 staircase cells
/// of a front of k points.
pub fn box_decomposition(
    front: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ref_point: &[f64],
) -> Vec<HyperCell> {
    let m = ref_point.len();
    if m == 0 {
        return vec![];
    }
    let points = non_dominated_points(&filter_by_ref(front, ref_point));

    // grid of each of the first m-1 objectives: -inf, sorted point coordinates, ref
    let grids: Vec<Vec<f64>> = (0..m - 1)
        .map(|j| {
            let mut g: Vec<f64> = points.iter().map(|p| p[j]).collect();
            g.sort_by(f64::total_cmp);
            g.dedup();
            let mut grid = vec![f64::NEG_INFINITY];
            grid.extend(g);
            grid.push(ref_point[j]);
            grid
        })
        .collect();

    let mut cells = vec![];
    let mut idx = vec![0usize; m.saturating_sub(1)];
    loop {
        let lower_head: Vec<f64> = idx.iter().enumerate().map(|(j, &k)| grids[j][k]).collect();
        let upper_head: Vec<f64> = idx
            .iter()
            .enumerate()
            .map(|(j, &k)| grids[j][k + 1])
            .collect();
        // lowest last objective among points dominating the cell lower corner
        let upper_last = points
            .iter()
            .filter(|p| p[..m - 1].iter().zip(&lower_head).all(|(pv, l)| pv <= l))
            .map(|p| p[m - 1])
            .fold(ref_point[m - 1], f64::min);
        if upper_last > f64::NEG_INFINITY {
            let mut lower = lower_head.clone();
            lower.push(f64::NEG_INFINITY);
            let mut upper = upper_head;
            upper.push(upper_last);
            cells.push(HyperCell {
                lower: Array1::from(lower),
                upper: Array1::from(upper),
            });
        }

        // next grid cell
        let mut j = 0;
        loop {
            if j == idx.len() {
                return cells;
            }
            idx[j] += 1;
            if idx[j] + 1 < grids[j].len() {
                break;
            }
            idx[j] = 0;
            j += 1;
        }
    }
}

/// Stacks cells as (n_cells, m) lower and upper matrices
pub fn cells_as_arrays(cells: &[HyperCell], m: usize) -> (Array2<f64>, Array2<f64>) {
    let mut lower = Array2::zeros((cells.len(), m));
    let mut upper = Array2::zeros((cells.len(), m));
    for (i, cell) in cells.iter().enumerate() {
        lower.index_axis_mut(Axis(0), i).assign(&cell.lower);
        upper.index_axis_mut(Axis(0), i).assign(&cell.upper);
    }
    (lower, upper)
}
