//! Acquisition functions scoring encoded candidate configurations.
//!
//! Objectives and constraints are modeled by independent [`Surrogate`]s and every
//! criterion is to be maximized. Candidates are scored by batches given as (n, dim)
//! matrices of encoded configurations.
use crate::errors::{OpenBoxError, Result};
use crate::pareto::{box_decomposition, cells_as_arrays, non_dominated_sort};
use crate::utils::{expected_shortfall, log_ei_helper, norm_cdf, norm_pdf, prob_below, VAR_EPSILON};

use log::debug;
use ndarray::{Array1, Array2, ArrayView2, Axis, Zip};
use ndarray_rand::rand::Rng;
use openbox_surrogate::{predict_all, Surrogate};
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};

/// Default exploration weight of the lower confidence bound
pub const LCB_KAPPA: f64 = 2.0;
/// Weight of the linear term of the ParEGO augmented Chebyshev scalarization
pub const PAREGO_RHO: f64 = 0.05;
/// Default number of sampled Pareto fronts used by MESMO
pub const MESMO_SAMPLES: usize = 10;
/// Largest number of objectives handled by EHVI when resolving `Auto`
const AUTO_EHVI_MAX_OBJECTIVES: usize = 4;

/// Kind of acquisition function
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionType {
    /// Expected improvement
    EI,
    /// Logarithm of the expected improvement
    LogEI,
    /// Probability of improvement
    PI,
    /// Negated lower confidence bound
    LCB,
    /// Expected improvement times probability of feasibility
    EIC,
    /// Expected hypervolume improvement
    EHVI,
    /// Expected hypervolume improvement times probability of feasibility
    EHVIC,
    /// Expected improvement of a random augmented Chebyshev scalarization
    ParEGO,
    /// Max-value entropy search for multi-objective optimization
    MESMO,
    /// Uncertainty-aware search over the Pareto front of lower confidence bounds
    USEMO,
    /// Chosen from the numbers of objectives and constraints
    #[default]
    Auto,
}

impl AcquisitionType {
    /// Resolves `Auto`, other kinds are returned unchanged
    pub fn resolve(&self, num_objectives: usize, num_constraints: usize) -> AcquisitionType {
        match self {
            AcquisitionType::Auto => match (num_objectives, num_constraints) {
                (1, 0) => AcquisitionType::EI,
                (1, _) => AcquisitionType::EIC,
                (m, 0) if m <= AUTO_EHVI_MAX_OBJECTIVES => AcquisitionType::EHVI,
                (m, _) if m <= AUTO_EHVI_MAX_OBJECTIVES => AcquisitionType::EHVIC,
                _ => AcquisitionType::MESMO,
            },
            other => *other,
        }
    }

    /// Whether the criterion only handles a single objective
    pub fn is_single_objective(&self) -> bool {
        matches!(
            self,
            AcquisitionType::EI
                | AcquisitionType::LogEI
                | AcquisitionType::PI
                | AcquisitionType::LCB
                | AcquisitionType::EIC
        )
    }

    /// Checks the criterion is usable for the given problem
    pub fn check(
        &self,
        num_objectives: usize,
        num_constraints: usize,
        ref_point: Option<&[f64]>,
    ) -> Result<()> {
        let kind = self.resolve(num_objectives, num_constraints);
        if num_objectives == 0 {
            return Err(OpenBoxError::InvalidConfigError(
                "at least one objective is required".to_string(),
            ));
        }
        if kind.is_single_objective() && num_objectives > 1 {
            return Err(OpenBoxError::InvalidConfigError(format!(
                "{kind:?} handles a single objective, got {num_objectives}"
            )));
        }
        if !kind.is_single_objective() && num_objectives == 1 {
            return Err(OpenBoxError::InvalidConfigError(format!(
                "{kind:?} requires several objectives"
            )));
        }
        if matches!(kind, AcquisitionType::EHVI | AcquisitionType::EHVIC) {
            match ref_point {
                None => {
                    return Err(OpenBoxError::InvalidConfigError(format!(
                        "{kind:?} requires a reference point"
                    )))
                }
                Some(r) if r.len() != num_objectives => {
                    return Err(OpenBoxError::InvalidConfigError(format!(
                        "reference point of length {} for {num_objectives} objectives",
                        r.len()
                    )))
                }
                _ => (),
            }
        }
        Ok(())
    }
}

/// A criterion to maximize over encoded candidates
pub trait AcquisitionFunction: Send + Sync {
    /// Name of the criterion
    fn name(&self) -> &'static str;

    /// Criterion values at n candidates given as a (n, dim) matrix
    fn values(&self, x: &ArrayView2<f64>) -> Result<Array1<f64>>;

    /// Whether the value of a candidate does not depend on the other candidates
    /// of the batch
    fn pointwise(&self) -> bool {
        true
    }
}

fn predict_single(model: &dyn Surrogate, x: &ArrayView2<f64>) -> Result<(Array1<f64>, Array1<f64>)> {
    Ok(model.predict_valvar(x)?)
}

/// Expected improvement below `fmin`
pub struct ExpectedImprovement {
    model: Box<dyn Surrogate>,
    fmin: f64,
}

impl ExpectedImprovement {
    /// Constructor given the objective model and the current minimum
    pub fn new(model: Box<dyn Surrogate>, fmin: f64) -> Self {
        ExpectedImprovement { model, fmin }
    }
}

impl AcquisitionFunction for ExpectedImprovement {
    fn name(&self) -> &'static str {
        "EI"
    }

    fn values(&self, x: &ArrayView2<f64>) -> Result<Array1<f64>> {
        let (mean, var) = predict_single(&*self.model, x)?;
        Ok(Zip::from(&mean)
            .and(&var)
            .map_collect(|m, v| expected_shortfall(self.fmin, *m, v.sqrt())))
    }
}

/// Logarithm of the expected improvement, accurate far from the incumbent
pub struct LogExpectedImprovement {
    model: Box<dyn Surrogate>,
    fmin: f64,
}

impl LogExpectedImprovement {
    /// Constructor given the objective model and the current minimum
    pub fn new(model: Box<dyn Surrogate>, fmin: f64) -> Self {
        LogExpectedImprovement { model, fmin }
    }
}

impl AcquisitionFunction for LogExpectedImprovement {
    fn name(&self) -> &'static str {
        "LogEI"
    }

    fn values(&self, x: &ArrayView2<f64>) -> Result<Array1<f64>> {
        let (mean, var) = predict_single(&*self.model, x)?;
        Ok(Zip::from(&mean).and(&var).map_collect(|m, v| {
            if *v < VAR_EPSILON {
                if self.fmin > *m {
                    (self.fmin - m).ln()
                } else {
                    f64::MIN
                }
            } else {
                let sigma = v.sqrt();
                log_ei_helper((self.fmin - m) / sigma) + sigma.ln()
            }
        }))
    }
}

/// Probability of improvement below `fmin`
pub struct ProbabilityOfImprovement {
    model: Box<dyn Surrogate>,
    fmin: f64,
}

impl ProbabilityOfImprovement {
    /// Constructor given the objective model and the current minimum
    pub fn new(model: Box<dyn Surrogate>, fmin: f64) -> Self {
        ProbabilityOfImprovement { model, fmin }
    }
}

impl AcquisitionFunction for ProbabilityOfImprovement {
    fn name(&self) -> &'static str {
        "PI"
    }

    fn values(&self, x: &ArrayView2<f64>) -> Result<Array1<f64>> {
        let (mean, var) = predict_single(&*self.model, x)?;
        Ok(Zip::from(&mean)
            .and(&var)
            .map_collect(|m, v| prob_below(self.fmin, *m, *v)))
    }
}

/// Negated lower confidence bound `-(mean - kappa * sigma)`
pub struct LowerConfidenceBound {
    model: Box<dyn Surrogate>,
    kappa: f64,
}

impl LowerConfidenceBound {
    /// Constructor given the objective model and the exploration weight
    pub fn new(model: Box<dyn Surrogate>, kappa: f64) -> Self {
        LowerConfidenceBound { model, kappa }
    }
}

impl AcquisitionFunction for LowerConfidenceBound {
    fn name(&self) -> &'static str {
        "LCB"
    }

    fn values(&self, x: &ArrayView2<f64>) -> Result<Array1<f64>> {
        let (mean, var) = predict_single(&*self.model, x)?;
        Ok(Zip::from(&mean)
            .and(&var)
            .map_collect(|m, v| -(m - self.kappa * v.sqrt())))
    }
}

/// Expected hypervolume improvement computed exactly over a box decomposition
/// of the region not dominated by the current Pareto front
pub struct ExpectedHypervolumeImprovement {
    models: Vec<Box<dyn Surrogate>>,
    lower: Array2<f64>,
    upper: Array2<f64>,
}

impl ExpectedHypervolumeImprovement {
    /// Constructor given one model per objective, the current front and the reference point
    pub fn new(models: Vec<Box<dyn Surrogate>>, front: &Array2<f64>, ref_point: &[f64]) -> Self {
        let cells = box_decomposition(front, ref_point);
        let (lower, upper) = cells_as_arrays(&cells, ref_point.len());
        debug!("EHVI over {} cells", cells.len());
        ExpectedHypervolumeImprovement {
            models,
            lower,
            upper,
        }
    }
}

impl AcquisitionFunction for ExpectedHypervolumeImprovement {
    fn name(&self) -> &'static str {
        "EHVI"
    }

    fn values(&self, x: &ArrayView2<f64>) -> Result<Array1<f64>> {
        let (means, vars) = predict_all(&self.models, x)?;
        let mut ehvi = Array1::zeros(x.nrows());
        Zip::from(&mut ehvi)
            .and(means.rows())
            .and(vars.rows())
            .par_for_each(|e, mean, var| {
                let sigma = var.mapv(f64::sqrt);
                *e = self
                    .lower
                    .rows()
                    .into_iter()
                    .zip(self.upper.rows())
                    .map(|(lo, up)| {
                        // expected length of the improvement along each objective
                        (0..mean.len())
                            .map(|j| {
                                expected_shortfall(up[j], mean[j], sigma[j])
                                    - expected_shortfall(lo[j], mean[j], sigma[j])
                            })
                            .product::<f64>()
                    })
                    .sum::<f64>()
                    .max(0.);
            });
        Ok(ehvi)
    }
}

/// Max-value entropy search for multi-objective optimization.
///
/// The information gained about sampled Pareto fronts is approximated by the sum over
/// objectives of the max-value entropy terms wrt the extreme values of each front.
pub struct Mesmo {
    models: Vec<Box<dyn Surrogate>>,
    /// (n_samples, n_objectives) minima of the sampled fronts
    y_star: Array2<f64>,
}

impl Mesmo {
    /// Samples `n_samples` Pareto fronts from posterior draws of the models on `pool`.
    ///
    /// `y` are the observed values, sampled minima never exceed the observed ones.
    pub fn new(
        models: Vec<Box<dyn Surrogate>>,
        pool: &ArrayView2<f64>,
        y: &Array2<f64>,
        n_samples: usize,
        rng: &mut Xoshiro256Plus,
    ) -> Result<Self> {
        let n_samples = n_samples.max(1);
        let mut y_star = Array2::zeros((n_samples, models.len()));
        for (j, model) in models.iter().enumerate() {
            let observed_min = y.column(j).fold(f64::INFINITY, |a, b| a.min(*b));
            // extreme points of a sampled front are the minima of each sampled objective
            let draws = model.sample(pool, n_samples, rng)?;
            for (s, traj) in draws.columns().into_iter().enumerate() {
                let sampled_min = traj.fold(f64::INFINITY, |a, b| a.min(*b));
                y_star[[s, j]] = sampled_min.min(observed_min);
            }
        }
        Ok(Mesmo { models, y_star })
    }
}

impl AcquisitionFunction for Mesmo {
    fn name(&self) -> &'static str {
        "MESMO"
    }

    fn values(&self, x: &ArrayView2<f64>) -> Result<Array1<f64>> {
        let (means, vars) = predict_all(&self.models, x)?;
        let n_samples = self.y_star.nrows() as f64;
        let mut values = Array1::zeros(x.nrows());
        Zip::from(&mut values)
            .and(means.rows())
            .and(vars.rows())
            .par_for_each(|val, mean, var| {
                let mut total = 0.;
                for y_star in self.y_star.rows() {
                    for j in 0..mean.len() {
                        if var[j] < VAR_EPSILON {
                            continue;
                        }
                        let gamma = (mean[j] - y_star[j]) / var[j].sqrt();
                        let cdf = norm_cdf(gamma).max(1e-300);
                        total += gamma * norm_pdf(gamma) / (2. * cdf) - cdf.ln();
                    }
                }
                *val = total / n_samples;
            });
        Ok(values)
    }
}

/// Candidates on the Pareto front of per-objective lower confidence bounds are scored
/// by their uncertainty volume, the following fronts get decreasing negative ranks
pub struct Usemo {
    models: Vec<Box<dyn Surrogate>>,
    kappa: f64,
}

impl Usemo {
    /// Constructor given one model per objective and the confidence bound weight
    pub fn new(models: Vec<Box<dyn Surrogate>>, kappa: f64) -> Self {
        Usemo { models, kappa }
    }
}

impl AcquisitionFunction for Usemo {
    fn name(&self) -> &'static str {
        "USEMO"
    }

    fn values(&self, x: &ArrayView2<f64>) -> Result<Array1<f64>> {
        let (means, vars) = predict_all(&self.models, x)?;
        let sigmas = vars.mapv(f64::sqrt);
        let lcb = &means - &(self.kappa * &sigmas);
        let mut values = Array1::zeros(x.nrows());
        for (rank, front) in non_dominated_sort(&lcb).into_iter().enumerate() {
            for i in front {
                values[i] = if rank == 0 {
                    sigmas.row(i).fold(1., |acc, s| acc * 2. * self.kappa * s)
                } else {
                    -(rank as f64)
                };
            }
        }
        Ok(values)
    }

    fn pointwise(&self) -> bool {
        false
    }
}

/// How an acquisition value is combined with the probability of feasibility
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FeasibilityMode {
    /// value * pof
    Product,
    /// value + ln(pof)
    Log,
    /// softplus(value) * pof, for criteria which may be negative
    Softplus,
}

/// Weighs an acquisition by the probability that every constraint is non positive.
/// Without inner criterion the probability of feasibility alone is returned.
pub struct Constrained {
    inner: Option<Box<dyn AcquisitionFunction>>,
    cstr_models: Vec<Box<dyn Surrogate>>,
    mode: FeasibilityMode,
}

impl Constrained {
    fn new(
        inner: Option<Box<dyn AcquisitionFunction>>,
        cstr_models: Vec<Box<dyn Surrogate>>,
        mode: FeasibilityMode,
    ) -> Self {
        Constrained {
            inner,
            cstr_models,
            mode,
        }
    }

    /// Product over constraints of the probabilities of feasibility
    pub fn pofs(&self, x: &ArrayView2<f64>) -> Result<Array1<f64>> {
        let (means, vars) = predict_all(&self.cstr_models, x)?;
        Ok(Zip::from(means.rows())
            .and(vars.rows())
            .map_collect(|m, v| {
                m.iter()
                    .zip(v.iter())
                    .fold(1., |acc, (m, v)| acc * prob_below(0., *m, *v))
            }))
    }
}

impl AcquisitionFunction for Constrained {
    fn name(&self) -> &'static str {
        match &self.inner {
            Some(inner) => inner.name(),
            None => "PoF",
        }
    }

    fn values(&self, x: &ArrayView2<f64>) -> Result<Array1<f64>> {
        let pofs = self.pofs(x)?;
        let Some(inner) = &self.inner else {
            return Ok(pofs);
        };
        let values = inner.values(x)?;
        Ok(Zip::from(&values).and(&pofs).map_collect(|a, p| match self.mode {
            FeasibilityMode::Product => a * p,
            FeasibilityMode::Log => a + p.max(1e-300).ln(),
            FeasibilityMode::Softplus => softplus(*a) * p,
        }))
    }

    fn pointwise(&self) -> bool {
        self.inner.as_ref().map_or(true, |inner| inner.pointwise())
    }
}

fn softplus(a: f64) -> f64 {
    if a > 30. {
        a
    } else {
        a.exp().ln_1p()
    }
}

/// Penalizes an acquisition around pending evaluations: the penalty of a pending
/// point is 0 on it and grows linearly to 1 at the distance beyond which a
/// Lipschitz continuous objective may improve on the incumbent
pub struct LocalPenalization {
    inner: Box<dyn AcquisitionFunction>,
    /// Pending points, scaled to the unit hypercube
    pending: Array2<f64>,
    radii: Array1<f64>,
    /// Widths of encoded dimensions
    scale: Array1<f64>,
    softplus: bool,
}

impl LocalPenalization {
    /// Penalizer of `inner` around `pending` encoded points.
    ///
    /// `mean` and `var` are the objective predictions at pending points, `fmin` is the
    /// incumbent, `lipschitz` the estimated Lipschitz constant of the objective in unit
    /// scale and `scale` the widths of the encoded bounds.
    pub fn new(
        inner: Box<dyn AcquisitionFunction>,
        pending: &Array2<f64>,
        mean: &Array1<f64>,
        var: &Array1<f64>,
        fmin: f64,
        lipschitz: f64,
        scale: &Array1<f64>,
    ) -> Self {
        let scale = scale.mapv(|s| if s > 0. { s } else { 1. });
        let lipschitz = lipschitz.max(1e-7);
        let radii = Zip::from(mean)
            .and(var)
            .map_collect(|m, v| ((m - fmin).abs() + v.sqrt()).max(1e-6) / lipschitz);
        let softplus = inner.name() == "LCB";
        LocalPenalization {
            inner,
            pending: pending / &scale,
            radii,
            scale,
            softplus,
        }
    }

    /// Product of the penalties of the pending points at the given candidates
    pub fn penalty(&self, x: &ArrayView2<f64>) -> Array1<f64> {
        let xs = x / &self.scale;
        Zip::from(xs.rows()).map_collect(|row| {
            self.pending
                .rows()
                .into_iter()
                .zip(self.radii.iter())
                .fold(1., |acc, (p, r)| {
                    let dist = (&row - &p).mapv(|d| d * d).sum().sqrt();
                    acc * (dist / r).min(1.)
                })
        })
    }
}

impl AcquisitionFunction for LocalPenalization {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn values(&self, x: &ArrayView2<f64>) -> Result<Array1<f64>> {
        let values = self.inner.values(x)?;
        let penalty = self.penalty(x);
        Ok(Zip::from(&values).and(&penalty).map_collect(|a, p| {
            if self.softplus || *a < 0. {
                softplus(*a) * p
            } else {
                a * p
            }
        }))
    }

    fn pointwise(&self) -> bool {
        self.inner.pointwise()
    }
}

/// Largest slope between pairs of observations, in unit scale
pub fn estimate_lipschitz(x: &Array2<f64>, y: &Array1<f64>, scale: &Array1<f64>) -> f64 {
    let scale = scale.mapv(|s| if s > 0. { s } else { 1. });
    let xs = x / &scale;
    let mut lipschitz: f64 = 0.;
    for i in 0..xs.nrows() {
        for j in (i + 1)..xs.nrows() {
            let dist = (&xs.row(i) - &xs.row(j)).mapv(|d| d * d).sum().sqrt();
            if dist > 1e-12 {
                lipschitz = lipschitz.max((y[i] - y[j]).abs() / dist);
            }
        }
    }
    if lipschitz > 0. {
        lipschitz
    } else {
        1.
    }
}

/// Random weights drawn uniformly on the simplex
pub fn parego_weights<R: Rng>(n_objectives: usize, rng: &mut R) -> Array1<f64> {
    let w: Array1<f64> = (0..n_objectives)
        .map(|_| -(1. - rng.gen::<f64>()).ln())
        .collect();
    let total = w.sum();
    w / total
}

/// Augmented Chebyshev scalarization `max_j(w_j y_j) + rho * sum_j(w_j y_j)` of
/// objectives normalized to [0, 1] column-wise
pub fn parego_scalarize(y: &Array2<f64>, weights: &Array1<f64>, rho: f64) -> Array1<f64> {
    let mut normalized = y.to_owned();
    for mut col in normalized.columns_mut() {
        let lo = col.fold(f64::INFINITY, |a, b| a.min(*b));
        let up = col.fold(f64::NEG_INFINITY, |a, b| a.max(*b));
        let range = up - lo;
        col.mapv_inplace(|v| if range > 0. { (v - lo) / range } else { 0. });
    }
    normalized.map_axis(Axis(1), |row| {
        let weighted = &row * weights;
        weighted.fold(f64::NEG_INFINITY, |a, b| a.max(*b)) + rho * weighted.sum()
    })
}

/// Builds acquisition functions from trained surrogates
#[derive(Clone, Debug)]
pub struct AcquisitionBuilder {
    kind: AcquisitionType,
    ref_point: Option<Vec<f64>>,
    lcb_kappa: f64,
    mesmo_samples: usize,
    pool: Option<Array2<f64>>,
    penalization: Option<Penalization>,
}

/// Pending points penalized by single objective criteria
#[derive(Clone, Debug)]
struct Penalization {
    pending: Array2<f64>,
    lipschitz: f64,
    scale: Array1<f64>,
}

impl AcquisitionBuilder {
    /// Constructor given the kind of criterion
    pub fn new(kind: AcquisitionType) -> Self {
        AcquisitionBuilder {
            kind,
            ref_point: None,
            lcb_kappa: LCB_KAPPA,
            mesmo_samples: MESMO_SAMPLES,
            pool: None,
            penalization: None,
        }
    }

    /// Sets the hypervolume reference point
    pub fn ref_point(mut self, ref_point: Option<Vec<f64>>) -> Self {
        self.ref_point = ref_point;
        self
    }

    /// Sets the exploration weight of confidence bounds
    pub fn lcb_kappa(mut self, kappa: f64) -> Self {
        self.lcb_kappa = kappa;
        self
    }

    /// Sets the number of Pareto fronts sampled by MESMO
    pub fn mesmo_samples(mut self, n_samples: usize) -> Self {
        self.mesmo_samples = n_samples;
        self
    }

    /// Sets the encoded candidates on which MESMO samples Pareto fronts
    pub fn pool(mut self, pool: Array2<f64>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Penalizes single objective criteria around `pending` encoded points
    /// (see [`LocalPenalization`])
    pub fn local_penalization(
        mut self,
        pending: Array2<f64>,
        lipschitz: f64,
        scale: Array1<f64>,
    ) -> Self {
        self.penalization = if pending.nrows() > 0 {
            Some(Penalization {
                pending,
                lipschitz,
                scale,
            })
        } else {
            None
        };
        self
    }

    /// Builds the criterion.
    ///
    /// `obj_models` were trained on the (n, n_models) targets `y`, `feasible` flags the
    /// rows of `y` which are feasible observations. With ParEGO a single model of the
    /// scalarized objectives is expected.
    pub fn build(
        &self,
        mut obj_models: Vec<Box<dyn Surrogate>>,
        cstr_models: Vec<Box<dyn Surrogate>>,
        y: &Array2<f64>,
        feasible: &[bool],
        rng: &mut Xoshiro256Plus,
    ) -> Result<Box<dyn AcquisitionFunction>> {
        if obj_models.is_empty() {
            return Err(OpenBoxError::InvalidValue(
                "no objective model to build acquisition".to_string(),
            ));
        }
        let kind = self.kind.resolve(obj_models.len(), cstr_models.len());
        let has_feasible = feasible.iter().any(|f| *f);
        let fmin = y
            .column(0)
            .iter()
            .zip(feasible)
            .filter(|(_, f)| **f || cstr_models.is_empty())
            .map(|(v, _)| *v)
            .fold(f64::INFINITY, f64::min);
        let fmin = if fmin.is_finite() {
            fmin
        } else {
            y.column(0).fold(f64::INFINITY, |a, b| a.min(*b))
        };

        let pending_preds = match &self.penalization {
            Some(p) if kind.is_single_objective() => {
                Some(obj_models[0].predict_valvar(&p.pending.view())?)
            }
            _ => None,
        };

        let (inner, mode): (Box<dyn AcquisitionFunction>, FeasibilityMode) = match kind {
            AcquisitionType::EI | AcquisitionType::EIC | AcquisitionType::ParEGO => (
                Box::new(ExpectedImprovement::new(obj_models.remove(0), fmin)),
                FeasibilityMode::Product,
            ),
            AcquisitionType::LogEI => (
                Box::new(LogExpectedImprovement::new(obj_models.remove(0), fmin)),
                FeasibilityMode::Log,
            ),
            AcquisitionType::PI => (
                Box::new(ProbabilityOfImprovement::new(obj_models.remove(0), fmin)),
                FeasibilityMode::Product,
            ),
            AcquisitionType::LCB => (
                Box::new(LowerConfidenceBound::new(obj_models.remove(0), self.lcb_kappa)),
                FeasibilityMode::Softplus,
            ),
            AcquisitionType::EHVI | AcquisitionType::EHVIC => {
                let ref_point = self.ref_point.as_deref().ok_or_else(|| {
                    OpenBoxError::InvalidConfigError(format!("{kind:?} requires a reference point"))
                })?;
                let rows: Vec<usize> = (0..y.nrows()).filter(|&i| feasible[i]).collect();
                let front = y.select(Axis(0), &rows);
                (
                    Box::new(ExpectedHypervolumeImprovement::new(
                        obj_models, &front, ref_point,
                    )),
                    FeasibilityMode::Product,
                )
            }
            AcquisitionType::MESMO => {
                let pool = self.pool.as_ref().ok_or_else(|| {
                    OpenBoxError::InvalidValue("MESMO requires a candidate pool".to_string())
                })?;
                (
                    Box::new(Mesmo::new(
                        obj_models,
                        &pool.view(),
                        y,
                        self.mesmo_samples,
                        rng,
                    )?),
                    FeasibilityMode::Log,
                )
            }
            AcquisitionType::USEMO => (
                Box::new(Usemo::new(obj_models, self.lcb_kappa)),
                FeasibilityMode::Softplus,
            ),
            AcquisitionType::Auto => {
                return Err(OpenBoxError::InvalidConfigError(
                    "unresolved acquisition type".to_string(),
                ))
            }
        };

        let inner: Box<dyn AcquisitionFunction> = match (&self.penalization, pending_preds) {
            (Some(p), Some((mean, var))) => Box::new(LocalPenalization::new(
                inner,
                &p.pending,
                &mean,
                &var,
                fmin,
                p.lipschitz,
                &p.scale,
            )),
            _ => inner,
        };

        if cstr_models.is_empty() {
            return Ok(inner);
        }
        let improvement_based = matches!(
            kind,
            AcquisitionType::EI
                | AcquisitionType::EIC
                | AcquisitionType::LogEI
                | AcquisitionType::PI
                | AcquisitionType::ParEGO
                | AcquisitionType::EHVI
                | AcquisitionType::EHVIC
        );
        if improvement_based && !has_feasible {
            debug!("No feasible observation yet, maximizing probability of feasibility");
            Ok(Box::new(Constrained::new(None, cstr_models, mode)))
        } else {
            Ok(Box::new(Constrained::new(Some(inner), cstr_models, mode)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array};
    use ndarray_rand::rand::SeedableRng;
    use openbox_surrogate::{SurrogateBuilder, SurrogateType};

    fn gp(x: &Array2<f64>, y: &Array1<f64>) -> Box<dyn Surrogate> {
        SurrogateBuilder::new(SurrogateType::Gp)
            .train(&x.view(), &y.view())
            .unwrap()
    }

    /// A deterministic model with given mean and variance functions
    struct Fixed(fn(f64) -> f64, f64);

    impl std::fmt::Display for Fixed {
        fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "Fixed")
        }
    }

    impl Surrogate for Fixed {
        fn predict_valvar(
            &self,
            x: &ArrayView2<f64>,
        ) -> openbox_surrogate::Result<(Array1<f64>, Array1<f64>)> {
            Ok((x.column(0).mapv(self.0), Array1::from_elem(x.nrows(), self.1)))
        }
    }

    #[test]
    fn test_auto_resolution() {
        assert_eq!(AcquisitionType::Auto.resolve(1, 0), AcquisitionType::EI);
        assert_eq!(AcquisitionType::Auto.resolve(1, 2), AcquisitionType::EIC);
        assert_eq!(AcquisitionType::Auto.resolve(2, 0), AcquisitionType::EHVI);
        assert_eq!(AcquisitionType::Auto.resolve(4, 1), AcquisitionType::EHVIC);
        assert_eq!(AcquisitionType::Auto.resolve(5, 0), AcquisitionType::MESMO);
        assert_eq!(AcquisitionType::LCB.resolve(1, 3), AcquisitionType::LCB);
    }

    #[test]
    fn test_check() {
        assert!(AcquisitionType::EI.check(2, 0, None).is_err());
        assert!(AcquisitionType::Auto.check(2, 0, None).is_err());
        assert!(AcquisitionType::Auto.check(2, 0, Some(&[1.])).is_err());
        assert!(AcquisitionType::Auto.check(2, 0, Some(&[1., 1.])).is_ok());
        assert!(AcquisitionType::MESMO.check(3, 1, None).is_ok());
        assert!(AcquisitionType::ParEGO.check(1, 0, None).is_err());
        assert!(AcquisitionType::Auto.check(1, 0, None).is_ok());
    }

    #[test]
    fn test_ei_zero_at_training_points() {
        let x = Array::linspace(0., 1., 8).insert_axis(Axis(1));
        let y = x.column(0).mapv(|v| (v - 0.4) * (v - 0.4));
        let fmin = y.fold(f64::INFINITY, |a, b| a.min(*b));
        let ei = ExpectedImprovement::new(gp(&x, &y), fmin);
        let values = ei.values(&x.view()).unwrap();
        values.iter().for_each(|v| assert_abs_diff_eq!(*v, 0., epsilon = 1e-4));
        let between = ei.values(&array![[0.4]].view()).unwrap();
        assert!(between[0] > values.fold(0., |a: f64, b| a.max(*b)));
    }

    #[test]
    fn test_logei_consistent_with_ei() {
        let x = array![[0.25], [0.5]];
        let model = || -> Box<dyn Surrogate> { Box::new(Fixed(|v| v, 0.04)) };
        let ei = ExpectedImprovement::new(model(), 0.3).values(&x.view()).unwrap();
        let logei = LogExpectedImprovement::new(model(), 0.3)
            .values(&x.view())
            .unwrap();
        assert_abs_diff_eq!(logei, ei.mapv(f64::ln), epsilon = 1e-9);
    }

    #[test]
    fn test_pi_and_lcb() {
        let x = array![[0.], [1.]];
        let pi = ProbabilityOfImprovement::new(Box::new(Fixed(|v| v, 1.)), 0.)
            .values(&x.view())
            .unwrap();
        assert_abs_diff_eq!(pi[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(pi[1], norm_cdf(-1.), epsilon = 1e-12);
        let lcb = LowerConfidenceBound::new(Box::new(Fixed(|v| v, 4.)), 2.)
            .values(&x.view())
            .unwrap();
        assert_abs_diff_eq!(lcb, array![4., 3.], epsilon = 1e-12);
    }

    #[test]
    fn test_ehvi_deterministic_is_hvi() {
        // with null variance EHVI is the hypervolume improvement of the predicted point
        let front = array![[1., 3.], [3., 1.]];
        let models: Vec<Box<dyn Surrogate>> =
            vec![Box::new(Fixed(|v| v, 0.)), Box::new(Fixed(|v| 4. - v, 0.))];
        let ehvi = ExpectedHypervolumeImprovement::new(models, &front, &[4., 4.]);
        // point (2, 2) adds a 1x1 square
        let values = ehvi.values(&array![[2.], [1.]].view()).unwrap();
        assert_abs_diff_eq!(values[0], 1., epsilon = 1e-12);
        assert_abs_diff_eq!(values[1], 0., epsilon = 1e-12);
    }

    #[test]
    fn test_ehvi_positive_with_uncertainty() {
        let front = array![[1., 3.], [3., 1.]];
        let models: Vec<Box<dyn Surrogate>> =
            vec![Box::new(Fixed(|v| v, 0.5)), Box::new(Fixed(|v| 4. - v, 0.5))];
        let ehvi = ExpectedHypervolumeImprovement::new(models, &front, &[4., 4.]);
        let values = ehvi.values(&array![[2.], [1.]].view()).unwrap();
        assert!(values[1] > 0.);
        assert!(values[0] > values[1]);
    }

    #[test]
    fn test_constrained_without_feasible_point() {
        let x = Array::linspace(0., 1., 6).insert_axis(Axis(1));
        let y = x.column(0).to_owned().insert_axis(Axis(1));
        let acq = AcquisitionBuilder::new(AcquisitionType::EIC)
            .build(
                vec![gp(&x, &y.column(0).to_owned())],
                vec![Box::new(Fixed(|v| 2. - v, 1e-2))],
                &y,
                &[false; 6],
                &mut Xoshiro256Plus::seed_from_u64(0),
            )
            .unwrap();
        assert_eq!(acq.name(), "PoF");
        let values = acq.values(&array![[0.], [1.]].view()).unwrap();
        assert!(values[1] > values[0]);
        assert!(values.iter().all(|v| (0. ..=1.).contains(v)));
    }

    #[test]
    fn test_eic_vanishes_where_infeasible() {
        let x = array![[0.], [1.]];
        let y = array![[1.], [0.5]];
        let acq = AcquisitionBuilder::new(AcquisitionType::Auto)
            .build(
                vec![Box::new(Fixed(|_| 0., 1.))],
                vec![Box::new(Fixed(|v| v - 0.5, 0.))],
                &y,
                &[true, false],
                &mut Xoshiro256Plus::seed_from_u64(0),
            )
            .unwrap();
        let values = acq.values(&x.view()).unwrap();
        assert!(values[0] > 0.);
        assert_eq!(values[1], 0.);
    }

    #[test]
    fn test_mesmo_and_usemo() {
        let x = Array::linspace(0., 1., 10).insert_axis(Axis(1));
        let y1 = x.column(0).mapv(|v| v * v);
        let y2 = x.column(0).mapv(|v| (v - 1.) * (v - 1.));
        let y = ndarray::stack![Axis(1), y1, y2];
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let pool = Array::linspace(0., 1., 50).insert_axis(Axis(1));
        let acq = AcquisitionBuilder::new(AcquisitionType::MESMO)
            .pool(pool)
            .mesmo_samples(5)
            .build(
                vec![gp(&x, &y1), gp(&x, &y2)],
                vec![],
                &y,
                &[true; 10],
                &mut rng,
            )
            .unwrap();
        let values = acq.values(&array![[0.05], [0.5]].view()).unwrap();
        assert!(values.iter().all(|v| v.is_finite() && *v >= -1e-9));

        let usemo = Usemo::new(
            vec![Box::new(Fixed(|v| v, 0.1)), Box::new(Fixed(|v| 1. - v, 0.1))],
            2.,
        );
        assert!(!usemo.pointwise());
        // all candidates on the lcb front
        let values = usemo.values(&array![[0.], [0.5], [1.]].view()).unwrap();
        values
            .iter()
            .for_each(|v| assert_abs_diff_eq!(*v, (4. * 0.1_f64.sqrt()).powi(2), epsilon = 1e-12));
        let dominated = Usemo::new(
            vec![Box::new(Fixed(|v| v, 0.1)), Box::new(Fixed(|v| v, 0.1))],
            2.,
        );
        let values = dominated.values(&array![[0.], [0.5], [1.]].view()).unwrap();
        assert!(values[0] > 0.);
        assert_eq!(values[1], -1.);
        assert_eq!(values[2], -2.);
    }

    #[test]
    fn test_parego() {
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        let w = parego_weights(3, &mut rng);
        assert_abs_diff_eq!(w.sum(), 1., epsilon = 1e-12);
        assert!(w.iter().all(|v| *v >= 0.));

        let y = array![[0., 10.], [5., 5.], [10., 0.]];
        let s = parego_scalarize(&y, &array![0.5, 0.5], PAREGO_RHO);
        assert_abs_diff_eq!(s, array![0.525, 0.275, 0.525], epsilon = 1e-12);
    }

    #[test]
    fn test_local_penalization() {
        let inner: Box<dyn AcquisitionFunction> =
            Box::new(ExpectedImprovement::new(Box::new(Fixed(|_| 0., 1.)), 0.));
        // pending prediction is 1 without uncertainty, radius is |1 - 0| / 2
        let lp = LocalPenalization::new(
            inner,
            &array![[0.5]],
            &array![1.],
            &array![0.],
            0.,
            2.,
            &array![1.],
        );
        let penalty = lp.penalty(&array![[0.5], [0.75], [1.]].view());
        assert_abs_diff_eq!(penalty, array![0., 0.5, 1.], epsilon = 1e-12);
        let values = lp.values(&array![[0.5], [1.]].view()).unwrap();
        assert_eq!(values[0], 0.);
        assert_abs_diff_eq!(values[1], norm_pdf(0.), epsilon = 1e-12);

        let x = array![[0.], [0.5], [1.]];
        let y = array![0., 2., 1.];
        assert_abs_diff_eq!(estimate_lipschitz(&x, &y, &array![1.]), 4., epsilon = 1e-12);
    }
}
