use crate::errors::{Result, SpaceError};
use crate::hyperparameter::{Hyperparameter, ParamValue};
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Data, Ix1};
use ndarray_rand::rand::seq::SliceRandom;
use ndarray_rand::rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A point of a [`ConfigSpace`]: hyperparameter values by name
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration {
    values: BTreeMap<String, ParamValue>,
}

impl Configuration {
    /// An empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a value, builder style
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Sets a value
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Value of the given hyperparameter
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    /// Float value of the given hyperparameter (integers are converted)
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ParamValue::as_f64)
    }

    /// Integer value of the given hyperparameter
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ParamValue::as_i64)
    }

    /// String value of the given categorical or ordinal hyperparameter
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the configuration holds no value
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over `(name, value)` pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.values.iter()
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}: {v}")?;
        }
        write!(f, "}}")
    }
}

/// An ordered set of hyperparameters with unique names.
///
/// The space defines the encoding of configurations as vectors used by surrogate
/// models: one component per non constant hyperparameter, in insertion order.
///
/// ```
/// use openbox_space::{ConfigSpace, Hyperparameter};
///
/// let space = ConfigSpace::new()
///     .add(Hyperparameter::float("x1", -5., 10.)).unwrap()
///     .add(Hyperparameter::int("n", 1, 8)).unwrap()
///     .add(Hyperparameter::categorical("kernel", ["rbf", "linear"])).unwrap();
/// assert_eq!(space.dim(), 3);
/// let conf = space.default_configuration();
/// assert_eq!(space.from_array(&space.to_array(&conf).unwrap()), conf);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSpace {
    hyperparameters: Vec<Hyperparameter>,
    /// Indices of encoded hyperparameters
    #[serde(skip)]
    encoded: Vec<usize>,
}

impl ConfigSpace {
    /// An empty space
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a hyperparameter, checking its definition and name unicity
    pub fn add(mut self, hp: Hyperparameter) -> Result<Self> {
        hp.check()?;
        if self.hyperparameters.iter().any(|h| h.name() == hp.name()) {
            return Err(SpaceError::DuplicateName(hp.name().to_string()));
        }
        if hp.is_encoded() {
            self.encoded.push(self.hyperparameters.len());
        }
        self.hyperparameters.push(hp);
        Ok(self)
    }

    /// Builds a space from a list of hyperparameters
    pub fn from_hyperparameters(hps: impl IntoIterator<Item = Hyperparameter>) -> Result<Self> {
        hps.into_iter().try_fold(Self::new(), |space, hp| space.add(hp))
    }

    /// Rebuilds the encoding index, required after deserialization
    pub fn reindexed(mut self) -> Self {
        self.encoded = self
            .hyperparameters
            .iter()
            .enumerate()
            .filter(|(_, h)| h.is_encoded())
            .map(|(i, _)| i)
            .collect();
        self
    }

    /// All hyperparameters in insertion order
    pub fn hyperparameters(&self) -> &[Hyperparameter] {
        &self.hyperparameters
    }

    /// Hyperparameter of the given name
    pub fn get(&self, name: &str) -> Option<&Hyperparameter> {
        self.hyperparameters.iter().find(|h| h.name() == name)
    }

    /// Number of hyperparameters, constants included
    pub fn len(&self) -> usize {
        self.hyperparameters.len()
    }

    /// Whether the space has no hyperparameter
    pub fn is_empty(&self) -> bool {
        self.hyperparameters.is_empty()
    }

    /// Dimension of the encoded vectors
    pub fn dim(&self) -> usize {
        self.encoded.len()
    }

    fn encoded_hp(&self, dim: usize) -> &Hyperparameter {
        &self.hyperparameters[self.encoded[dim]]
    }

    fn encoded_hps(&self) -> impl Iterator<Item = &Hyperparameter> {
        self.encoded.iter().map(|&i| &self.hyperparameters[i])
    }

    /// Whether the encoded dimension `dim` is categorical
    pub fn is_categorical(&self, dim: usize) -> bool {
        self.encoded_hp(dim).is_categorical()
    }

    /// Categorical flags of encoded dimensions
    pub fn categorical_mask(&self) -> Vec<bool> {
        self.encoded_hps().map(|h| h.is_categorical()).collect()
    }

    /// Number of choices of the encoded dimension `dim`, `None` if continuous
    pub fn n_choices(&self, dim: usize) -> Option<usize> {
        self.encoded_hp(dim).cardinality()
    }

    /// Number of distinct configurations, `None` if infinite or too large
    pub fn cardinality(&self) -> Option<usize> {
        self.hyperparameters
            .iter()
            .try_fold(1usize, |acc, h| h.cardinality().and_then(|c| acc.checked_mul(c)))
    }

    /// Bounds of encoded vectors as a (dim, 2) matrix
    pub fn bounds(&self) -> Array2<f64> {
        let mut bounds = Array2::zeros((self.dim(), 2));
        for (i, hp) in self.encoded_hps().enumerate() {
            let (lo, up) = hp.encoded_bounds();
            bounds[[i, 0]] = lo;
            bounds[[i, 1]] = up;
        }
        bounds
    }

    /// The configuration made of default values
    pub fn default_configuration(&self) -> Configuration {
        self.hyperparameters
            .iter()
            .fold(Configuration::new(), |c, h| {
                c.with(h.name(), h.default_value())
            })
    }

    /// Checks the configuration names match the space and values are valid
    pub fn validate(&self, config: &Configuration) -> Result<()> {
        if let Some((name, _)) = config.iter().find(|(n, _)| self.get(n).is_none()) {
            return Err(SpaceError::UnknownName(name.to_string()));
        }
        for hp in self.hyperparameters.iter() {
            let value = config.get(hp.name()).ok_or_else(|| {
                SpaceError::InvalidValue(format!("missing value for `{}`", hp.name()))
            })?;
            hp.validate(value)?;
        }
        Ok(())
    }

    /// Validates a configuration and converts its values to the kind of their
    /// hyperparameter (see [`Hyperparameter::canonical`])
    pub fn canonicalize(&self, config: &Configuration) -> Result<Configuration> {
        self.validate(config)?;
        self.hyperparameters
            .iter()
            .try_fold(Configuration::new(), |c, hp| match config.get(hp.name()) {
                Some(v) => Ok(c.with(hp.name(), hp.canonical(v)?)),
                None => Ok(c),
            })
    }

    /// Encodes a configuration as a vector of dimension [`ConfigSpace::dim`]
    pub fn to_array(&self, config: &Configuration) -> Result<Array1<f64>> {
        self.validate(config)?;
        let mut x = Array1::zeros(self.dim());
        for (i, hp) in self.encoded_hps().enumerate() {
            // validated above
            if let Some(v) = config.get(hp.name()) {
                x[i] = hp.encode(v)?.unwrap_or(0.);
            }
        }
        Ok(x)
    }

    /// Encodes configurations as a (n, dim) matrix
    pub fn to_array2<'a>(
        &self,
        configs: impl IntoIterator<Item = &'a Configuration>,
    ) -> Result<Array2<f64>> {
        let rows = configs
            .into_iter()
            .map(|c| self.to_array(c))
            .collect::<Result<Vec<_>>>()?;
        let mut x = Array2::zeros((rows.len(), self.dim()));
        for (mut row, r) in x.rows_mut().into_iter().zip(rows) {
            row.assign(&r);
        }
        Ok(x)
    }

    /// Decodes a vector: integers are rounded, values clipped to bounds
    /// and categorical indices mapped back to choices
    pub fn from_array(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix1>) -> Configuration {
        let mut config = Configuration::new();
        let mut dim = 0;
        for hp in self.hyperparameters.iter() {
            if hp.is_encoded() {
                config.insert(hp.name(), hp.decode(x.get(dim).copied().unwrap_or(0.)));
                dim += 1;
            } else {
                config.insert(hp.name(), hp.default_value());
            }
        }
        config
    }

    /// Maps a point of the unit hypercube to a configuration, such that
    /// uniform points give uniformly drawn discrete values
    pub fn from_unit(&self, u: &ArrayView1<f64>) -> Configuration {
        let x: Array1<f64> = self
            .encoded_hps()
            .zip(u.iter())
            .map(|(hp, &ui)| hp.encode_uniform(ui))
            .collect();
        self.from_array(&x)
    }

    /// Draws a configuration uniformly (log-uniformly for log scaled hyperparameters)
    pub fn sample_configuration<R: Rng>(&self, rng: &mut R) -> Configuration {
        let u: Array1<f64> = (0..self.dim()).map(|_| rng.gen::<f64>()).collect();
        self.from_unit(&u.view())
    }

    /// Draws `n` configurations, duplicates allowed
    pub fn sample_configurations<R: Rng>(&self, n: usize, rng: &mut R) -> Vec<Configuration> {
        (0..n).map(|_| self.sample_configuration(rng)).collect()
    }

    /// Returns up to `n` one-exchange neighbours of `config`: each one differs from
    /// `config` on a single hyperparameter. Dimensions are visited in random order,
    /// cycling when `n` exceeds the space dimension.
    pub fn neighbors<R: Rng>(
        &self,
        config: &Configuration,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<Configuration>> {
        let base = self.canonicalize(config)?;
        let x = self.to_array(&base)?;
        let dim = self.dim();
        if dim == 0 {
            return Ok(vec![]);
        }
        let mut order: Vec<usize> = (0..dim).collect();
        let mut res = Vec::with_capacity(n);
        while res.len() < n {
            order.shuffle(rng);
            let before = res.len();
            for &d in order.iter() {
                if res.len() >= n {
                    break;
                }
                let hp = self.encoded_hp(d);
                let value = hp.decode(hp.encoded_neighbor(x[d], rng));
                if base.get(hp.name()) != Some(&value) {
                    res.push(base.clone().with(hp.name(), value));
                }
            }
            if res.len() == before {
                // every dimension is stuck on a single value
                break;
            }
        }
        Ok(res)
    }

    /// Unit-scaled encoding used to compute distances between configurations:
    /// categorical indices are divided by their number of choices minus one
    pub fn to_unit_array(&self, config: &Configuration) -> Result<Array1<f64>> {
        let mut x = self.to_array(config)?;
        for (i, hp) in self.encoded_hps().enumerate() {
            if hp.is_categorical() {
                let (_, up) = hp.encoded_bounds();
                if up > 0. {
                    x[i] /= up;
                }
            }
        }
        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use ndarray_rand::rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    fn mixed_space() -> ConfigSpace {
        ConfigSpace::new()
            .add(Hyperparameter::float("x", -5., 10.))
            .unwrap()
            .add(Hyperparameter::float("lr", 1e-5, 1.).log_scale(true))
            .unwrap()
            .add(Hyperparameter::int("n", 1, 5))
            .unwrap()
            .add(Hyperparameter::constant("k", "fixed"))
            .unwrap()
            .add(Hyperparameter::categorical("c", ["a", "b", "c"]))
            .unwrap()
            .add(Hyperparameter::ordinal("o", ["low", "mid", "high"]))
            .unwrap()
    }

    #[test]
    fn test_add_errors() {
        let space = ConfigSpace::new()
            .add(Hyperparameter::float("x", 0., 1.))
            .unwrap();
        assert!(matches!(
            space.clone().add(Hyperparameter::int("x", 0, 1)),
            Err(SpaceError::DuplicateName(_))
        ));
        assert!(matches!(
            space.add(Hyperparameter::float("y", 1., 1.)),
            Err(SpaceError::InvalidHyperparameter(_, _))
        ));
    }

    #[test]
    fn test_dims() {
        let space = mixed_space();
        assert_eq!(space.len(), 6);
        assert_eq!(space.dim(), 5);
        assert_eq!(space.categorical_mask(), vec![false, false, false, true, false]);
        assert_eq!(space.n_choices(0), None);
        assert_eq!(space.n_choices(2), Some(5));
        assert_eq!(space.n_choices(3), Some(3));
        assert_eq!(
            space.bounds(),
            array![[0., 1.], [0., 1.], [0., 1.], [0., 2.], [0., 1.]]
        );
    }

    #[test]
    fn test_roundtrip() {
        let space = mixed_space();
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        for config in space.sample_configurations(50, &mut rng) {
            space.validate(&config).unwrap();
            let x = space.to_array(&config).unwrap();
            assert_eq!(space.from_array(&x), config);
        }
        for (x, lr) in [(0.1, 0.003), (-4.7, 1e-5), (9.99, 0.1234), (2.5, 0.7)] {
            let config = space
                .default_configuration()
                .with("x", x)
                .with("lr", lr)
                .with("n", 4i64)
                .with("c", "b");
            let back = space.from_array(&space.to_array(&config).unwrap());
            assert_eq!(back, config);
        }
    }

    #[test]
    fn test_canonicalize() {
        let space = mixed_space();
        let config = space
            .default_configuration()
            .with("x", 2i64)
            .with("lr", 0.003)
            .with("n", 3.);
        let canonical = space.canonicalize(&config).unwrap();
        assert_eq!(canonical.get("x"), Some(&ParamValue::Float(2.)));
        assert_eq!(canonical.get("n"), Some(&ParamValue::Int(3)));
        assert_eq!(space.from_array(&space.to_array(&config).unwrap()), canonical);
        assert!(space.canonicalize(&config.with("n", 3.5)).is_err());
    }

    #[test]
    fn test_from_array_clips() {
        let space = mixed_space();
        let c = space.from_array(&array![2., -1., 7., 9., -3.]);
        assert_eq!(c.get_f64("x"), Some(10.));
        assert_eq!(c.get_f64("lr"), Some(1e-5));
        assert_eq!(c.get_i64("n"), Some(5));
        assert_eq!(c.get_str("c"), Some("c"));
        assert_eq!(c.get_str("o"), Some("low"));
        assert_eq!(c.get_str("k"), Some("fixed"));
    }

    #[test]
    fn test_validate() {
        let space = mixed_space();
        let conf = space.default_configuration().with("x", 20.);
        assert!(space.validate(&conf).is_err());
        let conf = space.default_configuration().with("unknown", 1.);
        assert!(matches!(
            space.validate(&conf),
            Err(SpaceError::UnknownName(_))
        ));
        let conf = Configuration::new().with("x", 1.);
        assert!(space.validate(&conf).is_err());
    }

    #[test]
    fn test_neighbors() {
        let space = mixed_space();
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        let conf = space.default_configuration();
        let neighbors = space.neighbors(&conf, 12, &mut rng).unwrap();
        assert_eq!(neighbors.len(), 12);
        for n in neighbors.iter() {
            space.validate(n).unwrap();
            let changed = n.iter().filter(|(k, v)| conf.get(k) != Some(v)).count();
            assert_eq!(changed, 1);
        }
    }

    #[test]
    fn test_neighbors_keep_other_values() {
        let space = mixed_space();
        let mut rng = Xoshiro256Plus::seed_from_u64(3);
        let conf = space
            .default_configuration()
            .with("x", 0.1)
            .with("lr", 0.003);
        for n in space.neighbors(&conf, 25, &mut rng).unwrap() {
            let changed: Vec<&String> = n
                .iter()
                .filter(|(k, v)| conf.get(k) != Some(v))
                .map(|(k, _)| k)
                .collect();
            assert_eq!(changed.len(), 1, "{n}");
            if changed[0] != "x" {
                assert_eq!(n.get_f64("x"), Some(0.1));
            }
            if changed[0] != "lr" {
                assert_eq!(n.get_f64("lr"), Some(0.003));
            }
        }
    }

    #[test]
    fn test_constant_only_space() {
        let space = ConfigSpace::new()
            .add(Hyperparameter::constant("k", 3i64))
            .unwrap();
        assert_eq!(space.dim(), 0);
        assert_eq!(space.cardinality(), Some(1));
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        assert!(space
            .neighbors(&space.default_configuration(), 5, &mut rng)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_serde() {
        let space = mixed_space();
        let json = serde_json::to_string(&space).unwrap();
        let loaded: ConfigSpace = serde_json::from_str::<ConfigSpace>(&json)
            .unwrap()
            .reindexed();
        assert_eq!(loaded, space);
        let conf = space.default_configuration();
        let json = serde_json::to_string(&conf).unwrap();
        let back: Configuration = serde_json::from_str(&json).unwrap();
        assert_eq!(back, conf);
    }
}
