//! Hyperparameter definitions making up a configuration space.
//!
//! Every hyperparameter knows how to map its values to and from a single
//! component of the unit hypercube used by surrogate models:
//!
//! * float and integer values are normalized to `[0, 1]` (on a log scale when required),
//! * ordinal values are mapped to their rank divided by the sequence length minus one,
//! * categorical values are mapped to their choice index in `[0, n_choices - 1]`,
//! * constants are not encoded at all.

use crate::errors::{Result, SpaceError};
use ndarray_rand::rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Largest number of values of an integer hyperparameter, all of them being
/// exactly representable once encoded
pub const MAX_INT_VALUES: i128 = 1 << 53;

/// Number of values within the inclusive integer range `[lower, upper]`
fn int_span(lower: i64, upper: i64) -> i128 {
    upper as i128 - lower as i128 + 1
}

/// A hyperparameter value
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Integer value
    Int(i64),
    /// Float value
    Float(f64),
    /// Categorical or ordinal choice
    Str(String),
}

impl ParamValue {
    /// Value as a float, integers being converted
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            ParamValue::Str(_) => None,
        }
    }

    /// Value as an integer, floats with an integral value being accepted
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) if v.fract() == 0. => Some(*v as i64),
            _ => None,
        }
    }

    /// Value as a string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for ParamValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ParamValue::Int(a), ParamValue::Int(b)) => a == b,
            (ParamValue::Float(a), ParamValue::Float(b)) => a.to_bits() == b.to_bits(),
            (ParamValue::Str(a), ParamValue::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ParamValue {}

impl Hash for ParamValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ParamValue::Int(v) => v.hash(state),
            ParamValue::Float(v) => v.to_bits().hash(state),
            ParamValue::Str(s) => s.hash(state),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

/// A hyperparameter of a configuration space
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Hyperparameter {
    /// A continuous value within `[lower, upper]`
    Float {
        /// Name
        name: String,
        /// Lower bound
        lower: f64,
        /// Upper bound
        upper: f64,
        /// Default value, middle of the (log) interval when not specified
        default: Option<f64>,
        /// Whether values are sampled and encoded on a log scale
        log: bool,
    },
    /// An integer value within `[lower, upper]` (inclusive)
    Int {
        /// Name
        name: String,
        /// Lower bound
        lower: i64,
        /// Upper bound
        upper: i64,
        /// Default value, middle of the (log) interval when not specified
        default: Option<i64>,
        /// Whether values are sampled and encoded on a log scale
        log: bool,
    },
    /// An unordered choice
    Categorical {
        /// Name
        name: String,
        /// Available choices
        choices: Vec<String>,
        /// Default choice, first one when not specified
        default: Option<String>,
    },
    /// An ordered choice
    Ordinal {
        /// Name
        name: String,
        /// Ordered sequence of values
        sequence: Vec<String>,
        /// Default value, first one when not specified
        default: Option<String>,
    },
    /// A fixed value
    Constant {
        /// Name
        name: String,
        /// The value
        value: ParamValue,
    },
}

impl Hyperparameter {
    /// A float hyperparameter within `[lower, upper]`
    pub fn float(name: impl Into<String>, lower: f64, upper: f64) -> Self {
        Hyperparameter::Float {
            name: name.into(),
            lower,
            upper,
            default: None,
            log: false,
        }
    }

    /// An integer hyperparameter within `[lower, upper]`
    pub fn int(name: impl Into<String>, lower: i64, upper: i64) -> Self {
        Hyperparameter::Int {
            name: name.into(),
            lower,
            upper,
            default: None,
            log: false,
        }
    }

    /// A categorical hyperparameter
    pub fn categorical<S: Into<String>>(
        name: impl Into<String>,
        choices: impl IntoIterator<Item = S>,
    ) -> Self {
        Hyperparameter::Categorical {
            name: name.into(),
            choices: choices.into_iter().map(Into::into).collect(),
            default: None,
        }
    }

    /// An ordinal hyperparameter
    pub fn ordinal<S: Into<String>>(
        name: impl Into<String>,
        sequence: impl IntoIterator<Item = S>,
    ) -> Self {
        Hyperparameter::Ordinal {
            name: name.into(),
            sequence: sequence.into_iter().map(Into::into).collect(),
            default: None,
        }
    }

    /// A constant hyperparameter
    pub fn constant(name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        Hyperparameter::Constant {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Sets the default value.
    /// Values of the wrong kind are caught when the hyperparameter is added to a space.
    pub fn with_default(mut self, value: impl Into<ParamValue>) -> Self {
        let value = value.into();
        match &mut self {
            Hyperparameter::Float { default, .. } => *default = value.as_f64().or(Some(f64::NAN)),
            Hyperparameter::Int { default, .. } => *default = value.as_i64().or(Some(i64::MIN)),
            Hyperparameter::Categorical { default, .. } | Hyperparameter::Ordinal { default, .. } => {
                *default = Some(value.to_string())
            }
            Hyperparameter::Constant { .. } => {}
        }
        self
    }

    /// Sets log scale for float and integer hyperparameters, no-op otherwise
    pub fn log_scale(mut self, enabled: bool) -> Self {
        match &mut self {
            Hyperparameter::Float { log, .. } | Hyperparameter::Int { log, .. } => *log = enabled,
            _ => {}
        }
        self
    }

    /// Name of the hyperparameter
    pub fn name(&self) -> &str {
        match self {
            Hyperparameter::Float { name, .. }
            | Hyperparameter::Int { name, .. }
            | Hyperparameter::Categorical { name, .. }
            | Hyperparameter::Ordinal { name, .. }
            | Hyperparameter::Constant { name, .. } => name,
        }
    }

    /// Whether the hyperparameter takes place in the encoded vector
    pub fn is_encoded(&self) -> bool {
        !matches!(self, Hyperparameter::Constant { .. })
    }

    /// Whether the hyperparameter is an unordered choice
    pub fn is_categorical(&self) -> bool {
        matches!(self, Hyperparameter::Categorical { .. })
    }

    /// Number of distinct values, `None` for floats
    pub fn cardinality(&self) -> Option<usize> {
        match self {
            Hyperparameter::Float { .. } => None,
            Hyperparameter::Int { lower, upper, .. } => {
                usize::try_from(int_span(*lower, *upper)).ok()
            }
            Hyperparameter::Categorical { choices, .. } => Some(choices.len()),
            Hyperparameter::Ordinal { sequence, .. } => Some(sequence.len()),
            Hyperparameter::Constant { .. } => Some(1),
        }
    }

    /// Bounds of the encoded component
    pub fn encoded_bounds(&self) -> (f64, f64) {
        match self {
            Hyperparameter::Categorical { choices, .. } => (0., (choices.len() - 1) as f64),
            _ => (0., 1.),
        }
    }

    /// Checks the consistency of the definition
    pub fn check(&self) -> Result<()> {
        let invalid = |msg: String| {
            Err(SpaceError::InvalidHyperparameter(
                self.name().to_string(),
                msg,
            ))
        };
        match self {
            Hyperparameter::Float {
                lower,
                upper,
                default,
                log,
                ..
            } => {
                if !(lower.is_finite() && upper.is_finite()) || lower >= upper {
                    return invalid(format!("bad bounds [{lower}, {upper}]"));
                }
                if *log && *lower <= 0. {
                    return invalid(format!("log scale requires lower > 0, got {lower}"));
                }
                if let Some(d) = default {
                    if !(d >= lower && d <= upper) {
                        return invalid(format!("default {d} out of [{lower}, {upper}]"));
                    }
                }
            }
            Hyperparameter::Int {
                lower,
                upper,
                default,
                log,
                ..
            } => {
                if lower >= upper {
                    return invalid(format!("bad bounds [{lower}, {upper}]"));
                }
                if int_span(*lower, *upper) > MAX_INT_VALUES {
                    return invalid(format!("range [{lower}, {upper}] is too wide"));
                }
                if *log && *lower <= 0 {
                    return invalid(format!("log scale requires lower > 0, got {lower}"));
                }
                if let Some(d) = default {
                    if d < lower || d > upper {
                        return invalid(format!("default out of [{lower}, {upper}]"));
                    }
                }
            }
            Hyperparameter::Categorical {
                choices, default, ..
            }
            | Hyperparameter::Ordinal {
                sequence: choices,
                default,
                ..
            } => {
                if choices.is_empty() {
                    return invalid("no choice given".to_string());
                }
                let mut sorted = choices.clone();
                sorted.sort();
                sorted.dedup();
                if sorted.len() != choices.len() {
                    return invalid("duplicate choices".to_string());
                }
                if let Some(d) = default {
                    if !choices.contains(d) {
                        return invalid(format!("default `{d}` is not a valid choice"));
                    }
                }
            }
            Hyperparameter::Constant { .. } => {}
        }
        Ok(())
    }

    /// Default value
    pub fn default_value(&self) -> ParamValue {
        match self {
            // middle of the encoded interval
            Hyperparameter::Float { default, .. } => default
                .map(ParamValue::Float)
                .unwrap_or_else(|| self.decode(0.5)),
            Hyperparameter::Int {
                lower,
                upper,
                default,
                log,
                ..
            } => ParamValue::Int(default.unwrap_or_else(|| {
                if *log {
                    (0.5 * ((*lower as f64).ln() + (*upper as f64).ln()))
                        .exp()
                        .round() as i64
                } else {
                    (*lower as i128 + int_span(*lower, *upper) / 2) as i64
                }
            })),
            Hyperparameter::Categorical {
                choices, default, ..
            }
            | Hyperparameter::Ordinal {
                sequence: choices,
                default,
                ..
            } => ParamValue::Str(default.clone().unwrap_or_else(|| choices[0].clone())),
            Hyperparameter::Constant { value, .. } => value.clone(),
        }
    }

    /// Checks a value belongs to the hyperparameter domain
    pub fn validate(&self, value: &ParamValue) -> Result<()> {
        let ok = match self {
            Hyperparameter::Float { lower, upper, .. } => value
                .as_f64()
                .map(|v| v >= *lower && v <= *upper)
                .unwrap_or(false),
            Hyperparameter::Int { lower, upper, .. } => value
                .as_i64()
                .map(|v| v >= *lower && v <= *upper)
                .unwrap_or(false),
            Hyperparameter::Categorical { choices, .. }
            | Hyperparameter::Ordinal {
                sequence: choices,
                ..
            } => value
                .as_str()
                .map(|s| choices.iter().any(|c| c == s))
                .unwrap_or(false),
            Hyperparameter::Constant { value: v, .. } => v == value,
        };
        if ok {
            Ok(())
        } else {
            Err(SpaceError::InvalidValue(format!(
                "{value} is not a valid value for `{}`",
                self.name()
            )))
        }
    }

    /// Converts a valid value to the kind of the hyperparameter: integral floats
    /// given to an integer hyperparameter become integers and conversely
    pub fn canonical(&self, value: &ParamValue) -> Result<ParamValue> {
        self.validate(value)?;
        let canonical = match self {
            Hyperparameter::Float { .. } => value.as_f64().map(ParamValue::Float),
            Hyperparameter::Int { .. } => value.as_i64().map(ParamValue::Int),
            _ => None,
        };
        Ok(canonical.unwrap_or_else(|| value.clone()))
    }

    fn encode_float(v: f64, lower: f64, upper: f64, log: bool) -> f64 {
        if log {
            (v.ln() - lower.ln()) / (upper.ln() - lower.ln())
        } else {
            (v - lower) / (upper - lower)
        }
    }

    /// Encodes a value as a component of the unit hypercube (categorical: choice index).
    /// Returns `None` for constants.
    pub fn encode(&self, value: &ParamValue) -> Result<Option<f64>> {
        self.validate(value)?;
        let encoded = match self {
            Hyperparameter::Float {
                lower, upper, log, ..
            } => {
                let v = value.as_f64().unwrap_or(*lower);
                Some(Self::encode_float(v, *lower, *upper, *log))
            }
            Hyperparameter::Int {
                lower, upper, log, ..
            } => {
                let v = value.as_i64().unwrap_or(*lower);
                if *log {
                    let (lo, up) = ((*lower as f64 - 0.5).ln(), (*upper as f64 + 0.5).ln());
                    Some(((v as f64).ln() - lo) / (up - lo))
                } else {
                    let n = int_span(*lower, *upper) as f64;
                    Some(((v as i128 - *lower as i128) as f64 + 0.5) / n)
                }
            }
            Hyperparameter::Categorical { choices, .. } => {
                let s = value.as_str().unwrap_or_default();
                choices.iter().position(|c| c == s).map(|i| i as f64)
            }
            Hyperparameter::Ordinal { sequence, .. } => {
                let s = value.as_str().unwrap_or_default();
                let n = sequence.len();
                sequence
                    .iter()
                    .position(|c| c == s)
                    .map(|i| if n > 1 { i as f64 / (n - 1) as f64 } else { 0. })
            }
            Hyperparameter::Constant { .. } => None,
        };
        Ok(encoded)
    }

    /// Decodes a component of the unit hypercube (categorical: choice index).
    /// Out of range inputs are clipped.
    ///
    /// Floats are decoded to the shortest decimal value encoding back to the
    /// clipped input, so that hand written values survive an encoding round trip.
    pub fn decode(&self, x: f64) -> ParamValue {
        let x = if x.is_nan() { 0. } else { x };
        match self {
            Hyperparameter::Float {
                lower, upper, log, ..
            } => {
                let t = x.clamp(0., 1.);
                let v = if *log {
                    (lower.ln() + t * (upper.ln() - lower.ln())).exp()
                } else {
                    lower + t * (upper - lower)
                };
                let v = v.clamp(*lower, *upper);
                let shortest = (0..17usize)
                    .filter_map(|digits| format!("{:.*e}", digits, v).parse::<f64>().ok())
                    .find(|r| {
                        *r >= *lower
                            && *r <= *upper
                            && Self::encode_float(*r, *lower, *upper, *log) == t
                    });
                ParamValue::Float(shortest.unwrap_or(v))
            }
            Hyperparameter::Int {
                lower, upper, log, ..
            } => {
                let t = x.clamp(0., 1.);
                let v = if *log {
                    let (lo, up) = ((*lower as f64 - 0.5).ln(), (*upper as f64 + 0.5).ln());
                    (lo + t * (up - lo)).exp().round() as i64
                } else {
                    let n = int_span(*lower, *upper);
                    (*lower as i128 + (t * n as f64).floor() as i128)
                        .clamp(*lower as i128, *upper as i128) as i64
                };
                ParamValue::Int(v.clamp(*lower, *upper))
            }
            Hyperparameter::Categorical { choices, .. } => {
                let i = (x.round().max(0.) as usize).min(choices.len() - 1);
                ParamValue::Str(choices[i].clone())
            }
            Hyperparameter::Ordinal { sequence, .. } => {
                let n = sequence.len();
                let i = ((x.clamp(0., 1.) * (n - 1) as f64).round() as usize).min(n - 1);
                ParamValue::Str(sequence[i].clone())
            }
            Hyperparameter::Constant { value, .. } => value.clone(),
        }
    }

    /// Maps a uniform sample `u` in `[0, 1)` to an encoded component, such that
    /// each value of a discrete hyperparameter gets an equal probability
    pub fn encode_uniform(&self, u: f64) -> f64 {
        let u = u.clamp(0., 1.);
        match self {
            Hyperparameter::Categorical { choices, .. } => {
                let k = choices.len();
                ((u * k as f64).floor() as usize).min(k - 1) as f64
            }
            Hyperparameter::Ordinal { sequence, .. } => {
                let k = sequence.len();
                if k > 1 {
                    ((u * k as f64).floor() as usize).min(k - 1) as f64 / (k - 1) as f64
                } else {
                    0.
                }
            }
            _ => u,
        }
    }

    /// Draws an encoded neighbour of the encoded component `x`,
    /// guaranteed to decode to a different value when the domain allows it
    pub fn encoded_neighbor<R: Rng>(&self, x: f64, rng: &mut R) -> f64 {
        use ndarray_rand::rand_distr::{Distribution, Normal};
        const STDDEV: f64 = 0.2;
        const MAX_TRIES: usize = 20;

        match self {
            Hyperparameter::Float { .. } | Hyperparameter::Int { .. } => {
                let current = self.decode(x);
                let normal = Normal::new(0., STDDEV).unwrap_or_else(|_| unreachable!());
                let mut candidate = x;
                for _ in 0..MAX_TRIES {
                    candidate = (x + normal.sample(rng)).clamp(0., 1.);
                    if self.decode(candidate) != current {
                        return candidate;
                    }
                }
                candidate
            }
            Hyperparameter::Categorical { choices, .. } => {
                let k = choices.len();
                if k < 2 {
                    return x;
                }
                let current = x.round() as usize;
                let mut other = rng.gen_range(0..k - 1);
                if other >= current {
                    other += 1;
                }
                other as f64
            }
            Hyperparameter::Ordinal { sequence, .. } => {
                let k = sequence.len();
                if k < 2 {
                    return x;
                }
                let current = (x * (k - 1) as f64).round() as i64;
                let step = if current == 0 {
                    1
                } else if current == (k - 1) as i64 || rng.gen_bool(0.5) {
                    -1
                } else {
                    1
                };
                (current + step) as f64 / (k - 1) as f64
            }
            Hyperparameter::Constant { .. } => x,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray_rand::rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    #[test]
    fn test_check() {
        assert!(Hyperparameter::float("x", 1., 0.).check().is_err());
        assert!(Hyperparameter::float("x", 0., 1.)
            .log_scale(true)
            .check()
            .is_err());
        assert!(Hyperparameter::float("x", 0., 1.)
            .with_default(2.)
            .check()
            .is_err());
        assert!(Hyperparameter::int("n", 1, 10)
            .with_default(20i64)
            .check()
            .is_err());
        assert!(Hyperparameter::categorical("c", Vec::<String>::new())
            .check()
            .is_err());
        assert!(Hyperparameter::categorical("c", ["a", "b"])
            .with_default("z")
            .check()
            .is_err());
        assert!(Hyperparameter::ordinal("o", ["low", "high"]).check().is_ok());
    }

    #[test]
    fn test_defaults() {
        assert_eq!(
            Hyperparameter::float("x", -5., 10.).default_value(),
            ParamValue::Float(2.5)
        );
        let d = Hyperparameter::float("lr", 1e-4, 1.)
            .log_scale(true)
            .default_value();
        assert_abs_diff_eq!(d.as_f64().unwrap(), 1e-2, epsilon = 1e-12);
        assert_eq!(
            Hyperparameter::int("n", 0, 10).default_value(),
            ParamValue::Int(5)
        );
        assert_eq!(
            Hyperparameter::categorical("c", ["a", "b"]).default_value(),
            ParamValue::Str("a".to_string())
        );
    }

    #[test]
    fn test_encode_decode() {
        let hp = Hyperparameter::float("x", -5., 10.);
        assert_abs_diff_eq!(hp.encode(&ParamValue::Float(-5.)).unwrap().unwrap(), 0.);
        assert_abs_diff_eq!(hp.encode(&ParamValue::Float(10.)).unwrap().unwrap(), 1.);
        assert_eq!(hp.decode(1.5), ParamValue::Float(10.));

        let hp = Hyperparameter::int("n", 1, 4);
        for v in 1..=4 {
            let e = hp.encode(&ParamValue::Int(v)).unwrap().unwrap();
            assert_eq!(hp.decode(e), ParamValue::Int(v));
        }
        assert_eq!(hp.decode(1.), ParamValue::Int(4));
        assert_eq!(hp.decode(0.), ParamValue::Int(1));

        let hp = Hyperparameter::int("n", 1, 1000).log_scale(true);
        for v in [1, 2, 10, 999, 1000] {
            let e = hp.encode(&ParamValue::Int(v)).unwrap().unwrap();
            assert_eq!(hp.decode(e), ParamValue::Int(v));
        }

        let hp = Hyperparameter::categorical("c", ["a", "b", "c"]);
        assert_eq!(hp.encode(&"c".into()).unwrap(), Some(2.));
        assert_eq!(hp.decode(1.2), ParamValue::Str("b".to_string()));
        assert_eq!(hp.encoded_bounds(), (0., 2.));

        let hp = Hyperparameter::ordinal("o", ["s", "m", "l"]);
        assert_eq!(hp.encode(&"m".into()).unwrap(), Some(0.5));
        assert_eq!(hp.decode(0.9), ParamValue::Str("l".to_string()));

        let hp = Hyperparameter::constant("k", "fixed");
        assert_eq!(hp.encode(&"fixed".into()).unwrap(), None);
        assert!(hp.encode(&"other".into()).is_err());
    }

    #[test]
    fn test_wide_int_ranges() {
        let hp = Hyperparameter::int("n", i64::MIN, i64::MAX);
        assert!(hp.check().is_err());
        assert_eq!(hp.cardinality(), None);

        let hp = Hyperparameter::int("n", i64::MAX - 10, i64::MAX);
        hp.check().unwrap();
        assert_eq!(hp.cardinality(), Some(11));
        assert_eq!(hp.decode(1.), ParamValue::Int(i64::MAX));
        assert_eq!(hp.decode(0.), ParamValue::Int(i64::MAX - 10));
        let e = hp.encode(&ParamValue::Int(i64::MAX)).unwrap().unwrap();
        assert_eq!(hp.decode(e), ParamValue::Int(i64::MAX));
        assert_eq!(hp.default_value(), ParamValue::Int(i64::MAX - 5));

        let hp = Hyperparameter::int("n", i64::MIN, i64::MIN + 3);
        hp.check().unwrap();
        assert_eq!(hp.decode(0.), ParamValue::Int(i64::MIN));
    }

    #[test]
    fn test_float_decode_is_shortest() {
        let hp = Hyperparameter::float("x", -5., 10.);
        let e = hp.encode(&ParamValue::Float(0.1)).unwrap().unwrap();
        assert_eq!(hp.decode(e), ParamValue::Float(0.1));
        let hp = Hyperparameter::float("lr", 1e-5, 1.).log_scale(true);
        let e = hp.encode(&ParamValue::Float(0.003)).unwrap().unwrap();
        assert_eq!(hp.decode(e), ParamValue::Float(0.003));
        assert_eq!(hp.decode(0.), ParamValue::Float(1e-5));
        let mut rng = Xoshiro256Plus::seed_from_u64(7);
        for _ in 0..100 {
            let v = hp.decode(rng.gen::<f64>());
            let e = hp.encode(&v).unwrap().unwrap();
            assert_eq!(hp.decode(e), v);
        }
    }

    #[test]
    fn test_neighbor_changes_value() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let hps = [
            Hyperparameter::float("x", 0., 1.),
            Hyperparameter::int("n", 0, 3),
            Hyperparameter::categorical("c", ["a", "b", "c"]),
            Hyperparameter::ordinal("o", ["s", "m", "l"]),
        ];
        for hp in hps.iter() {
            let x = hp.encode(&hp.default_value()).unwrap().unwrap();
            for _ in 0..20 {
                let n = hp.encoded_neighbor(x, &mut rng);
                assert_ne!(hp.decode(n), hp.decode(x), "{}", hp.name());
            }
        }
    }

    #[test]
    fn test_serde_values() {
        let values: Vec<ParamValue> = serde_json::from_str(r#"[3, 2.5, "a"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                ParamValue::Int(3),
                ParamValue::Float(2.5),
                ParamValue::Str("a".to_string())
            ]
        );
        let json = serde_json::to_string(&Hyperparameter::float("x", 0., 1.)).unwrap();
        let hp: Hyperparameter = serde_json::from_str(&json).unwrap();
        assert_eq!(hp, Hyperparameter::float("x", 0., 1.));
    }
}
