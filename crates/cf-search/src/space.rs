//! Search space definitions and per-domain sampling, normalization and
//! perturbation.

use cf_types::{ConfigError, ParameterValue};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::Configuration;

/// Separator used when nested spaces are flattened into one level.
pub const NESTED_SEPARATOR: &str = "/";

/// Describes how a single parameter is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Domain {
    /// Uniform choice over an ordered set of options.
    Categorical { options: Vec<serde_json::Value> },
    /// Integer range [low, high] inclusive.
    IntUniform { low: i64, high: i64 },
    /// Integer range [low, high] inclusive, sampled in log-space.
    IntLogUniform { low: i64, high: i64 },
    /// Continuous uniform range [low, high].
    FloatUniform { low: f64, high: f64 },
    /// Log-uniform range (sampled in log-space then exponentiated).
    FloatLogUniform { low: f64, high: f64 },
}

/// Which way a perturbation moves along a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Self::Up => 1.0,
            Self::Down => -1.0,
        }
    }

    pub fn flip(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }
}

impl Domain {
    /// Check bounds and option sets.
    pub fn validate(&self, parameter: &str) -> Result<(), ConfigError> {
        let invalid_bounds = |low: f64, high: f64| ConfigError::InvalidBounds {
            parameter: parameter.to_string(),
            low,
            high,
        };
        let invalid_log = |low: f64| ConfigError::InvalidLogBounds {
            parameter: parameter.to_string(),
            low,
        };

        match self {
            Self::Categorical { options } if options.is_empty() => Err(ConfigError::EmptyChoices {
                parameter: parameter.to_string(),
            }),
            Self::Categorical { .. } => Ok(()),
            Self::IntUniform { low, high } if low > high => {
                Err(invalid_bounds(*low as f64, *high as f64))
            }
            Self::IntUniform { .. } => Ok(()),
            Self::IntLogUniform { low, .. } if *low <= 0 => Err(invalid_log(*low as f64)),
            Self::IntLogUniform { low, high } if low > high => {
                Err(invalid_bounds(*low as f64, *high as f64))
            }
            Self::IntLogUniform { .. } => Ok(()),
            // Width must be finite too.
            Self::FloatUniform { low, high } if !(low <= high && (high - low).is_finite()) => {
                Err(invalid_bounds(*low, *high))
            }
            Self::FloatUniform { .. } => Ok(()),
            Self::FloatLogUniform { low, .. } if !(*low > 0.0) => Err(invalid_log(*low)),
            Self::FloatLogUniform { low, high } if !(low <= high && high.is_finite()) => {
                Err(invalid_bounds(*low, *high))
            }
            Self::FloatLogUniform { .. } => Ok(()),
        }
    }

    /// Draw a fresh value from the domain.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParameterValue {
        match self {
            Self::Categorical { options } => {
                let idx = rng.random_range(0..options.len());
                ParameterValue::Json(options[idx].clone())
            }
            Self::IntUniform { low, high } => ParameterValue::Int(rng.random_range(*low..=*high)),
            Self::IntLogUniform { low, high } => {
                // Sample over [low, high + 1) so `high` keeps its share of the log mass.
                let log_low = (*low as f64).ln();
                let log_high = (*high as f64 + 1.0).ln();
                let value = rng.random_range(log_low..log_high).exp().floor() as i64;
                ParameterValue::Int(value.clamp(*low, *high))
            }
            Self::FloatUniform { low, high } => ParameterValue::Float(rng.random_range(*low..=*high)),
            Self::FloatLogUniform { low, high } => {
                let log_val: f64 = rng.random_range(low.ln()..=high.ln());
                ParameterValue::Float(log_val.exp().clamp(*low, *high))
            }
        }
    }

    /// Whether `value` lies inside the domain.
    pub fn contains(&self, value: &ParameterValue) -> bool {
        match self {
            Self::Categorical { .. } => self.option_index(value).is_some(),
            Self::IntUniform { low, high } | Self::IntLogUniform { low, high } => {
                matches!(value.as_i64(), Some(v) if v >= *low && v <= *high)
            }
            Self::FloatUniform { low, high } | Self::FloatLogUniform { low, high } => {
                matches!(value.as_f64(), Some(v) if v >= *low && v <= *high)
            }
        }
    }

    /// Map a value into the unit interval.
    ///
    /// Log domains are linear in log-space; categorical option `i` of `n`
    /// sits at the centre of its bucket, `(i + 0.5) / n`.
    pub fn normalize(&self, value: &ParameterValue) -> Option<f64> {
        let unit = match self {
            Self::Categorical { options } => {
                let idx = self.option_index(value)?;
                (idx as f64 + 0.5) / options.len() as f64
            }
            Self::IntUniform { low, high } => {
                let width = int_width(*low, *high);
                if width > 0.0 {
                    int_offset(value.as_i64()?, *low) / width
                } else {
                    0.0
                }
            }
            Self::FloatUniform { low, high } => linear_unit(value.as_f64()?, *low, *high),
            Self::IntLogUniform { low, high } => {
                log_unit(value.as_f64()?, *low as f64, *high as f64)
            }
            Self::FloatLogUniform { low, high } => log_unit(value.as_f64()?, *low, *high),
        };
        Some(unit.clamp(0.0, 1.0))
    }

    /// Inverse of [`Domain::normalize`]; `x` is clamped into `[0, 1]` first.
    pub fn denormalize(&self, x: f64) -> ParameterValue {
        let x = x.clamp(0.0, 1.0);
        match self {
            Self::Categorical { options } => {
                let idx = ((x * options.len() as f64).floor() as usize).min(options.len() - 1);
                ParameterValue::Json(options[idx].clone())
            }
            Self::IntUniform { low, high } => {
                let offset = (x * int_width(*low, *high)).round() as i128;
                let v = (i128::from(*low) + offset).clamp(i128::from(*low), i128::from(*high));
                ParameterValue::Int(v as i64)
            }
            Self::IntLogUniform { low, high } => {
                let ratio = *high as f64 / *low as f64;
                let v = (ratio.powf(x) * *low as f64).round() as i64;
                ParameterValue::Int(v.clamp(*low, *high))
            }
            Self::FloatUniform { high, .. } | Self::FloatLogUniform { high, .. } if x >= 1.0 => {
                ParameterValue::Float(*high)
            }
            Self::FloatUniform { low, high } => {
                ParameterValue::Float((low + x * (high - low)).clamp(*low, *high))
            }
            Self::FloatLogUniform { low, high } => {
                let log_low = low.ln();
                let value = (log_low + x * (high.ln() - log_low)).exp();
                ParameterValue::Float(value.clamp(*low, *high))
            }
        }
    }

    /// Move `current` by `step` (in normalized units) along `direction`.
    ///
    /// Returns `None` when the move cannot change the value, e.g. when the
    /// value is pinned at the bound it would move towards. Integer domains
    /// always move at least one unit; categorical domains shift the option
    /// index by at least one and wrap around.
    pub fn perturb(
        &self,
        current: &ParameterValue,
        step: f64,
        direction: Direction,
    ) -> Option<ParameterValue> {
        match self {
            Self::Categorical { options } => {
                let n = options.len();
                if n < 2 {
                    return None;
                }
                let idx = self.option_index(current)? as i64;
                let shift = ((step * n as f64).round() as i64).max(1);
                let moved = match direction {
                    Direction::Up => idx + shift,
                    Direction::Down => idx - shift,
                };
                let wrapped = moved.rem_euclid(n as i64) as usize;
                if wrapped as i64 == idx {
                    return None;
                }
                Some(ParameterValue::Json(options[wrapped].clone()))
            }
            Self::IntUniform { low, high } | Self::IntLogUniform { low, high } => {
                let value = current.as_i64()?;
                let x = self.normalize(current)?;
                let mut moved = self.denormalize(x + direction.sign() * step).as_i64()?;
                if moved == value {
                    moved = match direction {
                        Direction::Up => value.saturating_add(1),
                        Direction::Down => value.saturating_sub(1),
                    };
                }
                if moved < *low || moved > *high || moved == value {
                    return None;
                }
                Some(ParameterValue::Int(moved))
            }
            Self::FloatUniform { .. } | Self::FloatLogUniform { .. } => {
                let value = current.as_f64()?;
                let x = self.normalize(current)?;
                let target = (x + direction.sign() * step).clamp(0.0, 1.0);
                if target == x {
                    return None;
                }
                let moved = self.denormalize(target);
                if moved.as_f64() == Some(value) {
                    return None;
                }
                Some(moved)
            }
        }
    }

    /// Smallest meaningful step in normalized units.
    ///
    /// Integer domains resolve to one unit at the top of the range (the
    /// narrowest unit in log-space), categorical domains to one option.
    pub fn resolution(&self, min_float_step: f64) -> f64 {
        match self {
            Self::Categorical { options } => 1.0 / options.len() as f64,
            Self::IntUniform { low, high } if high > low => 1.0 / int_width(*low, *high),
            Self::IntLogUniform { low, high } if high > low => {
                let high = *high as f64;
                (1.0 / high).ln_1p() / (high / *low as f64).ln()
            }
            Self::IntUniform { .. } | Self::IntLogUniform { .. } => 1.0,
            Self::FloatUniform { .. } | Self::FloatLogUniform { .. } => min_float_step,
        }
    }

    /// A domain that holds exactly one value can never be perturbed.
    pub fn is_singleton(&self) -> bool {
        match self {
            Self::Categorical { options } => options.len() < 2,
            Self::IntUniform { low, high } | Self::IntLogUniform { low, high } => low == high,
            Self::FloatUniform { low, high } | Self::FloatLogUniform { low, high } => low == high,
        }
    }

    fn option_index(&self, value: &ParameterValue) -> Option<usize> {
        match self {
            Self::Categorical { options } => options
                .iter()
                .position(|option| ParameterValue::Json(option.clone()) == *value),
            _ => None,
        }
    }
}

/// `high - low`, exact in `i128` before the conversion.
fn int_width(low: i64, high: i64) -> f64 {
    int_offset(high, low)
}

fn int_offset(v: i64, low: i64) -> f64 {
    (i128::from(v) - i128::from(low)) as f64
}

fn linear_unit(v: f64, low: f64, high: f64) -> f64 {
    if high > low {
        (v - low) / (high - low)
    } else {
        0.0
    }
}

fn log_unit(v: f64, low: f64, high: f64) -> f64 {
    if high > low && v > 0.0 {
        (v.ln() - low.ln()) / (high.ln() - low.ln())
    } else {
        0.0
    }
}

/// What a named entry in the search space holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterKind {
    Domain(Domain),
    /// A nested group of definitions. Must be flattened before sampling.
    Nested(SearchSpace),
}

/// A single named entry in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Human-readable parameter name (e.g. "learning_rate").
    pub name: String,
    pub kind: ParameterKind,
}

/// A resolved dimension: a named, concrete domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub domain: Domain,
}

/// The full search space: an ordered list of parameter definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    pub fn add(mut self, name: impl Into<String>, domain: Domain) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::Domain(domain),
        });
        self
    }

    pub fn add_categorical(self, name: impl Into<String>, options: Vec<serde_json::Value>) -> Self {
        self.add(name, Domain::Categorical { options })
    }

    pub fn add_int(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.add(name, Domain::IntUniform { low, high })
    }

    pub fn add_log_int(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.add(name, Domain::IntLogUniform { low, high })
    }

    pub fn add_float(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(name, Domain::FloatUniform { low, high })
    }

    pub fn add_log_float(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(name, Domain::FloatLogUniform { low, high })
    }

    pub fn add_nested(mut self, name: impl Into<String>, space: SearchSpace) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::Nested(space),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ParameterKind> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.kind)
    }

    /// Check every domain (nested ones included) and name uniqueness.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for param in &self.parameters {
            if !seen.insert(param.name.as_str()) {
                return Err(ConfigError::DuplicateParameter {
                    parameter: param.name.clone(),
                });
            }
            match &param.kind {
                ParameterKind::Domain(domain) => domain.validate(&param.name)?,
                ParameterKind::Nested(space) => space.validate()?,
            }
        }
        Ok(())
    }

    /// True when no entry is a nested definition.
    pub fn is_resolved(&self) -> bool {
        self.parameters
            .iter()
            .all(|p| matches!(p.kind, ParameterKind::Domain(_)))
    }

    /// Hoist nested definitions to the top level as `outer/inner` names.
    pub fn flattened(&self) -> SearchSpace {
        let mut flat = SearchSpace::new();
        for param in &self.parameters {
            match &param.kind {
                ParameterKind::Domain(domain) => flat = flat.add(param.name.clone(), domain.clone()),
                ParameterKind::Nested(space) => {
                    for inner in space.flattened().parameters {
                        flat.parameters.push(ParameterDef {
                            name: format!("{}{}{}", param.name, NESTED_SEPARATOR, inner.name),
                            kind: inner.kind,
                        });
                    }
                }
            }
        }
        flat
    }

    /// The resolved dimensions, in declaration order.
    pub fn dimensions(&self) -> Result<Vec<Dimension>, ConfigError> {
        self.parameters
            .iter()
            .map(|param| match &param.kind {
                ParameterKind::Domain(domain) => Ok(Dimension {
                    name: param.name.clone(),
                    domain: domain.clone(),
                }),
                ParameterKind::Nested(_) => Err(ConfigError::UnresolvedSearchSpace {
                    parameter: param.name.clone(),
                }),
            })
            .collect()
    }

    /// Draw a full configuration.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Configuration, ConfigError> {
        let dims = self.dimensions()?;
        Ok(sample_dimensions(&dims, rng))
    }
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn sample_dimensions<R: Rng + ?Sized>(dims: &[Dimension], rng: &mut R) -> Configuration {
    dims.iter()
        .map(|dim| (dim.name.clone(), dim.domain.sample(rng)))
        .collect()
}
