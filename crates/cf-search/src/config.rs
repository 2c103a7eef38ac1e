//! Concrete configurations: one value per search-space dimension.

use cf_types::{ConfigError, ParameterValue};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::space::Dimension;

/// A mapping from parameter name to a concrete value.
///
/// Handed out by value: the searcher keeps its own copy, so callers are free
/// to mutate what they receive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration(BTreeMap<String, ParameterValue>);

impl Configuration {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParameterValue) -> Option<ParameterValue> {
        self.0.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParameterValue)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> BTreeMap<String, ParameterValue> {
        self.0
    }

    /// Check that this is a complete configuration of `dims`.
    pub fn validate(&self, dims: &[Dimension]) -> Result<(), ConfigError> {
        self.validate_partial(dims)?;
        match dims.iter().find(|dim| !self.0.contains_key(&dim.name)) {
            Some(missing) => Err(ConfigError::ValueOutOfDomain {
                parameter: missing.name.clone(),
                value: "<missing>".to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Check that every key names a dimension and every value is in range.
    pub fn validate_partial(&self, dims: &[Dimension]) -> Result<(), ConfigError> {
        for (name, value) in &self.0 {
            let dim = dims
                .iter()
                .find(|dim| &dim.name == name)
                .ok_or_else(|| ConfigError::UnknownParameter {
                    parameter: name.clone(),
                })?;
            if !dim.domain.contains(value) {
                return Err(ConfigError::ValueOutOfDomain {
                    parameter: name.clone(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Complete a low-cost partial configuration: keep every value it names
    /// and sample the rest from the space.
    pub fn merge_low_cost<R: Rng + ?Sized>(
        dims: &[Dimension],
        partial: &Configuration,
        rng: &mut R,
    ) -> Result<Configuration, ConfigError> {
        partial.validate_partial(dims)?;
        Ok(dims
            .iter()
            .map(|dim| {
                let value = match partial.get(&dim.name) {
                    Some(value) => value.clone(),
                    None => dim.domain.sample(rng),
                };
                (dim.name.clone(), value)
            })
            .collect())
    }
}

impl FromIterator<(String, ParameterValue)> for Configuration {
    fn from_iter<I: IntoIterator<Item = (String, ParameterValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Configuration {
    type Item = (String, ParameterValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, ParameterValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<BTreeMap<String, ParameterValue>> for Configuration {
    fn from(map: BTreeMap<String, ParameterValue>) -> Self {
        Self(map)
    }
}

impl std::fmt::Display for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::SearchSpace;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn dims() -> Vec<Dimension> {
        SearchSpace::new()
            .add_int("batch", 16, 32)
            .add_float("dropout", 0.5, 0.9)
            .add_log_float("lr", 1e-4, 1e-1)
            .dimensions()
            .unwrap()
    }

    #[test]
    fn merge_keeps_partial_values_and_fills_the_rest() {
        let partial = Configuration::new().with("batch", 32i64).with("lr", 0.001);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let merged = Configuration::merge_low_cost(&dims(), &partial, &mut rng).unwrap();

        assert_eq!(merged.len(), 3);
        assert_eq!(merged.get("batch"), Some(&ParameterValue::Int(32)));
        assert_eq!(merged.get("lr"), Some(&ParameterValue::Float(0.001)));
        let dropout = merged.get("dropout").unwrap().as_f64().unwrap();
        assert!((0.5..=0.9).contains(&dropout));
        assert!(merged.validate(&dims()).is_ok());
    }

    #[test]
    fn merge_rejects_unknown_and_out_of_range_values() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let unknown = Configuration::new().with("momentum", 0.9);
        assert!(matches!(
            Configuration::merge_low_cost(&dims(), &unknown, &mut rng),
            Err(ConfigError::UnknownParameter { .. })
        ));

        let out_of_range = Configuration::new().with("batch", 64i64);
        assert!(matches!(
            Configuration::merge_low_cost(&dims(), &out_of_range, &mut rng),
            Err(ConfigError::ValueOutOfDomain { .. })
        ));
    }

    #[test]
    fn validate_requires_every_dimension() {
        let partial = Configuration::new().with("batch", 20i64);
        assert!(partial.validate_partial(&dims()).is_ok());
        assert!(partial.validate(&dims()).is_err());
    }

    #[test]
    fn display_lists_values_in_name_order() {
        let config = Configuration::new().with("lr", 0.5).with("batch", 16i64);
        assert_eq!(config.to_string(), "{batch: 16, lr: 0.5}");
    }
}
